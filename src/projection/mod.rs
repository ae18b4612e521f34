//! Semantic projection: embeddings in, 2D coordinates out.
//!
//! The general algorithm lives in [`umap`]; this module owns the edge-case
//! policy around it. Small inputs bypass the algorithm entirely (it is
//! unstable below a handful of points), malformed embeddings land on a
//! fallback ring, and an algorithm blow-up degrades to a circular layout
//! instead of an error. Every input id always comes back with one finite
//! position.

mod umap;

use crate::eid::Eid;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::RwLock;

/// Radius of the ring where items with malformed embeddings are parked,
/// outside the main layout.
pub const FALLBACK_RADIUS: f32 = 3.0;

#[derive(Debug, Clone)]
pub struct ProjectionItem {
    pub id: Eid,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedPoint {
    pub id: Eid,
    pub x: f32,
    pub y: f32,
}

/// Internal only: always downgraded to the circular fallback before it can
/// reach a caller.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("layout produced non-finite coordinates")]
    NotFinite,
}

pub struct Projector {
    dimensions: usize,
}

impl Projector {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Project a flat item list (parents and comments alike) to 2D.
    ///
    /// Coordinates are not deterministic across runs for ≥3 items; callers
    /// that need a stable layout reuse one result via [`ProjectionCache`]
    /// rather than re-invoking per render.
    pub fn project(&self, items: &[ProjectionItem]) -> Vec<ProjectedPoint> {
        match items.len() {
            0 => Vec::new(),
            1 => vec![point(&items[0].id, 0.0, 0.0)],
            2 => vec![
                point(&items[0].id, -1.0, 0.0),
                point(&items[1].id, 1.0, 0.0),
            ],
            _ => self.project_many(items),
        }
    }

    fn is_valid(&self, embedding: &[f32]) -> bool {
        embedding.len() == self.dimensions && embedding.iter().all(|v| v.is_finite())
    }

    fn project_many(&self, items: &[ProjectionItem]) -> Vec<ProjectedPoint> {
        let n = items.len();

        let mut valid: Vec<usize> = Vec::with_capacity(n);
        let mut invalid: Vec<usize> = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            if self.is_valid(&item.embedding) {
                valid.push(idx);
            } else {
                invalid.push(idx);
            }
        }

        if !invalid.is_empty() {
            log::warn!(
                "{} of {} items have malformed embeddings, parking them on the fallback ring",
                invalid.len(),
                n
            );
        }

        let mut positions: Vec<Option<(f32, f32)>> = vec![None; n];

        match valid.len() {
            0 => {}
            1 => positions[valid[0]] = Some((0.0, 0.0)),
            2 => {
                positions[valid[0]] = Some((-1.0, 0.0));
                positions[valid[1]] = Some((1.0, 0.0));
            }
            count => {
                let embeddings: Vec<Vec<f32>> = valid
                    .iter()
                    .map(|&idx| items[idx].embedding.clone())
                    .collect();
                let params = umap::UmapParams::for_item_count(count);

                match umap::fit(&embeddings, &params) {
                    Ok(coords) => {
                        for (slot, coord) in valid.iter().zip(coords) {
                            positions[*slot] = Some((coord[0], coord[1]));
                        }
                    }
                    Err(err) => {
                        // degraded but navigable beats nothing
                        log::warn!("projection failed ({err}), falling back to circle layout");
                        for (t, slot) in valid.iter().enumerate() {
                            let theta = (t as f32 / count as f32) * 2.0 * std::f32::consts::PI;
                            positions[*slot] = Some((theta.cos(), theta.sin()));
                        }
                    }
                }
            }
        }

        for (t, slot) in invalid.iter().enumerate() {
            let theta = (t as f32 / invalid.len() as f32) * 2.0 * std::f32::consts::PI;
            positions[*slot] = Some((FALLBACK_RADIUS * theta.cos(), FALLBACK_RADIUS * theta.sin()));
        }

        items
            .iter()
            .zip(positions)
            .map(|(item, pos)| {
                let (x, y) = pos.expect("every item is assigned a position");
                point(&item.id, x, y)
            })
            .collect()
    }
}

fn point(id: &Eid, x: f32, y: f32) -> ProjectedPoint {
    ProjectedPoint {
        id: id.clone(),
        x,
        y,
    }
}

/// Hash of a projection input set: sorted (id, embedding) pairs. Two
/// snapshots hash equal iff the same ids carry the same vectors, which is
/// exactly when a cached layout may be reused.
pub fn snapshot_hash(items: &[ProjectionItem]) -> [u8; 32] {
    let mut sorted: Vec<&ProjectionItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = Sha256::new();
    for item in sorted {
        hasher.update(item.id.as_bytes());
        hasher.update([0u8]);
        for v in &item.embedding {
            hasher.update(v.to_le_bytes());
        }
        hasher.update([0xffu8]);
    }
    hasher.finalize().into()
}

struct CachedLayout {
    snapshot: [u8; 32],
    points: Vec<ProjectedPoint>,
}

/// Single-slot layout cache keyed by snapshot hash.
///
/// The projection is intentionally non-deterministic, so a collection view
/// re-rendering the same data must see the same coordinates; recomputation
/// only happens when the item set (or an embedding) actually changes.
#[derive(Default)]
pub struct ProjectionCache {
    inner: RwLock<Option<CachedLayout>>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&self, items: &[ProjectionItem], compute: F) -> Vec<ProjectedPoint>
    where
        F: FnOnce(&[ProjectionItem]) -> Vec<ProjectedPoint>,
    {
        let snapshot = snapshot_hash(items);

        if let Some(cached) = &*self.inner.read().unwrap() {
            if cached.snapshot == snapshot {
                return cached.points.clone();
            }
        }

        let points = compute(items);

        *self.inner.write().unwrap() = Some(CachedLayout {
            snapshot,
            points: points.clone(),
        });

        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, embedding: Vec<f32>) -> ProjectionItem {
        ProjectionItem {
            id: id.into(),
            embedding,
        }
    }

    #[test]
    fn test_snapshot_hash_ignores_order() {
        let a = vec![item("a", vec![1.0, 2.0]), item("b", vec![3.0, 4.0])];
        let b = vec![item("b", vec![3.0, 4.0]), item("a", vec![1.0, 2.0])];
        assert_eq!(snapshot_hash(&a), snapshot_hash(&b));
    }

    #[test]
    fn test_snapshot_hash_tracks_content() {
        let a = vec![item("a", vec![1.0, 2.0])];
        let b = vec![item("a", vec![1.0, 2.5])];
        let c = vec![item("c", vec![1.0, 2.0])];
        assert_ne!(snapshot_hash(&a), snapshot_hash(&b));
        assert_ne!(snapshot_hash(&a), snapshot_hash(&c));
    }

    #[test]
    fn test_cache_reuses_layout_for_same_snapshot() {
        let cache = ProjectionCache::new();
        let items = vec![item("a", vec![1.0]), item("b", vec![2.0])];

        let mut calls = 0;
        let first = cache.get_or_compute(&items, |_| {
            calls += 1;
            vec![point(&"a".into(), 0.0, 0.0), point(&"b".into(), 1.0, 1.0)]
        });

        let second = cache.get_or_compute(&items, |_| {
            calls += 1;
            unreachable!("cached snapshot must not recompute")
        });

        assert_eq!(calls, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cache_recomputes_on_changed_set() {
        let cache = ProjectionCache::new();
        let items = vec![item("a", vec![1.0])];

        cache.get_or_compute(&items, |_| vec![point(&"a".into(), 0.0, 0.0)]);

        let grown = vec![item("a", vec![1.0]), item("b", vec![2.0])];
        let mut recomputed = false;
        cache.get_or_compute(&grown, |_| {
            recomputed = true;
            vec![
                point(&"a".into(), 0.0, 0.0),
                point(&"b".into(), 1.0, 0.0),
            ]
        });

        assert!(recomputed);
    }
}
