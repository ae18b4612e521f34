use crate::eid::Eid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io::ErrorKind,
    sync::{Arc, RwLock},
    time::Instant,
};

/// Content modality of an entry. Drives which metadata fields are populated
/// and how the renderer draws the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Text,
    Image,
    Audio,
    Youtube,
    Spotify,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Youtube => "youtube",
            Self::Spotify => "spotify",
        }
    }
}

impl Default for EntryKind {
    fn default() -> Self {
        Self::Text
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribution for who submitted an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Type-specific entry metadata plus the denormalized comment-id list.
///
/// `comment_ids` is an advisory cache of the parent/child relation; the
/// `parent_id` column on the child is authoritative (see
/// [`EntryStore::reconcile_comment_ids`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(rename = "type", default)]
    pub kind: EntryKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    /// Canonical URL of a detected provider link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    /// Provider embed-player URL for the renderer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comment_ids: Vec<Eid>,

    /// Anything we don't model explicitly survives round-trips untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A content item: either a root post or, when `parent_id` is set, a comment
/// on one. Comments are stored flat in the same table; `comments` is only
/// populated on the read path, one level deep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Eid,

    /// Canonical display text: original text, caption, transcript, or title
    pub data: String,

    pub metadata: EntryMetadata,

    /// Semantic vector computed from `data`; fixed dimensionality
    pub embedding: Vec<f32>,

    pub collection: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Eid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Entry>,
}

impl Entry {
    pub fn is_comment(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryCreate {
    pub data: String,
    pub metadata: EntryMetadata,
    pub embedding: Vec<f32>,
    pub collection: String,
    pub parent_id: Option<Eid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt entry database: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub trait EntryStore: Send + Sync {
    fn create(&self, create: EntryCreate) -> Result<Entry, StoreError>;
    fn get(&self, id: &Eid) -> Result<Option<Entry>, StoreError>;

    /// Delete an entry and, cascading, every entry whose `parent_id`
    /// references it. Returns the removed entries (empty if `id` is
    /// unknown) so the caller can clean up associated media blobs.
    fn delete(&self, id: &Eid) -> Result<Vec<Entry>, StoreError>;

    /// Root entries of a collection, newest first, each carrying its
    /// comments one level deep (oldest first within a thread).
    fn list_by_collection(&self, collection: &str) -> Result<Vec<Entry>, StoreError>;

    /// Append `comment_id` to the parent's `comment_ids` and bump its
    /// `updated_at`. Best-effort half of the dual write: the comment row
    /// already exists and no lock spans both steps. Returns the updated
    /// parent, or `None` if the parent is gone.
    fn attach_comment(&self, parent_id: &Eid, comment_id: &Eid)
        -> Result<Option<Entry>, StoreError>;

    /// Remove `comment_id` from the parent's list on comment deletion.
    fn detach_comment(&self, parent_id: &Eid, comment_id: &Eid)
        -> Result<Option<Entry>, StoreError>;

    /// Distinct collection names with entry counts (comments included),
    /// sorted by name. Collections have no independent existence: a name
    /// with zero entries simply does not appear.
    fn collections(&self) -> Result<Vec<CollectionSummary>, StoreError>;

    /// Rebuild every `comment_ids` list from the authoritative `parent_id`
    /// links. Returns the number of parents repaired. Timestamps are left
    /// untouched: reconciliation is repair, not mutation.
    fn reconcile_comment_ids(&self) -> Result<usize, StoreError>;
}

/// JSON-file backend: the whole entry table lives in memory behind an
/// RwLock and is flushed atomically (temp file + rename) on every mutation.
#[derive(Clone, Default)]
pub struct BackendJson {
    list: Arc<RwLock<Vec<Entry>>>,
    path: String,
}

impl BackendJson {
    pub fn load(path: &str) -> Result<Self, StoreError> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new entry database at {path}");
                    std::fs::write(path, b"[]")?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let raw = std::fs::read(path)?;
        let entries: Vec<Entry> = serde_json::from_slice(&raw)?;

        log::debug!(
            "took {}ms to read entry database ({} entries)",
            now.elapsed().as_micros() as f64 / 1000.0,
            entries.len()
        );

        Ok(BackendJson {
            list: Arc::new(RwLock::new(entries)),
            path: path.to_string(),
        })
    }

    fn save(&self) -> Result<(), StoreError> {
        let entries = self.list.read().unwrap();

        let temp_path = format!("{}-tmp", &self.path);
        let raw = serde_json::to_vec(&*entries)?;
        std::fs::write(&temp_path, raw)?;
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    #[cfg(test)]
    pub fn list(&self) -> Arc<RwLock<Vec<Entry>>> {
        self.list.clone()
    }
}

impl EntryStore for BackendJson {
    fn create(&self, create: EntryCreate) -> Result<Entry, StoreError> {
        let now = Utc::now();
        let entry = Entry {
            id: Eid::new(),
            data: create.data,
            metadata: create.metadata,
            embedding: create.embedding,
            collection: create.collection,
            parent_id: create.parent_id,
            created_at: now,
            updated_at: now,
            comments: Vec::new(),
        };

        self.list.write().unwrap().push(entry.clone());

        self.save()?;

        Ok(entry)
    }

    fn get(&self, id: &Eid) -> Result<Option<Entry>, StoreError> {
        let entries = self.list.read().unwrap();
        Ok(entries.iter().find(|e| e.id == *id).cloned())
    }

    fn delete(&self, id: &Eid) -> Result<Vec<Entry>, StoreError> {
        let mut entries = self.list.write().unwrap();

        let target = match entries.iter().find(|e| e.id == *id).cloned() {
            Some(target) => target,
            None => return Ok(Vec::new()),
        };

        let mut removed = Vec::new();
        entries.retain(|e| {
            if e.id == *id || e.parent_id.as_ref() == Some(id) {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });

        // keep the parent's advisory list in step when a comment goes away
        if let Some(parent_id) = &target.parent_id {
            if let Some(parent) = entries.iter_mut().find(|e| e.id == *parent_id) {
                parent.metadata.comment_ids.retain(|c| c != id);
                parent.updated_at = Utc::now();
            }
        }

        drop(entries);

        self.save()?;

        Ok(removed)
    }

    fn list_by_collection(&self, collection: &str) -> Result<Vec<Entry>, StoreError> {
        let entries = self.list.read().unwrap();

        let mut roots: Vec<Entry> = entries
            .iter()
            .filter(|e| e.collection == collection && e.parent_id.is_none())
            .cloned()
            .collect();

        // newest first; ULIDs sort by creation time, breaking timestamp ties
        roots.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        for root in roots.iter_mut() {
            let mut comments: Vec<Entry> = entries
                .iter()
                .filter(|e| e.parent_id.as_ref() == Some(&root.id))
                .cloned()
                .collect();

            comments.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });

            root.comments = comments;
        }

        Ok(roots)
    }

    fn attach_comment(
        &self,
        parent_id: &Eid,
        comment_id: &Eid,
    ) -> Result<Option<Entry>, StoreError> {
        let mut entries = self.list.write().unwrap();

        let parent = match entries.iter_mut().find(|e| e.id == *parent_id) {
            Some(parent) => parent,
            None => return Ok(None),
        };

        if !parent.metadata.comment_ids.contains(comment_id) {
            parent.metadata.comment_ids.push(comment_id.clone());
            parent.updated_at = Utc::now();
        }

        let result = parent.clone();
        drop(entries);

        self.save()?;

        Ok(Some(result))
    }

    fn detach_comment(
        &self,
        parent_id: &Eid,
        comment_id: &Eid,
    ) -> Result<Option<Entry>, StoreError> {
        let mut entries = self.list.write().unwrap();

        let parent = match entries.iter_mut().find(|e| e.id == *parent_id) {
            Some(parent) => parent,
            None => return Ok(None),
        };

        let before = parent.metadata.comment_ids.len();
        parent.metadata.comment_ids.retain(|c| c != comment_id);
        if parent.metadata.comment_ids.len() != before {
            parent.updated_at = Utc::now();
        }

        let result = parent.clone();
        drop(entries);

        self.save()?;

        Ok(Some(result))
    }

    fn collections(&self) -> Result<Vec<CollectionSummary>, StoreError> {
        let entries = self.list.read().unwrap();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in entries.iter() {
            *counts.entry(entry.collection.clone()).or_insert(0) += 1;
        }

        let mut summaries: Vec<CollectionSummary> = counts
            .into_iter()
            .map(|(name, count)| CollectionSummary { name, count })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(summaries)
    }

    fn reconcile_comment_ids(&self) -> Result<usize, StoreError> {
        let mut entries = self.list.write().unwrap();

        // authoritative child lists, thread-ordered
        let mut children: HashMap<Eid, Vec<(DateTime<Utc>, Eid)>> = HashMap::new();
        for entry in entries.iter() {
            if let Some(parent_id) = &entry.parent_id {
                children
                    .entry(parent_id.clone())
                    .or_default()
                    .push((entry.created_at, entry.id.clone()));
            }
        }

        let mut repaired = 0;
        for entry in entries.iter_mut() {
            let mut expected: Vec<Eid> = children
                .remove(&entry.id)
                .map(|mut ids| {
                    ids.sort();
                    ids.into_iter().map(|(_, id)| id).collect()
                })
                .unwrap_or_default();

            if entry.metadata.comment_ids != expected {
                std::mem::swap(&mut entry.metadata.comment_ids, &mut expected);
                repaired += 1;
            }
        }

        drop(entries);

        if repaired > 0 {
            log::warn!("reconciled comment_ids on {repaired} entries");
            self.save()?;
        }

        Ok(repaired)
    }
}
