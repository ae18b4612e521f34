use crate::projection::{ProjectedPoint, ProjectionItem, Projector, FALLBACK_RADIUS};

const DIMS: usize = 8;

fn item(id: &str, embedding: Vec<f32>) -> ProjectionItem {
    ProjectionItem {
        id: id.into(),
        embedding,
    }
}

fn valid_item(id: &str, seed: f32) -> ProjectionItem {
    item(id, (0..DIMS).map(|d| seed + d as f32 * 0.01).collect())
}

fn assert_all_finite(points: &[ProjectedPoint]) {
    for p in points {
        assert!(p.x.is_finite() && p.y.is_finite(), "{} is non-finite", p.id);
    }
}

#[test]
fn test_zero_items() {
    let projector = Projector::new(DIMS);
    assert!(projector.project(&[]).is_empty());
}

#[test]
fn test_single_item_at_origin() {
    // full production dimensionality for the exactness property
    let projector = Projector::new(1536);
    let items = vec![item("only", vec![0.25; 1536])];

    let points = projector.project(&items);
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].id, "only".into());
    assert_eq!((points[0].x, points[0].y), (0.0, 0.0));
}

#[test]
fn test_two_items_fixed_layout_in_input_order() {
    let projector = Projector::new(DIMS);
    let items = vec![valid_item("left", 0.0), valid_item("right", 1.0)];

    let points = projector.project(&items);
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].id, "left".into());
    assert_eq!((points[0].x, points[0].y), (-1.0, 0.0));
    assert_eq!(points[1].id, "right".into());
    assert_eq!((points[1].x, points[1].y), (1.0, 0.0));
}

#[test]
fn test_every_input_id_appears_exactly_once() {
    let projector = Projector::new(DIMS);

    let items: Vec<ProjectionItem> = (0..7)
        .map(|i| valid_item(&format!("id-{i}"), i as f32))
        .collect();

    let points = projector.project(&items);
    assert_eq!(points.len(), 7);
    for i in 0..7 {
        let id = format!("id-{i}");
        assert_eq!(
            points.iter().filter(|p| p.id == id.clone().into()).count(),
            1
        );
    }
    assert_all_finite(&points);
}

#[test]
fn test_malformed_embeddings_land_on_fallback_ring() {
    let projector = Projector::new(DIMS);

    let items = vec![
        valid_item("ok-1", 0.0),
        valid_item("ok-2", 5.0),
        valid_item("ok-3", 9.0),
        item("short", vec![1.0, 2.0]),
        item("empty", vec![]),
        item("nan", vec![f32::NAN; DIMS]),
    ];

    let points = projector.project(&items);
    assert_eq!(points.len(), 6);
    assert_all_finite(&points);

    for id in ["short", "empty", "nan"] {
        let p = points.iter().find(|p| p.id == id.into()).unwrap();
        let radius = (p.x * p.x + p.y * p.y).sqrt();
        assert!(
            (radius - FALLBACK_RADIUS).abs() < 1e-4,
            "{id} is off the ring (radius {radius})"
        );
    }
}

#[test]
fn test_all_malformed_still_all_positioned() {
    let projector = Projector::new(DIMS);

    let items: Vec<ProjectionItem> = (0..4)
        .map(|i| item(&format!("bad-{i}"), vec![1.0, 2.0]))
        .collect();

    let points = projector.project(&items);
    assert_eq!(points.len(), 4);
    assert_all_finite(&points);

    // evenly spaced on the ring means distinct positions
    for (i, a) in points.iter().enumerate() {
        for b in points.iter().skip(i + 1) {
            assert!((a.x, a.y) != (b.x, b.y));
        }
    }
}

#[test]
fn test_small_valid_subset_among_malformed() {
    let projector = Projector::new(DIMS);

    // 4 items total, only one carries a usable embedding
    let items = vec![
        item("bad-1", vec![]),
        valid_item("good", 1.0),
        item("bad-2", vec![f32::INFINITY; DIMS]),
        item("bad-3", vec![0.0; DIMS + 1]),
    ];

    let points = projector.project(&items);
    assert_eq!(points.len(), 4);

    let good = points.iter().find(|p| p.id == "good".into()).unwrap();
    assert_eq!((good.x, good.y), (0.0, 0.0));

    // two valid ones get the fixed two-point layout
    let items = vec![
        valid_item("a", 1.0),
        item("bad", vec![]),
        valid_item("b", 2.0),
    ];
    let points = projector.project(&items);
    let a = points.iter().find(|p| p.id == "a".into()).unwrap();
    let b = points.iter().find(|p| p.id == "b".into()).unwrap();
    assert_eq!((a.x, a.y), (-1.0, 0.0));
    assert_eq!((b.x, b.y), (1.0, 0.0));
}

#[test]
fn test_repeated_projection_same_ids_finite_coordinates() {
    let projector = Projector::new(DIMS);

    let items: Vec<ProjectionItem> = (0..10)
        .map(|i| valid_item(&format!("id-{i}"), (i * 3) as f32))
        .collect();

    let first = projector.project(&items);
    let second = projector.project(&items);

    // coordinates may differ run to run; the id set may not
    let ids = |points: &[ProjectedPoint]| {
        let mut ids: Vec<String> = points.iter().map(|p| p.id.to_string()).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&first), ids(&second));
    assert_all_finite(&first);
    assert_all_finite(&second);
}

#[test]
fn test_larger_collection_spreads_out() {
    let projector = Projector::new(DIMS);

    let items: Vec<ProjectionItem> = (0..30)
        .map(|i| {
            let cluster = (i % 3) as f32 * 50.0;
            valid_item(&format!("id-{i}"), cluster + (i / 3) as f32 * 0.1)
        })
        .collect();

    let points = projector.project(&items);
    assert_eq!(points.len(), 30);
    assert_all_finite(&points);

    // a real layout, not everything collapsed onto one spot
    let (x0, y0) = (points[0].x, points[0].y);
    assert!(points.iter().any(|p| (p.x - x0).abs() > 1e-3 || (p.y - y0).abs() > 1e-3));
}
