//! End-to-end engine tests against in-memory vector and metadata sources.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use lookalike::config::Config;
use lookalike::model::ProductRef;
use lookalike::search::store::encode_vector;
use lookalike::search::{
    CancelToken, MetadataStore, SearchError, SearchService, VectorRecord, VectorSource,
};

/// Mutable in-memory vector source, so tests can grow the catalogue
/// between reloads.
struct MemSource {
    rows: Mutex<Vec<(String, Vec<f32>)>>,
}

impl MemSource {
    fn new(rows: &[(&str, &[f32])]) -> Self {
        Self {
            rows: Mutex::new(
                rows.iter()
                    .map(|(id, v)| (id.to_string(), v.to_vec()))
                    .collect(),
            ),
        }
    }

    fn push(&self, id: &str, vector: &[f32]) {
        self.rows.lock().push((id.to_string(), vector.to_vec()));
    }
}

impl VectorSource for MemSource {
    fn records(&self) -> anyhow::Result<Vec<VectorRecord>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .map(|(id, v)| VectorRecord {
                item_id: id.clone(),
                bytes: encode_vector(v),
            })
            .collect())
    }
}

/// Metadata store that synthesizes a URL for every id except those listed
/// as missing.
struct MemMeta {
    missing: HashSet<String>,
}

impl MemMeta {
    fn new() -> Self {
        Self {
            missing: HashSet::new(),
        }
    }

    fn without(ids: &[&str]) -> Self {
        Self {
            missing: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MetadataStore for MemMeta {
    fn lookup(&self, item_id: &str) -> anyhow::Result<Option<ProductRef>> {
        if self.missing.contains(item_id) {
            return Ok(None);
        }
        Ok(Some(ProductRef {
            item_id: item_id.to_string(),
            image_url: format!("http://img.test/{item_id}.jpg"),
        }))
    }
}

fn service_with(rows: &[(&str, &[f32])], dimension: usize) -> SearchService {
    let config = Config {
        dimension,
        ..Config::default()
    };
    SearchService::new(
        Arc::new(MemSource::new(rows)),
        Arc::new(MemMeta::new()),
        config,
    )
}

#[test]
fn initialize_is_idempotent_and_publishes_snapshot() {
    let service = service_with(&[("a", &[1.0, 0.0]), ("b", &[0.0, 1.0])], 2);
    assert!(!service.is_ready());
    assert!(service.initialize());
    assert!(service.is_ready());
    assert_eq!(service.snapshot_len(), Some(2));
    assert!(service.initialize());
    assert_eq!(service.snapshot_len(), Some(2));
}

#[test]
fn fused_search_ranks_by_combined_evidence() {
    let service = service_with(
        &[
            ("v1", &[1.0, 0.0]),
            ("v2", &[0.0, 1.0]),
            ("v3", &[0.7, 0.7]),
        ],
        2,
    );
    assert!(service.initialize());

    let hits = service.search(&[1.0, 0.0], 2).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.item_id.as_str()).collect();
    assert_eq!(ids, vec!["v1", "v3"]);
    // An exact match tops out every method and saturates the final score.
    assert_eq!(hits[0].score, 1.0);
    assert!(hits[1].score < hits[0].score);
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.score));
        assert_eq!(hit.image_url, format!("http://img.test/{}.jpg", hit.item_id));
    }
}

#[test]
fn results_are_bounded_by_top_k() {
    let rows: Vec<(String, Vec<f32>)> = (0..20)
        .map(|i| {
            let angle = i as f32 * 0.3;
            (format!("item-{i:02}"), vec![angle.cos(), angle.sin()])
        })
        .collect();
    let borrowed: Vec<(&str, &[f32])> = rows
        .iter()
        .map(|(id, v)| (id.as_str(), v.as_slice()))
        .collect();
    let service = service_with(&borrowed, 2);
    assert!(service.initialize());

    let hits = service.search(&[1.0, 0.0], 5).unwrap();
    assert_eq!(hits.len(), 5);
    let known: HashSet<&str> = borrowed.iter().map(|(id, _)| *id).collect();
    for hit in &hits {
        assert!(known.contains(hit.item_id.as_str()));
    }
}

#[test]
fn repeated_queries_are_deterministic() {
    let service = service_with(
        &[
            ("a", &[0.9, 0.1, 0.0]),
            ("b", &[0.1, 0.9, 0.0]),
            ("c", &[0.5, 0.5, 0.5]),
            ("d", &[0.0, 0.0, 1.0]),
        ],
        3,
    );
    assert!(service.initialize());

    let first = service.search(&[0.8, 0.2, 0.1], 3).unwrap();
    for _ in 0..5 {
        let again = service.search(&[0.8, 0.2, 0.1], 3).unwrap();
        assert_eq!(again.len(), first.len());
        for (a, b) in first.iter().zip(again.iter()) {
            assert_eq!(a.item_id, b.item_id);
            assert_eq!(a.score, b.score);
        }
    }
}

#[test]
fn empty_source_stays_non_ready() {
    let service = service_with(&[], 2);
    assert!(!service.initialize());
    assert!(!service.is_ready());
    let err = service.search(&[1.0, 0.0], 5).unwrap_err();
    assert!(matches!(err, SearchError::NotReady));
}

#[test]
fn results_without_metadata_are_dropped() {
    let config = Config {
        dimension: 2,
        ..Config::default()
    };
    let service = SearchService::new(
        Arc::new(MemSource::new(&[
            ("v1", &[1.0, 0.0]),
            ("v2", &[0.9, 0.1]),
            ("v3", &[0.0, 1.0]),
        ])),
        Arc::new(MemMeta::without(&["v2"])),
        config,
    );
    assert!(service.initialize());

    let hits = service.search(&[1.0, 0.0], 3).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.item_id.as_str()).collect();
    assert!(!ids.contains(&"v2"));
    assert!(ids.contains(&"v1"));
    assert!(ids.contains(&"v3"));
}

#[test]
fn pre_cancelled_token_aborts_the_query() {
    let service = service_with(&[("a", &[1.0, 0.0]), ("b", &[0.0, 1.0])], 2);
    assert!(service.initialize());

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = service.search_with_cancel(&[1.0, 0.0], 2, &cancel).unwrap_err();
    assert!(matches!(err, SearchError::Cancelled));
}

#[test]
fn query_dimension_is_checked() {
    let service = service_with(&[("a", &[1.0, 0.0])], 2);
    assert!(service.initialize());

    let err = service.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
    assert!(matches!(
        err,
        SearchError::DimensionMismatch {
            expected: 2,
            got: 3
        }
    ));
}

#[test]
fn reload_swaps_in_new_catalogue() {
    let source = Arc::new(MemSource::new(&[("a", &[1.0, 0.0])]));
    let config = Config {
        dimension: 2,
        ..Config::default()
    };
    let service = SearchService::new(source.clone(), Arc::new(MemMeta::new()), config);
    assert!(service.initialize());
    assert_eq!(service.snapshot_len(), Some(1));

    source.push("b", &[0.0, 1.0]);
    service.reload().unwrap();
    assert_eq!(service.snapshot_len(), Some(2));

    let hits = service.search(&[0.0, 1.0], 1).unwrap();
    assert_eq!(hits[0].item_id, "b");
}

#[test]
fn cosine_search_applies_the_threshold() {
    let service = service_with(
        &[
            ("near", &[1.0, 0.0]),
            ("far", &[-1.0, 0.0]),
            ("side", &[0.0, 1.0]),
        ],
        2,
    );
    assert!(service.initialize());

    let hits = service.search_cosine(&[1.0, 0.0], 3, Some(0.5)).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.item_id.as_str()).collect();
    assert_eq!(ids, vec!["near"]);
    assert!(hits[0].score > 0.99);
}
