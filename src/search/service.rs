//! Search service façade: snapshot lifecycle plus query entry points.
//!
//! The service is an explicitly constructed, owned instance (construct →
//! initialize → serve → drop); nothing here is process-global. Once a
//! snapshot is published it is immutable, so any number of concurrent
//! searches run against it without locking; a reload builds a replacement
//! off to the side and swaps the active `Arc` under the only lock in the
//! engine.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::SearchError;
use super::cancel::CancelToken;
use super::fusion::{QueryVector, ScoringMethod, fuse, standard_methods};
use super::index::ExactIndex;
use super::snapshot::Snapshot;
use super::store::{LoadError, VectorSource, VectorStore};
use crate::config::Config;
use crate::model::{ItemId, ProductRef, SearchHit};

/// External store resolving item ids to display metadata.
pub trait MetadataStore: Send + Sync {
    fn lookup(&self, item_id: &str) -> anyhow::Result<Option<ProductRef>>;
}

pub struct SearchService {
    source: Arc<dyn VectorSource>,
    metadata: Arc<dyn MetadataStore>,
    config: Config,
    methods: Vec<Box<dyn ScoringMethod>>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl SearchService {
    pub fn new(
        source: Arc<dyn VectorSource>,
        metadata: Arc<dyn MetadataStore>,
        config: Config,
    ) -> Self {
        Self {
            source,
            metadata,
            config,
            methods: standard_methods(),
            snapshot: RwLock::new(None),
        }
    }

    /// Replace the scoring ensemble. Intended for experiments; the default
    /// is [`standard_methods`].
    pub fn with_methods(mut self, methods: Vec<Box<dyn ScoringMethod>>) -> Self {
        self.methods = methods;
        self
    }

    /// Build and publish the first snapshot. Idempotent: once a snapshot is
    /// active this is a no-op returning `true`. On failure the service
    /// stays non-ready and `false` is returned; no partial snapshot is ever
    /// published.
    pub fn initialize(&self) -> bool {
        if self.is_ready() {
            return true;
        }
        match self.reload() {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "search service initialization failed");
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Rows in the active snapshot, if any.
    pub fn snapshot_len(&self) -> Option<usize> {
        self.active().map(|s| s.len())
    }

    /// Build a fresh snapshot from the source and atomically swap it in.
    /// In-flight queries keep their `Arc` to the old snapshot until they
    /// finish.
    pub fn reload(&self) -> Result<(), LoadError> {
        let records = self.source.records().map_err(LoadError::Source)?;
        let store = VectorStore::from_records(records, self.config.dimension)?;
        let snapshot = Arc::new(Snapshot::build(store));
        info!(
            vectors = snapshot.len(),
            dimension = snapshot.dimension(),
            "built search snapshot"
        );
        *self.snapshot.write() = Some(snapshot);
        Ok(())
    }

    fn active(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    fn require_snapshot(&self) -> Result<Arc<Snapshot>, SearchError> {
        self.active().ok_or_else(|| {
            warn!("search requested before a snapshot was built");
            SearchError::NotReady
        })
    }

    /// Fused multi-index search: top `top_k` items with scores in [0, 1],
    /// hydrated with display metadata.
    pub fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.search_with_cancel(embedding, top_k, &CancelToken::new())
    }

    /// Like [`search`](Self::search) but polls `cancel` during the scans so
    /// a caller-side timeout can abort mid-flight.
    pub fn search_with_cancel(
        &self,
        embedding: &[f32],
        top_k: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let snapshot = self.require_snapshot()?;
        self.check_dimension(&snapshot, embedding)?;

        let query = QueryVector::new(embedding);
        let ranked = fuse(
            &snapshot,
            &query,
            top_k,
            &self.config.fusion,
            &self.methods,
            cancel,
        )?;
        self.hydrate(ranked.into_iter().map(|c| (c.item_id, c.score)))
    }

    /// Single-metric cosine search with a minimum-similarity cutoff.
    /// Results are ordered (similarity desc, item id asc); scores are the
    /// raw cosine values.
    pub fn search_cosine(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let snapshot = self.require_snapshot()?;
        self.check_dimension(&snapshot, embedding)?;
        let threshold = min_similarity.unwrap_or(self.config.min_similarity);

        let query = QueryVector::new(embedding);
        let neighbors = snapshot
            .cosine()
            .query(query.normalized(), top_k, &CancelToken::new())?;

        let store = snapshot.store();
        let mut scored: Vec<(ItemId, f32)> = neighbors
            .into_iter()
            .filter(|n| n.score >= threshold)
            .map(|n| (store.id_at(n.row).to_string(), n.score))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        self.hydrate(scored.into_iter())
    }

    fn check_dimension(
        &self,
        snapshot: &Snapshot,
        embedding: &[f32],
    ) -> Result<(), SearchError> {
        if embedding.len() != snapshot.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: snapshot.dimension(),
                got: embedding.len(),
            });
        }
        Ok(())
    }

    /// Resolve ids to display metadata. Lookup misses drop the id from the
    /// output; lookup failures abort the query.
    fn hydrate(
        &self,
        ranked: impl Iterator<Item = (ItemId, f32)>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut hits = Vec::new();
        for (item_id, score) in ranked {
            match self
                .metadata
                .lookup(&item_id)
                .map_err(SearchError::Metadata)?
            {
                Some(product) => hits.push(SearchHit {
                    item_id,
                    score,
                    image_url: product.image_url,
                }),
                None => {
                    debug!(item_id = %item_id, "dropping result without display metadata");
                }
            }
        }
        Ok(hits)
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("ready", &self.is_ready())
            .field("methods", &self.methods.len())
            .finish()
    }
}
