//! The similarity-search core.
//!
//! - **[`store`]**: embedding matrices, id mapping, blob decoding.
//! - **[`index`]**: exact cosine and euclidean nearest-neighbor lookup.
//! - **[`fusion`]**: multi-method score fusion with rank bonuses.
//! - **[`snapshot`]**: the immutable unit of serving.
//! - **[`service`]**: the façade owning the snapshot lifecycle.
//! - **[`cancel`]**: cooperative cancellation for the O(N) scans.

pub mod cancel;
pub mod fusion;
pub mod index;
pub mod service;
pub mod snapshot;
pub mod store;

use thiserror::Error;

pub use cancel::CancelToken;
pub use service::{MetadataStore, SearchService};
pub use store::{LoadError, VectorRecord, VectorSource};

/// Query-time failure. A sparse or unmatched snapshot is not one of these:
/// an empty result list is a valid outcome.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no active snapshot; call initialize() first")]
    NotReady,
    #[error("search cancelled")]
    Cancelled,
    #[error("query dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("metadata lookup failed: {0}")]
    Metadata(#[source] anyhow::Error),
}
