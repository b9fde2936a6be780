//! Shared domain types.

use serde::{Deserialize, Serialize};

/// Opaque catalogue item identifier (unique key in the product table).
pub type ItemId = String;

/// Display metadata for an item, owned by the external catalogue store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub item_id: ItemId,
    pub image_url: String,
}

/// One ranked search result. `score` is normalized to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub item_id: ItemId,
    pub score: f32,
    pub image_url: String,
}

/// Catalogue-level counters, surfaced by the `stats` CLI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total_items: u64,
    pub items_with_vectors: u64,
}
