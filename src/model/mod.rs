pub mod types;

pub use types::{CatalogStats, ItemId, ProductRef, SearchHit};
