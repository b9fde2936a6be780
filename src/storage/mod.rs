pub mod sqlite;

pub use sqlite::{CatalogError, SqliteCatalog};
