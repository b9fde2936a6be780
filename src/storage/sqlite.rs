//! `SQLite` catalogue backend: the persisted vector source and the product
//! metadata store.
//!
//! Schema: `items(item_id TEXT PRIMARY KEY, image_url TEXT, vector BLOB)`.
//! Vector blobs are little-endian f32, row-major, contiguous per vector;
//! any change to that layout must be versioned.

use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::info;

use crate::model::{CatalogStats, ProductRef};
use crate::search::service::MetadataStore;
use crate::search::store::{VectorRecord, VectorSource, encode_vector};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalogue database not found at {0}")]
    NotFound(PathBuf),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Thread-safe handle to the catalogue database. The connection is guarded
/// by a mutex; the engine reads it once per snapshot build plus once per
/// hydrated result, so contention is negligible.
#[derive(Debug)]
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open an existing catalogue database.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;
        info!(path = %path.display(), "opened catalogue database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (creating if needed) and ensure the schema exists.
    pub fn create(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory catalogue with schema, for tests and tooling.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                item_id   TEXT PRIMARY KEY,
                image_url TEXT,
                vector    BLOB
            );",
        )?;
        Ok(())
    }

    /// Insert or replace one item. `vector: None` stores an item without an
    /// embedding; such items are invisible to the vector source but still
    /// counted by [`stats`](Self::stats).
    pub fn insert_item(
        &self,
        item_id: &str,
        image_url: &str,
        vector: Option<&[f32]>,
    ) -> Result<(), CatalogError> {
        let blob = vector.map(encode_vector);
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO items (item_id, image_url, vector) VALUES (?1, ?2, ?3)",
            params![item_id, image_url, blob],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let conn = self.conn.lock();
        let total_items: u64 =
            conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        let items_with_vectors: u64 = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE vector IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(CatalogStats {
            total_items,
            items_with_vectors,
        })
    }
}

impl VectorSource for SqliteCatalog {
    /// All persisted vectors in fixed `item_id` order, so the snapshot's
    /// row→id mapping is stable across rebuilds of identical data.
    fn records(&self) -> anyhow::Result<Vec<VectorRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT item_id, vector FROM items WHERE vector IS NOT NULL ORDER BY item_id")
            .context("prepare vector query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(VectorRecord {
                    item_id: row.get(0)?,
                    bytes: row.get(1)?,
                })
            })
            .context("enumerate catalogue vectors")?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("read catalogue vector row")?);
        }
        Ok(records)
    }
}

impl MetadataStore for SqliteCatalog {
    fn lookup(&self, item_id: &str) -> anyhow::Result<Option<ProductRef>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT item_id, image_url FROM items WHERE item_id = ?1 AND image_url IS NOT NULL",
                params![item_id],
                |row| {
                    Ok(ProductRef {
                        item_id: row.get(0)?,
                        image_url: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("metadata lookup")?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_come_back_in_id_order() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .insert_item("b", "http://x/b.jpg", Some(&[2.0, 0.0]))
            .unwrap();
        catalog
            .insert_item("a", "http://x/a.jpg", Some(&[1.0, 0.0]))
            .unwrap();
        catalog.insert_item("c", "http://x/c.jpg", None).unwrap();

        let records = catalog.records().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn stats_count_vectorless_items() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .insert_item("a", "http://x/a.jpg", Some(&[1.0]))
            .unwrap();
        catalog.insert_item("b", "http://x/b.jpg", None).unwrap();

        let stats = catalog.stats().unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.items_with_vectors, 1);
    }

    #[test]
    fn lookup_hits_and_misses() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .insert_item("a", "http://x/a.jpg", Some(&[1.0]))
            .unwrap();

        let hit = catalog.lookup("a").unwrap().unwrap();
        assert_eq!(hit.image_url, "http://x/a.jpg");
        assert!(catalog.lookup("missing").unwrap().is_none());
    }

    #[test]
    fn open_missing_path_fails() {
        let err = SqliteCatalog::open(Path::new("/nonexistent/items.db")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }
}
