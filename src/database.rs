//! Database initialization and the URL mapping store
//!
//! The store deduplicates issued tokens and counts proxied accesses. It is
//! optional from the pipeline's point of view: tokens always decode without it.

use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::StoreError;
use crate::model::UrlMapping;

/// Main table for storing URL mappings
///
/// Key: Original URL
/// Value: JSON-serialized UrlMapping
pub const TABLE_MAPPINGS: TableDefinition<&str, &str> = TableDefinition::new("url_mappings_v1");

/// Index from token to original URL
///
/// Key: Token (encoded_id)
/// Value: Original URL, a key of [`TABLE_MAPPINGS`]
pub const TABLE_TOKEN_INDEX: TableDefinition<&str, &str> = TableDefinition::new("token_index_v1");

/// Counters. Holds `next_id` for mapping identifiers.
pub const TABLE_META: TableDefinition<&str, u64> = TableDefinition::new("meta_v1");

const NEXT_ID_KEY: &str = "next_id";

/// Initializes the embedded database and creates required tables
///
/// # Arguments
///
/// * `db_path` - File path where the database should be stored (e.g., "data.db")
///
/// # Example
///
/// ```no_run
/// # use linkproxy::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_MAPPINGS)?;
        write_txn.open_table(TABLE_TOKEN_INDEX)?;
        write_txn.open_table(TABLE_META)?;
    }
    write_txn.commit()?;

    Ok(db)
}

/// Persisted URL mappings, shared across handlers
#[derive(Clone)]
pub struct MappingStore {
    db: Arc<Database>,
}

impl MappingStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Looks up the mapping for an original URL.
    pub fn find_by_original_url(&self, original_url: &str) -> Result<Option<UrlMapping>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE_MAPPINGS)?;

        let record = match table.get(original_url)? {
            Some(value) => Some(serde_json::from_str(value.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Looks up the mapping for a token.
    pub fn find_by_token(&self, token: &str) -> Result<Option<UrlMapping>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TABLE_TOKEN_INDEX)?;

        let original_url = match index.get(token)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(TABLE_MAPPINGS)?;
        let record = match table.get(original_url.as_str())? {
            Some(value) => Some(serde_json::from_str(value.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Inserts a mapping for `original_url`, unless one already exists.
    ///
    /// Returns the stored mapping and whether it was newly created. The lookup
    /// and insert share one write transaction, so concurrent requests for the
    /// same URL end up with a single mapping.
    pub fn insert(&self, original_url: &str, encoded_id: &str) -> Result<(UrlMapping, bool), StoreError> {
        let write_txn = self.db.begin_write()?;
        let mapping = {
            let mut table = write_txn.open_table(TABLE_MAPPINGS)?;

            let existing = table.get(original_url)?.map(|v| v.value().to_string());
            if let Some(json) = existing {
                return Ok((serde_json::from_str(&json)?, false));
            }

            let mut meta = write_txn.open_table(TABLE_META)?;
            let id = meta.get(NEXT_ID_KEY)?.map(|v| v.value()).unwrap_or(1);
            meta.insert(NEXT_ID_KEY, id + 1)?;

            let mapping = UrlMapping {
                id,
                original_url: original_url.to_string(),
                encoded_id: encoded_id.to_string(),
                created_at: Utc::now(),
                access_count: 0,
            };
            let json = serde_json::to_string(&mapping)?;
            table.insert(original_url, json.as_str())?;

            let mut index = write_txn.open_table(TABLE_TOKEN_INDEX)?;
            index.insert(encoded_id, original_url)?;

            mapping
        };
        write_txn.commit()?;

        debug!(id = mapping.id, original_url, "stored new mapping");
        Ok((mapping, true))
    }

    /// Increments the access counter of the mapping behind `token`.
    ///
    /// Returns the new count, or `None` when the token was never stored.
    pub fn record_access(&self, token: &str) -> Result<Option<u64>, StoreError> {
        let write_txn = self.db.begin_write()?;
        let count = {
            let index = write_txn.open_table(TABLE_TOKEN_INDEX)?;
            let original_url = index.get(token)?.map(|v| v.value().to_string());

            let Some(original_url) = original_url else {
                return Ok(None);
            };

            let mut table = write_txn.open_table(TABLE_MAPPINGS)?;
            let existing = table
                .get(original_url.as_str())?
                .map(|v| v.value().to_string());
            let Some(json) = existing else {
                return Ok(None);
            };

            let mut mapping: UrlMapping = serde_json::from_str(&json)?;
            mapping.access_count += 1;
            let json = serde_json::to_string(&mapping)?;
            table.insert(original_url.as_str(), json.as_str())?;

            mapping.access_count
        };
        write_txn.commit()?;

        Ok(Some(count))
    }
}
