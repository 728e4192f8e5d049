//! Document Store Module
//!
//! Table-oriented JSON document storage. Unlike the cache, store errors are
//! returned to the caller.

mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryDocumentStore;

// == Table Names ==
pub const BUSES: &str = "buses";
pub const ROUTES: &str = "routes";
pub const SCHEDULES: &str = "schedules";
pub const LOCATIONS: &str = "locations";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{table} '{key}' not found")]
    NotFound { table: String, key: String },

    #[error("{table} '{key}' already exists")]
    Conflict { table: String, key: String },

    #[error("invalid document: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Backend(String),
}

/// Document store collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Inserts or replaces the document under `key`.
    async fn put(&self, table: &str, key: &str, item: Value) -> Result<(), StoreError>;

    /// Inserts only if `key` is free.
    async fn create(&self, table: &str, key: &str, item: Value) -> Result<(), StoreError>;

    /// All documents of a table, ordered by key.
    async fn scan(&self, table: &str) -> Result<Vec<Value>, StoreError>;

    /// Documents whose top-level `field` equals `value`, or whose array
    /// `field` contains it.
    async fn query(&self, table: &str, field: &str, value: &Value)
        -> Result<Vec<Value>, StoreError>;

    /// Merges the top-level fields of `patch` into the document.
    async fn update(&self, table: &str, key: &str, patch: Value) -> Result<Value, StoreError>;

    async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError>;
}
