//! In-process document store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{DocumentStore, StoreError};

type Table = BTreeMap<String, Value>;

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `table`.
    pub async fn count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, |t| t.len())
    }
}

fn matches(doc: &Value, field: &str, value: &Value) -> bool {
    match doc.get(field) {
        Some(Value::Array(items)) => items.contains(value),
        Some(found) => found == value,
        None => false,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, table: &str, key: &str, item: Value) -> Result<(), StoreError> {
        if !item.is_object() {
            return Err(StoreError::Invalid("documents must be JSON objects".to_string()));
        }
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), item);
        Ok(())
    }

    async fn create(&self, table: &str, key: &str, item: Value) -> Result<(), StoreError> {
        if !item.is_object() {
            return Err(StoreError::Invalid("documents must be JSON objects".to_string()));
        }
        let mut tables = self.tables.write().await;
        let docs = tables.entry(table.to_string()).or_default();
        if docs.contains_key(key) {
            return Err(StoreError::Conflict {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        docs.insert(key.to_string(), item);
        Ok(())
    }

    async fn scan(&self, table: &str) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn query(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|t| {
                t.values()
                    .filter(|doc| matches(doc, field, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, table: &str, key: &str, patch: Value) -> Result<Value, StoreError> {
        let Value::Object(fields) = patch else {
            return Err(StoreError::Invalid("patch must be a JSON object".to_string()));
        };

        let mut tables = self.tables.write().await;
        let doc = tables
            .get_mut(table)
            .and_then(|t| t.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                key: key.to_string(),
            })?;

        if let Value::Object(existing) = doc {
            existing.extend(fields);
        }
        Ok(doc.clone())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .get_mut(table)
            .and_then(|t| t.remove(key))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                key: key.to_string(),
            })
    }
}
