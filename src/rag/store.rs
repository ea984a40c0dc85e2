//! VectorIndex trait: abstract interface for the example index.
//!
//! A collection holds fixed-dimension vectors, each with an id and a flat
//! JSON map of metadata fields. The primary implementation is
//! `SqliteVectorIndex` in the `sqlite` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::PipelineResult;

/// One row to insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub fields: Map<String, Value>,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity (higher = closer).
    pub score: f32,
    /// Only the fields the caller asked for.
    pub fields: Map<String, Value>,
}

impl SearchHit {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn has_collection(&self, name: &str) -> PipelineResult<bool>;

    /// Create an empty collection; fails if it already exists.
    async fn create_collection(&self, name: &str, dimension: usize) -> PipelineResult<()>;

    async fn collection_dimension(&self, name: &str) -> PipelineResult<Option<usize>>;

    /// Insert all records atomically.
    async fn insert(&self, name: &str, records: Vec<IndexRecord>) -> PipelineResult<()>;

    /// Create a collection and insert its rows in one transaction, so a
    /// failure leaves no collection behind.
    async fn create_with_records(
        &self,
        name: &str,
        dimension: usize,
        records: Vec<IndexRecord>,
    ) -> PipelineResult<()>;

    /// Top `k` rows by descending cosine similarity; ties keep insertion order.
    async fn search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
        fields: &[&str],
    ) -> PipelineResult<Vec<SearchHit>>;

    async fn count(&self, name: &str) -> PipelineResult<usize>;

    /// Remove a collection and its rows. Returns false if it did not exist.
    async fn drop_collection(&self, name: &str) -> PipelineResult<bool>;
}
