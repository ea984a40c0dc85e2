use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::store::{SearchHit, VectorIndex};
use crate::core::errors::{PipelineError, PipelineResult};
use crate::embedding::EmbeddingBackend;

const OUTPUT_FIELDS: [&str; 5] = ["description", "config", "headers", "type", "example_id"];

/// One example as shown to the model, with the score of its best variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedExample {
    pub example_id: String,
    /// The phrasing that matched (primary or alternative).
    pub description: String,
    pub config: Value,
    pub headers: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: f32,
}

impl RetrievedExample {
    fn from_hit(hit: SearchHit) -> PipelineResult<Self> {
        let text = |name: &str| hit.field_str(name).unwrap_or_default().to_string();
        let raw_config = hit.field_str("config").unwrap_or("null");
        let config = serde_json::from_str(raw_config).map_err(|e| {
            PipelineError::Storage(format!("row '{}' holds invalid config JSON: {}", hit.id, e))
        })?;

        Ok(Self {
            example_id: text("example_id"),
            description: text("description"),
            headers: text("headers"),
            kind: text("type"),
            config,
            score: hit.score,
        })
    }
}

pub struct ExampleRetriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
    collection: String,
    alternatives_per_example: usize,
}

impl ExampleRetriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
        collection: impl Into<String>,
        alternatives_per_example: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            collection: collection.into(),
            alternatives_per_example,
        }
    }

    /// Up to `k` examples ranked by similarity.
    ///
    /// With `deduplicate`, each example appears once, represented by its best
    /// scoring phrasing; the raw search is widened to `k * (A + 1)` rows so
    /// that alternatives crowding the top do not starve the result.
    pub async fn retrieve(
        &self,
        description: &str,
        k: usize,
        deduplicate: bool,
    ) -> PipelineResult<Vec<RetrievedExample>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.encode_query(description).await?;
        let raw_limit = if deduplicate {
            k.saturating_mul(self.alternatives_per_example + 1)
        } else {
            k
        };

        let hits = self
            .index
            .search(&self.collection, &query, raw_limit, &OUTPUT_FIELDS)
            .await?;
        let raw_count = hits.len();

        let selected = if deduplicate {
            dedupe_hits(hits, k)
        } else {
            hits.into_iter().take(k).collect()
        };

        tracing::debug!(
            "Retrieved {} examples from {} raw hits (k={}, dedupe={})",
            selected.len(),
            raw_count,
            k,
            deduplicate
        );

        selected.into_iter().map(RetrievedExample::from_hit).collect()
    }
}

/// First hit per example id, in rank order, at most `k`.
fn dedupe_hits(hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(k);
    for hit in hits {
        if kept.len() == k {
            break;
        }
        let key = hit
            .field_str("example_id")
            .map(str::to_string)
            .unwrap_or_else(|| hit.id.clone());
        if seen.insert(key) {
            kept.push(hit);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn hit(id: &str, example: &str, score: f32) -> SearchHit {
        let mut fields = Map::new();
        fields.insert("example_id".to_string(), json!(example));
        SearchHit {
            id: id.to_string(),
            score,
            fields,
        }
    }

    #[test]
    fn dedupe_keeps_first_hit_per_example() {
        let hits = vec![
            hit("1#alt1", "1", 0.9),
            hit("1#0", "1", 0.8),
            hit("2#0", "2", 0.7),
            hit("1#alt2", "1", 0.6),
            hit("3#0", "3", 0.5),
        ];
        let kept = dedupe_hits(hits, 2);
        let ids: Vec<&str> = kept.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["1#alt1", "2#0"]);
    }

    #[test]
    fn dedupe_may_return_fewer_than_k() {
        let hits = vec![hit("1#0", "1", 0.9), hit("1#alt1", "1", 0.8)];
        assert_eq!(dedupe_hits(hits, 5).len(), 1);
    }

    #[test]
    fn from_hit_parses_config() {
        let mut h = hit("1#0", "1", 0.5);
        h.fields.insert("config".to_string(), json!("{\"graphType\":\"Bar\"}"));
        h.fields.insert("description".to_string(), json!("bar chart"));
        let example = RetrievedExample::from_hit(h).unwrap();
        assert_eq!(example.config, json!({ "graphType": "Bar" }));
        assert_eq!(example.description, "bar chart");
        assert_eq!(example.headers, "");
    }
}
