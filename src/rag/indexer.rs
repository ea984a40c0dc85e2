use std::sync::Arc;

use serde_json::{json, Map};

use super::corpus::Example;
use super::store::{IndexRecord, VectorIndex};
use crate::core::errors::{PipelineError, PipelineResult};
use crate::embedding::EmbeddingBackend;

/// Populates a collection with one row per description variant.
pub struct IndexBuilder {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
    collection: String,
}

/// What `ensure` / `rebuild` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Reused { rows: usize },
    Created { rows: usize },
}

impl IndexBuilder {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            index,
            embedder,
            collection: collection.into(),
        }
    }

    /// Create and populate the collection unless it already exists.
    ///
    /// A populated collection is never re-populated; its dimension must match
    /// the active embedding backend. A collection with no rows counts as
    /// missing and is built again.
    pub async fn ensure(&self, examples: &[Example]) -> PipelineResult<IndexOutcome> {
        if let Some(stored) = self.index.collection_dimension(&self.collection).await? {
            if self.index.count(&self.collection).await? == 0 {
                tracing::warn!(
                    "Vector index collection '{}' exists but is empty; repopulating",
                    self.collection
                );
                return self.rebuild(examples).await;
            }

            let active = self.embedder.dimension();
            if stored != active {
                return Err(PipelineError::Configuration(format!(
                    "collection '{}' was built with dimension {} but embedding backend '{}' \
                     produces {}; rebuild the index (`index --rebuild`)",
                    self.collection,
                    stored,
                    self.embedder.name(),
                    active
                )));
            }
            let rows = self.index.count(&self.collection).await?;
            tracing::info!(
                "Vector index collection '{}' already exists ({} rows)",
                self.collection,
                rows
            );
            return Ok(IndexOutcome::Reused { rows });
        }

        let rows = self.populate(examples).await?;
        Ok(IndexOutcome::Created { rows })
    }

    /// Drop the collection and build it again from `examples`.
    pub async fn rebuild(&self, examples: &[Example]) -> PipelineResult<IndexOutcome> {
        self.index.drop_collection(&self.collection).await?;
        let rows = self.populate(examples).await?;
        Ok(IndexOutcome::Created { rows })
    }

    async fn populate(&self, examples: &[Example]) -> PipelineResult<usize> {
        let (texts, mut records) = build_records(examples);
        tracing::info!(
            "Embedding {} description variants from {} examples with '{}'",
            texts.len(),
            examples.len(),
            self.embedder.name()
        );

        let vectors = self.embedder.encode_batch(&texts).await?;
        if vectors.len() != records.len() {
            return Err(PipelineError::Configuration(format!(
                "embedding backend returned {} vectors for {} texts",
                vectors.len(),
                records.len()
            )));
        }
        for (record, vector) in records.iter_mut().zip(vectors) {
            record.vector = vector;
        }

        let rows = records.len();
        self.index
            .create_with_records(&self.collection, self.embedder.dimension(), records)
            .await?;

        tracing::info!("Inserted {} rows into '{}'", rows, self.collection);
        Ok(rows)
    }
}

/// Texts to embed and their (vector-less) rows, in the same order.
fn build_records(examples: &[Example]) -> (Vec<String>, Vec<IndexRecord>) {
    let mut texts = Vec::new();
    let mut records = Vec::new();

    for example in examples {
        let config = example.config.to_string();
        for (n, variant) in example.variants().enumerate() {
            let is_primary = n == 0;
            let id = if is_primary {
                format!("{}#0", example.id)
            } else {
                format!("{}#alt{}", example.id, n)
            };

            let mut fields = Map::new();
            fields.insert("description".to_string(), json!(variant));
            fields.insert("config".to_string(), json!(config));
            fields.insert(
                "headers".to_string(),
                json!(example.headers.clone().unwrap_or_default()),
            );
            fields.insert("type".to_string(), json!(example.kind));
            fields.insert("example_id".to_string(), json!(example.id));
            fields.insert("is_primary".to_string(), json!(is_primary));

            texts.push(variant.to_string());
            records.push(IndexRecord {
                id,
                vector: Vec::new(),
                fields,
            });
        }
    }

    (texts, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use crate::rag::sqlite::SqliteVectorIndex;

    fn examples() -> Vec<Example> {
        vec![
            Example {
                id: "1".to_string(),
                description: "bar chart".to_string(),
                alt_descriptions: vec!["bars".to_string(), "a bar plot".to_string()],
                config: json!({ "graphType": "Bar" }),
                headers: Some("Gene".to_string()),
                kind: "bar".to_string(),
            },
            Example {
                id: "2".to_string(),
                description: "scatter plot".to_string(),
                alt_descriptions: Vec::new(),
                config: json!({ "graphType": "Scatter2D" }),
                headers: None,
                kind: "scatter".to_string(),
            },
        ]
    }

    #[test]
    fn one_record_per_variant() {
        let (texts, records) = build_records(&examples());
        assert_eq!(texts, vec!["bar chart", "bars", "a bar plot", "scatter plot"]);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1#0", "1#alt1", "1#alt2", "2#0"]);
        assert_eq!(records[1].fields["is_primary"], json!(false));
        assert_eq!(records[1].fields["example_id"], json!("1"));
        assert_eq!(records[2].fields["config"], records[0].fields["config"]);
        assert_eq!(records[3].fields["headers"], json!(""));
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let index: Arc<dyn VectorIndex> =
            Arc::new(SqliteVectorIndex::open(dir.path().join("i.db")).await.unwrap());
        let embedder: Arc<dyn EmbeddingBackend> = Arc::new(HashingEmbedding::new(64).unwrap());
        let builder = IndexBuilder::new(index.clone(), embedder, "few_shot_examples");

        let first = builder.ensure(&examples()).await.unwrap();
        assert_eq!(first, IndexOutcome::Created { rows: 4 });

        // a second call must not insert again, even with a different corpus
        let second = builder.ensure(&examples()[..1]).await.unwrap();
        assert_eq!(second, IndexOutcome::Reused { rows: 4 });
        assert_eq!(index.count("few_shot_examples").await.unwrap(), 4);

        let rebuilt = builder.rebuild(&examples()[..1]).await.unwrap();
        assert_eq!(rebuilt, IndexOutcome::Created { rows: 3 });
    }

    #[tokio::test]
    async fn reused_collection_with_other_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let index: Arc<dyn VectorIndex> =
            Arc::new(SqliteVectorIndex::open(dir.path().join("i.db")).await.unwrap());

        IndexBuilder::new(
            index.clone(),
            Arc::new(HashingEmbedding::new(64).unwrap()),
            "few_shot_examples",
        )
        .ensure(&examples())
        .await
        .unwrap();

        let err = IndexBuilder::new(
            index,
            Arc::new(HashingEmbedding::new(32).unwrap()),
            "few_shot_examples",
        )
        .ensure(&examples())
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("dimension 64"));
    }

    #[tokio::test]
    async fn empty_collection_is_populated() {
        let dir = tempfile::tempdir().unwrap();
        let index: Arc<dyn VectorIndex> =
            Arc::new(SqliteVectorIndex::open(dir.path().join("i.db")).await.unwrap());
        index.create_collection("few_shot_examples", 32).await.unwrap();

        let outcome = IndexBuilder::new(
            index.clone(),
            Arc::new(HashingEmbedding::new(64).unwrap()),
            "few_shot_examples",
        )
        .ensure(&examples())
        .await
        .unwrap();
        assert_eq!(outcome, IndexOutcome::Created { rows: 4 });
        assert_eq!(index.collection_dimension("few_shot_examples").await.unwrap(), Some(64));
        assert_eq!(index.count("few_shot_examples").await.unwrap(), 4);
    }
}
