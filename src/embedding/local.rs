use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{check_vectors, EmbeddingBackend};
use crate::core::config::settings::LocalEmbeddingSettings;
use crate::core::errors::{PipelineError, PipelineResult, TransientFailure};
use crate::http::{build_client, join_url, send_json};

const SAMPLE_TEXT: &str = "dimension check";
const MAX_BATCH: usize = 64;

/// Locally served embedding model (llama.cpp server, LM Studio, TEI, ...)
/// reached through the OpenAI-compatible `/v1/embeddings` route.
pub struct LocalEmbedding {
    base_url: String,
    model: String,
    client: Client,
    dimension: usize,
    query_prefix: String,
    document_prefix: String,
}

impl LocalEmbedding {
    pub async fn new(settings: &LocalEmbeddingSettings, timeout: Duration) -> PipelineResult<Self> {
        let mut backend = Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            client: build_client(timeout)?,
            dimension: settings.dimension.unwrap_or(0),
            query_prefix: settings.query_prefix.clone(),
            document_prefix: settings.document_prefix.clone(),
        };

        if backend.dimension == 0 {
            let sample = backend.request_embeddings(vec![SAMPLE_TEXT.to_string()]).await?;
            backend.dimension = sample.first().map(Vec::len).unwrap_or(0);
            if backend.dimension == 0 {
                return Err(PipelineError::Configuration(format!(
                    "local embedding model '{}' returned an empty vector for a sample input",
                    backend.model
                )));
            }
            tracing::info!(
                "Detected local embedding dimension: {} ({})",
                backend.dimension,
                backend.model
            );
        }

        Ok(backend)
    }

    async fn request_embeddings(&self, inputs: Vec<String>) -> PipelineResult<Vec<Vec<f32>>> {
        let url = join_url(&self.base_url, "/v1/embeddings");
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let payload = send_json(self.client.post(&url).json(&body))
            .await
            .map_err(|failure| PipelineError::Transient {
                provider: "local".to_string(),
                failure,
            })?;

        parse_openai_embeddings(&payload).ok_or_else(|| PipelineError::Transient {
            provider: "local".to_string(),
            failure: TransientFailure::api_status(200, "response has no `data` embeddings"),
        })
    }

    async fn encode_prefixed(&self, prefix: &str, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            let inputs = chunk.iter().map(|t| format!("{}{}", prefix, t)).collect();
            vectors.extend(self.request_embeddings(inputs).await?);
        }
        check_vectors("local", texts.len(), self.dimension, &vectors)?;
        Ok(vectors)
    }
}

/// Decode an OpenAI-style `{data: [{embedding, index}]}` body in input order.
pub(super) fn parse_openai_embeddings(payload: &Value) -> Option<Vec<Vec<f32>>> {
    let data = payload.get("data")?.as_array()?;
    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let values = item.get("embedding")?.as_array()?;
        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(position);
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Some(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl EmbeddingBackend for LocalEmbedding {
    fn name(&self) -> &str {
        "local"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        self.encode_prefixed(&self.document_prefix, texts).await
    }

    async fn encode_query(&self, text: &str) -> PipelineResult<Vec<f32>> {
        let mut vectors = self
            .encode_prefixed(&self.query_prefix, &[text.to_string()])
            .await?;
        Ok(vectors.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, routing::post, Json, Router};

    type Seen = Arc<Mutex<Vec<String>>>;

    async fn embeddings(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        let inputs: Vec<String> = body["input"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        seen.lock().unwrap().extend(inputs.iter().cloned());
        // reversed order exercises index sorting
        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(i, text)| json!({ "index": i, "embedding": [text.len() as f32, 1.0, 0.0] }))
            .collect();
        Json(json!({ "data": data }))
    }

    async fn serve() -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/v1/embeddings", post(embeddings))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    #[tokio::test]
    async fn detects_dimension_and_applies_role_prefixes() {
        let (base_url, seen) = serve().await;
        let settings = LocalEmbeddingSettings {
            base_url,
            model: "bge-m3".to_string(),
            dimension: None,
            query_prefix: "query: ".to_string(),
            document_prefix: "passage: ".to_string(),
        };

        let backend = LocalEmbedding::new(&settings, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(backend.dimension(), 3);

        let docs = backend
            .encode_batch(&["a".to_string(), "bbb".to_string()])
            .await
            .unwrap();
        assert_eq!(docs[0][0], "passage: a".len() as f32);
        assert_eq!(docs[1][0], "passage: bbb".len() as f32);

        backend.encode_query("pie").await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec!["dimension check", "passage: a", "passage: bbb", "query: pie"]
        );
    }

    #[tokio::test]
    async fn configured_dimension_is_enforced() {
        let (base_url, _) = serve().await;
        let settings = LocalEmbeddingSettings {
            base_url,
            dimension: Some(8),
            ..LocalEmbeddingSettings::default()
        };

        let backend = LocalEmbedding::new(&settings, Duration::from_secs(5))
            .await
            .unwrap();
        let err = backend.encode_query("x").await.unwrap_err();
        assert!(err.to_string().contains("expected 8, got 3"));
    }

    #[tokio::test]
    async fn unreachable_server_is_transient_error() {
        let settings = LocalEmbeddingSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            ..LocalEmbeddingSettings::default()
        };
        let err = LocalEmbedding::new(&settings, Duration::from_secs(2))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Transient { .. }));
    }
}
