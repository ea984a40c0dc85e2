use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{check_vectors, EmbeddingBackend};
use crate::core::config::settings::GeminiEmbeddingSettings;
use crate::core::errors::{PipelineError, PipelineResult, TransientFailure};
use crate::http::{build_client, join_url, send_json};

const MAX_BATCH: usize = 100;

pub struct GeminiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

impl GeminiEmbedding {
    pub fn new(
        settings: &GeminiEmbeddingSettings,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(
                    "GOOGLE_API_KEY environment variable not set".to_string(),
                )
            })?
            .to_string();

        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.trim_start_matches("models/").to_string(),
            dimension: settings.dimension,
        })
    }

    fn transient(failure: TransientFailure) -> PipelineError {
        PipelineError::Transient {
            provider: "gemini".to_string(),
            failure,
        }
    }

    async fn post(&self, method: &str, body: Value) -> PipelineResult<Value> {
        let url = join_url(
            &self.base_url,
            &format!("v1beta/models/{}:{}", self.model, method),
        );
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        send_json(request).await.map_err(Self::transient)
    }

    async fn embed_documents(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        let model_ref = format!("models/{}", self.model);
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": model_ref,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": "RETRIEVAL_DOCUMENT",
                })
            })
            .collect();

        let payload = self
            .post("batchEmbedContents", json!({ "requests": requests }))
            .await?;

        payload
            .get("embeddings")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(values_of).collect())
            .ok_or_else(|| {
                Self::transient(TransientFailure::api_status(
                    200,
                    "response has no `embeddings`",
                ))
            })
    }
}

fn values_of(item: &Value) -> Option<Vec<f32>> {
    let values = item.get("values")?.as_array()?;
    Some(
        values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect(),
    )
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbedding {
    fn name(&self) -> &str {
        "gemini"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            vectors.extend(self.embed_documents(chunk).await?);
        }
        check_vectors("gemini", texts.len(), self.dimension, &vectors)?;
        Ok(vectors)
    }

    async fn encode_query(&self, text: &str) -> PipelineResult<Vec<f32>> {
        let payload = self
            .post(
                "embedContent",
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                    "taskType": "RETRIEVAL_QUERY",
                }),
            )
            .await?;

        let vector = payload
            .get("embedding")
            .and_then(values_of)
            .ok_or_else(|| {
                Self::transient(TransientFailure::api_status(200, "response has no `embedding`"))
            })?;
        check_vectors("gemini", 1, self.dimension, std::slice::from_ref(&vector))?;
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Path, State},
        http::HeaderMap,
        routing::post,
        Json, Router,
    };

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    async fn handler(
        State(calls): State<Calls>,
        Path(target): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let key = headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        calls.lock().unwrap().push((target.clone(), key));

        if target.ends_with(":batchEmbedContents") {
            let embeddings: Vec<Value> = body["requests"]
                .as_array()
                .unwrap()
                .iter()
                .map(|r| {
                    assert_eq!(r["taskType"], "RETRIEVAL_DOCUMENT");
                    json!({ "values": [1.0, 0.0] })
                })
                .collect();
            Json(json!({ "embeddings": embeddings }))
        } else {
            assert_eq!(body["taskType"], "RETRIEVAL_QUERY");
            Json(json!({ "embedding": { "values": [0.0, 1.0] } }))
        }
    }

    async fn serve() -> (String, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/v1beta/models/:target", post(handler))
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let err = GeminiEmbedding::new(
            &GeminiEmbeddingSettings::default(),
            Some("  "),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[tokio::test]
    async fn documents_and_queries_use_distinct_task_types() {
        let (base_url, calls) = serve().await;
        let settings = GeminiEmbeddingSettings {
            model: "text-embedding-004".to_string(),
            base_url,
            dimension: 2,
        };
        let backend =
            GeminiEmbedding::new(&settings, Some("secret"), Duration::from_secs(5)).unwrap();

        let texts: Vec<String> = (0..150).map(|i| format!("text {}", i)).collect();
        let docs = backend.encode_batch(&texts).await.unwrap();
        assert_eq!(docs.len(), 150);
        assert_eq!(backend.encode_query("q").await.unwrap(), vec![0.0, 1.0]);

        let calls = calls.lock().unwrap().clone();
        let targets: Vec<&str> = calls.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            targets,
            vec![
                "text-embedding-004:batchEmbedContents",
                "text-embedding-004:batchEmbedContents",
                "text-embedding-004:embedContent",
            ]
        );
        assert!(calls.iter().all(|(_, key)| key == "secret"));
    }
}
