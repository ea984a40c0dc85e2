use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::GenerationBackend;
use super::retry::{with_retries, AttemptError};
use crate::core::config::settings::GeminiLlmSettings;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::http::{build_client, join_url, send_json};

const PROVIDER: &str = "Gemini";

pub struct GeminiGeneration {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl GeminiGeneration {
    pub fn new(
        settings: &GeminiLlmSettings,
        max_tokens: u32,
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

        tracing::info!("Gemini generation: {}", settings.model);
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.trim_start_matches("models/").to_string(),
            max_tokens,
        })
    }

    async fn attempt(&self, prompt: &str, temperature: f32) -> Result<String, AttemptError> {
        let url = join_url(
            &self.base_url,
            &format!("v1beta/models/{}:generateContent", self.model),
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": self.max_tokens,
            },
        });

        let payload = send_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
        )
        .await?;

        candidate_text(&payload).ok_or_else(|| {
            AttemptError::Fatal(PipelineError::malformed_response(
                PROVIDER,
                "response has no candidate text",
                &payload.to_string(),
            ))
        })
    }
}

/// Concatenated text parts of the first candidate.
fn candidate_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl GenerationBackend for GeminiGeneration {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_retries: u32,
    ) -> PipelineResult<String> {
        with_retries(PROVIDER, max_retries, |_| self.attempt(prompt, temperature)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{
        extract::{Path, State},
        http::StatusCode,
        routing::post,
        Json, Router,
    };

    async fn generate_content(
        Path(target): Path<String>,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, StatusCode> {
        if target != "gemini-test:generateContent" {
            return Err(StatusCode::NOT_FOUND);
        }
        if body["generationConfig"]["maxOutputTokens"] != 4096 {
            return Err(StatusCode::BAD_REQUEST);
        }
        Ok(Json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n" }, { "text": "{\"a\":1}\n```" }] }
            }]
        })))
    }

    async fn serve() -> String {
        let app = Router::new().route("/v1beta/models/:target", post(generate_content));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn joins_candidate_parts() {
        let settings = GeminiLlmSettings {
            model: "models/gemini-test".to_string(),
            base_url: serve().await,
        };
        let llm = GeminiGeneration::new(&settings, 4096, Some("g"), Duration::from_secs(5)).unwrap();
        assert_eq!(llm.model(), "gemini-test");
        let text = llm.generate("bar chart", 0.2, 2).await.unwrap();
        assert_eq!(text, "```json\n{\"a\":1}\n```");
    }

    #[tokio::test]
    async fn unreachable_server_exhausts_retries() {
        let settings = GeminiLlmSettings {
            model: "gemini-test".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        };
        let llm = GeminiGeneration::new(&settings, 4096, Some("g"), Duration::from_secs(2)).unwrap();
        let err = llm.generate("bar chart", 0.0, 2).await.unwrap_err();
        assert!(matches!(err, PipelineError::ProviderExhausted { attempts: 2, .. }));
        assert!(err.to_string().contains("Gemini call failed after 2 attempts"));
    }

    async fn blocked_content(State(calls): State<Arc<AtomicUsize>>) -> Json<Value> {
        calls.fetch_add(1, Ordering::SeqCst);
        Json(json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
    }

    #[tokio::test]
    async fn reply_without_candidates_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/v1beta/models/:target", post(blocked_content))
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let settings = GeminiLlmSettings {
            model: "gemini-test".to_string(),
            base_url: format!("http://{}", addr),
        };
        let llm = GeminiGeneration::new(&settings, 4096, Some("g"), Duration::from_secs(5)).unwrap();
        let err = llm.generate("bar chart", 0.0, 3).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, PipelineError::MalformedResponse { .. }));
        assert!(err.to_string().contains("blockReason"));
    }

    #[test]
    fn empty_candidates_yield_none() {
        assert_eq!(candidate_text(&json!({ "candidates": [] })), None);
    }
}
