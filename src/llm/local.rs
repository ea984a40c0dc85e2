use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::provider::GenerationBackend;
use super::retry::{with_retries, AttemptError};
use super::types::{completion_text, ChatMessage};
use crate::core::config::settings::LocalLlmSettings;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::http::{build_client, join_url, send_json};

const PROVIDER: &str = "Local LLM";

/// OpenAI-compatible chat server on the local machine (LM Studio,
/// llama.cpp server, vLLM).
#[derive(Clone)]
pub struct LocalGeneration {
    base_url: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

impl LocalGeneration {
    pub fn new(settings: &LocalLlmSettings, max_tokens: u32, timeout: Duration) -> PipelineResult<Self> {
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens,
            client: build_client(timeout)?,
        })
    }

    async fn attempt(&self, prompt: &str, temperature: f32) -> Result<String, AttemptError> {
        let url = join_url(&self.base_url, "/v1/chat/completions");
        let body = json!({
            "model": self.model,
            "messages": [ChatMessage::user(prompt)],
            "stream": false,
            "temperature": temperature,
            "max_tokens": self.max_tokens,
        });

        let payload = send_json(self.client.post(&url).json(&body)).await?;
        completion_text(&payload).ok_or_else(|| {
            AttemptError::Fatal(PipelineError::malformed_response(
                PROVIDER,
                "completion has no message content",
                &payload.to_string(),
            ))
        })
    }
}

#[async_trait]
impl GenerationBackend for LocalGeneration {
    fn name(&self) -> &str {
        "local"
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
