use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::provider::GenerationBackend;
use super::retry::{with_retries, AttemptError};
use super::types::{completion_text, ChatMessage};
use crate::core::config::settings::AzureLlmSettings;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::directory::{choose_endpoint, EndpointDirectory};
use crate::http::{build_client, join_url, send_json};

const PROVIDER: &str = "Azure OpenAI";
const DEFAULT_MODEL_VERSION: &str = "2024-07-18";

/// Version tag the directory entries must carry for a known deployment name.
pub fn pinned_model_version(model: &str) -> &'static str {
    match model {
        "gpt-4o-mini-global" => "2024-07-18",
        "gpt-4o-global" => "2024-05-13",
        "gpt-4-turbo-global" => "turbo-2024-04-09",
        _ => DEFAULT_MODEL_VERSION,
    }
}

/// Azure OpenAI chat completions spread over the directory's endpoints.
pub struct AzureOpenAiGeneration {
    client: Client,
    api_key: String,
    api_version: String,
    environment: String,
    model: String,
    model_version: String,
    max_tokens: u32,
    directory: EndpointDirectory,
}

impl AzureOpenAiGeneration {
    pub fn new(
        settings: &AzureLlmSettings,
        max_tokens: u32,
        api_key: Option<&str>,
        directory: EndpointDirectory,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(
                    "AZURE_OPENAI_KEY environment variable not set".to_string(),
                )
            })?
            .to_string();

        let model_version = settings
            .model_version
            .clone()
            .unwrap_or_else(|| pinned_model_version(&settings.model).to_string());

        tracing::info!(
            "Azure OpenAI generation: {} ({}) in {}",
            settings.model,
            model_version,
            settings.environment
        );

        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            api_version: settings.api_version.clone(),
            environment: settings.environment.clone(),
            model: settings.model.clone(),
            model_version,
            max_tokens,
            directory,
        })
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    async fn attempt(&self, prompt: &str, temperature: f32) -> Result<String, AttemptError> {
        let eligible = self
            .directory
            .eligible(&self.environment, &self.model, &self.model_version);
        let endpoint = choose_endpoint(&eligible).ok_or_else(|| {
            PipelineError::Discovery(format!(
                "No endpoints found for: {}, {}, {}",
                self.environment, self.model, self.model_version
            ))
        })?;

        let url = join_url(
            &endpoint.endpoint,
            &format!(
                "openai/deployments/{}/chat/completions?api-version={}",
                self.model, self.api_version
            ),
        );
        tracing::debug!("Azure OpenAI request via {}", endpoint.endpoint);

        let body = json!({
            "messages": [ChatMessage::user(prompt)],
            "max_tokens": self.max_tokens,
            "temperature": temperature,
        });
        let payload = send_json(
            self.client
                .post(&url)
                .header("api-key", &self.api_key)
                .json(&body),
        )
        .await?;

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
impl GenerationBackend for AzureOpenAiGeneration {
    fn name(&self) -> &str {
        "openai"
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
