use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::local::parse_openai_embeddings;
use super::provider::{check_vectors, EmbeddingBackend};
use crate::core::config::settings::AzureEmbeddingSettings;
use crate::core::errors::{PipelineError, PipelineResult, TransientFailure};
use crate::directory::{choose_endpoint, EndpointDirectory};
use crate::http::{build_client, join_url, send_json};

const MAX_BATCH: usize = 2048;

/// Azure OpenAI embeddings behind an endpoint directory.
pub struct AzureOpenAiEmbedding {
    client: Client,
    api_key: String,
    api_version: String,
    environment: String,
    model: String,
    dimension: usize,
    directory: EndpointDirectory,
}

impl AzureOpenAiEmbedding {
    pub fn new(
        settings: &AzureEmbeddingSettings,
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

        let mut model = settings.model.clone();
        if directory.endpoints(&settings.environment, &model).is_empty() {
            if let Some(fallback) =
                directory.find_model(&settings.environment, |name| {
                    name.to_lowercase().contains("embedding")
                })
            {
                tracing::warn!(
                    "No endpoints for embedding model '{}', using '{}'",
                    model,
                    fallback
                );
                model = fallback.to_string();
            }
        }

        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            api_version: settings.api_version.clone(),
            environment: settings.environment.clone(),
            model,
            dimension: settings.dimension,
            directory,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request_embeddings(&self, inputs: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        let candidates: Vec<_> = self
            .directory
            .endpoints(&self.environment, &self.model)
            .iter()
            .collect();
        let endpoint = choose_endpoint(&candidates).ok_or_else(|| {
            PipelineError::Discovery(format!(
                "No embedding endpoints found for {} / {}",
                self.environment, self.model
            ))
        })?;

        let url = join_url(
            &endpoint.endpoint,
            &format!(
                "openai/deployments/{}/embeddings?api-version={}",
                self.model, self.api_version
            ),
        );
        tracing::debug!("Embedding {} texts via {}", inputs.len(), endpoint.endpoint);

        let request = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .json(&json!({ "model": self.model, "input": inputs }));

        let payload = send_json(request)
            .await
            .map_err(|failure| PipelineError::Transient {
                provider: "openai".to_string(),
                failure,
            })?;

        parse_openai_embeddings(&payload).ok_or_else(|| PipelineError::Transient {
            provider: "openai".to_string(),
            failure: TransientFailure::api_status(200, "response has no `data` embeddings"),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for AzureOpenAiEmbedding {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            vectors.extend(self.request_embeddings(chunk).await?);
        }
        check_vectors("openai", texts.len(), self.dimension, &vectors)?;
        Ok(vectors)
    }

    async fn encode_query(&self, text: &str) -> PipelineResult<Vec<f32>> {
        let mut vectors = self.encode_batch(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }
}
