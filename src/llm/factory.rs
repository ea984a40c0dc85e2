use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::azure::AzureOpenAiGeneration;
use super::gemini::GeminiGeneration;
use super::local::LocalGeneration;
use super::provider::GenerationBackend;
use crate::core::config::Settings;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::directory::EndpointDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationProviderKind {
    OpenAi,
    Gemini,
    Local,
}

impl GenerationProviderKind {
    pub const NAMES: [&'static str; 3] = ["openai", "gemini", "local"];
}

impl FromStr for GenerationProviderKind {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "local" => Ok(Self::Local),
            _ => Err(PipelineError::Configuration(format!(
                "Unsupported LLM provider: '{}'. Valid options: {}",
                value,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for GenerationProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Local => "local",
        })
    }
}

pub async fn create_generation_backend(
    settings: &Settings,
) -> PipelineResult<Arc<dyn GenerationBackend>> {
    let kind: GenerationProviderKind = settings.llm.provider.parse()?;
    let timeout = Duration::from_secs(settings.http.request_timeout_secs);
    let max_tokens = settings.llm.max_tokens;
    tracing::info!("Initializing LLM provider: {}", kind);

    let backend: Arc<dyn GenerationBackend> = match kind {
        GenerationProviderKind::OpenAi => {
            let api_key = settings.credentials.azure_api_key.as_deref();
            if api_key.map_or(true, |k| k.trim().is_empty()) {
                return Err(PipelineError::Configuration(
                    "AZURE_OPENAI_KEY environment variable not set".to_string(),
                ));
            }
            let directory = EndpointDirectory::fetch(
                settings.directory.url.as_deref(),
                Duration::from_secs(settings.http.directory_timeout_secs),
            )
            .await?;
            Arc::new(AzureOpenAiGeneration::new(
                &settings.llm.openai,
                max_tokens,
                api_key,
                directory,
                timeout,
            )?)
        }
        GenerationProviderKind::Gemini => Arc::new(GeminiGeneration::new(
            &settings.llm.gemini,
            max_tokens,
            settings.credentials.google_api_key.as_deref(),
            timeout,
        )?),
        GenerationProviderKind::Local => Arc::new(LocalGeneration::new(
            &settings.llm.local,
            max_tokens,
            timeout,
        )?),
    };

    Ok(backend)
}
