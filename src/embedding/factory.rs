use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::azure::AzureOpenAiEmbedding;
use super::gemini::GeminiEmbedding;
use super::lite::LiteEmbedding;
use super::local::LocalEmbedding;
use super::provider::EmbeddingBackend;
use crate::core::config::Settings;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::directory::EndpointDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    Local,
    Lite,
    OpenAi,
    Gemini,
}

impl EmbeddingProviderKind {
    pub const NAMES: [&'static str; 4] = ["local", "lite", "openai", "gemini"];
}

impl FromStr for EmbeddingProviderKind {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "lite" => Ok(Self::Lite),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            _ => Err(PipelineError::Configuration(format!(
                "Unsupported embedding provider: '{}'. Valid options: {}",
                value,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Lite => "lite",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        };
        f.write_str(name)
    }
}

/// Build the configured embedding backend. Hosted providers check their
/// credential before touching the network.
pub async fn create_embedding_backend(
    settings: &Settings,
) -> PipelineResult<Arc<dyn EmbeddingBackend>> {
    let kind: EmbeddingProviderKind = settings.embedding.provider.parse()?;
    let timeout = Duration::from_secs(settings.http.request_timeout_secs);
    tracing::info!("Initializing embedding backend: {}", kind);

    let backend: Arc<dyn EmbeddingBackend> = match kind {
        EmbeddingProviderKind::Lite => Arc::new(LiteEmbedding::load(&settings.embedding.lite).await?),
        EmbeddingProviderKind::Local => {
            Arc::new(LocalEmbedding::new(&settings.embedding.local, timeout).await?)
        }
        EmbeddingProviderKind::OpenAi => {
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
            Arc::new(AzureOpenAiEmbedding::new(
                &settings.embedding.openai,
                api_key,
                directory,
                timeout,
            )?)
        }
        EmbeddingProviderKind::Gemini => Arc::new(GeminiEmbedding::new(
            &settings.embedding.gemini,
            settings.credentials.google_api_key.as_deref(),
            timeout,
        )?),
    };

    tracing::info!(
        "Embedding backend ready: {} (dimension {})",
        backend.name(),
        backend.dimension()
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!(
            "OpenAI".parse::<EmbeddingProviderKind>().unwrap(),
            EmbeddingProviderKind::OpenAi
        );
        assert_eq!(
            " lite ".parse::<EmbeddingProviderKind>().unwrap(),
            EmbeddingProviderKind::Lite
        );
    }

    #[test]
    fn unknown_name_lists_valid_set() {
        let err = "bert".parse::<EmbeddingProviderKind>().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'bert'"));
        assert!(text.contains("local, lite, openai, gemini"));
    }

    #[tokio::test]
    async fn lite_rejects_unknown_model_before_loading() {
        let mut settings = Settings::default();
        settings.embedding.provider = "lite".to_string();
        settings.embedding.lite.model = "bge-m3".to_string();
        let err = create_embedding_backend(&settings).await.err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("Unsupported lite embedding model: 'bge-m3'"));
    }

    #[cfg(not(feature = "lite-model"))]
    #[tokio::test]
    async fn lite_without_model_feature_is_configuration_error() {
        let mut settings = Settings::default();
        settings.embedding.provider = "lite".to_string();
        let err = create_embedding_backend(&settings).await.err().unwrap();
        assert!(err.to_string().contains("lite-model"));
    }

    #[tokio::test]
    async fn openai_without_key_fails_before_directory_fetch() {
        let mut settings = Settings::default();
        settings.embedding.provider = "openai".to_string();
        // would be a Discovery error if the fetch were attempted
        settings.directory.url = Some("http://127.0.0.1:9/urls.json".to_string());
        let err = create_embedding_backend(&settings).await.err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("AZURE_OPENAI_KEY"));
    }

    #[tokio::test]
    async fn gemini_without_key_is_configuration_error() {
        let mut settings = Settings::default();
        settings.embedding.provider = "gemini".to_string();
        let err = create_embedding_backend(&settings).await.err().unwrap();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }
}
