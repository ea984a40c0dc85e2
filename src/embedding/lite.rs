//! In-process sentence embedding model.
//!
//! Runs a small ONNX sentence-transformer through `fastembed`. Weights are
//! downloaded into the cache directory on first load, after which the
//! backend works offline. Inference needs the `lite-model` cargo feature;
//! without it the model name is still validated but loading fails with a
//! configuration error.

use std::fmt;
use std::str::FromStr;
#[cfg(feature = "lite-model")]
use std::sync::Arc;

use async_trait::async_trait;

use super::provider::{check_vectors, EmbeddingBackend};
use crate::core::config::settings::LiteEmbeddingSettings;
use crate::core::errors::{PipelineError, PipelineResult};

#[cfg(feature = "lite-model")]
const BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteModel {
    AllMiniLmL6V2,
    AllMiniLmL12V2,
    BgeSmallEnV15,
    BgeBaseEnV15,
    MultilingualE5Small,
}

impl LiteModel {
    pub const NAMES: [&'static str; 5] = [
        "all-MiniLM-L6-v2",
        "all-MiniLM-L12-v2",
        "bge-small-en-v1.5",
        "bge-base-en-v1.5",
        "multilingual-e5-small",
    ];

    pub fn dimension(self) -> usize {
        match self {
            Self::BgeBaseEnV15 => 768,
            _ => 384,
        }
    }

    /// (query, document) prefixes the model was trained with.
    fn prefixes(self) -> (&'static str, &'static str) {
        match self {
            Self::MultilingualE5Small => ("query: ", "passage: "),
            _ => ("", ""),
        }
    }

    #[cfg(feature = "lite-model")]
    fn fastembed_model(self) -> fastembed::EmbeddingModel {
        use fastembed::EmbeddingModel;

        match self {
            Self::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
            Self::AllMiniLmL12V2 => EmbeddingModel::AllMiniLML12V2,
            Self::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
            Self::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
            Self::MultilingualE5Small => EmbeddingModel::MultilingualE5Small,
        }
    }
}

impl FromStr for LiteModel {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // Hugging Face ids such as `sentence-transformers/all-MiniLM-L6-v2` are accepted
        let name = value
            .trim()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match name.as_str() {
            "all-minilm-l6-v2" => Ok(Self::AllMiniLmL6V2),
            "all-minilm-l12-v2" => Ok(Self::AllMiniLmL12V2),
            "bge-small-en-v1.5" => Ok(Self::BgeSmallEnV15),
            "bge-base-en-v1.5" => Ok(Self::BgeBaseEnV15),
            "multilingual-e5-small" => Ok(Self::MultilingualE5Small),
            _ => Err(PipelineError::Configuration(format!(
                "Unsupported lite embedding model: '{}'. Valid options: {}",
                value,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for LiteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AllMiniLmL6V2 => Self::NAMES[0],
            Self::AllMiniLmL12V2 => Self::NAMES[1],
            Self::BgeSmallEnV15 => Self::NAMES[2],
            Self::BgeBaseEnV15 => Self::NAMES[3],
            Self::MultilingualE5Small => Self::NAMES[4],
        };
        f.write_str(name)
    }
}

pub struct LiteEmbedding {
    model: LiteModel,
    #[cfg(feature = "lite-model")]
    engine: Arc<fastembed::TextEmbedding>,
}

impl LiteEmbedding {
    /// Resolve the configured model and load it on a blocking thread.
    pub async fn load(settings: &LiteEmbeddingSettings) -> PipelineResult<Self> {
        let model: LiteModel = settings.model.parse()?;
        tracing::info!(
            "Loading lite embedding model {} ({} dimensions)",
            model,
            model.dimension()
        );
        Self::load_model(model, settings.cache_dir.clone()).await
    }

    pub fn model(&self) -> LiteModel {
        self.model
    }

    #[cfg(feature = "lite-model")]
    async fn load_model(model: LiteModel, cache_dir: Option<String>) -> PipelineResult<Self> {
        use fastembed::{InitOptions, TextEmbedding};

        let engine = tokio::task::spawn_blocking(move || {
            let mut options =
                InitOptions::new(model.fastembed_model()).with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir.into());
            }
            TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| PipelineError::Model(format!("loading {} was aborted: {}", model, e)))?
        .map_err(|e| PipelineError::Model(format!("failed to load {}: {}", model, e)))?;

        Ok(Self {
            model,
            engine: Arc::new(engine),
        })
    }

    #[cfg(not(feature = "lite-model"))]
    async fn load_model(model: LiteModel, _cache_dir: Option<String>) -> PipelineResult<Self> {
        Err(model_unavailable(model))
    }

    #[cfg(feature = "lite-model")]
    async fn embed(&self, inputs: Vec<String>) -> PipelineResult<Vec<Vec<f32>>> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.embed(inputs, Some(BATCH_SIZE)))
            .await
            .map_err(|e| PipelineError::Model(format!("{} inference was aborted: {}", self.model, e)))?
            .map_err(|e| PipelineError::Model(format!("{} inference failed: {}", self.model, e)))
    }

    #[cfg(not(feature = "lite-model"))]
    async fn embed(&self, _inputs: Vec<String>) -> PipelineResult<Vec<Vec<f32>>> {
        Err(model_unavailable(self.model))
    }

    async fn encode_prefixed(&self, prefix: &str, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();
        let vectors = self.embed(inputs).await?;
        check_vectors("lite", texts.len(), self.model.dimension(), &vectors)?;
        Ok(vectors)
    }
}

#[cfg(not(feature = "lite-model"))]
fn model_unavailable(model: LiteModel) -> PipelineError {
    PipelineError::Configuration(format!(
        "lite embedding model {} is not compiled in; rebuild with `--features lite-model`",
        model
    ))
}

#[async_trait]
impl EmbeddingBackend for LiteEmbedding {
    fn name(&self) -> &str {
        "lite"
    }

    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    async fn encode_batch(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        let (_, document) = self.model.prefixes();
        self.encode_prefixed(document, texts).await
    }

    async fn encode_query(&self, text: &str) -> PipelineResult<Vec<f32>> {
        let (query, _) = self.model.prefixes();
        self.encode_prefixed(query, &[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| PipelineError::Model(format!("{} returned no vector", self.model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_and_hub_ids() {
        assert_eq!(
            "all-MiniLM-L6-v2".parse::<LiteModel>().unwrap(),
            LiteModel::AllMiniLmL6V2
        );
        assert_eq!(
            "sentence-transformers/all-MiniLM-L6-v2".parse::<LiteModel>().unwrap(),
            LiteModel::AllMiniLmL6V2
        );
        assert_eq!(
            "BAAI/bge-base-en-v1.5".parse::<LiteModel>().unwrap(),
            LiteModel::BgeBaseEnV15
        );
        for name in LiteModel::NAMES {
            assert_eq!(name.parse::<LiteModel>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn dimensions_and_prefixes_follow_the_model() {
        assert_eq!(LiteModel::AllMiniLmL6V2.dimension(), 384);
        assert_eq!(LiteModel::BgeBaseEnV15.dimension(), 768);
        assert_eq!(LiteModel::MultilingualE5Small.prefixes(), ("query: ", "passage: "));
        assert_eq!(LiteModel::BgeSmallEnV15.prefixes(), ("", ""));
    }

    #[test]
    fn unknown_model_lists_valid_set() {
        let err = "bge-m3".parse::<LiteModel>().unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("all-MiniLM-L6-v2, all-MiniLM-L12-v2"));
    }

    #[cfg(not(feature = "lite-model"))]
    #[tokio::test]
    async fn loading_without_the_feature_is_configuration_error() {
        let err = LiteEmbedding::load(&LiteEmbeddingSettings::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("--features lite-model"));
    }

    #[cfg(feature = "lite-model")]
    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn paraphrases_score_above_unrelated_text() {
        use crate::vector_math::cosine_similarity;

        let lite = LiteEmbedding::load(&LiteEmbeddingSettings::default())
            .await
            .unwrap();
        let docs = lite
            .encode_batch(&[
                "bar chart with blue bars".to_string(),
                "network graph of protein interactions".to_string(),
            ])
            .await
            .unwrap();
        let query = lite.encode_query("histogram colored in navy").await.unwrap();
        assert_eq!(query.len(), 384);
        assert!(cosine_similarity(&query, &docs[0]) > cosine_similarity(&query, &docs[1]));
    }
}
