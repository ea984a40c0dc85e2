//! Retrieve → assemble → generate → extract.

use std::sync::Arc;

use serde_json::Value;

use crate::core::config::settings::RetrievalSettings;
use crate::core::config::{AppPaths, Settings};
use crate::core::errors::{PipelineError, PipelineResult};
use crate::embedding::{create_embedding_backend, EmbeddingBackend};
use crate::extract::ResponseExtractor;
use crate::llm::{create_generation_backend, GenerationBackend};
use crate::prompt::PromptAssembler;
use crate::rag::{
    Corpus, ExampleRetriever, IndexBuilder, IndexOutcome, RetrievedExample, SqliteVectorIndex,
    VectorIndex,
};

pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-call generation options.
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_retries: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Retrieval plus prompt assembly; everything short of calling a model.
pub struct PromptBuilder {
    retriever: ExampleRetriever,
    assembler: PromptAssembler,
    retrieval: RetrievalSettings,
}

impl PromptBuilder {
    /// Load the corpus, build the embedding backend, open the index and make
    /// sure the collection exists.
    pub async fn initialize(settings: &Settings, paths: &AppPaths) -> PipelineResult<Self> {
        let corpus = Corpus::load(&paths.data_dir)?;
        let embedder = create_embedding_backend(settings).await?;
        let index: Arc<dyn VectorIndex> =
            Arc::new(SqliteVectorIndex::open(&paths.index_path).await?);

        IndexBuilder::new(index.clone(), embedder.clone(), &settings.index.collection)
            .ensure(&corpus.examples)
            .await?;

        Self::from_parts(settings, &corpus, index, embedder)
    }

    pub fn from_parts(
        settings: &Settings,
        corpus: &Corpus,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> PipelineResult<Self> {
        Ok(Self {
            retriever: ExampleRetriever::new(
                index,
                embedder,
                &settings.index.collection,
                settings.retrieval.alternatives_per_example,
            ),
            assembler: PromptAssembler::new(
                corpus.template.clone(),
                corpus.schema.clone(),
                corpus.rules.clone(),
            )?,
            retrieval: settings.retrieval.clone(),
        })
    }

    pub async fn similar_examples(
        &self,
        description: &str,
        k: usize,
    ) -> PipelineResult<Vec<RetrievedExample>> {
        validate_description(description)?;
        self.retriever
            .retrieve(description, k, self.retrieval.deduplicate)
            .await
    }

    /// Prompt for `description` built from the configured top-k examples.
    pub async fn build_prompt(
        &self,
        description: &str,
        headers: Option<&str>,
    ) -> PipelineResult<String> {
        let examples = self
            .similar_examples(description, self.retrieval.top_k)
            .await?;
        Ok(self.assembler.assemble(description, headers, &examples))
    }
}

pub struct Generator {
    prompts: PromptBuilder,
    llm: Arc<dyn GenerationBackend>,
    extractor: ResponseExtractor,
}

impl Generator {
    /// Wire every component from settings.
    pub async fn initialize(settings: &Settings, paths: &AppPaths) -> PipelineResult<Self> {
        let prompts = PromptBuilder::initialize(settings, paths).await?;
        let llm = create_generation_backend(settings).await?;
        tracing::info!("Generator ready: llm={} ({})", llm.name(), llm.model());
        Self::new(prompts, llm)
    }

    pub fn new(prompts: PromptBuilder, llm: Arc<dyn GenerationBackend>) -> PipelineResult<Self> {
        Ok(Self {
            prompts,
            llm,
            extractor: ResponseExtractor::new()?,
        })
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub async fn similar_examples(
        &self,
        description: &str,
        k: usize,
    ) -> PipelineResult<Vec<RetrievedExample>> {
        self.prompts.similar_examples(description, k).await
    }

    pub async fn build_prompt(
        &self,
        description: &str,
        headers: Option<&str>,
    ) -> PipelineResult<String> {
        self.prompts.build_prompt(description, headers).await
    }

    pub async fn generate_configuration(
        &self,
        description: &str,
        headers: Option<&str>,
        options: GenerationOptions,
    ) -> PipelineResult<Value> {
        if !(0.0..=1.0).contains(&options.temperature) {
            return Err(PipelineError::InvalidInput(format!(
                "temperature must be within [0.0, 1.0], got {}",
                options.temperature
            )));
        }

        let prompt = self.prompts.build_prompt(description, headers).await?;
        tracing::debug!("Prompt assembled ({} chars)", prompt.len());

        let raw = self
            .llm
            .generate(&prompt, options.temperature, options.max_retries)
            .await?;
        self.extractor.extract(&raw)
    }
}

/// Create the collection if needed, or drop and repopulate it.
pub async fn build_index(
    settings: &Settings,
    paths: &AppPaths,
    rebuild: bool,
) -> PipelineResult<IndexOutcome> {
    let corpus = Corpus::load(&paths.data_dir)?;
    let embedder = create_embedding_backend(settings).await?;
    let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open(&paths.index_path).await?);
    let builder = IndexBuilder::new(index, embedder, &settings.index.collection);

    if rebuild {
        builder.rebuild(&corpus.examples).await
    } else {
        builder.ensure(&corpus.examples).await
    }
}

fn validate_description(description: &str) -> PipelineResult<()> {
    if description.trim().is_empty() {
        return Err(PipelineError::InvalidInput(
            "description must not be empty".to_string(),
        ));
    }
    Ok(())
}
