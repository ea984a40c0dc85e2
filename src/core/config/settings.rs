//! Typed view of the merged configuration.
//!
//! Built once at startup by `ConfigService::load_settings` and never re-read; every
//! backend receives the slice it needs at construction.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub index: IndexSettings,
    pub http: HttpSettings,
    pub directory: DirectorySettings,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// One of `local`, `lite`, `openai`, `gemini`.
    pub provider: String,
    pub local: LocalEmbeddingSettings,
    pub lite: LiteEmbeddingSettings,
    pub openai: AzureEmbeddingSettings,
    pub gemini: GeminiEmbeddingSettings,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            local: LocalEmbeddingSettings::default(),
            lite: LiteEmbeddingSettings::default(),
            openai: AzureEmbeddingSettings::default(),
            gemini: GeminiEmbeddingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalEmbeddingSettings {
    pub base_url: String,
    pub model: String,
    /// Detected from the server when unset.
    pub dimension: Option<usize>,
    pub query_prefix: String,
    pub document_prefix: String,
}

impl Default for LocalEmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            model: "bge-m3".to_string(),
            dimension: None,
            query_prefix: String::new(),
            document_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiteEmbeddingSettings {
    /// fastembed model name or Hugging Face id; the dimension follows from it.
    pub model: String,
    /// Where model weights are cached; fastembed's default when unset.
    pub cache_dir: Option<String>,
}

impl Default for LiteEmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureEmbeddingSettings {
    pub model: String,
    pub environment: String,
    pub api_version: String,
    pub dimension: usize,
}

impl Default for AzureEmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            environment: "nonprod".to_string(),
            api_version: "2024-02-01".to_string(),
            dimension: 1536,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiEmbeddingSettings {
    pub model: String,
    pub base_url: String,
    pub dimension: usize,
}

impl Default for GeminiEmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            dimension: 768,
        }
    }
}

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// One of `openai`, `gemini`, `local`.
    pub provider: String,
    pub max_tokens: u32,
    pub openai: AzureLlmSettings,
    pub gemini: GeminiLlmSettings,
    pub local: LocalLlmSettings,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            max_tokens: 4096,
            openai: AzureLlmSettings::default(),
            gemini: GeminiLlmSettings::default(),
            local: LocalLlmSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureLlmSettings {
    pub model: String,
    pub environment: String,
    pub api_version: String,
    /// Overrides the version pinned for known model names.
    pub model_version: Option<String>,
}

impl Default for AzureLlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini-global".to_string(),
            environment: "nonprod".to_string(),
            api_version: "2024-02-01".to_string(),
            model_version: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiLlmSettings {
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiLlmSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-exp".to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLlmSettings {
    pub base_url: String,
    pub model: String,
}

impl Default for LocalLlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8088".to_string(),
            model: "local-model".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Alternative phrasings stored per example; widens the raw search pool
    /// when deduplicating.
    pub alternatives_per_example: usize,
    pub deduplicate: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 25,
            alternatives_per_example: 3,
            deduplicate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub collection: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            collection: "few_shot_examples".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub request_timeout_secs: u64,
    pub directory_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            directory_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    /// Location of the `{environment: {model: [endpoint...]}}` document.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub azure_api_key: Option<String>,
    pub google_api_key: Option<String>,
}
