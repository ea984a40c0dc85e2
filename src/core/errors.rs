use std::fmt;

use thiserror::Error;

const EXCERPT_CHARS: usize = 200;

/// How a single provider call failed. Every kind is retried the same way by
/// the generation layer; the kind only drives diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unreachable,
    RateLimited,
    ApiStatus(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransientFailure {
    pub fn unreachable<E: fmt::Display>(err: E) -> Self {
        Self {
            kind: FailureKind::Unreachable,
            message: err.to_string(),
        }
    }

    pub fn rate_limited<E: fmt::Display>(err: E) -> Self {
        Self {
            kind: FailureKind::RateLimited,
            message: err.to_string(),
        }
    }

    pub fn api_status<E: fmt::Display>(status: u16, err: E) -> Self {
        Self {
            kind: FailureKind::ApiStatus(status),
            message: err.to_string(),
        }
    }

    /// Classify a transport error raised before any response was read.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 429 => Self::rate_limited(err),
            Some(status) => Self::api_status(status.as_u16(), err),
            None => Self::unreachable(err),
        }
    }

    /// Classify a non-success HTTP status with its response body.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = body.trim();
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body)
        };
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::rate_limited(detail)
        } else {
            Self::api_status(status.as_u16(), detail)
        }
    }
}

impl fmt::Display for TransientFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Unreachable => write!(f, "Server unreachable: {}", self.message),
            FailureKind::RateLimited => write!(f, "Rate limit (HTTP 429): {}", self.message),
            FailureKind::ApiStatus(code) => write!(f, "API error (HTTP {}): {}", code, self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("endpoint discovery failed: {0}")]
    Discovery(String),

    #[error("{provider} call failed: {failure}")]
    Transient {
        provider: String,
        failure: TransientFailure,
    },

    #[error("{provider} call failed after {attempts} attempts. Last error: {last}")]
    ProviderExhausted {
        provider: String,
        attempts: u32,
        last: TransientFailure,
    },

    /// A successful reply without the expected content; never retried.
    #[error("{provider} returned a malformed response ({message}): {excerpt:?}")]
    MalformedResponse {
        provider: String,
        message: String,
        excerpt: String,
    },

    #[error("no JSON object found in model output: {excerpt:?}")]
    Extraction { excerpt: String },

    #[error("model output is not valid JSON ({message}): {excerpt:?}")]
    Parse { message: String, excerpt: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding model error: {0}")]
    Model(String),

    #[error("malformed example corpus: {0}")]
    Corpus(String),

    #[error("vector index error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn storage<E: fmt::Display>(err: E) -> Self {
        PipelineError::Storage(err.to_string())
    }

    pub fn config<E: fmt::Display>(err: E) -> Self {
        PipelineError::Configuration(err.to_string())
    }

    pub fn malformed_response(provider: &str, message: &str, body: &str) -> Self {
        PipelineError::MalformedResponse {
            provider: provider.to_string(),
            message: message.to_string(),
            excerpt: body.chars().take(EXCERPT_CHARS).collect(),
        }
    }

    pub fn dimension_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        PipelineError::Configuration(format!(
            "dimension mismatch ({}): expected {}, got {}",
            context, expected, actual
        ))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
