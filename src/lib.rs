pub mod core;
pub mod directory;
pub mod embedding;
pub mod extract;
pub mod http;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod rag;
pub mod vector_math;

pub use crate::core::errors::{PipelineError, PipelineResult};
pub use pipeline::{GenerationOptions, Generator};
