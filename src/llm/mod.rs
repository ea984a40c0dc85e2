pub mod azure;
pub mod factory;
pub mod gemini;
pub mod local;
pub mod provider;
pub mod retry;
pub mod types;

pub use factory::{create_generation_backend, GenerationProviderKind};
pub use provider::GenerationBackend;
pub use types::ChatMessage;
