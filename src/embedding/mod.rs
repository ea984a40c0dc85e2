pub mod azure;
pub mod factory;
pub mod gemini;
pub mod hashing;
pub mod lite;
pub mod local;
pub mod provider;

pub use factory::{create_embedding_backend, EmbeddingProviderKind};
pub use hashing::HashingEmbedding;
pub use lite::{LiteEmbedding, LiteModel};
pub use provider::EmbeddingBackend;
