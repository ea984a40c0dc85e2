//! Retrieval side of the pipeline.
//!
//! - `corpus`: worked examples and prompt material from the data directory
//! - `store` / `sqlite`: the persistent vector index
//! - `indexer`: one-shot population of a collection from the corpus
//! - `retriever`: similarity search with per-example deduplication

pub mod corpus;
pub mod indexer;
pub mod retriever;
pub mod sqlite;
pub mod store;

pub use corpus::{Corpus, Example};
pub use indexer::{IndexBuilder, IndexOutcome};
pub use retriever::{ExampleRetriever, RetrievedExample};
pub use sqlite::SqliteVectorIndex;
pub use store::{IndexRecord, SearchHit, VectorIndex};
