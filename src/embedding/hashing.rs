//! Deterministic stand-in encoder for tests.
//!
//! Signed feature hashing over lowercase word tokens and word-boundary
//! character trigrams, projected into a fixed number of buckets and
//! L2-normalized. It captures surface overlap only, never meaning, so the
//! provider factory does not offer it; tests plug it in directly, or serve it
//! behind a mock embedding endpoint.

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::provider::EmbeddingBackend;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::vector_math::l2_normalize;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

pub struct HashingEmbedding {
    dimension: usize,
    token_pattern: Regex,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> PipelineResult<Self> {
        if dimension == 0 {
            return Err(PipelineError::Configuration(
                "hashing embedding dimension must be positive".to_string(),
            ));
        }
        let token_pattern = Regex::new(r"[\p{L}\p{N}]+").map_err(PipelineError::config)?;
        Ok(Self {
            dimension,
            token_pattern,
        })
    }

    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for token in self.token_pattern.find_iter(&lowered) {
            let word = token.as_str();
            self.accumulate(&mut vector, &format!("w:{}", word), WORD_WEIGHT);

            let bounded: Vec<char> = format!("#{}#", word).chars().collect();
            for window in bounded.windows(3) {
                let gram: String = window.iter().collect();
                self.accumulate(&mut vector, &format!("c:{}", gram), TRIGRAM_WEIGHT);
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(head);

        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedding {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }

    async fn encode_query(&self, text: &str) -> PipelineResult<Vec<f32>> {
        Ok(self.encode(text))
    }
}
