use async_trait::async_trait;

use crate::core::errors::PipelineResult;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// provider name as configured (e.g. "openai", "gemini", "local")
    fn name(&self) -> &str;

    /// model or deployment the backend talks to
    fn model(&self) -> &str;

    /// send one prompt and return the raw completion text, retrying
    /// transient failures up to `max_retries` attempts
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_retries: u32,
    ) -> PipelineResult<String>;
}
