//! Answer-generation capability trait.

use anyhow::Result;
use async_trait::async_trait;

/// Prompt-to-text capability (a single non-streaming completion).
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"llama3-8b-8192"`).
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}
