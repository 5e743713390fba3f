use async_trait::async_trait;

use crate::core::errors::ApiError;

/// Bounded decoding parameters for a generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub max_output_tokens: i64,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// return the provider name (e.g. "gemini")
    fn name(&self) -> &str;

    /// single-prompt text generation with structured (JSON) output requested
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, ApiError>;

    /// embed one text into a fixed-length vector
    async fn embed_content(&self, model_id: &str, text: &str) -> Result<Vec<f32>, ApiError>;
}
