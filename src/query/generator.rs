//! Grounded answer generation.

use std::sync::Arc;

use serde::Serialize;

use crate::core::errors::ApiError;
use crate::index::RetrievedChunk;
use crate::llm::provider::{GenerationConfig, ModelProvider};

/// Returned verbatim when the generation call fails; callers receive it as
/// a valid-but-degraded answer.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I couldn't generate a response. Please try again later.";

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub answer: String,
    pub context: Vec<RetrievedChunk>,
    pub model_id: String,
    pub degraded: bool,
}

#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn ModelProvider>,
    config: GenerationConfig,
}

impl Generator {
    pub fn new(provider: Arc<dyn ModelProvider>, config: GenerationConfig) -> Self {
        Self { provider, config }
    }

    pub async fn generate(
        &self,
        model_id: &str,
        query: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<GenerationResult, ApiError> {
        let prompt = build_prompt(query, chunks);

        match self.provider.generate(model_id, &prompt, &self.config).await {
            Ok(answer) => Ok(GenerationResult {
                answer,
                context: chunks.to_vec(),
                model_id: model_id.to_string(),
                degraded: false,
            }),
            Err(err) => {
                tracing::error!(model_id, "failed to generate response: {err}");
                Ok(GenerationResult {
                    answer: FALLBACK_ANSWER.to_string(),
                    context: chunks.to_vec(),
                    model_id: model_id.to_string(),
                    degraded: true,
                })
            }
        }
    }
}

pub fn build_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|chunk| format!("Document: {}\nContent: {}", chunk.file_name, chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the following question based on the provided context.\n\
         If the answer is not in the context, say \"I don't have enough information.\"\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {query}\n\
         \n\
         Answer:"
    )
}
