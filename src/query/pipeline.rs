//! Query orchestrator: retrieve, generate, optionally evaluate.

use serde::{Deserialize, Serialize};

use super::evaluator::{EvaluationScores, Evaluator};
use super::generator::Generator;
use super::retriever::Retriever;
use crate::core::errors::ApiError;
use crate::index::RetrievedChunk;

fn default_user_id() -> String {
    "system".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub enable_evaluation: bool,
    #[serde(default)]
    pub ground_truth: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub response: String,
    pub results: Vec<RetrievedChunk>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationScores>,
    pub degraded: bool,
}

#[derive(Clone)]
pub struct QueryPipeline {
    retriever: Retriever,
    generator: Generator,
    evaluator: Evaluator,
    default_model: String,
    search_limit: usize,
}

impl QueryPipeline {
    pub fn new(
        retriever: Retriever,
        generator: Generator,
        evaluator: Evaluator,
        default_model: String,
        search_limit: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            evaluator,
            default_model,
            search_limit,
        }
    }

    pub async fn execute(&self, request: QueryRequest) -> Result<QueryResponse, ApiError> {
        let query = match request.query.as_deref() {
            Some(query) if !query.is_empty() => query.to_string(),
            _ => return Err(ApiError::Validation("Query is required".to_string())),
        };
        let model_id = request
            .model_name
            .unwrap_or_else(|| self.default_model.clone());

        let retrieval = self
            .retriever
            .retrieve(&query, &request.user_id, self.search_limit)
            .await?;

        let generation = self
            .generator
            .generate(&model_id, &query, &retrieval.chunks)
            .await?;

        let evaluation = if request.enable_evaluation {
            let contexts: Vec<String> = retrieval
                .chunks
                .iter()
                .map(|chunk| chunk.content.clone())
                .collect();
            Some(
                self.evaluator
                    .evaluate(
                        &model_id,
                        &query,
                        &generation.answer,
                        &contexts,
                        request.ground_truth.as_deref(),
                    )
                    .await,
            )
        } else {
            None
        };

        let degraded = generation.degraded || retrieval.degraded.is_some();

        // Query log: one structured line per answered query.
        tracing::info!(
            user_id = request.user_id.as_str(),
            model_id = model_id.as_str(),
            results = retrieval.chunks.len(),
            evaluated = evaluation.is_some(),
            degraded,
            "query answered"
        );

        Ok(QueryResponse {
            query,
            response: generation.answer,
            count: retrieval.chunks.len(),
            results: retrieval.chunks,
            evaluation,
            degraded,
        })
    }
}
