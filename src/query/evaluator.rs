//! Answer quality scoring via auxiliary model calls.
//!
//! Each metric issues one rubric-prompted generation call that must reply
//! with a bare number in [0,1]. Scoring never blocks answer delivery: a
//! failed call or unparseable reply falls back to the neutral 0.5.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm::provider::{GenerationConfig, ModelProvider};

pub const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub answer_relevancy: f64,
    pub faithfulness: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_precision: Option<f64>,
}

#[derive(Clone)]
pub struct Evaluator {
    provider: Arc<dyn ModelProvider>,
    config: GenerationConfig,
}

impl Evaluator {
    pub fn new(provider: Arc<dyn ModelProvider>, config: GenerationConfig) -> Self {
        Self { provider, config }
    }

    /// Score the answer against its grounding context. `context_precision`
    /// is computed only when a reference answer is supplied. Metrics are
    /// evaluated one at a time, in a fixed order.
    pub async fn evaluate(
        &self,
        model_id: &str,
        query: &str,
        answer: &str,
        contexts: &[String],
        reference_answer: Option<&str>,
    ) -> EvaluationScores {
        let context_block = contexts.join("\n\n");

        let answer_relevancy = self
            .score_metric(model_id, &relevancy_prompt(query, answer))
            .await;
        let faithfulness = self
            .score_metric(model_id, &faithfulness_prompt(answer, &context_block))
            .await;
        let context_precision = match reference_answer {
            Some(reference) => Some(
                self.score_metric(
                    model_id,
                    &context_precision_prompt(query, &context_block, reference),
                )
                .await,
            ),
            None => None,
        };

        EvaluationScores {
            answer_relevancy,
            faithfulness,
            context_precision,
        }
    }

    async fn score_metric(&self, model_id: &str, prompt: &str) -> f64 {
        match self.provider.generate(model_id, prompt, &self.config).await {
            Ok(reply) => parse_score(&reply).unwrap_or_else(|| {
                tracing::warn!("unparseable evaluation reply: {reply:?}");
                NEUTRAL_SCORE
            }),
            Err(err) => {
                tracing::warn!("evaluation call failed: {err}");
                NEUTRAL_SCORE
            }
        }
    }
}

/// First numeric literal in the reply, clamped to [0,1].
fn parse_score(reply: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("static regex"));

    number
        .find(reply)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|value| value.clamp(0.0, 1.0))
}

fn relevancy_prompt(query: &str, answer: &str) -> String {
    format!(
        "Rate how relevant the answer is to the question, on a scale from 0 to 1.\n\
         Respond with a single number between 0 and 1 with two decimals and nothing else.\n\
         \n\
         Question: {query}\n\
         \n\
         Answer: {answer}\n\
         \n\
         Score:"
    )
}

fn faithfulness_prompt(answer: &str, context: &str) -> String {
    format!(
        "Rate how faithful the answer is to the provided context, on a scale from 0 to 1.\n\
         A faithful answer makes no claim that is not supported by the context.\n\
         Respond with a single number between 0 and 1 with two decimals and nothing else.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Answer: {answer}\n\
         \n\
         Score:"
    )
}

fn context_precision_prompt(query: &str, context: &str, reference: &str) -> String {
    format!(
        "Rate how precisely the retrieved context covers the information needed to\n\
         produce the reference answer for the question, on a scale from 0 to 1.\n\
         Respond with a single number between 0 and 1 with two decimals and nothing else.\n\
         \n\
         Question: {query}\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Reference answer: {reference}\n\
         \n\
         Score:"
    )
}
