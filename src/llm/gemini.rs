use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{GenerationConfig, ModelProvider};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    fn model_url(&self, model_id: &str, operation: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}?key={}",
            self.base_url, model_id, operation, self.api_key
        )
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, ApiError> {
        let url = self.model_url(model_id, "generateContent");

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": config.temperature,
                "topP": config.top_p,
                "topK": config.top_k,
                "maxOutputTokens": config.max_output_tokens,
                "responseMimeType": "application/json",
            },
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::external)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::ExternalService(format!(
                "generation request failed ({status}): {text}"
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::external)?;

        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ApiError::ExternalService("generation response contained no candidates".to_string())
            })
    }

    async fn embed_content(&self, model_id: &str, text: &str) -> Result<Vec<f32>, ApiError> {
        let url = self.model_url(model_id, "embedContent");

        let body = json!({
            "content": { "parts": [{ "text": text }] },
            "taskType": "SEMANTIC_SIMILARITY",
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::external)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::ExternalService(format!(
                "embedding request failed ({status}): {text}"
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::external)?;

        let values = payload["embedding"]["values"].as_array().ok_or_else(|| {
            ApiError::ExternalService("embedding response contained no values".to_string())
        })?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }
}
