//! Model-backed estimation and coaching.
//!
//! The session talks to [`NutritionModel`]; [`GeminiClient`] implements it
//! over the `generateContent` REST endpoint with a response schema, so the
//! model is forced to answer in the shapes defined here. Responses still
//! get defensive parsing: fenced code blocks are stripped, and a bare
//! number is accepted as a calories-only estimate.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::ProcessingLevel;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Nutrition estimate for one described food item.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NutritionEstimate {
    pub kcal: f64,
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carb_g: f64,
    #[serde(default)]
    pub fat_g: f64,
    #[serde(default)]
    pub fiber_g: f64,
    #[serde(default)]
    pub processing_level: ProcessingLevel,
}

/// Calorie estimate for one described activity.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ExpenditureEstimate {
    pub kcal: f64,
}

/// The inference contract the session depends on.
#[async_trait]
pub trait NutritionModel: Send + Sync {
    async fn estimate_food(&self, description: &str) -> Result<NutritionEstimate>;

    async fn estimate_activity(&self, description: &str) -> Result<ExpenditureEstimate>;

    /// Free-form coaching text for an assembled prompt pair.
    async fn coach_message(&self, system_prompt: &str, user_query: &str) -> Result<String>;
}

/// Exponential backoff for transient inference failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` (0-based) failed: doubles
    /// each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// [`NutritionModel`] over the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    async fn generate_once(
        &self,
        system_prompt: Option<&str>,
        user_query: &str,
        schema: Option<&Value>,
    ) -> Result<String> {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": user_query }] }],
        });
        if let Some(system) = system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if let Some(schema) = schema {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": schema,
            });
        }

        let resp = self.client.post(self.endpoint()).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "generateContent failed: {status} - {text}"
            )));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| Error::Inference(format!("undecodable response: {e}")))?;
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Inference("response carries no candidate text".into()))
    }

    /// One generation with the retry policy applied to every failure mode
    /// (the API rejects bursts with 429/503 routinely).
    async fn generate(
        &self,
        system_prompt: Option<&str>,
        user_query: &str,
        schema: Option<&Value>,
    ) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.generate_once(system_prompt, user_query, schema).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(error);
                    }
                    let delay = self.retry.delay(attempt - 1);
                    warn!(%error, attempt, ?delay, "inference attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl NutritionModel for GeminiClient {
    async fn estimate_food(&self, description: &str) -> Result<NutritionEstimate> {
        let query = format!(
            "Estimate the nutritional content of the following food as eaten. \
Use realistic portions when quantities are missing. Food: {description}"
        );
        let text = self
            .generate(None, &query, Some(&food_response_schema()))
            .await?;
        debug!(%text, "food estimate received");
        parse_food_estimate(&text)
    }

    async fn estimate_activity(&self, description: &str) -> Result<ExpenditureEstimate> {
        let query = format!(
            "Estimate the calories expended by the following physical activity \
for an average adult. Activity: {description}"
        );
        let text = self
            .generate(None, &query, Some(&activity_response_schema()))
            .await?;
        debug!(%text, "activity estimate received");
        parse_activity_estimate(&text)
    }

    async fn coach_message(&self, system_prompt: &str, user_query: &str) -> Result<String> {
        self.generate(Some(system_prompt), user_query, None).await
    }
}

fn food_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "kcal": { "type": "NUMBER" },
            "protein_g": { "type": "NUMBER" },
            "carb_g": { "type": "NUMBER" },
            "fat_g": { "type": "NUMBER" },
            "fiber_g": { "type": "NUMBER" },
            "processing_level": {
                "type": "STRING",
                "enum": ["natural", "processed", "ultraprocessed"]
            }
        },
        "required": ["kcal"]
    })
}

fn activity_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": { "kcal": { "type": "NUMBER" } },
        "required": ["kcal"]
    })
}

/// Drop a surrounding markdown code fence, if any.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub(crate) fn parse_food_estimate(text: &str) -> Result<NutritionEstimate> {
    let body = strip_fence(text);
    if let Ok(estimate) = serde_json::from_str::<NutritionEstimate>(body) {
        return Ok(estimate);
    }
    // Occasionally the model answers with just a number.
    if let Ok(kcal) = body.parse::<f64>() {
        return Ok(NutritionEstimate {
            kcal,
            protein_g: 0.0,
            carb_g: 0.0,
            fat_g: 0.0,
            fiber_g: 0.0,
            processing_level: ProcessingLevel::Unknown,
        });
    }
    Err(Error::Inference(format!(
        "response is neither an estimate object nor a number: {body:?}"
    )))
}

pub(crate) fn parse_activity_estimate(text: &str) -> Result<ExpenditureEstimate> {
    let body = strip_fence(text);
    if let Ok(estimate) = serde_json::from_str::<ExpenditureEstimate>(body) {
        return Ok(estimate);
    }
    if let Ok(kcal) = body.parse::<f64>() {
        return Ok(ExpenditureEstimate { kcal });
    }
    Err(Error::Inference(format!(
        "response is neither an estimate object nor a number: {body:?}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_object_parses_with_processing_level() {
        let estimate = parse_food_estimate(
            r#"{"kcal": 520.0, "protein_g": 32, "carb_g": 45, "fat_g": 18,
                "fiber_g": 6, "processing_level": "processed"}"#,
        )
        .unwrap();
        assert_eq!(estimate.kcal, 520.0);
        assert_eq!(estimate.protein_g, 32.0);
        assert_eq!(estimate.processing_level, ProcessingLevel::Processed);
    }

    #[test]
    fn missing_macros_default_to_zero() {
        let estimate = parse_food_estimate(r#"{"kcal": 90}"#).unwrap();
        assert_eq!(estimate.kcal, 90.0);
        assert_eq!(estimate.fiber_g, 0.0);
        assert_eq!(estimate.processing_level, ProcessingLevel::Unknown);
    }

    #[test]
    fn bare_number_is_a_calories_only_estimate() {
        let estimate = parse_food_estimate("350").unwrap();
        assert_eq!(estimate.kcal, 350.0);
        assert_eq!(estimate.protein_g, 0.0);
        assert_eq!(estimate.processing_level, ProcessingLevel::Unknown);

        let activity = parse_activity_estimate(" 275.5 ").unwrap();
        assert_eq!(activity.kcal, 275.5);
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let estimate =
            parse_food_estimate("```json\n{\"kcal\": 410, \"protein_g\": 25}\n```").unwrap();
        assert_eq!(estimate.kcal, 410.0);
        assert_eq!(estimate.protein_g, 25.0);
    }

    #[test]
    fn prose_is_rejected() {
        let err = parse_food_estimate("around four hundred calories").unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay(0), Duration::from_secs(2));
        assert_eq!(policy.delay(1), Duration::from_secs(4));
        assert_eq!(policy.delay(2), Duration::from_secs(8));
    }
}
