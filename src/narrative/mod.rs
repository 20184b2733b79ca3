//! Narrative service: turns report statistics into a written engineering
//! assessment via an OpenAI-compatible chat completion endpoint.
//!
//! The call is strictly best-effort. Callers wrap it in their own deadline
//! and degrade to a report without narrative on any error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::NarrativeConfig;

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("narrative generation is disabled")]
    Disabled,

    #[error("API key not configured (set {0})")]
    MissingApiKey(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Figures the narrative is written from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeStats {
    pub total_failures: usize,
    pub total_time: f64,
    pub laplace_score: f64,
    pub trend_assessment: String,
    pub best_model: Option<String>,
    pub best_rmse: Option<f64>,
    /// Most recent raw failure intensities, oldest first.
    pub recent_intensity: Vec<f64>,
    pub original_count: usize,
    pub processed_count: usize,
}

#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn generate(&self, stats: &NarrativeStats) -> Result<String, NarrativeError>;
}

const SYSTEM_PROMPT: &str = "You are an expert reliability engineer writing formal analysis reports.";

pub fn build_prompt(stats: &NarrativeStats) -> String {
    let best = match (&stats.best_model, stats.best_rmse) {
        (Some(name), Some(rmse)) => format!("{} (RMSE: {:.4})", name, rmse),
        _ => "none (no model could be fitted)".to_string(),
    };
    let intensity: Vec<String> = stats
        .recent_intensity
        .iter()
        .map(|v| format!("{:.6}", v))
        .collect();

    format!(
        "Generate a detailed software reliability analysis report in Markdown, \
suitable for a formal engineering document.

System data and analysis metrics:
- Total failures: {total_failures}
- Total operating time: {total_time:.2}
- Records: {original} submitted, {processed} after preprocessing
- Laplace trend factor: {laplace:.4} (interpretation: {assessment})
- Best performing model: {best}
- Recent failure intensity: [{intensity}]

Report structure:
1. Executive summary: overall system health and key findings.
2. Data quality: failure distribution, outliers, data sufficiency.
3. Trend analysis: interpretation of the Laplace factor and the failure intensity. Is reliability growing or degrading?
4. Model evaluation: why the best model fits this failure process.
5. Reliability projections for the next operational period.
6. Maintenance and testing recommendations.
7. Risk assessment for a release in the current state.

Use professional engineering terminology, bullet points and clear sections.",
        total_failures = stats.total_failures,
        total_time = stats.total_time,
        original = stats.original_count,
        processed = stats.processed_count,
        laplace = stats.laplace_score,
        assessment = stats.trend_assessment,
        best = best,
        intensity = intensity.join(", "),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct ChatNarrativeClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatNarrativeClient {
    /// Build a client from configuration, reading the key from the
    /// configured environment variable.
    pub fn from_config(config: &NarrativeConfig) -> Result<Self, NarrativeError> {
        if !config.enabled {
            return Err(NarrativeError::Disabled);
        }
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| NarrativeError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &NarrativeConfig, api_key: String) -> Result<Self, NarrativeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl NarrativeService for ChatNarrativeClient {
    async fn generate(&self, stats: &NarrativeStats) -> Result<String, NarrativeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(stats),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        debug!(%url, model = %self.model, "Requesting narrative");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| NarrativeError::InvalidResponse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| NarrativeError::InvalidResponse("no content in response".into()))?;

        info!(chars = content.len(), "Narrative generated");
        Ok(content)
    }
}
