//! Ollama-backed pattern summariser

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SummaryContext, Summarizer};
use crate::error::{Error, Result};
use crate::models::Pattern;

#[derive(Clone)]
pub struct OllamaSummarizer {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize_pattern(
        &self,
        pattern: &Pattern,
        context: &SummaryContext<'_>,
    ) -> Result<String> {
        let fulfilled = context
            .recent_obligations
            .iter()
            .filter(|o| o.status == crate::models::ObligationStatus::Fulfilled)
            .count();
        let missed = context
            .recent_obligations
            .iter()
            .filter(|o| o.status == crate::models::ObligationStatus::Missed)
            .count();

        let prompt = format!(
            "Describe this recurring payment in one short paragraph for a personal \
             finance app. Be factual, no advice.\n\
             Counterparty: {payee}\n\
             Direction: {direction}\n\
             Cadence: every {interval} days ({case})\n\
             Typical amount: {amount} {currency} (range {min}-{max}, {behaviour})\n\
             Recent history: {fulfilled} on time, {missed} missed.",
            payee = context.payee_name,
            direction = pattern.direction,
            interval = pattern.interval_days,
            case = pattern.pattern_case,
            amount = pattern.representative_amount,
            currency = context.currency_code,
            min = pattern.amount_min,
            max = pattern.amount_max,
            behaviour = pattern.amount_behaviour,
            fulfilled = fulfilled,
            missed = missed,
        );

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt,
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Http(response.error_for_status().unwrap_err()));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!("Summariser response: {}", ollama_response.response);

        let summary = ollama_response.response.trim().to_string();
        if summary.is_empty() {
            return Err(Error::Summariser("empty response from backend".to_string()));
        }
        Ok(summary)
    }
}
