//! Pattern summariser adapter
//!
//! An optional, advisory collaborator: given a discovered pattern, produce
//! a one-paragraph human-readable description that gets stored on the
//! pattern row. The summariser has no say in pattern creation or deletion;
//! the deterministic engine is the sole arbiter, and a summariser failure
//! only means the annotation stays empty.
//!
//! # Configuration
//!
//! - `OLLAMA_HOST`: Ollama server URL (enables the Ollama backend)
//! - `OLLAMA_MODEL`: Model name (default: llama3.2)

mod mock;
mod ollama;

pub use mock::MockSummarizer;
pub use ollama::OllamaSummarizer;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Obligation, Pattern};

/// Context handed to a summariser backend alongside the pattern
#[derive(Debug, Clone)]
pub struct SummaryContext<'a> {
    pub payee_name: &'a str,
    pub currency_code: &'a str,
    /// Recent obligation history, newest first
    pub recent_obligations: &'a [Obligation],
}

/// A backend that can describe a pattern in prose
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize_pattern(
        &self,
        pattern: &Pattern,
        context: &SummaryContext<'_>,
    ) -> Result<String>;
}

/// Concrete summariser wrapper providing Clone and compile-time dispatch
#[derive(Clone)]
pub enum SummarizerClient {
    Ollama(OllamaSummarizer),
    Mock(MockSummarizer),
}

impl SummarizerClient {
    /// Create from environment variables; None when no backend is
    /// configured (annotation is simply unavailable then)
    pub fn from_env() -> Option<Self> {
        OllamaSummarizer::from_env().map(Self::Ollama)
    }

    pub fn host(&self) -> &str {
        match self {
            Self::Ollama(backend) => backend.host(),
            Self::Mock(_) => "mock",
        }
    }
}

#[async_trait]
impl Summarizer for SummarizerClient {
    async fn summarize_pattern(
        &self,
        pattern: &Pattern,
        context: &SummaryContext<'_>,
    ) -> Result<String> {
        match self {
            Self::Ollama(backend) => backend.summarize_pattern(pattern, context).await,
            Self::Mock(backend) => backend.summarize_pattern(pattern, context).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AmountBehaviour, Direction, Pattern, PatternCase, PatternStatus,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn sample_pattern() -> Pattern {
        Pattern {
            id: 1,
            user_id: 1,
            payee_id: 1,
            direction: Direction::Debit,
            currency_id: 1,
            interval_days: 30,
            pattern_case: PatternCase::FixedMonthly,
            amount_behaviour: AmountBehaviour::Fixed,
            representative_amount: Decimal::from(649),
            amount_min: Decimal::from(649),
            amount_max: Decimal::from(649),
            day_of_month_hint: Some(15),
            status: PatternStatus::Active,
            confidence: 0.9,
            detection_version: 1,
            summary: None,
            last_evaluated_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mock_summarizer_through_client_dispatch() {
        let client = SummarizerClient::Mock(MockSummarizer::new());
        let pattern = sample_pattern();
        let context = SummaryContext {
            payee_name: "Netflix",
            currency_code: "INR",
            recent_obligations: &[],
        };

        let summary = client.summarize_pattern(&pattern, &context).await.unwrap();
        assert!(summary.contains("Netflix"));
        assert!(summary.contains("649"));
        assert_eq!(client.host(), "mock");
    }
}
