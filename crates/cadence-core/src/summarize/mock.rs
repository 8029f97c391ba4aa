//! Deterministic summariser for tests

use async_trait::async_trait;

use super::{SummaryContext, Summarizer};
use crate::error::Result;
use crate::models::Pattern;

#[derive(Clone, Default)]
pub struct MockSummarizer;

impl MockSummarizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize_pattern(
        &self,
        pattern: &Pattern,
        context: &SummaryContext<'_>,
    ) -> Result<String> {
        Ok(format!(
            "{} of about {} {} to {} every {} days.",
            match pattern.direction {
                crate::models::Direction::Debit => "Payment",
                crate::models::Direction::Credit => "Income",
            },
            pattern.representative_amount,
            context.currency_code,
            context.payee_name,
            pattern.interval_days,
        ))
    }
}
