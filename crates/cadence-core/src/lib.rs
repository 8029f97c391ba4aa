//! Cadence Core Library
//!
//! Shared functionality for the Cadence recurring-obligation tracker:
//! - Database access and migrations (transactions, patterns, streaks,
//!   obligations, links, dead letters)
//! - The deterministic pattern discovery pipeline (grouping, cluster
//!   splitting, interval inference, confidence scoring)
//! - The runtime matcher that fulfils or misses obligations as new
//!   transactions arrive
//! - Single-flight and per-key serialisation locks
//! - An optional, advisory pattern summariser backend

pub mod db;
pub mod discovery;
pub mod error;
pub mod locks;
pub mod matcher;
pub mod models;
pub mod stats;
pub mod summarize;

pub use db::{Database, PatternUpsert};
pub use discovery::{
    DiscoveryConfig, DiscoveryFilter, DiscoveryRun, PatternDiscovery, RejectedCluster,
};
pub use error::{Error, Result};
pub use locks::{DiscoveryLocks, MatchKey, MatchKeyLocks};
pub use matcher::{dispatch_transaction, MatchOutcome, MatcherConfig, RuntimeMatcher};
pub use summarize::{MockSummarizer, OllamaSummarizer, Summarizer, SummarizerClient};
