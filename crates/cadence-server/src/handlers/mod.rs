//! HTTP handlers, grouped by resource

mod discover;
mod obligations;
mod patterns;
mod transactions;

pub use discover::run_discovery;
pub use obligations::{list_pattern_obligations, list_upcoming};
pub use patterns::{
    annotate_pattern, delete_pattern, get_pattern, list_patterns, pause_pattern, resume_pattern,
};
pub use transactions::{list_dead_letters, list_transactions, record_transaction};
