//! Candidate grouping and filtering
//!
//! First stage of the discovery path: bucket the user's transactions by
//! (payee, direction, currency), strip the ones already claimed by a
//! pattern, and drop buckets too small to infer anything from.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Direction, Transaction};

/// Minimum transactions per group: two intervals are required for any
/// interval inference
pub const MIN_GROUP_SIZE: usize = 3;

/// The identity a candidate group is keyed on. Currencies never mix across
/// groups; direction isolation keeps credits away from debit patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GroupKey {
    pub user_id: i64,
    pub payee_id: i64,
    pub direction: Direction,
    pub currency_id: i64,
}

/// One payee/direction/currency bucket of unassigned transactions
#[derive(Debug, Clone)]
pub struct CandidateGroup {
    pub key: GroupKey,
    /// Sorted by occurred_at ascending
    pub transactions: Vec<Transaction>,
}

/// Why a group was dropped before reaching the splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSkipReason {
    /// Fewer than three unassigned transactions
    TooFewTransactions,
}

/// A dropped group, reported back to the caller with its reason code
#[derive(Debug, Clone, Serialize)]
pub struct SkippedGroup {
    pub key: GroupKey,
    pub transaction_count: usize,
    pub reason: GroupSkipReason,
}

/// Optional narrowing of a discovery run
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryFilter {
    pub payee_id: Option<i64>,
    pub direction: Option<Direction>,
}

/// Build candidate groups for a user.
///
/// Pure function of the stored transactions and links: transactions
/// already linked to any pattern are excluded, which keeps discovery
/// monotonic across runs (a known series is never re-discovered, only new
/// transactions feed new candidates). A user with no transactions yields
/// an empty set, not an error.
pub fn build_candidate_groups(
    db: &Database,
    user_id: i64,
    filter: DiscoveryFilter,
) -> Result<(Vec<CandidateGroup>, Vec<SkippedGroup>)> {
    let transactions =
        db.transactions_for_discovery(user_id, filter.payee_id, filter.direction)?;
    let linked = db.linked_transaction_ids(user_id)?;

    let mut buckets: HashMap<GroupKey, Vec<Transaction>> = HashMap::new();
    for tx in transactions {
        if linked.contains(&tx.id) {
            continue;
        }
        let key = GroupKey {
            user_id,
            payee_id: tx.payee_id,
            direction: tx.direction,
            currency_id: tx.currency_id,
        };
        buckets.entry(key).or_default().push(tx);
    }

    let mut groups = Vec::new();
    let mut skipped = Vec::new();
    for (key, mut txs) in buckets {
        if txs.len() < MIN_GROUP_SIZE {
            debug!(
                payee_id = key.payee_id,
                count = txs.len(),
                "Skipping group below minimum size"
            );
            skipped.push(SkippedGroup {
                key,
                transaction_count: txs.len(),
                reason: GroupSkipReason::TooFewTransactions,
            });
            continue;
        }
        txs.sort_by_key(|t| t.occurred_at);
        groups.push(CandidateGroup {
            key,
            transactions: txs,
        });
    }

    // Deterministic order for downstream processing and tests
    groups.sort_by_key(|g| (g.key.payee_id, g.key.direction.as_str(), g.key.currency_id));
    skipped.sort_by_key(|g| (g.key.payee_id, g.key.direction.as_str(), g.key.currency_id));

    Ok((groups, skipped))
}
