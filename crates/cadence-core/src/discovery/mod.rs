//! Pattern discovery path
//!
//! On-demand, batch-oriented: group the user's unassigned transactions,
//! split each group into candidate clusters, run every cluster through the
//! deterministic engine, and persist the survivors in one durable
//! transaction. Serialised per user; concurrent requests for the same user
//! fail fast with Conflict instead of racing the upsert. Side-effect-free
//! until the final commit, so a cancelled run leaves no partial state.
//!
//! The runtime matcher is the only other writer of pattern state and never
//! creates patterns; creation happens here or not at all.

pub mod cluster;
pub mod engine;
pub mod grouping;

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::locks::DiscoveryLocks;
use crate::models::Pattern;

pub use engine::{ClusterRejection, PatternCandidate};
pub use grouping::{CandidateGroup, DiscoveryFilter, GroupKey, GroupSkipReason, SkippedGroup};

/// Discovery thresholds. The defaults are the product behaviour; tests
/// occasionally tighten or loosen individual knobs.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Minimum transactions per cluster (two intervals minimum)
    pub min_cluster_size: usize,
    /// Relative half-width of an amount band
    pub amount_tolerance_ratio: Decimal,
    /// Absolute floor of an amount band half-width
    pub amount_tolerance_floor: Decimal,
    /// Widest wrap-aware day-of-month spread a single schedule may have
    pub day_window_span: i64,
    /// Gaps shorter than this are interval noise, not a cycle
    pub min_interval_days: i64,
    /// More transactions than this inside 30 rolling days means a
    /// frequent-purchase relationship, not an obligation
    pub max_per_rolling_window: usize,
    /// Share of a cluster the dominant amount band must hold
    pub min_inlier_fraction: f64,
    /// Amount CV at or below this is `fixed`
    pub fixed_amount_cv: f64,
    /// Amount CV at or below this (and above fixed) is `variable`
    pub variable_amount_cv: f64,
    /// Candidates scoring below this are rejected
    pub min_confidence: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            amount_tolerance_ratio: Decimal::new(25, 2), // ±25%
            amount_tolerance_floor: Decimal::from(50),   // or ±50, whichever is larger
            day_window_span: 10,
            min_interval_days: 10,
            max_per_rolling_window: 3,
            min_inlier_fraction: 0.80,
            fixed_amount_cv: 0.05,
            variable_amount_cv: 0.30,
            min_confidence: 0.40,
        }
    }
}

/// One persisted pattern from a discovery run
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredPattern {
    pub pattern: Pattern,
    pub created: bool,
}

/// A cluster that reached the engine and was turned away
#[derive(Debug, Clone, Serialize)]
pub struct RejectedCluster {
    pub key: GroupKey,
    pub transaction_count: usize,
    pub rejection: ClusterRejection,
}

/// Everything a discovery run produced, for the caller's response
#[derive(Debug, Clone, Serialize, Default)]
pub struct DiscoveryRun {
    pub patterns: Vec<DiscoveredPattern>,
    pub rejected_clusters: Vec<RejectedCluster>,
    pub skipped_groups: Vec<SkippedGroup>,
}

/// Discovery driver; one per request, borrowing the shared database and
/// the process-wide lock registry
pub struct PatternDiscovery<'a> {
    db: &'a Database,
    config: DiscoveryConfig,
    locks: Arc<DiscoveryLocks>,
}

impl<'a> PatternDiscovery<'a> {
    pub fn new(db: &'a Database, locks: Arc<DiscoveryLocks>) -> Self {
        Self {
            db,
            config: DiscoveryConfig::default(),
            locks,
        }
    }

    pub fn with_config(db: &'a Database, locks: Arc<DiscoveryLocks>, config: DiscoveryConfig) -> Self {
        Self { db, config, locks }
    }

    /// Run discovery for a user.
    ///
    /// Idempotent: a second run over the same transactions finds every
    /// candidate again, hits the same natural keys, and changes nothing
    /// but `detection_version` and `last_evaluated_at`. Fails with
    /// Conflict when a run for this user is already in flight.
    pub fn run(&self, user_id: i64, filter: DiscoveryFilter) -> Result<DiscoveryRun> {
        let _guard = self.locks.try_acquire(user_id)?;

        let (groups, skipped_groups) =
            grouping::build_candidate_groups(self.db, user_id, filter)?;

        let mut upserts = Vec::new();
        let mut rejected_clusters = Vec::new();
        for group in &groups {
            for cluster in cluster::split_clusters(group, &self.config) {
                match engine::evaluate_cluster(group.key, &cluster, &self.config) {
                    Ok(candidate) => upserts.push(candidate.to_upsert(&self.config)),
                    Err(rejection) => rejected_clusters.push(RejectedCluster {
                        key: group.key,
                        transaction_count: cluster.len(),
                        rejection,
                    }),
                }
            }
        }

        // All candidates commit together; a failure anywhere rolls back
        // the entire run.
        let persisted = self.db.persist_candidates(&upserts)?;
        let patterns: Vec<DiscoveredPattern> = persisted
            .into_iter()
            .map(|(pattern, created)| DiscoveredPattern { pattern, created })
            .collect();

        let created = patterns.iter().filter(|p| p.created).count();
        info!(
            user_id,
            groups = groups.len(),
            patterns = patterns.len(),
            created,
            updated = patterns.len() - created,
            rejected = rejected_clusters.len(),
            "Discovery run complete"
        );

        Ok(DiscoveryRun {
            patterns,
            rejected_clusters,
            skipped_groups,
        })
    }
}
