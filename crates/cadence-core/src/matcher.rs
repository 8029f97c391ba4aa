//! Runtime matcher / obligation manager
//!
//! Invoked once per newly recorded transaction. Finds the patterns on the
//! transaction's (user, payee, direction, currency) key, lazily sweeps
//! overdue obligations into misses, fulfils the best-matching pending
//! obligation, updates the streak, and rolls the next obligation. Never
//! creates patterns - that is the discovery path's job.
//!
//! Matching is date-only: a transaction inside the tolerance window
//! fulfils the obligation no matter its amount. The expected amount range
//! exists for forecasting and outlier flagging, and as the second term of
//! the priority score when several patterns claim the same transaction.
//!
//! All writes for one transaction happen inside a single database
//! transaction, under the per-key lock, so obligation transitions stay
//! linearly ordered and a failure leaves no partial state.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{self, Database};
use crate::discovery::engine::expected_amount_window;
use crate::error::{Error, Result};
use crate::locks::{MatchKey, MatchKeyLocks};
use crate::models::{Obligation, Pattern, PatternStatus, PatternStreak, Transaction};

/// Matcher behaviour knobs. Defaults are the product behaviour.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Upper bound on obligations swept into misses per pattern per
    /// incoming transaction; long gaps collapse over several arrivals
    pub max_miss_sweep: usize,
    /// When true a transaction may fulfil one obligation on every
    /// matching pattern; default is first-match-wins
    pub allow_multi_pattern: bool,
    /// Misses beyond this move the pattern to paused
    pub paused_after: i64,
    /// Misses beyond this move the pattern to broken
    pub broken_after: i64,
    /// Dispatch: retry budget for transient storage errors
    pub max_attempts: u32,
    /// Dispatch: base delay for exponential backoff
    pub retry_base_delay: Duration,
    /// Dispatch: wall-clock ceiling per attempt
    pub attempt_timeout: Duration,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_miss_sweep: 6,
            allow_multi_pattern: false,
            paused_after: 1,
            broken_after: 3,
            max_attempts: 5,
            retry_base_delay: Duration::from_millis(200),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// One fulfilment produced by a match
#[derive(Debug, Clone, Serialize)]
pub struct Fulfilment {
    pub pattern_id: i64,
    pub obligation_id: i64,
    pub expected_date: NaiveDate,
    pub days_early: i64,
}

/// One obligation swept into `missed`
#[derive(Debug, Clone, Serialize)]
pub struct MissRecord {
    pub pattern_id: i64,
    pub obligation_id: i64,
    pub expected_date: NaiveDate,
}

/// What one matcher invocation did
#[derive(Debug, Clone, Serialize, Default)]
pub struct MatchOutcome {
    pub transaction_id: i64,
    pub fulfilled: Vec<Fulfilment>,
    pub missed: Vec<MissRecord>,
    /// Patterns whose missing expected obligation had to be recreated
    pub repaired_patterns: Vec<i64>,
}

impl MatchOutcome {
    pub fn matched(&self) -> bool {
        !self.fulfilled.is_empty()
    }
}

/// How a pattern relates to the incoming transaction, decided in the
/// read-only planning phase
struct PatternPlan {
    pattern: Pattern,
    action: PlanAction,
    /// Overdue obligations to sweep before the window can contain the
    /// transaction (bounded by max_miss_sweep)
    misses_needed: usize,
    /// Whether the post-sweep window contains the transaction date
    matches: bool,
    /// Priority score; lower is tighter. Only meaningful when `matches`.
    score: f64,
}

/// What the execution phase starts from for a pattern. Inconsistent
/// patterns (no pending obligation) are only diagnosed during planning;
/// the corrective writes happen inside the execution transaction with
/// everything else.
enum PlanAction {
    /// The pending obligation to sweep and match against
    Resolve(Obligation),
    /// No pending obligation: recreate one from the last actual date
    /// before proceeding
    Repair {
        expected_date: NaiveDate,
        expected_min: rust_decimal::Decimal,
        expected_max: rust_decimal::Decimal,
    },
    /// No pending obligation and no history either: pause the pattern
    /// and flag it for re-discovery
    Pause,
}

pub struct RuntimeMatcher<'a> {
    db: &'a Database,
    locks: Arc<MatchKeyLocks>,
    config: MatcherConfig,
}

impl<'a> RuntimeMatcher<'a> {
    pub fn new(db: &'a Database, locks: Arc<MatchKeyLocks>) -> Self {
        Self {
            db,
            locks,
            config: MatcherConfig::default(),
        }
    }

    pub fn with_config(db: &'a Database, locks: Arc<MatchKeyLocks>, config: MatcherConfig) -> Self {
        Self { db, locks, config }
    }

    /// Process one newly recorded transaction against the patterns on its
    /// key. Serialised per key; a no-pattern key is a cheap no-op.
    pub fn match_transaction(&self, transaction_id: i64) -> Result<MatchOutcome> {
        let tx = self
            .db
            .get_transaction(transaction_id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {} not found", transaction_id)))?;

        let key = MatchKey {
            user_id: tx.user_id,
            payee_id: tx.payee_id,
            direction: tx.direction,
            currency_id: tx.currency_id,
        };
        let key_lock = self.locks.for_key(key);
        let _guard = key_lock.lock();

        let patterns = self
            .db
            .patterns_for_key(tx.user_id, tx.payee_id, tx.direction, tx.currency_id)?;

        let outcome = MatchOutcome {
            transaction_id,
            ..Default::default()
        };
        if patterns.is_empty() {
            debug!(transaction_id, "No patterns on key; transaction left for discovery");
            return Ok(outcome);
        }

        // Planning phase: read-only look at every pattern
        let mut plans = Vec::new();
        for pattern in patterns {
            plans.push(self.plan(&pattern, &tx)?);
        }

        // Priority: matching patterns first, tightest (date, amount) fit
        // wins, stable tie-break on the lowest pattern id. Non-matching
        // patterns follow so their overdue obligations still sweep when
        // nothing matches at all.
        plans.sort_by(|a, b| {
            b.matches
                .cmp(&a.matches)
                .then(a.score.total_cmp(&b.score))
                .then(a.pattern.id.cmp(&b.pattern.id))
        });

        // Execution phase: one database transaction for the whole unit,
        // repairs included - a failure anywhere rolls everything back.
        let config = self.config.clone();
        let outcome = self.db.with_transaction(move |conn| {
            let mut outcome = outcome;
            for plan in &plans {
                let mut obligation = match &plan.action {
                    PlanAction::Resolve(ob) => ob.clone(),
                    PlanAction::Repair {
                        expected_date,
                        expected_min,
                        expected_max,
                    } => {
                        warn!(
                            pattern_id = plan.pattern.id,
                            "Pattern had no expected obligation; repairing from last actual date"
                        );
                        outcome.repaired_patterns.push(plan.pattern.id);
                        db::insert_obligation_in(
                            conn,
                            plan.pattern.id,
                            *expected_date,
                            plan.pattern.tolerance_days(),
                            *expected_min,
                            *expected_max,
                        )?
                    }
                    PlanAction::Pause => {
                        warn!(
                            pattern_id = plan.pattern.id,
                            "Pattern has no expected obligation and no history; \
                             pausing for re-discovery"
                        );
                        db::update_pattern_status_in(conn, plan.pattern.id, PatternStatus::Paused)?;
                        db::touch_pattern_evaluated_in(conn, plan.pattern.id)?;
                        continue;
                    }
                };

                let mut streak = db::get_streak_in(conn, plan.pattern.id)?.ok_or_else(|| {
                    Error::Invariant(format!("Pattern {} has no streak row", plan.pattern.id))
                })?;
                let mut status = plan.pattern.status;

                for _ in 0..plan.misses_needed {
                    db::miss_obligation_in(conn, obligation.id)?;
                    outcome.missed.push(MissRecord {
                        pattern_id: plan.pattern.id,
                        obligation_id: obligation.id,
                        expected_date: obligation.expected_date,
                    });
                    apply_miss_to_streak(&mut streak);
                    status = degraded_status(status, streak.missed_count, &config);
                    obligation = roll_next_in(conn, &plan.pattern, obligation.expected_date)?;
                }

                if plan.matches {
                    let days_early = (obligation.expected_date - tx.date()).num_days();
                    db::fulfil_obligation_in(conn, obligation.id, tx.id, days_early)?;
                    db::link_transaction_in(conn, plan.pattern.id, tx.id)?;

                    streak.current_streak += 1;
                    streak.longest_streak = streak.longest_streak.max(streak.current_streak);
                    streak.missed_count = 0;
                    streak.last_actual_date = Some(tx.date());
                    streak.last_expected_date = Some(obligation.expected_date);
                    streak.confidence_multiplier =
                        (streak.confidence_multiplier + 0.05).min(1.0);
                    // a successful match is the recovery path out of
                    // paused and broken
                    status = PatternStatus::Active;

                    // roll the next obligation from the expected date, not
                    // the fulfilment date, so jitter never accumulates
                    roll_next_in(conn, &plan.pattern, obligation.expected_date)?;

                    outcome.fulfilled.push(Fulfilment {
                        pattern_id: plan.pattern.id,
                        obligation_id: obligation.id,
                        expected_date: obligation.expected_date,
                        days_early,
                    });
                }

                db::save_streak_in(conn, &streak)?;
                if status != plan.pattern.status {
                    db::update_pattern_status_in(conn, plan.pattern.id, status)?;
                }
                db::touch_pattern_evaluated_in(conn, plan.pattern.id)?;

                if plan.matches && !config.allow_multi_pattern {
                    break;
                }
            }
            Ok(outcome)
        })?;

        if outcome.matched() {
            info!(
                transaction_id,
                pattern_id = outcome.fulfilled[0].pattern_id,
                missed = outcome.missed.len(),
                "Transaction fulfilled obligation"
            );
        } else {
            debug!(
                transaction_id,
                missed = outcome.missed.len(),
                "Transaction matched no obligation window"
            );
        }
        Ok(outcome)
    }

    /// Decide how a pattern relates to the transaction. Strictly
    /// read-only: an inconsistent pattern (no pending obligation) is
    /// diagnosed here, but the repair or pause it needs is carried in the
    /// plan and applied inside the execution transaction.
    fn plan(&self, pattern: &Pattern, tx: &Transaction) -> Result<PatternPlan> {
        let action = match self.db.pending_obligation(pattern.id)? {
            Some(ob) => PlanAction::Resolve(ob),
            None => {
                let streak = self.db.get_streak(pattern.id)?;
                match streak.as_ref().and_then(|s| s.last_actual_date) {
                    Some(last) => {
                        let expected = last + chrono::Duration::days(pattern.interval_days);
                        let window = self.db.recent_linked_transactions(pattern.id, 3)?;
                        let amounts = inlier_amounts(pattern, &window);
                        let (expected_min, expected_max) = expected_amount_window(
                            pattern.amount_behaviour,
                            pattern.representative_amount,
                            &amounts,
                        );
                        PlanAction::Repair {
                            expected_date: expected,
                            expected_min,
                            expected_max,
                        }
                    }
                    None => {
                        return Ok(PatternPlan {
                            pattern: pattern.clone(),
                            action: PlanAction::Pause,
                            misses_needed: 0,
                            matches: false,
                            score: f64::INFINITY,
                        })
                    }
                }
            }
        };

        let (first_expected, tolerance, window_min, window_max) = match &action {
            PlanAction::Resolve(ob) => (
                ob.expected_date,
                ob.tolerance_days,
                ob.expected_min_amount,
                ob.expected_max_amount,
            ),
            PlanAction::Repair {
                expected_date,
                expected_min,
                expected_max,
            } => (
                *expected_date,
                pattern.tolerance_days(),
                *expected_min,
                *expected_max,
            ),
            PlanAction::Pause => unreachable!("pause plans return early"),
        };

        let mut expected = first_expected;
        let mut misses_needed = 0usize;
        while misses_needed < self.config.max_miss_sweep
            && (tx.date() - expected).num_days() > tolerance
        {
            misses_needed += 1;
            expected = expected + chrono::Duration::days(pattern.interval_days);
        }

        let days_off = (tx.date() - expected).num_days();
        let matches = days_off.abs() <= tolerance;

        let score = if matches {
            let date_term = days_off.abs() as f64 / tolerance.max(1) as f64;
            let amount_term = amount_distance_term(tx.amount, window_min, window_max);
            date_term + amount_term
        } else {
            f64::INFINITY
        };

        Ok(PatternPlan {
            pattern: pattern.clone(),
            action,
            misses_needed,
            matches,
            score,
        })
    }
}

/// Second term of the priority score: how far the amount falls outside the
/// obligation's expected range, relative to the range ceiling. Zero inside
/// the range; never blocks a match on its own.
fn amount_distance_term(
    amount: rust_decimal::Decimal,
    expected_min: rust_decimal::Decimal,
    expected_max: rust_decimal::Decimal,
) -> f64 {
    if expected_max <= rust_decimal::Decimal::ZERO {
        return 0.0;
    }
    let distance = if amount < expected_min {
        expected_min - amount
    } else if amount > expected_max {
        amount - expected_max
    } else {
        return 0.0;
    };
    (distance / expected_max).to_f64().unwrap_or(0.0)
}

fn apply_miss_to_streak(streak: &mut PatternStreak) {
    streak.missed_count += 1;
    streak.current_streak = 0;
    streak.confidence_multiplier = (streak.confidence_multiplier - 0.15).max(0.0);
}

/// State degradation ladder. Archived never degrades further; recovery to
/// active happens only through a successful match.
fn degraded_status(current: PatternStatus, missed_count: i64, config: &MatcherConfig) -> PatternStatus {
    if current == PatternStatus::Archived {
        return current;
    }
    if missed_count > config.broken_after {
        PatternStatus::Broken
    } else if missed_count > config.paused_after {
        PatternStatus::Paused
    } else {
        current
    }
}

/// Amounts from the recent-link window that sit inside the pattern's
/// representative band; outliers stay linked but never steer the window
fn inlier_amounts(
    pattern: &Pattern,
    window: &[Transaction],
) -> Vec<rust_decimal::Decimal> {
    use crate::discovery::cluster::amount_tolerance;
    use crate::discovery::DiscoveryConfig;

    let tolerance = amount_tolerance(pattern.representative_amount, &DiscoveryConfig::default());
    let mut amounts: Vec<_> = window
        .iter()
        .filter(|t| (t.amount - pattern.representative_amount).abs() <= tolerance)
        .map(|t| t.amount)
        .collect();
    // window arrives newest first; the estimator wants oldest first
    amounts.reverse();
    amounts
}

/// Create the next expected obligation: interval from the prior expected
/// date (fulfilled or missed alike), tolerance from the pattern case,
/// amount window from the last three inlier links.
fn roll_next_in(
    conn: &rusqlite::Connection,
    pattern: &Pattern,
    prior_expected: NaiveDate,
) -> Result<Obligation> {
    let expected = prior_expected + chrono::Duration::days(pattern.interval_days);
    let window = db::recent_linked_transactions_in(conn, pattern.id, 3)?;
    let amounts = inlier_amounts(pattern, &window);
    let (min, max) = expected_amount_window(
        pattern.amount_behaviour,
        pattern.representative_amount,
        &amounts,
    );
    db::insert_obligation_in(conn, pattern.id, expected, pattern.tolerance_days(), min, max)
}

/// Dispatch a matcher unit with bounded retries, exponential backoff, and
/// a per-attempt wall-clock ceiling. Transient storage errors retry;
/// input errors return immediately; an exhausted budget parks the
/// transaction in the dead-letter store and surfaces Retryable.
pub async fn dispatch_transaction(
    db: Database,
    locks: Arc<MatchKeyLocks>,
    config: MatcherConfig,
    transaction_id: i64,
) -> Result<MatchOutcome> {
    let mut last_error = String::new();

    for attempt in 1..=config.max_attempts {
        let db_attempt = db.clone();
        let locks_attempt = Arc::clone(&locks);
        let config_attempt = config.clone();

        let attempt_result = tokio::time::timeout(
            config.attempt_timeout,
            tokio::task::spawn_blocking(move || {
                RuntimeMatcher::with_config(&db_attempt, locks_attempt, config_attempt)
                    .match_transaction(transaction_id)
            }),
        )
        .await;

        match attempt_result {
            Ok(Ok(Ok(outcome))) => return Ok(outcome),
            Ok(Ok(Err(e))) if e.is_transient() => {
                last_error = e.to_string();
                warn!(transaction_id, attempt, error = %e, "Matcher attempt failed; retrying");
            }
            // input and invariant errors are the caller's problem, not
            // retry fodder
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(join_error)) => {
                last_error = format!("matcher task panicked: {}", join_error);
                warn!(transaction_id, attempt, error = %last_error, "Matcher attempt crashed");
            }
            Err(_) => {
                last_error = format!(
                    "matcher attempt exceeded {}s ceiling",
                    config.attempt_timeout.as_secs()
                );
                warn!(transaction_id, attempt, "Matcher attempt timed out");
            }
        }

        if attempt < config.max_attempts {
            let delay = config.retry_base_delay * 2u32.saturating_pow(attempt - 1);
            tokio::time::sleep(delay).await;
        }
    }

    db.insert_dead_letter(transaction_id, &last_error, config.max_attempts as i64)?;
    warn!(transaction_id, error = %last_error, "Matcher work dead-lettered");
    Err(Error::Retryable(format!(
        "matching transaction {} failed after {} attempts: {}",
        transaction_id, config.max_attempts, last_error
    )))
}
