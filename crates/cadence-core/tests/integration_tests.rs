//! Integration tests for cadence-core
//!
//! These exercise the full record -> discover -> match workflow the way
//! the service drives it: transactions in, patterns and obligations out,
//! then new transactions fulfilling or missing those obligations.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use cadence_core::{
    db::Database,
    models::{
        AmountBehaviour, Direction, NewTransaction, ObligationStatus, PatternCase, PatternStatus,
    },
    DiscoveryFilter, DiscoveryLocks, MatchKeyLocks, PatternDiscovery, RuntimeMatcher,
};

struct Harness {
    db: Database,
    discovery_locks: Arc<DiscoveryLocks>,
    matcher_locks: Arc<MatchKeyLocks>,
}

impl Harness {
    fn new() -> Self {
        Self {
            db: Database::in_memory().expect("in-memory database"),
            discovery_locks: Arc::new(DiscoveryLocks::new()),
            matcher_locks: Arc::new(MatchKeyLocks::new()),
        }
    }

    fn record(
        &self,
        payee: &str,
        currency: &str,
        direction: Direction,
        date: (i32, u32, u32),
        amount: i64,
        msg: &str,
    ) -> i64 {
        let payee_id = self.db.upsert_payee(1, payee).unwrap();
        let currency_id = self.db.upsert_currency(currency).unwrap();
        self.db
            .insert_transaction(&NewTransaction {
                user_id: 1,
                payee_id,
                direction,
                currency_id,
                occurred_at: Utc
                    .with_ymd_and_hms(date.0, date.1, date.2, 10, 0, 0)
                    .unwrap(),
                amount: Decimal::from(amount),
                source_message_id: msg.to_string(),
            })
            .unwrap()
    }

    fn discover(&self) -> cadence_core::DiscoveryRun {
        PatternDiscovery::new(&self.db, Arc::clone(&self.discovery_locks))
            .run(1, DiscoveryFilter::default())
            .unwrap()
    }

    fn run_matcher(&self, transaction_id: i64) -> cadence_core::MatchOutcome {
        RuntimeMatcher::new(&self.db, Arc::clone(&self.matcher_locks))
            .match_transaction(transaction_id)
            .unwrap()
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

#[test]
fn test_fixed_monthly_salary_that_skips_a_month() {
    let h = Harness::new();
    h.record("Sabitha", "INR", Direction::Credit, (2025, 10, 31), 16500, "sal-1");
    h.record("Sabitha", "INR", Direction::Credit, (2025, 12, 1), 16500, "sal-2");
    h.record("Sabitha", "INR", Direction::Credit, (2025, 12, 30), 16500, "sal-3");

    let run = h.discover();
    assert_eq!(run.patterns.len(), 1);

    let pattern = &run.patterns[0].pattern;
    assert_eq!(pattern.pattern_case, PatternCase::FixedMonthly);
    assert_eq!(pattern.interval_days, 30);
    assert_eq!(pattern.amount_behaviour, AmountBehaviour::Fixed);
    assert_eq!(pattern.representative_amount, Decimal::from(16500));
    assert!(pattern.confidence >= 0.80, "confidence {}", pattern.confidence);

    let pending = h.db.pending_obligation(pattern.id).unwrap().unwrap();
    assert_eq!(pending.expected_date, date(2026, 1, 29));
    assert_eq!(pending.tolerance_days, 3);
}

#[test]
fn test_variable_monthly_support() {
    let h = Harness::new();
    h.record("Swathi", "INR", Direction::Debit, (2025, 10, 1), 4000, "sup-1");
    h.record("Swathi", "INR", Direction::Debit, (2025, 10, 31), 5000, "sup-2");
    h.record("Swathi", "INR", Direction::Debit, (2025, 12, 2), 4000, "sup-3");

    let run = h.discover();
    assert_eq!(run.patterns.len(), 1);

    let pattern = &run.patterns[0].pattern;
    assert_eq!(pattern.pattern_case, PatternCase::VariableMonthly);
    assert_eq!(pattern.interval_days, 31);
    assert_eq!(pattern.amount_behaviour, AmountBehaviour::Variable);
    assert_eq!(pattern.representative_amount, Decimal::from(4000));
    assert_eq!(pattern.amount_min, Decimal::from(4000));
    assert_eq!(pattern.amount_max, Decimal::from(5000));
    assert!(pattern.confidence >= 0.70, "confidence {}", pattern.confidence);
}

/// Seed scenario C: three independent monthly chit series to one payee
fn seed_chit_series(h: &Harness) {
    // series 1: ~day 2, ~8500
    h.record("Selvam", "INR", Direction::Debit, (2025, 10, 2), 8500, "c1-1");
    h.record("Selvam", "INR", Direction::Debit, (2025, 11, 3), 8500, "c1-2");
    h.record("Selvam", "INR", Direction::Debit, (2025, 12, 2), 8600, "c1-3");
    // series 2: ~day 8, ~4300
    h.record("Selvam", "INR", Direction::Debit, (2025, 10, 8), 4300, "c2-1");
    h.record("Selvam", "INR", Direction::Debit, (2025, 11, 7), 4300, "c2-2");
    h.record("Selvam", "INR", Direction::Debit, (2025, 12, 9), 4250, "c2-3");
    // series 3: ~day 13, ~2400
    h.record("Selvam", "INR", Direction::Debit, (2025, 10, 13), 2400, "c3-1");
    h.record("Selvam", "INR", Direction::Debit, (2025, 11, 13), 2400, "c3-2");
    h.record("Selvam", "INR", Direction::Debit, (2025, 12, 14), 2450, "c3-3");
}

#[test]
fn test_three_chit_schedules_become_three_patterns() {
    let h = Harness::new();
    seed_chit_series(&h);

    let run = h.discover();
    assert_eq!(run.patterns.len(), 3);

    for discovered in &run.patterns {
        let p = &discovered.pattern;
        assert!(p.pattern_case.is_monthly_family(), "case {}", p.pattern_case);
        assert!(p.confidence >= 0.80, "confidence {}", p.confidence);
        assert!(h.db.pending_obligation(p.id).unwrap().is_some());
    }

    // the runtime can tell which series a new payment belongs to
    let tx = h.record("Selvam", "INR", Direction::Debit, (2026, 1, 8), 4300, "c2-4");
    let outcome = h.run_matcher(tx);
    assert_eq!(outcome.fulfilled.len(), 1);
    let winner = h
        .db
        .get_pattern(outcome.fulfilled[0].pattern_id)
        .unwrap()
        .unwrap();
    assert_eq!(winner.representative_amount, Decimal::from(4300));
}

#[test]
fn test_chit_missed_cycle_then_recovery_next_month() {
    let h = Harness::new();
    seed_chit_series(&h);
    let run = h.discover();

    let chit2 = run
        .patterns
        .iter()
        .map(|d| &d.pattern)
        .find(|p| p.representative_amount == Decimal::from(4300))
        .unwrap();
    let o_jan = h.db.pending_obligation(chit2.id).unwrap().unwrap();

    // nothing arrives in the January window; the next payment lands a full
    // cycle later
    let feb_date = o_jan.expected_date + chrono::Duration::days(chit2.interval_days);
    let tx = h.record(
        "Selvam",
        "INR",
        Direction::Debit,
        (2026, feb_date.month0() + 1, feb_date.day()),
        4300,
        "c2-feb",
    );
    let outcome = h.run_matcher(tx);

    // January swept to missed, February fulfilled
    assert_eq!(outcome.missed.len(), 1);
    assert_eq!(outcome.missed[0].expected_date, o_jan.expected_date);
    assert_eq!(outcome.fulfilled.len(), 1);
    assert_eq!(outcome.fulfilled[0].expected_date, feb_date);

    let jan = h.db.get_obligation(o_jan.id).unwrap().unwrap();
    assert_eq!(jan.status, ObligationStatus::Missed);

    let pattern = h.db.get_pattern(chit2.id).unwrap().unwrap();
    assert_eq!(pattern.status, PatternStatus::Active);
    let streak = h.db.get_streak(chit2.id).unwrap().unwrap();
    assert_eq!(streak.missed_count, 0); // reset by the successful match
    assert_eq!(streak.current_streak, 1);
    assert!((streak.confidence_multiplier - 0.90).abs() < 1e-9);
}

#[test]
fn test_28_day_recharge() {
    let h = Harness::new();
    let start = date(2025, 9, 5);
    for i in 0..5i64 {
        let d = start + chrono::Duration::days(28 * i);
        h.record(
            "Airtel",
            "INR",
            Direction::Debit,
            (d.year(), d.month(), d.day()),
            199,
            &format!("rc-{}", i),
        );
    }

    let run = h.discover();
    assert_eq!(run.patterns.len(), 1);
    let pattern = &run.patterns[0].pattern;
    assert_eq!(pattern.pattern_case, PatternCase::CustomInterval);
    assert_eq!(pattern.interval_days, 28);
    assert_eq!(pattern.amount_behaviour, AmountBehaviour::Fixed);
    assert!(pattern.confidence >= 0.90, "confidence {}", pattern.confidence);

    let pending = h.db.pending_obligation(pattern.id).unwrap().unwrap();
    assert_eq!(pending.tolerance_days, 4); // max(2, round(0.15 * 28))
    assert_eq!(
        pending.expected_date,
        start + chrono::Duration::days(28 * 5)
    );
}

#[test]
fn test_currency_split_never_mixes() {
    let h = Harness::new();
    for (i, day) in [5u32, 5, 6, 5, 5].iter().enumerate() {
        let month = 8 + (i as u32 % 5);
        h.record(
            "Acme",
            "INR",
            Direction::Debit,
            (2025, month, *day),
            1200,
            &format!("inr-{}", i),
        );
        h.record(
            "Acme",
            "USD",
            Direction::Debit,
            (2025, month, *day),
            1200,
            &format!("usd-{}", i),
        );
    }

    let run = h.discover();
    // at most one pattern per currency
    assert!(run.patterns.len() <= 2);
    assert!(!run.patterns.is_empty());

    // no pattern links transactions of two currencies
    for discovered in &run.patterns {
        let p = &discovered.pattern;
        for link in h.db.links_for_pattern(p.id).unwrap() {
            let tx = h.db.get_transaction(link.transaction_id).unwrap().unwrap();
            assert_eq!(tx.currency_id, p.currency_id);
        }
    }
}

// =============================================================================
// Property-style invariants
// =============================================================================

#[test]
fn test_discovery_is_idempotent() {
    let h = Harness::new();
    seed_chit_series(&h);

    let first = h.discover();
    let ids_before: Vec<i64> = first.patterns.iter().map(|d| d.pattern.id).collect();
    let links_before = h.db.count_links(1).unwrap();
    let streaks_before: Vec<_> = ids_before
        .iter()
        .map(|id| h.db.get_streak(*id).unwrap().unwrap())
        .collect();

    // every transaction is linked now, so a re-run has nothing to feed the
    // engine: no new patterns, no changed links, no touched streaks
    let second = h.discover();
    assert!(second.patterns.is_empty());
    assert!(second.rejected_clusters.is_empty());

    assert_eq!(h.db.list_patterns(1, None).unwrap().len(), ids_before.len());
    assert_eq!(h.db.count_links(1).unwrap(), links_before);
    for (id, before) in ids_before.iter().zip(&streaks_before) {
        let after = h.db.get_streak(*id).unwrap().unwrap();
        assert_eq!(after.current_streak, before.current_streak);
        assert_eq!(after.missed_count, before.missed_count);
        assert!(h.db.pending_obligation(*id).unwrap().is_some());
        // identity and version survived the re-run untouched
        let p = h.db.get_pattern(*id).unwrap().unwrap();
        assert_eq!(p.detection_version, 1);
    }
}

#[test]
fn test_rediscovery_updates_known_series_when_unlinked_history_accumulates() {
    let h = Harness::new();
    h.record("Netflix", "INR", Direction::Debit, (2025, 6, 15), 649, "nf1");
    h.record("Netflix", "INR", Direction::Debit, (2025, 7, 15), 649, "nf2");
    h.record("Netflix", "INR", Direction::Debit, (2025, 8, 15), 649, "nf3");
    let first = h.discover();
    let pattern_id = first.patterns[0].pattern.id;

    // three further months arrive while the matcher was offline, far past
    // every sweepable window - they stay unlinked until re-discovery
    h.record("Netflix", "INR", Direction::Debit, (2026, 3, 15), 699, "nf4");
    h.record("Netflix", "INR", Direction::Debit, (2026, 4, 15), 699, "nf5");
    h.record("Netflix", "INR", Direction::Debit, (2026, 5, 15), 699, "nf6");

    let second = h.discover();
    assert_eq!(second.patterns.len(), 1);
    // the natural key resolves to the same pattern: same id, bumped
    // version, refreshed amounts, links grown
    assert_eq!(second.patterns[0].pattern.id, pattern_id);
    assert!(!second.patterns[0].created);
    assert_eq!(second.patterns[0].pattern.detection_version, 2);
    assert_eq!(h.db.links_for_pattern(pattern_id).unwrap().len(), 6);
}

#[test]
fn test_link_monotonicity_across_runs() {
    let h = Harness::new();
    h.record("Netflix", "INR", Direction::Debit, (2025, 9, 15), 649, "n1");
    h.record("Netflix", "INR", Direction::Debit, (2025, 10, 15), 649, "n2");
    h.record("Netflix", "INR", Direction::Debit, (2025, 11, 15), 649, "n3");

    let first = h.discover();
    let pattern_id = first.patterns[0].pattern.id;
    let links_before: Vec<i64> = h
        .db
        .links_for_pattern(pattern_id)
        .unwrap()
        .iter()
        .map(|l| l.transaction_id)
        .collect();

    // the December payment arrives through the runtime path
    let tx = h.record("Netflix", "INR", Direction::Debit, (2025, 12, 15), 649, "n4");
    h.run_matcher(tx);

    let second = h.discover();
    assert!(second.patterns.iter().all(|d| !d.created));

    let links_after: Vec<i64> = h
        .db
        .links_for_pattern(pattern_id)
        .unwrap()
        .iter()
        .map(|l| l.transaction_id)
        .collect();
    for link in &links_before {
        assert!(links_after.contains(link), "link {} disappeared", link);
    }
    assert!(links_after.contains(&tx));
}

#[test]
fn test_at_most_one_expected_obligation_at_rest() {
    let h = Harness::new();
    seed_chit_series(&h);
    h.discover();

    // drive a mix of fulfilments and misses
    let tx1 = h.record("Selvam", "INR", Direction::Debit, (2026, 1, 2), 8500, "x1");
    h.run_matcher(tx1);
    let tx2 = h.record("Selvam", "INR", Direction::Debit, (2026, 2, 13), 2400, "x2");
    h.run_matcher(tx2);

    // pending_obligation errors on duplicates, so Some(_) proves exactly one
    for pattern in h.db.list_patterns(1, None).unwrap() {
        if pattern.status == PatternStatus::Active || pattern.status == PatternStatus::Paused {
            assert!(
                h.db.pending_obligation(pattern.id).unwrap().is_some(),
                "pattern {} has no pending obligation",
                pattern.id
            );
        }
    }
}

#[test]
fn test_interval_closure_on_consecutive_obligations() {
    let h = Harness::new();
    h.record("Rent", "INR", Direction::Debit, (2025, 9, 1), 15000, "r1");
    h.record("Rent", "INR", Direction::Debit, (2025, 10, 1), 15000, "r2");
    h.record("Rent", "INR", Direction::Debit, (2025, 11, 1), 15000, "r3");
    let run = h.discover();
    let pattern = &run.patterns[0].pattern;

    // fulfil two cycles, the second a couple of days late
    let o1 = h.db.pending_obligation(pattern.id).unwrap().unwrap();
    let tx1 = h.record("Rent", "INR", Direction::Debit, (2025, 12, 1), 15000, "r4");
    h.run_matcher(tx1);
    let o2 = h.db.pending_obligation(pattern.id).unwrap().unwrap();
    assert_eq!(
        o2.expected_date,
        o1.expected_date + chrono::Duration::days(pattern.interval_days)
    );

    let late = o2.expected_date + chrono::Duration::days(2);
    let tx2 = h.record(
        "Rent",
        "INR",
        Direction::Debit,
        (late.year(), late.month(), late.day()),
        15000,
        "r5",
    );
    h.run_matcher(tx2);

    // the next expected date chains from the expected date, not from the
    // late fulfilment
    let o3 = h.db.pending_obligation(pattern.id).unwrap().unwrap();
    assert_eq!(
        o3.expected_date,
        o2.expected_date + chrono::Duration::days(pattern.interval_days)
    );
}

#[test]
fn test_match_is_amount_agnostic_end_to_end() {
    let h = Harness::new();
    h.record("Gym", "INR", Direction::Debit, (2025, 9, 10), 1500, "g1");
    h.record("Gym", "INR", Direction::Debit, (2025, 10, 10), 1500, "g2");
    h.record("Gym", "INR", Direction::Debit, (2025, 11, 10), 1500, "g3");
    let run = h.discover();
    let pattern = &run.patterns[0].pattern;

    let pending = h.db.pending_obligation(pattern.id).unwrap().unwrap();
    let d = pending.expected_date;
    // ten times the usual amount, inside the window: still a match
    let tx = h.record(
        "Gym",
        "INR",
        Direction::Debit,
        (d.year(), d.month(), d.day()),
        15000,
        "g4",
    );
    let outcome = h.run_matcher(tx);
    assert!(outcome.matched());
}

#[test]
fn test_runtime_never_creates_patterns() {
    let h = Harness::new();
    // one stray transaction, no discovery
    let tx = h.record("Stray", "INR", Direction::Debit, (2025, 11, 1), 500, "s1");
    let outcome = h.run_matcher(tx);
    assert!(!outcome.matched());
    assert!(h.db.list_patterns(1, None).unwrap().is_empty());
}

#[test]
fn test_concurrent_discovery_conflicts() {
    let h = Harness::new();
    let guard = h.discovery_locks.try_acquire(1).unwrap();
    let result = PatternDiscovery::new(&h.db, Arc::clone(&h.discovery_locks))
        .run(1, DiscoveryFilter::default());
    assert!(matches!(result, Err(cadence_core::Error::Conflict(_))));
    drop(guard);
    assert!(PatternDiscovery::new(&h.db, Arc::clone(&h.discovery_locks))
        .run(1, DiscoveryFilter::default())
        .is_ok());
}
