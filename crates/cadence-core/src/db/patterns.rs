//! Pattern, streak, and link operations
//!
//! `persist_candidates` is the single write path for the discovery side:
//! one durable transaction for the whole run, with the fill order
//! pattern -> streak -> links -> first obligation per candidate. The
//! runtime matcher uses the narrower mutators further down.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::debug;

use super::{format_datetime, parse_amount, parse_date, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{
    AmountBehaviour, Direction, Pattern, PatternCase, PatternStatus, PatternStreak,
    PatternTransactionLink, Transaction,
};

/// Day-of-month window used in the pattern natural key. Multiple series to
/// one payee are told apart by amount band and by which third of the month
/// they land in.
pub(crate) fn day_window(day_of_month_hint: Option<u32>) -> Option<u8> {
    day_of_month_hint.map(|d| match d {
        1..=10 => 0,
        11..=20 => 1,
        _ => 2,
    })
}

/// Everything the persistence layer needs to upsert one discovered series.
/// Built by the discovery engine; the db layer adds no policy of its own.
#[derive(Debug, Clone)]
pub struct PatternUpsert {
    pub user_id: i64,
    pub payee_id: i64,
    pub direction: Direction,
    pub currency_id: i64,
    pub interval_days: i64,
    pub pattern_case: PatternCase,
    pub amount_behaviour: AmountBehaviour,
    pub representative_amount: Decimal,
    pub amount_min: Decimal,
    pub amount_max: Decimal,
    pub day_of_month_hint: Option<u32>,
    pub confidence: f64,
    /// Amount tolerance for the natural-key lookup (representative amounts
    /// drifting within tolerance between runs still hit the same pattern)
    pub key_amount_tolerance: Decimal,
    /// Every member transaction, linked in full (outliers included)
    pub transaction_ids: Vec<i64>,
    /// Last observed transaction date; seeds the streak and the first
    /// obligation
    pub last_transaction_date: NaiveDate,
    /// First obligation amount window (per the amount behaviour)
    pub first_expected_min: Decimal,
    pub first_expected_max: Decimal,
}

fn row_to_pattern(row: &Row<'_>) -> rusqlite::Result<Pattern> {
    let direction_str: String = row.get(3)?;
    let case_str: String = row.get(6)?;
    let behaviour_str: String = row.get(7)?;
    let repr_str: String = row.get(8)?;
    let min_str: String = row.get(9)?;
    let max_str: String = row.get(10)?;
    let status_str: String = row.get(12)?;
    let last_eval_str: String = row.get(16)?;
    let created_at_str: String = row.get(17)?;

    Ok(Pattern {
        id: row.get(0)?,
        user_id: row.get(1)?,
        payee_id: row.get(2)?,
        direction: direction_str.parse().unwrap_or(Direction::Debit),
        currency_id: row.get(4)?,
        interval_days: row.get(5)?,
        pattern_case: case_str.parse().unwrap_or(PatternCase::CustomInterval),
        amount_behaviour: behaviour_str.parse().unwrap_or(AmountBehaviour::Variable),
        representative_amount: parse_amount(&repr_str)?,
        amount_min: parse_amount(&min_str)?,
        amount_max: parse_amount(&max_str)?,
        day_of_month_hint: row.get(11)?,
        status: status_str.parse().unwrap_or(PatternStatus::Active),
        confidence: row.get(13)?,
        detection_version: row.get(14)?,
        summary: row.get(15)?,
        last_evaluated_at: parse_datetime(&last_eval_str),
        created_at: parse_datetime(&created_at_str),
    })
}

const PATTERN_COLUMNS: &str = "id, user_id, payee_id, direction, currency_id, interval_days, \
     pattern_case, amount_behaviour, representative_amount, amount_min, amount_max, \
     day_of_month_hint, status, confidence, detection_version, summary, \
     last_evaluated_at, created_at";

impl Database {
    /// Persist a discovery run's candidates in a single durable transaction.
    ///
    /// Idempotent on the natural key (user, payee, direction, currency,
    /// amount band, day window): a re-run with no new transactions updates
    /// fields and bumps detection_version, but never touches streaks,
    /// existing links, or obligations of known patterns.
    ///
    /// Returns each persisted pattern with a flag for whether it was newly
    /// created.
    pub fn persist_candidates(&self, candidates: &[PatternUpsert]) -> Result<Vec<(Pattern, bool)>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut out = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let persisted = upsert_candidate(&tx, candidate)?;
            out.push(persisted);
        }

        tx.commit()?;
        Ok(out)
    }

    /// Upsert a single candidate (convenience over `persist_candidates`)
    pub fn upsert_pattern(&self, candidate: &PatternUpsert) -> Result<(Pattern, bool)> {
        let mut results = self.persist_candidates(std::slice::from_ref(candidate))?;
        results
            .pop()
            .ok_or_else(|| Error::Invariant("upsert produced no pattern".to_string()))
    }

    pub fn get_pattern(&self, id: i64) -> Result<Option<Pattern>> {
        let conn = self.conn()?;
        let pattern = conn
            .query_row(
                &format!("SELECT {} FROM patterns WHERE id = ?", PATTERN_COLUMNS),
                params![id],
                row_to_pattern,
            )
            .optional()?;
        Ok(pattern)
    }

    /// List a user's patterns, optionally filtered by status
    pub fn list_patterns(
        &self,
        user_id: i64,
        status: Option<PatternStatus>,
    ) -> Result<Vec<Pattern>> {
        let conn = self.conn()?;

        let (query, params_vec): (String, Vec<Box<dyn rusqlite::ToSql>>) =
            if let Some(status) = status {
                (
                    format!(
                        "SELECT {} FROM patterns WHERE user_id = ? AND status = ? \
                         ORDER BY id",
                        PATTERN_COLUMNS
                    ),
                    vec![Box::new(user_id), Box::new(status.as_str().to_string())],
                )
            } else {
                (
                    format!(
                        "SELECT {} FROM patterns WHERE user_id = ? ORDER BY id",
                        PATTERN_COLUMNS
                    ),
                    vec![Box::new(user_id)],
                )
            };

        let mut stmt = conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let patterns = stmt
            .query_map(params_refs.as_slice(), row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(patterns)
    }

    /// Patterns eligible for runtime matching on a key, ordered by id.
    ///
    /// Broken patterns stay eligible: a payment landing inside a future
    /// obligation's window is the recovery path back to active. Only
    /// archived patterns are invisible to the matcher.
    pub fn patterns_for_key(
        &self,
        user_id: i64,
        payee_id: i64,
        direction: Direction,
        currency_id: i64,
    ) -> Result<Vec<Pattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patterns \
             WHERE user_id = ? AND payee_id = ? AND direction = ? AND currency_id = ? \
               AND status != 'archived' \
             ORDER BY id",
            PATTERN_COLUMNS
        ))?;
        let patterns = stmt
            .query_map(
                params![user_id, payee_id, direction.as_str(), currency_id],
                row_to_pattern,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(patterns)
    }

    pub fn update_pattern_status(&self, id: i64, status: PatternStatus) -> Result<()> {
        let conn = self.conn()?;
        update_pattern_status_in(&conn, id, status)
    }

    /// Store the advisory summariser annotation. Never gates anything.
    pub fn set_pattern_summary(&self, id: i64, summary: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE patterns SET summary = ? WHERE id = ?",
            params![summary, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Pattern {} not found", id)));
        }
        Ok(())
    }

    pub fn touch_pattern_evaluated(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        touch_pattern_evaluated_in(&conn, id)
    }

    /// Hard-delete a pattern. Cascades to streak, obligations, and links;
    /// the caller is responsible for having confirmed this with the user.
    pub fn delete_pattern(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM patterns WHERE id = ?", params![id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Pattern {} not found", id)));
        }
        Ok(())
    }

    pub fn count_patterns_by_status(&self, user_id: i64) -> Result<Vec<(PatternStatus, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM patterns WHERE user_id = ? GROUP BY status",
        )?;
        let counts = stmt
            .query_map(params![user_id], |row| {
                let status_str: String = row.get(0)?;
                Ok((
                    status_str.parse().unwrap_or(PatternStatus::Active),
                    row.get::<_, i64>(1)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    // ========== Streaks ==========

    pub fn get_streak(&self, pattern_id: i64) -> Result<Option<PatternStreak>> {
        let conn = self.conn()?;
        get_streak_in(&conn, pattern_id)
    }

    /// Write back a streak mutated by the runtime matcher
    pub fn save_streak(&self, streak: &PatternStreak) -> Result<()> {
        let conn = self.conn()?;
        save_streak_in(&conn, streak)
    }

    // ========== Links ==========

    /// Link a transaction to a pattern. Safe to call twice: the link table
    /// is append-only with a uniqueness constraint.
    pub fn link_transaction(&self, pattern_id: i64, transaction_id: i64) -> Result<()> {
        let conn = self.conn()?;
        link_transaction_in(&conn, pattern_id, transaction_id)
    }

    pub fn links_for_pattern(&self, pattern_id: i64) -> Result<Vec<PatternTransactionLink>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT pattern_id, transaction_id, linked_at \
             FROM pattern_transaction_links WHERE pattern_id = ? ORDER BY transaction_id",
        )?;
        let links = stmt
            .query_map(params![pattern_id], |row| {
                let linked_at_str: String = row.get(2)?;
                Ok(PatternTransactionLink {
                    pattern_id: row.get(0)?,
                    transaction_id: row.get(1)?,
                    linked_at: parse_datetime(&linked_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// The most recent transactions linked to a pattern, newest first.
    /// Feeds the rolling expected-amount window.
    pub fn recent_linked_transactions(
        &self,
        pattern_id: i64,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        recent_linked_transactions_in(&conn, pattern_id, limit)
    }

    pub fn count_links(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pattern_transaction_links l \
             JOIN patterns p ON p.id = l.pattern_id WHERE p.user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// Connection-level primitives. The pooled methods above and the matcher's
// single-transaction unit of work share these; a rusqlite Transaction
// derefs to Connection, so they run in either context.

pub(crate) fn get_streak_in(
    conn: &rusqlite::Connection,
    pattern_id: i64,
) -> Result<Option<PatternStreak>> {
    let streak = conn
        .query_row(
            "SELECT pattern_id, current_streak, longest_streak, missed_count, \
                    last_actual_date, last_expected_date, confidence_multiplier \
             FROM pattern_streaks WHERE pattern_id = ?",
            params![pattern_id],
            row_to_streak,
        )
        .optional()?;
    Ok(streak)
}

pub(crate) fn save_streak_in(conn: &rusqlite::Connection, streak: &PatternStreak) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pattern_streaks SET current_streak = ?, longest_streak = ?, \
                missed_count = ?, last_actual_date = ?, last_expected_date = ?, \
                confidence_multiplier = ? \
         WHERE pattern_id = ?",
        params![
            streak.current_streak,
            streak.longest_streak,
            streak.missed_count,
            streak.last_actual_date.map(|d| d.to_string()),
            streak.last_expected_date.map(|d| d.to_string()),
            streak.confidence_multiplier,
            streak.pattern_id,
        ],
    )?;
    if changed == 0 {
        return Err(Error::Invariant(format!(
            "Pattern {} has no streak row",
            streak.pattern_id
        )));
    }
    Ok(())
}

pub(crate) fn link_transaction_in(
    conn: &rusqlite::Connection,
    pattern_id: i64,
    transaction_id: i64,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO pattern_transaction_links (pattern_id, transaction_id) \
         VALUES (?, ?)",
        params![pattern_id, transaction_id],
    )?;
    Ok(())
}

pub(crate) fn update_pattern_status_in(
    conn: &rusqlite::Connection,
    id: i64,
    status: PatternStatus,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE patterns SET status = ? WHERE id = ?",
        params![status.as_str(), id],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("Pattern {} not found", id)));
    }
    Ok(())
}

pub(crate) fn touch_pattern_evaluated_in(conn: &rusqlite::Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE patterns SET last_evaluated_at = ? WHERE id = ?",
        params![format_datetime(Utc::now()), id],
    )?;
    Ok(())
}

pub(crate) fn recent_linked_transactions_in(
    conn: &rusqlite::Connection,
    pattern_id: i64,
    limit: i64,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.user_id, t.payee_id, t.direction, t.currency_id, \
                t.occurred_at, t.amount, t.source_message_id, t.created_at \
         FROM pattern_transaction_links l \
         JOIN transactions t ON t.id = l.transaction_id \
         WHERE l.pattern_id = ? \
         ORDER BY t.occurred_at DESC LIMIT ?",
    )?;
    let txs = stmt
        .query_map(params![pattern_id, limit], |row| {
            let direction_str: String = row.get(3)?;
            let occurred_at_str: String = row.get(5)?;
            let amount_str: String = row.get(6)?;
            let created_at_str: String = row.get(8)?;
            Ok(Transaction {
                id: row.get(0)?,
                user_id: row.get(1)?,
                payee_id: row.get(2)?,
                direction: direction_str.parse().unwrap_or(Direction::Debit),
                currency_id: row.get(4)?,
                occurred_at: parse_datetime(&occurred_at_str),
                amount: parse_amount(&amount_str)?,
                source_message_id: row.get(7)?,
                created_at: parse_datetime(&created_at_str),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(txs)
}

fn row_to_streak(row: &Row<'_>) -> rusqlite::Result<PatternStreak> {
    let last_actual_str: Option<String> = row.get(4)?;
    let last_expected_str: Option<String> = row.get(5)?;
    Ok(PatternStreak {
        pattern_id: row.get(0)?,
        current_streak: row.get(1)?,
        longest_streak: row.get(2)?,
        missed_count: row.get(3)?,
        last_actual_date: last_actual_str.as_deref().and_then(parse_date),
        last_expected_date: last_expected_str.as_deref().and_then(parse_date),
        confidence_multiplier: row.get(6)?,
    })
}

/// Upsert one candidate inside the run's transaction, honouring the fill
/// order: pattern -> flush id -> streak -> links -> first obligation.
fn upsert_candidate(
    tx: &rusqlite::Transaction<'_>,
    candidate: &PatternUpsert,
) -> Result<(Pattern, bool)> {
    let existing = find_by_natural_key(tx, candidate)?;
    let now = format_datetime(Utc::now());

    let (pattern_id, created) = match existing {
        Some(id) => {
            // Known series: refresh what discovery learned, keep identity.
            // Streak and obligations belong to the runtime and stay put.
            tx.execute(
                "UPDATE patterns SET interval_days = ?, pattern_case = ?, \
                        amount_behaviour = ?, representative_amount = ?, amount_min = ?, \
                        amount_max = ?, day_of_month_hint = ?, confidence = ?, \
                        detection_version = detection_version + 1, last_evaluated_at = ? \
                 WHERE id = ?",
                params![
                    candidate.interval_days,
                    candidate.pattern_case.as_str(),
                    candidate.amount_behaviour.as_str(),
                    candidate.representative_amount.to_string(),
                    candidate.amount_min.to_string(),
                    candidate.amount_max.to_string(),
                    candidate.day_of_month_hint,
                    candidate.confidence,
                    now,
                    id,
                ],
            )?;
            debug!(pattern_id = id, "Re-discovery updated existing pattern");
            (id, false)
        }
        None => {
            tx.execute(
                "INSERT INTO patterns \
                    (user_id, payee_id, direction, currency_id, interval_days, pattern_case, \
                     amount_behaviour, representative_amount, amount_min, amount_max, \
                     day_of_month_hint, status, confidence, detection_version, last_evaluated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, 1, ?)",
                params![
                    candidate.user_id,
                    candidate.payee_id,
                    candidate.direction.as_str(),
                    candidate.currency_id,
                    candidate.interval_days,
                    candidate.pattern_case.as_str(),
                    candidate.amount_behaviour.as_str(),
                    candidate.representative_amount.to_string(),
                    candidate.amount_min.to_string(),
                    candidate.amount_max.to_string(),
                    candidate.day_of_month_hint,
                    candidate.confidence,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();

            // Seed the streak: the historical series counts as consecutive
            // fulfilments.
            let n = candidate.transaction_ids.len() as i64;
            tx.execute(
                "INSERT INTO pattern_streaks \
                    (pattern_id, current_streak, longest_streak, missed_count, \
                     last_actual_date, confidence_multiplier) \
                 VALUES (?, ?, ?, 0, ?, 1.0)",
                params![id, n, n, candidate.last_transaction_date.to_string()],
            )?;
            debug!(pattern_id = id, transactions = n, "Created new pattern");
            (id, true)
        }
    };

    // Links are append-only; absent ones are added, existing ones are left
    // alone. This is what makes re-discovery monotonic.
    for tx_id in &candidate.transaction_ids {
        tx.execute(
            "INSERT OR IGNORE INTO pattern_transaction_links (pattern_id, transaction_id) \
             VALUES (?, ?)",
            params![pattern_id, tx_id],
        )?;
    }

    // First obligation, new patterns only
    if created {
        let tolerance = candidate
            .pattern_case
            .tolerance_days(candidate.interval_days);
        let expected =
            candidate.last_transaction_date + chrono::Duration::days(candidate.interval_days);
        tx.execute(
            "INSERT INTO obligations \
                (pattern_id, expected_date, tolerance_days, expected_min_amount, \
                 expected_max_amount, status) \
             VALUES (?, ?, ?, ?, ?, 'expected')",
            params![
                pattern_id,
                expected.to_string(),
                tolerance,
                candidate.first_expected_min.to_string(),
                candidate.first_expected_max.to_string(),
            ],
        )?;
    }

    let pattern = tx.query_row(
        &format!("SELECT {} FROM patterns WHERE id = ?", PATTERN_COLUMNS),
        params![pattern_id],
        row_to_pattern,
    )?;
    Ok((pattern, created))
}

/// Natural-key lookup: same (user, payee, direction, currency), a
/// representative amount within the candidate's tolerance, and the same
/// day-of-month window. Archived patterns never match; a re-discovered
/// series for an archived pattern becomes a new row.
fn find_by_natural_key(
    tx: &rusqlite::Transaction<'_>,
    candidate: &PatternUpsert,
) -> Result<Option<i64>> {
    let mut stmt = tx.prepare(
        "SELECT id, representative_amount, day_of_month_hint FROM patterns \
         WHERE user_id = ? AND payee_id = ? AND direction = ? AND currency_id = ? \
           AND status != 'archived' \
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(
            params![
                candidate.user_id,
                candidate.payee_id,
                candidate.direction.as_str(),
                candidate.currency_id
            ],
            |row| {
                let repr_str: String = row.get(1)?;
                let hint: Option<u32> = row.get(2)?;
                Ok((row.get::<_, i64>(0)?, repr_str, hint))
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let candidate_window = day_window(candidate.day_of_month_hint);
    for (id, repr_str, hint) in rows {
        let repr: Decimal = repr_str
            .parse()
            .map_err(|_| Error::Invariant(format!("Pattern {} has a corrupt amount", id)))?;
        let amount_close = (repr - candidate.representative_amount).abs()
            <= candidate.key_amount_tolerance;
        let window_matches = day_window(hint) == candidate_window;
        if amount_close && window_matches {
            return Ok(Some(id));
        }
    }
    Ok(None)
}
