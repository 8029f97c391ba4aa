//! Obligation operations
//!
//! Obligations are strictly linearly ordered per pattern: the pending one
//! is resolved (fulfilled or missed) before the next is created. The
//! matcher enforces that ordering under its per-key lock; this layer just
//! provides the primitives.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;

use super::{format_datetime, parse_amount, parse_date, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Obligation, ObligationStatus};

fn row_to_obligation(row: &Row<'_>) -> rusqlite::Result<Obligation> {
    let expected_str: String = row.get(2)?;
    let min_str: String = row.get(4)?;
    let max_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let fulfilled_at_str: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(10)?;

    Ok(Obligation {
        id: row.get(0)?,
        pattern_id: row.get(1)?,
        expected_date: parse_date(&expected_str).unwrap_or_default(),
        tolerance_days: row.get(3)?,
        expected_min_amount: parse_amount(&min_str)?,
        expected_max_amount: parse_amount(&max_str)?,
        status: status_str.parse().unwrap_or(ObligationStatus::Expected),
        fulfilled_by_transaction_id: row.get(7)?,
        fulfilled_at: fulfilled_at_str.map(|s| parse_datetime(&s)),
        days_early: row.get(9)?,
        created_at: parse_datetime(&created_at_str),
    })
}

const OBLIGATION_COLUMNS: &str = "id, pattern_id, expected_date, tolerance_days, \
     expected_min_amount, expected_max_amount, status, fulfilled_by_transaction_id, \
     fulfilled_at, days_early, created_at";

impl Database {
    /// Create the next expected obligation for a pattern
    pub fn insert_obligation(
        &self,
        pattern_id: i64,
        expected_date: NaiveDate,
        tolerance_days: i64,
        expected_min: Decimal,
        expected_max: Decimal,
    ) -> Result<Obligation> {
        let conn = self.conn()?;
        insert_obligation_in(
            &conn,
            pattern_id,
            expected_date,
            tolerance_days,
            expected_min,
            expected_max,
        )
    }

    pub fn get_obligation(&self, id: i64) -> Result<Option<Obligation>> {
        let conn = self.conn()?;
        let ob = conn
            .query_row(
                &format!("SELECT {} FROM obligations WHERE id = ?", OBLIGATION_COLUMNS),
                params![id],
                row_to_obligation,
            )
            .optional()?;
        Ok(ob)
    }

    /// The pattern's pending obligation, if any. At most one exists at
    /// rest; more than one is an invariant violation.
    pub fn pending_obligation(&self, pattern_id: i64) -> Result<Option<Obligation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM obligations WHERE pattern_id = ? AND status = 'expected' \
             ORDER BY expected_date",
            OBLIGATION_COLUMNS
        ))?;
        let pending = stmt
            .query_map(params![pattern_id], row_to_obligation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if pending.len() > 1 {
            return Err(Error::Invariant(format!(
                "Pattern {} has {} expected obligations",
                pattern_id,
                pending.len()
            )));
        }
        Ok(pending.into_iter().next())
    }

    /// Resolve an obligation as fulfilled by a transaction
    pub fn fulfil_obligation(
        &self,
        obligation_id: i64,
        transaction_id: i64,
        days_early: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        fulfil_obligation_in(&conn, obligation_id, transaction_id, days_early)
    }

    /// Resolve an obligation as missed
    pub fn miss_obligation(&self, obligation_id: i64) -> Result<()> {
        let conn = self.conn()?;
        miss_obligation_in(&conn, obligation_id)
    }

    /// Cancel the pending obligation, if any (used when a pattern is
    /// archived or hard-deleted after confirmation)
    pub fn cancel_pending_obligation(&self, pattern_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE obligations SET status = 'cancelled' \
             WHERE pattern_id = ? AND status = 'expected'",
            params![pattern_id],
        )?;
        Ok(())
    }

    /// Obligation history for a pattern, newest expected date first
    pub fn obligations_for_pattern(
        &self,
        pattern_id: i64,
        status: Option<ObligationStatus>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<Obligation>> {
        let conn = self.conn()?;

        let mut query = format!(
            "SELECT {} FROM obligations WHERE pattern_id = ?",
            OBLIGATION_COLUMNS
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(pattern_id)];

        if let Some(status) = status {
            query.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }
        if let Some(from) = from {
            query.push_str(" AND expected_date >= ?");
            params_vec.push(Box::new(from.to_string()));
        }
        if let Some(to) = to {
            query.push_str(" AND expected_date <= ?");
            params_vec.push(Box::new(to.to_string()));
        }
        query.push_str(" ORDER BY expected_date DESC LIMIT ?");
        params_vec.push(Box::new(limit));

        let mut stmt = conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let obligations = stmt
            .query_map(params_refs.as_slice(), row_to_obligation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(obligations)
    }

    /// Pending obligations across all of a user's patterns due within the
    /// window, soonest first
    pub fn upcoming_obligations(
        &self,
        user_id: i64,
        until: NaiveDate,
    ) -> Result<Vec<Obligation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT o.id, o.pattern_id, o.expected_date, o.tolerance_days, \
                    o.expected_min_amount, o.expected_max_amount, o.status, \
                    o.fulfilled_by_transaction_id, o.fulfilled_at, o.days_early, o.created_at \
             FROM obligations o \
             JOIN patterns p ON p.id = o.pattern_id \
             WHERE p.user_id = ? AND o.status = 'expected' AND o.expected_date <= ? \
               AND p.status != 'archived' \
             ORDER BY o.expected_date ASC",
        )?;
        let obligations = stmt
            .query_map(params![user_id, until.to_string()], row_to_obligation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(obligations)
    }

    pub fn count_overdue_obligations(&self, user_id: i64, today: NaiveDate) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM obligations o \
             JOIN patterns p ON p.id = o.pattern_id \
             WHERE p.user_id = ? AND o.status = 'expected' \
               AND date(o.expected_date, '+' || o.tolerance_days || ' days') < date(?)",
            params![user_id, today.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// Connection-level primitives shared with the matcher's transactional unit
// of work (see db::patterns for the rationale).

pub(crate) fn insert_obligation_in(
    conn: &rusqlite::Connection,
    pattern_id: i64,
    expected_date: NaiveDate,
    tolerance_days: i64,
    expected_min: Decimal,
    expected_max: Decimal,
) -> Result<Obligation> {
    conn.execute(
        "INSERT INTO obligations \
            (pattern_id, expected_date, tolerance_days, expected_min_amount, \
             expected_max_amount, status) \
         VALUES (?, ?, ?, ?, ?, 'expected')",
        params![
            pattern_id,
            expected_date.to_string(),
            tolerance_days,
            expected_min.to_string(),
            expected_max.to_string(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {} FROM obligations WHERE id = ?", OBLIGATION_COLUMNS),
        params![id],
        row_to_obligation,
    )
    .map_err(|e| e.into())
}

pub(crate) fn fulfil_obligation_in(
    conn: &rusqlite::Connection,
    obligation_id: i64,
    transaction_id: i64,
    days_early: i64,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE obligations SET status = 'fulfilled', fulfilled_by_transaction_id = ?, \
                fulfilled_at = ?, days_early = ? \
         WHERE id = ? AND status = 'expected'",
        params![
            transaction_id,
            format_datetime(Utc::now()),
            days_early,
            obligation_id,
        ],
    )?;
    if changed == 0 {
        return Err(Error::Invariant(format!(
            "Obligation {} is not pending; cannot fulfil",
            obligation_id
        )));
    }
    Ok(())
}

pub(crate) fn miss_obligation_in(conn: &rusqlite::Connection, obligation_id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE obligations SET status = 'missed' WHERE id = ? AND status = 'expected'",
        params![obligation_id],
    )?;
    if changed == 0 {
        return Err(Error::Invariant(format!(
            "Obligation {} is not pending; cannot mark missed",
            obligation_id
        )));
    }
    Ok(())
}
