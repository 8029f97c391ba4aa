//! Payee, currency, and transaction operations
//!
//! Transactions are immutable facts; the only write is the initial insert.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::warn;

use super::{format_datetime, parse_amount, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Currency, Direction, NewTransaction, Payee, Transaction};

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
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
}

const TRANSACTION_COLUMNS: &str = "id, user_id, payee_id, direction, currency_id, \
     occurred_at, amount, source_message_id, created_at";

impl Database {
    // ========== Payees ==========

    /// Upsert a payee by name for a user, returning its id
    pub fn upsert_payee(&self, user_id: i64, name: &str) -> Result<i64> {
        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM payees WHERE user_id = ? AND name = ?",
                params![user_id, name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO payees (user_id, name) VALUES (?, ?)",
            params![user_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_payee(&self, id: i64) -> Result<Option<Payee>> {
        let conn = self.conn()?;
        let payee = conn
            .query_row(
                "SELECT id, user_id, name, created_at FROM payees WHERE id = ?",
                params![id],
                |row| {
                    let created_at_str: String = row.get(3)?;
                    Ok(Payee {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        created_at: parse_datetime(&created_at_str),
                    })
                },
            )
            .optional()?;
        Ok(payee)
    }

    pub fn list_payees(&self, user_id: i64) -> Result<Vec<Payee>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, created_at FROM payees WHERE user_id = ? ORDER BY name",
        )?;
        let payees = stmt
            .query_map(params![user_id], |row| {
                let created_at_str: String = row.get(3)?;
                Ok(Payee {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    created_at: parse_datetime(&created_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(payees)
    }

    // ========== Currencies ==========

    /// Upsert a currency by code, returning its id
    pub fn upsert_currency(&self, code: &str) -> Result<i64> {
        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM currencies WHERE code = ?",
                params![code],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute("INSERT INTO currencies (code) VALUES (?)", params![code])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_currency(&self, id: i64) -> Result<Option<Currency>> {
        let conn = self.conn()?;
        let currency = conn
            .query_row(
                "SELECT id, code, created_at FROM currencies WHERE id = ?",
                params![id],
                |row| {
                    let created_at_str: String = row.get(2)?;
                    Ok(Currency {
                        id: row.get(0)?,
                        code: row.get(1)?,
                        created_at: parse_datetime(&created_at_str),
                    })
                },
            )
            .optional()?;
        Ok(currency)
    }

    // ========== Transactions ==========

    /// Record a new transaction.
    ///
    /// Returns the new row id, or Conflict if the source_message_id has
    /// already been recorded (the upstream producer guarantees uniqueness;
    /// a duplicate here means a redelivery, not new money movement).
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        if tx.amount.is_sign_negative() {
            return Err(Error::InvalidData(format!(
                "Transaction amounts are non-negative (direction carries the sign), got {}",
                tx.amount
            )));
        }

        // Clock anomalies are accepted but flagged; the transaction still
        // participates in matching according to its date.
        if tx.occurred_at > Utc::now() + chrono::Duration::days(1) {
            warn!(
                occurred_at = %tx.occurred_at,
                source_message_id = %tx.source_message_id,
                "Transaction dated in the future"
            );
        }

        let conn = self.conn()?;

        let latest_on_key: Option<String> = conn
            .query_row(
                "SELECT MAX(occurred_at) FROM transactions \
                 WHERE user_id = ? AND payee_id = ? AND direction = ? AND currency_id = ?",
                params![
                    tx.user_id,
                    tx.payee_id,
                    tx.direction.as_str(),
                    tx.currency_id
                ],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        if let Some(latest) = latest_on_key.as_deref().map(parse_datetime) {
            if tx.occurred_at < latest - chrono::Duration::days(1) {
                warn!(
                    occurred_at = %tx.occurred_at,
                    latest_on_key = %latest,
                    source_message_id = %tx.source_message_id,
                    "Transaction arrived out of order for its key"
                );
            }
        }
        let result = conn.execute(
            r#"
            INSERT INTO transactions
                (user_id, payee_id, direction, currency_id, occurred_at, amount, source_message_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.user_id,
                tx.payee_id,
                tx.direction.as_str(),
                tx.currency_id,
                format_datetime(tx.occurred_at),
                tx.amount.to_string(),
                tx.source_message_id,
            ],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let detail = msg.unwrap_or_default();
                if detail.contains("source_message_id") {
                    Err(Error::Conflict(format!(
                        "Transaction with source_message_id {} already recorded",
                        tx.source_message_id
                    )))
                } else {
                    Err(Error::InvalidData(detail))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions WHERE id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![id],
                row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// List a user's transactions, newest first
    pub fn list_transactions(
        &self,
        user_id: i64,
        payee_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        let (query, params_vec): (String, Vec<Box<dyn rusqlite::ToSql>>) =
            if let Some(payee) = payee_id {
                (
                    format!(
                        "SELECT {} FROM transactions WHERE user_id = ? AND payee_id = ? \
                         ORDER BY occurred_at DESC LIMIT ? OFFSET ?",
                        TRANSACTION_COLUMNS
                    ),
                    vec![
                        Box::new(user_id),
                        Box::new(payee),
                        Box::new(limit),
                        Box::new(offset),
                    ],
                )
            } else {
                (
                    format!(
                        "SELECT {} FROM transactions WHERE user_id = ? \
                         ORDER BY occurred_at DESC LIMIT ? OFFSET ?",
                        TRANSACTION_COLUMNS
                    ),
                    vec![Box::new(user_id), Box::new(limit), Box::new(offset)],
                )
            };

        let mut stmt = conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let txs = stmt
            .query_map(params_refs.as_slice(), row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// All of a user's transactions for discovery, optionally narrowed by
    /// payee and direction, oldest first
    pub fn transactions_for_discovery(
        &self,
        user_id: i64,
        payee_id: Option<i64>,
        direction: Option<Direction>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        let mut query = format!(
            "SELECT {} FROM transactions WHERE user_id = ?",
            TRANSACTION_COLUMNS
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id)];

        if let Some(payee) = payee_id {
            query.push_str(" AND payee_id = ?");
            params_vec.push(Box::new(payee));
        }
        if let Some(dir) = direction {
            query.push_str(" AND direction = ?");
            params_vec.push(Box::new(dir.as_str().to_string()));
        }
        query.push_str(" ORDER BY occurred_at ASC");

        let mut stmt = conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let txs = stmt
            .query_map(params_refs.as_slice(), row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Transaction ids already linked to any of the user's patterns.
    ///
    /// Links only ever connect a transaction to a pattern with the same
    /// (user, payee, direction, currency) key, so per-user filtering is
    /// equivalent to the per-key filter discovery needs.
    pub fn linked_transaction_ids(&self, user_id: i64) -> Result<std::collections::HashSet<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT l.transaction_id
            FROM pattern_transaction_links l
            JOIN patterns p ON p.id = l.pattern_id
            WHERE p.user_id = ?
            "#,
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<std::collections::HashSet<_>, _>>()?;
        Ok(ids)
    }

    pub fn count_transactions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
