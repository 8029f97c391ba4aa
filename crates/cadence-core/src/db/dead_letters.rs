//! Dead-letter operations
//!
//! Matcher work that cannot be retried to success is parked here, never
//! dropped. An operator re-dispatches after fixing the underlying issue.

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::DeadLetter;

impl Database {
    pub fn insert_dead_letter(
        &self,
        transaction_id: i64,
        error: &str,
        attempts: i64,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO dead_letters (transaction_id, error, attempts) VALUES (?, ?, ?)",
            params![transaction_id, error, attempts],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, transaction_id, error, attempts, created_at \
             FROM dead_letters ORDER BY id DESC LIMIT ?",
        )?;
        let letters = stmt
            .query_map(params![limit], |row| {
                let created_at_str: String = row.get(4)?;
                Ok(DeadLetter {
                    id: row.get(0)?,
                    transaction_id: row.get(1)?,
                    error: row.get(2)?,
                    attempts: row.get(3)?,
                    created_at: parse_datetime(&created_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(letters)
    }

    pub fn count_dead_letters(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove a dead letter after successful re-dispatch
    pub fn resolve_dead_letter(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM dead_letters WHERE id = ?", params![id])?;
        Ok(())
    }
}
