//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `transactions` - Payees, currencies, and immutable transaction facts
//! - `patterns` - Pattern rows, streaks, and append-only transaction links
//! - `obligations` - Expected/fulfilled/missed obligation timeline
//! - `dead_letters` - Matcher work that exhausted its retry budget

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{Error, Result};

mod dead_letters;
mod obligations;
mod patterns;
mod transactions;


pub use patterns::PatternUpsert;

pub(crate) use obligations::{fulfil_obligation_in, insert_obligation_in, miss_obligation_in};
pub(crate) use patterns::{
    get_streak_in, link_transaction_in, recent_linked_transactions_in, save_streak_in,
    touch_pattern_evaluated_in, update_pattern_status_in,
};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "CADENCE_DB_KEY";

/// Derive the raw SQLCipher key from a passphrase using Argon2id.
///
/// SQLCipher takes a 256-bit key as 64 hex digits, so the passphrase is
/// stretched straight into a 32-byte buffer rather than through the PHC
/// string machinery. The salt is fixed per key-schema version: the key
/// must be a function of the passphrase alone so the database file can be
/// moved, renamed, or restored freely. Bumping the version tag would
/// invalidate every existing encrypted database.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::Argon2;

    const KEY_SALT: &[u8] = b"cadence.pattern-store.kdf.v1";
    const KEY_BYTES: usize = 32;

    let mut key = [0u8; KEY_BYTES];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), KEY_SALT, &mut key)
        .map_err(|e| Error::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(hex::encode(key))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a DateTime<Utc> the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parse a TEXT-stored decimal amount. A corrupt amount cell is an
/// invariant violation, not recoverable data.
pub(crate) fn parse_amount(s: &str) -> rusqlite::Result<Decimal> {
    s.parse::<Decimal>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `CADENCE_DB_KEY` environment variable to be set. The
    /// database will be encrypted using SQLCipher with a key derived from
    /// the passphrase via Argon2.
    ///
    /// Returns an error if `CADENCE_DB_KEY` is not set. Use
    /// `new_unencrypted()` for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for
    /// development or testing. For production, use `new()` with
    /// `CADENCE_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Use with_init to set the key on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/cadence_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside a single immediate transaction. Used by the runtime
    /// matcher so a whole match-or-miss unit of work commits atomically;
    /// any error rolls the entire sequence back.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn()?;
        let tx =
            conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;

            PRAGMA cache_size = 2000;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Payees (normalised counterparties, per user)
            CREATE TABLE IF NOT EXISTS payees (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_payees_user ON payees(user_id);

            -- Currencies
            CREATE TABLE IF NOT EXISTS currencies (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Transactions (immutable facts from the ingestion producer)
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                payee_id INTEGER NOT NULL REFERENCES payees(id),
                direction TEXT NOT NULL CHECK (direction IN ('debit', 'credit')),
                currency_id INTEGER NOT NULL REFERENCES currencies(id),
                occurred_at DATETIME NOT NULL,
                amount TEXT NOT NULL,
                source_message_id TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_key
                ON transactions(user_id, payee_id, direction, currency_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_occurred ON transactions(occurred_at);

            -- Patterns (discovered recurring series)
            CREATE TABLE IF NOT EXISTS patterns (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                payee_id INTEGER NOT NULL REFERENCES payees(id),
                direction TEXT NOT NULL CHECK (direction IN ('debit', 'credit')),
                currency_id INTEGER NOT NULL REFERENCES currencies(id),
                interval_days INTEGER NOT NULL,
                pattern_case TEXT NOT NULL,
                amount_behaviour TEXT NOT NULL,
                representative_amount TEXT NOT NULL,
                amount_min TEXT NOT NULL,
                amount_max TEXT NOT NULL,
                day_of_month_hint INTEGER,
                status TEXT NOT NULL DEFAULT 'active',
                confidence REAL NOT NULL,
                detection_version INTEGER NOT NULL DEFAULT 1,
                summary TEXT,
                last_evaluated_at DATETIME NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_patterns_user ON patterns(user_id);
            CREATE INDEX IF NOT EXISTS idx_patterns_key
                ON patterns(user_id, payee_id, direction, currency_id);
            CREATE INDEX IF NOT EXISTS idx_patterns_status ON patterns(status);

            -- Streaks (1:1 with patterns)
            CREATE TABLE IF NOT EXISTS pattern_streaks (
                pattern_id INTEGER PRIMARY KEY REFERENCES patterns(id) ON DELETE CASCADE,
                current_streak INTEGER NOT NULL DEFAULT 0,
                longest_streak INTEGER NOT NULL DEFAULT 0,
                missed_count INTEGER NOT NULL DEFAULT 0,
                last_actual_date DATE,
                last_expected_date DATE,
                confidence_multiplier REAL NOT NULL DEFAULT 1.0
            );

            -- Pattern <-> transaction links (append-only)
            CREATE TABLE IF NOT EXISTS pattern_transaction_links (
                pattern_id INTEGER NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
                transaction_id INTEGER NOT NULL REFERENCES transactions(id),
                linked_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (pattern_id, transaction_id)
            );

            CREATE INDEX IF NOT EXISTS idx_links_transaction
                ON pattern_transaction_links(transaction_id);

            -- Obligations (expected future occurrences and their history)
            CREATE TABLE IF NOT EXISTS obligations (
                id INTEGER PRIMARY KEY,
                pattern_id INTEGER NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
                expected_date DATE NOT NULL,
                tolerance_days INTEGER NOT NULL,
                expected_min_amount TEXT NOT NULL,
                expected_max_amount TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'expected'
                    CHECK (status IN ('expected', 'fulfilled', 'missed', 'cancelled')),
                fulfilled_by_transaction_id INTEGER REFERENCES transactions(id),
                fulfilled_at DATETIME,
                days_early INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_obligations_pattern ON obligations(pattern_id);
            CREATE INDEX IF NOT EXISTS idx_obligations_status ON obligations(status);
            CREATE INDEX IF NOT EXISTS idx_obligations_expected ON obligations(expected_date);

            -- Dead letters (matcher work that exhausted its retry budget)
            CREATE TABLE IF NOT EXISTS dead_letters (
                id INTEGER PRIMARY KEY,
                transaction_id INTEGER NOT NULL REFERENCES transactions(id),
                error TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}
