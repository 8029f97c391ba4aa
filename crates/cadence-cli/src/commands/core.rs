//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Per-user overview

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use cadence_core::db::Database;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path.to_str().context("Invalid database path")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Record transactions: cadence ingest --payee ... --amount ... --date ...");
    println!("  2. Discover patterns:   cadence discover");
    println!("  3. Start the API:       cadence serve");

    Ok(())
}

pub fn cmd_status(db: &Database, user_id: i64) -> Result<()> {
    let transactions = db.count_transactions(user_id)?;
    let links = db.count_links(user_id)?;
    let by_status = db.count_patterns_by_status(user_id)?;
    let today = Utc::now().date_naive();
    let overdue = db.count_overdue_obligations(user_id, today)?;
    let dead = db.count_dead_letters()?;

    println!("📊 Cadence status (user {})", user_id);
    println!("   ─────────────────────────────");
    println!("   Transactions: {} ({} linked to patterns)", transactions, links);
    if by_status.is_empty() {
        println!("   Patterns: none discovered yet");
    } else {
        for (status, count) in by_status {
            println!("   Patterns {}: {}", status, count);
        }
    }
    println!("   Overdue obligations: {}", overdue);
    if dead > 0 {
        println!("   ⚠️  Dead-lettered matcher work: {}", dead);
    }

    Ok(())
}
