//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cadence - Track recurring financial obligations
#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Discover recurring payment patterns and track their fulfilment", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "cadence.db", global = true)]
    pub db: PathBuf,

    /// User id to operate as (the service normally gets this from the
    /// identity layer)
    #[arg(long, default_value = "1", global = true)]
    pub user: i64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CADENCE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Record a transaction and run the matcher on it
    Ingest {
        /// Counterparty name (created on first use)
        #[arg(long)]
        payee: String,

        /// Amount (non-negative; direction carries the sign)
        #[arg(long)]
        amount: String,

        /// debit or credit
        #[arg(long, default_value = "debit")]
        direction: String,

        /// Currency code
        #[arg(long, default_value = "INR")]
        currency: String,

        /// Date (YYYY-MM-DD) or datetime (YYYY-MM-DDTHH:MM:SS)
        #[arg(long)]
        date: String,

        /// Upstream message id (unique); derived from the inputs when
        /// omitted
        #[arg(long)]
        source_id: Option<String>,
    },

    /// Run pattern discovery
    Discover {
        /// Restrict to one payee name
        #[arg(long)]
        payee: Option<String>,

        /// Restrict to one direction: debit or credit
        #[arg(long)]
        direction: Option<String>,
    },

    /// Inspect and manage patterns
    Patterns {
        #[command(subcommand)]
        action: Option<PatternsAction>,
    },

    /// Pending obligations due in the next N days
    Upcoming {
        /// Horizon in days
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Show database status
    Status,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[derive(Subcommand)]
pub enum PatternsAction {
    /// List patterns (default)
    List {
        /// Filter by status: active, paused, broken, archived
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one pattern with its streak and recent obligations
    Show { id: i64 },

    /// Pause matching for a pattern
    Pause { id: i64 },

    /// Resume matching for a pattern
    Resume { id: i64 },

    /// Archive a pattern, or hard-delete it with --force
    Delete {
        id: i64,

        /// Hard delete: cascades to streak, obligations, and links
        #[arg(long)]
        force: bool,
    },
}
