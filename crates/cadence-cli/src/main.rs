//! Cadence CLI - recurring obligation tracker
//!
//! Usage:
//!   cadence init                       Initialize database
//!   cadence ingest --payee X ...       Record a transaction and match it
//!   cadence discover                   Run pattern discovery
//!   cadence patterns                   List discovered patterns
//!   cadence upcoming --days 30         Pending obligations due soon
//!   cadence serve --port 3000          Start the REST API server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Ingest {
            payee,
            amount,
            direction,
            currency,
            date,
            source_id,
        } => {
            commands::cmd_ingest(
                &cli.db,
                cli.user,
                &payee,
                &amount,
                &direction,
                &currency,
                &date,
                source_id.as_deref(),
                cli.no_encrypt,
            )
            .await
        }
        Commands::Discover { payee, direction } => commands::cmd_discover(
            &cli.db,
            cli.user,
            payee.as_deref(),
            direction.as_deref(),
            cli.no_encrypt,
        ),
        Commands::Patterns { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_patterns_list(&db, cli.user, None),
                Some(PatternsAction::List { status }) => {
                    commands::cmd_patterns_list(&db, cli.user, status.as_deref())
                }
                Some(PatternsAction::Show { id }) => {
                    commands::cmd_patterns_show(&db, cli.user, id)
                }
                Some(PatternsAction::Pause { id }) => {
                    commands::cmd_patterns_pause(&db, cli.user, id)
                }
                Some(PatternsAction::Resume { id }) => {
                    commands::cmd_patterns_resume(&db, cli.user, id)
                }
                Some(PatternsAction::Delete { id, force }) => {
                    commands::cmd_patterns_delete(&db, cli.user, id, force)
                }
            }
        }
        Commands::Upcoming { days } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_upcoming(&db, cli.user, days)
        }
        Commands::Status => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_status(&db, cli.user)
        }
        Commands::Serve { port, host } => {
            commands::cmd_serve(&cli.db, &host, port, cli.no_encrypt).await
        }
    }
}
