//! Transaction ingest command

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use cadence_core::models::{Direction, NewTransaction};
use cadence_core::{dispatch_transaction, MatchKeyLocks, MatcherConfig};

use super::open_db;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_ingest(
    db_path: &Path,
    user_id: i64,
    payee: &str,
    amount: &str,
    direction: &str,
    currency: &str,
    date: &str,
    source_id: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let direction: Direction = direction
        .parse()
        .map_err(|e: String| anyhow!(e))
        .context("Invalid --direction")?;
    let amount: Decimal = amount.parse().context("Invalid --amount")?;
    let occurred_at = parse_occurred_at(date)?;

    let payee_id = db.upsert_payee(user_id, payee)?;
    let currency_id = db.upsert_currency(currency)?;

    // a stable synthetic message id keeps re-runs of the same command
    // idempotent when no upstream id is available
    let source_message_id = source_id.map(str::to_string).unwrap_or_else(|| {
        format!(
            "cli-{}-{}-{}-{}-{}",
            user_id,
            payee_id,
            direction,
            occurred_at.format("%Y%m%d%H%M%S"),
            amount
        )
    });

    let transaction_id = db.insert_transaction(&NewTransaction {
        user_id,
        payee_id,
        direction,
        currency_id,
        occurred_at,
        amount,
        source_message_id,
    })?;
    println!("💾 Recorded transaction {}", transaction_id);

    let outcome = dispatch_transaction(
        db.clone(),
        Arc::new(MatchKeyLocks::new()),
        MatcherConfig::default(),
        transaction_id,
    )
    .await?;

    for miss in &outcome.missed {
        println!(
            "   ⏰ Pattern {} missed its {} obligation",
            miss.pattern_id, miss.expected_date
        );
    }
    match outcome.fulfilled.first() {
        Some(f) => println!(
            "   ✅ Fulfilled pattern {} (expected {}, {} days {})",
            f.pattern_id,
            f.expected_date,
            f.days_early.abs(),
            if f.days_early >= 0 { "early" } else { "late" },
        ),
        None => println!("   💤 No obligation window matched; kept for future discovery"),
    }

    Ok(())
}

/// Accept a bare date or a full datetime; bare dates get a neutral midday
/// timestamp so timezone wobble cannot move them across a day boundary
fn parse_occurred_at(input: &str) -> Result<chrono::DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&dt));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .context("Invalid --date (use YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)")?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("midday is valid")))
}
