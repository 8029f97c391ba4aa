//! Discovery command

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use cadence_core::models::Direction;
use cadence_core::{DiscoveryFilter, DiscoveryLocks, PatternDiscovery};

use super::open_db;

pub fn cmd_discover(
    db_path: &Path,
    user_id: i64,
    payee: Option<&str>,
    direction: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let direction: Option<Direction> = direction
        .map(|d| d.parse().map_err(|e: String| anyhow!(e)))
        .transpose()
        .context("Invalid --direction")?;
    // --payee narrows to an existing payee; an unknown name has nothing
    // to discover
    let payee_id = match payee {
        Some(name) => {
            let found = db
                .list_payees(user_id)?
                .into_iter()
                .find(|p| p.name == name);
            match found {
                Some(p) => Some(p.id),
                None => {
                    println!("🤷 No payee named '{}' for user {}", name, user_id);
                    return Ok(());
                }
            }
        }
        None => None,
    };

    println!("🔍 Running pattern discovery...");
    let run = PatternDiscovery::new(&db, Arc::new(DiscoveryLocks::new()))
        .run(user_id, DiscoveryFilter { payee_id, direction })?;

    println!();
    println!("📊 Discovery Results");
    println!("   ─────────────────────────────");
    let created = run.patterns.iter().filter(|p| p.created).count();
    println!("   Patterns created: {}", created);
    println!("   Patterns updated: {}", run.patterns.len() - created);

    for discovered in &run.patterns {
        let p = &discovered.pattern;
        println!(
            "   {} #{}: every {} days, {} @ {} (confidence {:.2})",
            if discovered.created { "🆕" } else { "♻️ " },
            p.id,
            p.interval_days,
            p.pattern_case,
            p.representative_amount,
            p.confidence
        );
    }

    if !run.rejected_clusters.is_empty() {
        println!();
        println!("   Clusters without a pattern:");
        for rejected in &run.rejected_clusters {
            println!(
                "   - payee {} ({} transactions): {}",
                rejected.key.payee_id, rejected.transaction_count, rejected.rejection
            );
        }
    }
    if !run.skipped_groups.is_empty() {
        println!(
            "   Groups below the 3-transaction minimum: {}",
            run.skipped_groups.len()
        );
    }

    Ok(())
}
