//! Pattern inspection and management commands

use anyhow::{anyhow, Result};
use chrono::Utc;

use cadence_core::db::Database;
use cadence_core::models::{Pattern, PatternStatus};

fn load_owned(db: &Database, user_id: i64, id: i64) -> Result<Pattern> {
    db.get_pattern(id)?
        .filter(|p| p.user_id == user_id)
        .ok_or_else(|| anyhow!("Pattern {} not found", id))
}

pub fn cmd_patterns_list(db: &Database, user_id: i64, status: Option<&str>) -> Result<()> {
    let status: Option<PatternStatus> = status
        .map(|s| s.parse().map_err(|e: String| anyhow!(e)))
        .transpose()?;

    let patterns = db.list_patterns(user_id, status)?;
    if patterns.is_empty() {
        println!("🤷 No patterns. Run 'cadence discover' after recording transactions.");
        return Ok(());
    }

    println!("📋 Patterns (user {})", user_id);
    for p in patterns {
        let payee = db
            .get_payee(p.payee_id)?
            .map(|x| x.name)
            .unwrap_or_else(|| format!("payee {}", p.payee_id));
        println!(
            "   #{} {} {} {} @ {} every {}d [{}] confidence {:.2} v{}",
            p.id,
            p.direction,
            payee,
            p.pattern_case,
            p.representative_amount,
            p.interval_days,
            p.status,
            p.confidence,
            p.detection_version,
        );
    }
    Ok(())
}

pub fn cmd_patterns_show(db: &Database, user_id: i64, id: i64) -> Result<()> {
    let p = load_owned(db, user_id, id)?;
    let payee = db
        .get_payee(p.payee_id)?
        .map(|x| x.name)
        .unwrap_or_else(|| format!("payee {}", p.payee_id));
    let currency = db
        .get_currency(p.currency_id)?
        .map(|c| c.code)
        .unwrap_or_else(|| "?".to_string());

    println!("🔎 Pattern #{} [{}]", p.id, p.status);
    println!("   {} {} in {}", p.direction, payee, currency);
    println!(
        "   {} every {} days, typically {} (range {} - {}, {})",
        p.pattern_case, p.interval_days, p.representative_amount, p.amount_min, p.amount_max,
        p.amount_behaviour,
    );
    if let Some(day) = p.day_of_month_hint {
        println!("   Usually around day {} of the month", day);
    }
    println!(
        "   Confidence {:.2}, detection v{}, last evaluated {}",
        p.confidence, p.detection_version, p.last_evaluated_at
    );
    if let Some(summary) = &p.summary {
        println!("   📝 {}", summary);
    }

    if let Some(streak) = db.get_streak(p.id)? {
        println!(
            "   Streak: {} current / {} longest, {} missed, multiplier {:.2}",
            streak.current_streak,
            streak.longest_streak,
            streak.missed_count,
            streak.confidence_multiplier
        );
    }

    let obligations = db.obligations_for_pattern(p.id, None, None, None, 6)?;
    if !obligations.is_empty() {
        println!("   Recent obligations:");
        for ob in obligations {
            println!(
                "   - {} [{}] window ±{}d, expecting {} - {}",
                ob.expected_date,
                ob.status,
                ob.tolerance_days,
                ob.expected_min_amount,
                ob.expected_max_amount
            );
        }
    }
    Ok(())
}

pub fn cmd_patterns_pause(db: &Database, user_id: i64, id: i64) -> Result<()> {
    load_owned(db, user_id, id)?;
    db.update_pattern_status(id, PatternStatus::Paused)?;
    println!("⏸️  Pattern {} paused", id);
    Ok(())
}

pub fn cmd_patterns_resume(db: &Database, user_id: i64, id: i64) -> Result<()> {
    load_owned(db, user_id, id)?;
    db.update_pattern_status(id, PatternStatus::Active)?;
    println!("▶️  Pattern {} resumed", id);
    Ok(())
}

pub fn cmd_patterns_delete(db: &Database, user_id: i64, id: i64, force: bool) -> Result<()> {
    load_owned(db, user_id, id)?;
    if force {
        db.delete_pattern(id)?;
        println!("🗑️  Pattern {} deleted (history removed)", id);
    } else {
        db.cancel_pending_obligation(id)?;
        db.update_pattern_status(id, PatternStatus::Archived)?;
        println!("📦 Pattern {} archived (use --force to delete history)", id);
    }
    Ok(())
}

pub fn cmd_upcoming(db: &Database, user_id: i64, days: i64) -> Result<()> {
    if days < 0 {
        return Err(anyhow!("--days must be non-negative"));
    }
    let today = Utc::now().date_naive();
    let until = today + chrono::Duration::days(days);
    let obligations = db.upcoming_obligations(user_id, until)?;

    if obligations.is_empty() {
        println!("🎉 Nothing due in the next {} days", days);
        return Ok(());
    }

    println!("📅 Obligations due by {}", until);
    for ob in obligations {
        let pattern = db.get_pattern(ob.pattern_id)?;
        let payee = match &pattern {
            Some(p) => db
                .get_payee(p.payee_id)?
                .map(|x| x.name)
                .unwrap_or_else(|| format!("payee {}", p.payee_id)),
            None => "?".to_string(),
        };
        let overdue = if ob.overdue_at(today) { " ⚠️ overdue" } else { "" };
        println!(
            "   {} {} expecting {} - {} (pattern #{}){}",
            ob.expected_date,
            payee,
            ob.expected_min_amount,
            ob.expected_max_amount,
            ob.pattern_id,
            overdue
        );
    }
    Ok(())
}
