//! Pattern discovery engine
//!
//! Turns one candidate cluster into at most one pattern candidate through a
//! fixed pipeline: validate, interval extraction, frequency screening,
//! stability check, case classification, amount banding, outlier re-check,
//! behaviour classification, confidence scoring. Every stage can reject the
//! cluster with a reason code; nothing here touches the database.
//!
//! Interval-in-days is authoritative throughout. Calendar-month bucketing is
//! deliberately absent: a payroll hitting the 31st and then the 1st is two
//! observations ~30 days apart, and minimum-occurrence checks count
//! transactions, never distinct months.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::cluster::amount_tolerance;
use super::grouping::GroupKey;
use super::DiscoveryConfig;
use crate::db::PatternUpsert;
use crate::models::{AmountBehaviour, PatternCase, Transaction};
use crate::stats;

/// Why a cluster did not become a pattern. Reported to the caller; a
/// rejection is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum ClusterRejection {
    /// Fewer than three distinct transactions after deduplication
    TooFewTransactions { have: usize },
    /// More than the allowed transactions inside a rolling 30-day window;
    /// this is a frequent-purchase relationship, not an obligation
    TooFrequent { max_in_window: usize },
    /// Fewer than two intervals survived the short-interval screen
    TooFewIntervals { have: usize },
    /// Interval standard deviation exceeded the stability bound
    UnstableInterval { std_dev: f64, bound: f64 },
    /// Stable, but outside the [10, 400] day range a recurring obligation
    /// can plausibly have
    IntervalOutOfRange { interval_days: i64 },
    /// No single amount band holds the required share of transactions
    AmountScatter { inlier_fraction: f64 },
    /// Interval statistics no longer stable once amount outliers were
    /// removed
    UnstableWithoutOutliers { std_dev: f64, bound: f64 },
    /// Scored below the confidence cutoff
    LowConfidence { confidence: f64 },
}

impl std::fmt::Display for ClusterRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewTransactions { have } => {
                write!(f, "too few transactions ({})", have)
            }
            Self::TooFrequent { max_in_window } => {
                write!(f, "too frequent ({} in a 30-day window)", max_in_window)
            }
            Self::TooFewIntervals { have } => write!(f, "too few usable intervals ({})", have),
            Self::UnstableInterval { std_dev, bound } => {
                write!(f, "unstable intervals (sd {:.1} > {:.1})", std_dev, bound)
            }
            Self::IntervalOutOfRange { interval_days } => {
                write!(f, "interval {} days out of range", interval_days)
            }
            Self::AmountScatter { inlier_fraction } => {
                write!(f, "amounts scattered ({:.0}% in band)", inlier_fraction * 100.0)
            }
            Self::UnstableWithoutOutliers { std_dev, bound } => {
                write!(
                    f,
                    "unstable without outliers (sd {:.1} > {:.1})",
                    std_dev, bound
                )
            }
            Self::LowConfidence { confidence } => {
                write!(f, "confidence {:.2} below cutoff", confidence)
            }
        }
    }
}

/// A cluster that survived the pipeline: everything persistence needs to
/// upsert a pattern, plus the inlier bookkeeping used for the first
/// obligation's amount window.
#[derive(Debug, Clone)]
pub struct PatternCandidate {
    pub key: GroupKey,
    pub interval_days: i64,
    pub pattern_case: PatternCase,
    pub amount_behaviour: AmountBehaviour,
    pub representative_amount: Decimal,
    pub amount_min: Decimal,
    pub amount_max: Decimal,
    pub day_of_month_hint: Option<u32>,
    pub confidence: f64,
    /// All member transactions, outliers included; every one gets linked
    pub transaction_ids: Vec<i64>,
    pub last_transaction_date: NaiveDate,
    /// Inlier amounts, oldest first; the last three feed the first
    /// obligation's expected range
    pub inlier_amounts: Vec<Decimal>,
}

impl PatternCandidate {
    pub fn to_upsert(&self, config: &DiscoveryConfig) -> PatternUpsert {
        let window_start = self.inlier_amounts.len().saturating_sub(3);
        let window = &self.inlier_amounts[window_start..];
        let (first_min, first_max) = expected_amount_window(
            self.amount_behaviour,
            self.representative_amount,
            window,
        );
        PatternUpsert {
            user_id: self.key.user_id,
            payee_id: self.key.payee_id,
            direction: self.key.direction,
            currency_id: self.key.currency_id,
            interval_days: self.interval_days,
            pattern_case: self.pattern_case,
            amount_behaviour: self.amount_behaviour,
            representative_amount: self.representative_amount,
            amount_min: self.amount_min,
            amount_max: self.amount_max,
            day_of_month_hint: self.day_of_month_hint,
            confidence: self.confidence,
            key_amount_tolerance: amount_tolerance(self.representative_amount, config),
            transaction_ids: self.transaction_ids.clone(),
            last_transaction_date: self.last_transaction_date,
            first_expected_min: first_min,
            first_expected_max: first_max,
        }
    }
}

/// Expected-amount window for the next obligation, re-estimated from the
/// most recent inlier transactions.
///
/// - fixed: the representative amount, both bounds
/// - variable: mean ± 1σ of the window, lower bound floored at 0.95 of the
///   window minimum, upper bound floored at 1.05 of the window maximum so
///   the range always covers the recent observations with headroom
/// - highly variable: plain window min/max
pub fn expected_amount_window(
    behaviour: AmountBehaviour,
    representative: Decimal,
    window: &[Decimal],
) -> (Decimal, Decimal) {
    if window.is_empty() {
        return (representative, representative);
    }
    match behaviour {
        AmountBehaviour::Fixed => (representative, representative),
        AmountBehaviour::Variable => {
            let mean = stats::decimal_mean(window);
            let sd = stats::decimal_std_dev(window);
            let min = window.iter().min().copied().unwrap_or(representative);
            let max = window.iter().max().copied().unwrap_or(representative);
            let floor = min * Decimal::new(95, 2);
            let ceiling = max * Decimal::new(105, 2);
            let lower = (mean - sd).max(floor).round_dp(2);
            let upper = (mean + sd).max(ceiling).round_dp(2);
            (lower, upper)
        }
        AmountBehaviour::HighlyVariable => {
            let min = window.iter().min().copied().unwrap_or(representative);
            let max = window.iter().max().copied().unwrap_or(representative);
            (min, max)
        }
    }
}

/// Run a cluster through the discovery pipeline.
pub fn evaluate_cluster(
    key: GroupKey,
    cluster: &[Transaction],
    config: &DiscoveryConfig,
) -> Result<PatternCandidate, ClusterRejection> {
    // Stage 0: validate. Sort by date and drop exact duplicates (same
    // instant, same amount) - upstream uniqueness should make these
    // impossible, but a redelivered batch must not skew the statistics.
    let mut members: Vec<&Transaction> = cluster.iter().collect();
    members.sort_by_key(|t| (t.occurred_at, t.id));
    members.dedup_by(|a, b| a.occurred_at == b.occurred_at && a.amount == b.amount);

    if members.len() < config.min_cluster_size {
        return Err(ClusterRejection::TooFewTransactions {
            have: members.len(),
        });
    }

    let dates: Vec<NaiveDate> = members.iter().map(|t| t.date()).collect();

    // Stage 2a: frequent-purchase screen over the raw dates
    let max_in_window = max_transactions_in_window(&dates, 30);
    if max_in_window > config.max_per_rolling_window {
        return Err(ClusterRejection::TooFrequent { max_in_window });
    }

    // Stages 1-2b: intervals in whole days, with sub-10-day gaps treated
    // as noise (the later transaction is ignored for interval statistics
    // but stays a cluster member and gets linked)
    let kept_dates = drop_short_gaps(&dates, config.min_interval_days);
    let intervals = intervals_of(&kept_dates);
    if intervals.len() < 2 {
        return Err(ClusterRejection::TooFewIntervals {
            have: intervals.len(),
        });
    }

    // Stage 3: stable interval. A single gap near an integer multiple of
    // the median is one or two missed cycles, not pattern collapse, so
    // fold such gaps back onto the base interval before judging stability.
    let normalised = normalise_missed_cycles(&intervals);
    let (interval_days, interval_sd, stability_bound) = interval_stats(&normalised);
    if interval_sd > stability_bound {
        return Err(ClusterRejection::UnstableInterval {
            std_dev: interval_sd,
            bound: stability_bound,
        });
    }

    // Stage 4: classify by interval range; tighter ranges win overlaps
    let base_case = classify_interval(interval_days)
        .ok_or(ClusterRejection::IntervalOutOfRange { interval_days })?;

    // Stage 5: amount banding inside the cluster. The dominant band must
    // hold the required share; the rest are outliers - withheld from the
    // amount statistics, still linked to the pattern.
    let amounts: Vec<Decimal> = members.iter().map(|t| t.amount).collect();
    let band = dominant_amount_band(&amounts, config);
    let inlier_fraction = band.len() as f64 / members.len() as f64;
    if inlier_fraction < config.min_inlier_fraction {
        return Err(ClusterRejection::AmountScatter { inlier_fraction });
    }

    let band_centre = stats::decimal_median(&band);
    let tolerance = amount_tolerance(band_centre, config);
    let is_inlier =
        |t: &Transaction| (t.amount - band_centre).abs() <= tolerance;

    let inliers: Vec<&&Transaction> = members.iter().filter(|t| is_inlier(t)).collect();

    // Stage 6: re-run the interval stability check on inlier dates only;
    // if the regularity was carried by the outliers, the cluster is noise
    let inlier_dates: Vec<NaiveDate> = inliers.iter().map(|t| t.date()).collect();
    let inlier_kept = drop_short_gaps(&inlier_dates, config.min_interval_days);
    let inlier_intervals = normalise_missed_cycles(&intervals_of(&inlier_kept));
    let (_, inlier_sd, inlier_bound) = interval_stats(&inlier_intervals);
    if inlier_intervals.len() < 2 || inlier_sd > inlier_bound {
        return Err(ClusterRejection::UnstableWithoutOutliers {
            std_dev: inlier_sd,
            bound: inlier_bound,
        });
    }

    // Stage 7: amount behaviour from the inlier band's variability
    let inlier_amounts: Vec<Decimal> = inliers.iter().map(|t| t.amount).collect();
    let amount_cv = stats::decimal_cv(&inlier_amounts);
    let behaviour = if amount_cv <= config.fixed_amount_cv {
        AmountBehaviour::Fixed
    } else if amount_cv <= config.variable_amount_cv {
        AmountBehaviour::Variable
    } else {
        AmountBehaviour::HighlyVariable
    };

    // Monthly family resolves to its sub-case through the behaviour; date
    // regularity stays the primary signal even for highly variable amounts
    let pattern_case = match (base_case, behaviour) {
        (BaseCase::Monthly, AmountBehaviour::Fixed) => PatternCase::FixedMonthly,
        (BaseCase::Monthly, AmountBehaviour::Variable) => PatternCase::VariableMonthly,
        (BaseCase::Monthly, AmountBehaviour::HighlyVariable) => PatternCase::FlexibleMonthly,
        (BaseCase::BiMonthly, _) => PatternCase::BiMonthly,
        (BaseCase::Quarterly, _) => PatternCase::Quarterly,
        (BaseCase::Custom, _) => PatternCase::CustomInterval,
    };

    // Stage 8: confidence
    let days: Vec<u32> = inliers.iter().map(|t| t.date().day()).collect();
    let day_sd = stats::circular_day_std_dev(&days);
    let interval_cv = stats::coefficient_of_variation(&inlier_intervals);

    let case_strength = match pattern_case {
        PatternCase::FixedMonthly
        | PatternCase::BiMonthly
        | PatternCase::Quarterly
        | PatternCase::CustomInterval => 1.0,
        PatternCase::VariableMonthly => 0.8,
        PatternCase::FlexibleMonthly => 0.6,
    };

    let confidence = 0.35 * clamp01(1.0 - interval_cv)
        + 0.25 * clamp01(1.0 - amount_cv)
        + 0.20 * clamp01(1.0 - day_sd / 10.0)
        + 0.15 * (members.len() as f64 / 6.0).min(1.0)
        + 0.05 * case_strength;

    if confidence < config.min_confidence {
        return Err(ClusterRejection::LowConfidence { confidence });
    }

    // Stage 9: emit
    let day_of_month_hint = if pattern_case.is_monthly_family() {
        stats::circular_day_center(&days)
    } else {
        None
    };

    let candidate = PatternCandidate {
        key,
        interval_days,
        pattern_case,
        amount_behaviour: behaviour,
        representative_amount: band_centre,
        amount_min: amounts.iter().min().copied().unwrap_or(band_centre),
        amount_max: amounts.iter().max().copied().unwrap_or(band_centre),
        day_of_month_hint,
        confidence,
        transaction_ids: members.iter().map(|t| t.id).collect(),
        last_transaction_date: *dates.last().expect("validated non-empty"),
        inlier_amounts,
    };
    debug!(
        payee_id = key.payee_id,
        interval = interval_days,
        case = %pattern_case,
        confidence = format!("{:.2}", confidence),
        "Cluster accepted"
    );
    Ok(candidate)
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

enum BaseCase {
    Monthly,
    BiMonthly,
    Quarterly,
    Custom,
}

/// Interval range classification. The monthly band is checked first so an
/// interval in an overlap resolves to the tighter case.
fn classify_interval(interval_days: i64) -> Option<BaseCase> {
    match interval_days {
        27..=33 => Some(BaseCase::Monthly),
        55..=65 => Some(BaseCase::BiMonthly),
        85..=95 => Some(BaseCase::Quarterly),
        10..=400 => Some(BaseCase::Custom),
        _ => None,
    }
}

/// Keep a date only when it is at least `min_gap` days after the last kept
/// one; closer dates are interval noise (an extra mid-cycle payment)
fn drop_short_gaps(dates: &[NaiveDate], min_gap: i64) -> Vec<NaiveDate> {
    let mut kept: Vec<NaiveDate> = Vec::with_capacity(dates.len());
    for &date in dates {
        match kept.last() {
            Some(&last) if (date - last).num_days() < min_gap => continue,
            _ => kept.push(date),
        }
    }
    kept
}

fn intervals_of(dates: &[NaiveDate]) -> Vec<f64> {
    dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() as f64)
        .collect()
}

/// Fold intervals near 2x or 3x the series median back onto the base
/// interval. The skipped cycles themselves surface later as lazy misses at
/// runtime; at discovery time they must not read as instability.
fn normalise_missed_cycles(intervals: &[f64]) -> Vec<f64> {
    if intervals.is_empty() {
        return Vec::new();
    }
    let base = stats::median(intervals);
    if base <= 0.0 {
        return intervals.to_vec();
    }
    intervals
        .iter()
        .map(|&i| {
            let k = (i / base).round();
            if (2.0..=3.0).contains(&k) && (i - k * base).abs() <= (k * base * 0.15).max(3.0) {
                i / k
            } else {
                i
            }
        })
        .collect()
}

/// Median-rounded candidate interval, its standard deviation, and the
/// stability bound max(3 days, 0.15 * median)
fn interval_stats(intervals: &[f64]) -> (i64, f64, f64) {
    let median = stats::median(intervals);
    let sd = stats::std_dev(intervals);
    let bound = (0.15 * median).max(3.0);
    (median.round() as i64, sd, bound)
}

/// Largest count of cluster dates falling inside any `window_days` span
fn max_transactions_in_window(dates: &[NaiveDate], window_days: i64) -> usize {
    let mut max_count = 0;
    let mut start = 0;
    for end in 0..dates.len() {
        while (dates[end] - dates[start]).num_days() >= window_days {
            start += 1;
        }
        max_count = max_count.max(end - start + 1);
    }
    max_count
}

/// The dominant amount band: greedy agglomerative banding over sorted
/// amounts, then the band with the most members (ties go to the lower
/// band, which sorts first)
fn dominant_amount_band(amounts: &[Decimal], config: &DiscoveryConfig) -> Vec<Decimal> {
    let mut sorted = amounts.to_vec();
    sorted.sort();

    let mut bands: Vec<Vec<Decimal>> = Vec::new();
    let mut current: Vec<Decimal> = Vec::new();
    let mut centroid = Decimal::ZERO;
    for amount in sorted {
        if current.is_empty() {
            centroid = amount;
            current.push(amount);
            continue;
        }
        if (amount - centroid).abs() <= amount_tolerance(centroid, config) {
            current.push(amount);
            let sum: Decimal = current.iter().sum();
            centroid = sum / Decimal::from(current.len() as i64);
        } else {
            bands.push(std::mem::take(&mut current));
            centroid = amount;
            current.push(amount);
        }
    }
    if !current.is_empty() {
        bands.push(current);
    }

    bands
        .into_iter()
        .max_by_key(|b| b.len())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use chrono::{TimeZone, Utc};

    fn key() -> GroupKey {
        GroupKey {
            user_id: 1,
            payee_id: 1,
            direction: Direction::Debit,
            currency_id: 1,
        }
    }

    fn tx(id: i64, y: i32, m: u32, d: u32, amount: i64) -> Transaction {
        Transaction {
            id,
            user_id: 1,
            payee_id: 1,
            direction: Direction::Debit,
            currency_id: 1,
            occurred_at: Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap(),
            amount: Decimal::from(amount),
            source_message_id: format!("msg-{}", id),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fixed_monthly_salary_with_skipped_month() {
        // three credits of 16500: Oct 31, Dec 1, Dec 30
        let cluster = vec![
            tx(1, 2025, 10, 31, 16500),
            tx(2, 2025, 12, 1, 16500),
            tx(3, 2025, 12, 30, 16500),
        ];
        let c = evaluate_cluster(key(), &cluster, &DiscoveryConfig::default()).unwrap();
        assert_eq!(c.pattern_case, PatternCase::FixedMonthly);
        assert_eq!(c.interval_days, 30);
        assert_eq!(c.amount_behaviour, AmountBehaviour::Fixed);
        assert_eq!(c.representative_amount, Decimal::from(16500));
        assert!(c.confidence >= 0.80, "confidence {}", c.confidence);
        assert_eq!(
            c.last_transaction_date,
            NaiveDate::from_ymd_opt(2025, 12, 30).unwrap()
        );
    }

    #[test]
    fn test_variable_monthly_support() {
        // 4000 on Oct 1, 5000 on Oct 31, 4000 on Dec 2
        let cluster = vec![
            tx(1, 2025, 10, 1, 4000),
            tx(2, 2025, 10, 31, 5000),
            tx(3, 2025, 12, 2, 4000),
        ];
        let c = evaluate_cluster(key(), &cluster, &DiscoveryConfig::default()).unwrap();
        assert_eq!(c.pattern_case, PatternCase::VariableMonthly);
        assert_eq!(c.interval_days, 31);
        assert_eq!(c.amount_behaviour, AmountBehaviour::Variable);
        assert_eq!(c.representative_amount, Decimal::from(4000));
        assert_eq!(c.amount_min, Decimal::from(4000));
        assert_eq!(c.amount_max, Decimal::from(5000));
        assert!(c.confidence >= 0.70, "confidence {}", c.confidence);
    }

    #[test]
    fn test_28_day_recharge_is_custom_interval() {
        let start = NaiveDate::from_ymd_opt(2025, 9, 5).unwrap();
        let cluster: Vec<Transaction> = (0..5)
            .map(|i| {
                let date = start + chrono::Duration::days(28 * i);
                tx(
                    i + 1,
                    date.year(),
                    date.month(),
                    date.day(),
                    199,
                )
            })
            .collect();
        let c = evaluate_cluster(key(), &cluster, &DiscoveryConfig::default()).unwrap();
        assert_eq!(c.pattern_case, PatternCase::CustomInterval);
        assert_eq!(c.interval_days, 28);
        assert_eq!(c.amount_behaviour, AmountBehaviour::Fixed);
        assert!(c.confidence >= 0.90, "confidence {}", c.confidence);
        // custom tolerance: max(2, round(0.15 * 28)) = 4
        assert_eq!(c.pattern_case.tolerance_days(c.interval_days), 4);
        assert!(c.day_of_month_hint.is_none());
    }

    #[test]
    fn test_frequent_purchases_rejected() {
        // grocery-style: 5 purchases inside one month
        let cluster = vec![
            tx(1, 2025, 10, 2, 800),
            tx(2, 2025, 10, 9, 820),
            tx(3, 2025, 10, 15, 790),
            tx(4, 2025, 10, 22, 805),
            tx(5, 2025, 10, 29, 815),
        ];
        let err = evaluate_cluster(key(), &cluster, &DiscoveryConfig::default()).unwrap_err();
        assert!(matches!(err, ClusterRejection::TooFrequent { .. }));
    }

    #[test]
    fn test_irregular_intervals_rejected() {
        // gaps of 40, 19, and 50 days: no stable base interval, and none of
        // the gaps is a clean multiple of another
        let cluster = vec![
            tx(1, 2025, 1, 1, 1000),
            tx(2, 2025, 2, 10, 1000),
            tx(3, 2025, 3, 1, 1000),
            tx(4, 2025, 4, 20, 1000),
        ];
        let err = evaluate_cluster(key(), &cluster, &DiscoveryConfig::default()).unwrap_err();
        assert!(matches!(err, ClusterRejection::UnstableInterval { .. }));
    }

    #[test]
    fn test_skipped_month_reads_as_missed_cycle_not_collapse() {
        // monthly with one skipped cycle: Jan, Feb, Mar, (skip Apr), May, Jun
        let cluster = vec![
            tx(1, 2025, 1, 5, 2400),
            tx(2, 2025, 2, 4, 2400),
            tx(3, 2025, 3, 6, 2400),
            tx(4, 2025, 5, 5, 2400),
            tx(5, 2025, 6, 4, 2400),
        ];
        let c = evaluate_cluster(key(), &cluster, &DiscoveryConfig::default()).unwrap();
        assert!(c.pattern_case.is_monthly_family());
        assert!((28..=32).contains(&c.interval_days));
    }

    #[test]
    fn test_duplicate_rows_deduped_before_stats() {
        let mut cluster = vec![
            tx(1, 2025, 10, 5, 199),
            tx(2, 2025, 11, 5, 199),
            tx(3, 2025, 12, 5, 199),
        ];
        // same instant and amount as id 2, different row
        let mut dup = tx(4, 2025, 11, 5, 199);
        dup.occurred_at = cluster[1].occurred_at;
        cluster.push(dup);

        let c = evaluate_cluster(key(), &cluster, &DiscoveryConfig::default()).unwrap();
        assert_eq!(c.transaction_ids.len(), 3);
    }

    #[test]
    fn test_low_sample_low_regularity_rejected_on_confidence() {
        // three observations, jittered days and amounts near the variable
        // boundary: passes stability but lands under the 0.40 cutoff once
        // every component is discounted
        let cluster = vec![
            tx(1, 2025, 10, 3, 900),
            tx(2, 2025, 11, 7, 1400),
            tx(3, 2025, 12, 4, 2100),
        ];
        let result = evaluate_cluster(key(), &cluster, &DiscoveryConfig::default());
        // either amount scatter or low confidence - both are rejections,
        // never a pattern
        assert!(result.is_err());
    }

    #[test]
    fn test_expected_amount_window_variable() {
        let window = vec![
            Decimal::from(4000),
            Decimal::from(5000),
            Decimal::from(4000),
        ];
        let (lo, hi) =
            expected_amount_window(AmountBehaviour::Variable, Decimal::from(4000), &window);
        // lower floored at 0.95 * 4000, upper at least 1.05 * 5000
        assert!(lo >= Decimal::from(3800));
        assert!(lo <= Decimal::from(4000));
        assert!(hi >= Decimal::from(5250));
    }

    #[test]
    fn test_expected_amount_window_fixed_and_highly_variable() {
        let window = vec![Decimal::from(180), Decimal::from(260), Decimal::from(205)];
        assert_eq!(
            expected_amount_window(AmountBehaviour::Fixed, Decimal::from(199), &window),
            (Decimal::from(199), Decimal::from(199))
        );
        assert_eq!(
            expected_amount_window(AmountBehaviour::HighlyVariable, Decimal::from(199), &window),
            (Decimal::from(180), Decimal::from(260))
        );
    }
}
