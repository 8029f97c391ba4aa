//! Small statistics helpers shared by the splitter, the discovery engine,
//! and the matcher's amount-window estimation.
//!
//! Interval and day-of-month statistics run in f64; amount statistics take
//! decimals in and only drop to f64 for the dimensionless ratios (CV).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Days in the circle used for wrap-aware day-of-month arithmetic. Payroll
/// on the 31st followed by the 1st must read as zero dispersion.
pub const DAY_CYCLE: i64 = 30;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation; 0 for an empty or zero-mean series
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    std_dev(values) / m
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median of a decimal series, exact (the midpoint of the two central
/// values for even lengths)
pub fn decimal_median(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / Decimal::from(2)
    } else {
        sorted[mid]
    }
}

pub fn decimal_mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len() as i64)
}

/// CV of a decimal series (dimensionless, so f64 is fine here)
pub fn decimal_cv(values: &[Decimal]) -> f64 {
    let as_f64: Vec<f64> = values.iter().filter_map(|v| v.to_f64()).collect();
    coefficient_of_variation(&as_f64)
}

/// Standard deviation of a decimal series, returned as a decimal so amount
/// windows stay exact-ish (two decimal places)
pub fn decimal_std_dev(values: &[Decimal]) -> Decimal {
    let as_f64: Vec<f64> = values.iter().filter_map(|v| v.to_f64()).collect();
    Decimal::from_f64_retain(std_dev(&as_f64))
        .unwrap_or(Decimal::ZERO)
        .round_dp(2)
}

/// Circular distance between two points on the day cycle
fn circular_distance(a: i64, b: i64) -> i64 {
    let d = (a - b).rem_euclid(DAY_CYCLE);
    d.min(DAY_CYCLE - d)
}

/// Map a 1-based day of month onto the 0-based cycle. Day 31 folds onto
/// day 1's position so month-boundary jitter stays adjacent.
fn to_cycle(day: u32) -> i64 {
    ((day as i64) - 1).rem_euclid(DAY_CYCLE)
}

/// Circular centre of a set of days of month: the observed value that
/// minimises the sum of squared circular distances. Returns a 1-based day.
pub fn circular_day_center(days: &[u32]) -> Option<u32> {
    if days.is_empty() {
        return None;
    }
    let points: Vec<i64> = days.iter().map(|&d| to_cycle(d)).collect();
    let best = points
        .iter()
        .copied()
        .min_by_key(|&candidate| {
            let cost: i64 = points
                .iter()
                .map(|&p| {
                    let d = circular_distance(p, candidate);
                    d * d
                })
                .sum();
            // stable tie-break on the earlier day
            (cost, candidate)
        })?;
    Some((best + 1) as u32)
}

/// Wrap-aware standard deviation of days of month around their circular
/// centre. A payroll alternating between the 31st and the 1st scores near
/// zero rather than ~15.
pub fn circular_day_std_dev(days: &[u32]) -> f64 {
    let Some(center) = circular_day_center(days) else {
        return 0.0;
    };
    let c = to_cycle(center);
    let sq_sum: i64 = days
        .iter()
        .map(|&d| {
            let dist = circular_distance(to_cycle(d), c);
            dist * dist
        })
        .sum();
    (sq_sum as f64 / days.len() as f64).sqrt()
}

/// Wrap-aware span of a day set: the tightest arc containing every
/// observed day, in days
pub fn circular_day_span(days: &[u32]) -> i64 {
    if days.len() < 2 {
        return 0;
    }
    let mut points: Vec<i64> = days.iter().map(|&d| to_cycle(d)).collect();
    points.sort_unstable();
    points.dedup();
    if points.len() < 2 {
        return 0;
    }
    // span = cycle minus the widest empty gap between consecutive points
    let mut max_gap = 0;
    for w in points.windows(2) {
        max_gap = max_gap.max(w[1] - w[0]);
    }
    let wrap_gap = DAY_CYCLE - points.last().unwrap() + points.first().unwrap();
    max_gap = max_gap.max(wrap_gap);
    DAY_CYCLE - max_gap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_even_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_decimal_median() {
        let values = vec![Decimal::from(4000), Decimal::from(5000), Decimal::from(4000)];
        assert_eq!(decimal_median(&values), Decimal::from(4000));
    }

    #[test]
    fn test_cv_fixed_series_is_zero() {
        let v = vec![30.0, 30.0, 30.0];
        assert_eq!(coefficient_of_variation(&v), 0.0);
    }

    #[test]
    fn test_std_dev() {
        // mean 30, deviations 1 and 1
        let v = vec![31.0, 29.0];
        assert!((std_dev(&v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_circular_day_wraps_month_boundary() {
        // payroll drifting over the month boundary: 31st, 1st, 2nd
        let days = vec![31, 1, 2];
        assert!(circular_day_std_dev(&days) < 1.0);
        assert!(circular_day_span(&days) <= 2);
    }

    #[test]
    fn test_circular_day_spread_detected() {
        // three distinct chit days in one month
        let days = vec![2, 13, 22];
        assert!(circular_day_span(&days) > 10);
        assert!(circular_day_std_dev(&days) > 5.0);
    }

    #[test]
    fn test_circular_center_tight_cluster() {
        let days = vec![5, 6, 5, 7];
        let center = circular_day_center(&days).unwrap();
        assert!((5..=7).contains(&center));
    }
}
