//! Cluster splitter
//!
//! A single payee can legitimately carry several independent schedules
//! (three chit payments on roughly the 5th, 15th, and 22nd with three
//! distinct amount bands). Treating them as one series would produce a
//! single low-confidence pattern with inflated amount variance, so a group
//! is partitioned into candidate clusters before interval inference:
//! first by amount band, then by day-of-month window when the days inside
//! a band still spread too wide. Deterministic, no learned model.

use rust_decimal::Decimal;
use tracing::debug;

use super::grouping::CandidateGroup;
use super::DiscoveryConfig;
use crate::models::Transaction;
use crate::stats;

/// Symmetric amount tolerance around a band centre: a relative share of
/// the centre or an absolute floor, whichever is larger. Shared by the
/// splitter, the engine's inlier banding, and the natural-key lookup.
pub fn amount_tolerance(centre: Decimal, config: &DiscoveryConfig) -> Decimal {
    let relative = (centre * config.amount_tolerance_ratio).abs();
    relative.max(config.amount_tolerance_floor)
}

/// Partition a group's transactions into candidate clusters. Each returned
/// cluster has at least `min_cluster_size` members and is fed to the
/// discovery engine independently.
pub fn split_clusters(group: &CandidateGroup, config: &DiscoveryConfig) -> Vec<Vec<Transaction>> {
    let bands = split_by_amount(&group.transactions, config);

    let mut clusters = Vec::new();
    for band in bands {
        for cluster in split_by_day_window(band, config) {
            if cluster.len() < config.min_cluster_size {
                debug!(
                    payee_id = group.key.payee_id,
                    size = cluster.len(),
                    "Dropping undersized cluster"
                );
                continue;
            }
            clusters.push(cluster);
        }
    }

    // Oldest-first inside each cluster; bands ordered by amount already
    for cluster in &mut clusters {
        cluster.sort_by_key(|t| t.occurred_at);
    }
    clusters
}

/// Greedy 1D agglomerative clustering over sorted amounts: walk the
/// transactions in ascending amount order and open a new band whenever the
/// gap to the running band's centroid exceeds tolerance. Processing in
/// sorted order means a borderline amount lands in the earlier
/// (lower-amount) band, which is the tie-break we want.
fn split_by_amount(
    transactions: &[Transaction],
    config: &DiscoveryConfig,
) -> Vec<Vec<Transaction>> {
    let mut sorted: Vec<Transaction> = transactions.to_vec();
    sorted.sort_by(|a, b| a.amount.cmp(&b.amount).then(a.occurred_at.cmp(&b.occurred_at)));

    let mut bands: Vec<Vec<Transaction>> = Vec::new();
    let mut current: Vec<Transaction> = Vec::new();
    let mut centroid = Decimal::ZERO;

    for tx in sorted {
        if current.is_empty() {
            centroid = tx.amount;
            current.push(tx);
            continue;
        }
        if (tx.amount - centroid).abs() <= amount_tolerance(centroid, config) {
            current.push(tx);
            let sum: Decimal = current.iter().map(|t| t.amount).sum();
            centroid = sum / Decimal::from(current.len() as i64);
        } else {
            bands.push(std::mem::take(&mut current));
            centroid = tx.amount;
            current.push(tx);
        }
    }
    if !current.is_empty() {
        bands.push(current);
    }
    bands
}

/// Within an amount band, accept the whole band when its days of month fit
/// inside a tight wrap-aware window; otherwise fall back to the fixed
/// early/mid/late thirds of the month.
fn split_by_day_window(band: Vec<Transaction>, config: &DiscoveryConfig) -> Vec<Vec<Transaction>> {
    use chrono::Datelike;

    let days: Vec<u32> = band.iter().map(|t| t.date().day()).collect();
    if stats::circular_day_span(&days) <= config.day_window_span {
        return vec![band];
    }

    let mut windows: [Vec<Transaction>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for tx in band {
        let idx = match tx.date().day() {
            1..=10 => 0,
            11..=20 => 1,
            _ => 2,
        };
        windows[idx].push(tx);
    }
    windows.into_iter().filter(|w| !w.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::grouping::GroupKey;
    use crate::models::Direction;
    use chrono::{TimeZone, Utc};

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

    fn group(transactions: Vec<Transaction>) -> CandidateGroup {
        CandidateGroup {
            key: GroupKey {
                user_id: 1,
                payee_id: 1,
                direction: Direction::Debit,
                currency_id: 1,
            },
            transactions,
        }
    }

    #[test]
    fn test_amount_tolerance_floor_and_ratio() {
        let config = DiscoveryConfig::default();
        // 25% of 8500 = 2125 beats the floor
        assert_eq!(
            amount_tolerance(Decimal::from(8500), &config),
            Decimal::from(2125)
        );
        // 25% of 100 = 25 loses to the 50 floor
        assert_eq!(
            amount_tolerance(Decimal::from(100), &config),
            Decimal::from(50)
        );
    }

    #[test]
    fn test_single_series_stays_whole() {
        let config = DiscoveryConfig::default();
        let g = group(vec![
            tx(1, 2025, 10, 5, 199),
            tx(2, 2025, 11, 5, 199),
            tx(3, 2025, 12, 5, 199),
        ]);
        let clusters = split_clusters(&g, &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn test_three_chit_schedules_split_into_three_clusters() {
        let config = DiscoveryConfig::default();
        // three monthly series: ~day 2 @ 8500, ~day 8 @ 4300, ~day 13 @ 2400
        let g = group(vec![
            tx(1, 2025, 10, 2, 8500),
            tx(2, 2025, 11, 3, 8500),
            tx(3, 2025, 12, 2, 8600),
            tx(4, 2025, 10, 8, 4300),
            tx(5, 2025, 11, 7, 4300),
            tx(6, 2025, 12, 9, 4250),
            tx(7, 2025, 10, 13, 2400),
            tx(8, 2025, 11, 13, 2400),
            tx(9, 2025, 12, 14, 2450),
        ]);
        let clusters = split_clusters(&g, &config);
        assert_eq!(clusters.len(), 3);
        assert!(clusters.iter().all(|c| c.len() == 3));
    }

    #[test]
    fn test_same_amount_different_day_windows_split() {
        let config = DiscoveryConfig::default();
        // one amount band, but two schedules at the 2nd and the 22nd
        let g = group(vec![
            tx(1, 2025, 10, 2, 1000),
            tx(2, 2025, 11, 2, 1000),
            tx(3, 2025, 12, 2, 1000),
            tx(4, 2025, 10, 22, 1000),
            tx(5, 2025, 11, 22, 1000),
            tx(6, 2025, 12, 22, 1000),
        ]);
        let clusters = split_clusters(&g, &config);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_undersized_clusters_dropped() {
        let config = DiscoveryConfig::default();
        // the 95000 one-off is its own band and gets dropped
        let g = group(vec![
            tx(1, 2025, 10, 5, 199),
            tx(2, 2025, 11, 5, 199),
            tx(3, 2025, 12, 5, 199),
            tx(4, 2025, 11, 20, 95000),
        ]);
        let clusters = split_clusters(&g, &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn test_month_boundary_days_not_split() {
        let config = DiscoveryConfig::default();
        // payroll drifting across the month boundary stays one cluster
        let g = group(vec![
            tx(1, 2025, 10, 31, 16500),
            tx(2, 2025, 12, 1, 16500),
            tx(3, 2025, 12, 30, 16500),
        ]);
        let clusters = split_clusters(&g, &config);
        assert_eq!(clusters.len(), 1);
    }
}
