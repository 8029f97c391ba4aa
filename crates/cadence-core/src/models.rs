//! Domain models for Cadence

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A normalised transaction counterparty (the ingestion pipeline resolves
/// raw descriptions to a stable payee identity before the core ever sees
/// a transaction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payee {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A currency, referenced by every transaction and pattern. Patterns never
/// mix currencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    pub id: i64,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// Whether the user was debited or credited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable transaction fact, written by the out-of-core ingestion
/// producer. The core never mutates these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub payee_id: i64,
    pub direction: Direction,
    pub currency_id: i64,
    /// When the money moved (UTC)
    pub occurred_at: DateTime<Utc>,
    /// Non-negative; direction carries the sign
    pub amount: Decimal,
    /// Unique upstream message id; deduplication happens before ingestion
    pub source_message_id: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Calendar date of the transaction; all interval and tolerance
    /// arithmetic works in whole days.
    pub fn date(&self) -> NaiveDate {
        self.occurred_at.date_naive()
    }
}

/// A transaction to be recorded (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub payee_id: i64,
    pub direction: Direction,
    pub currency_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub amount: Decimal,
    pub source_message_id: String,
}

/// Qualitative bucket of a pattern's interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCase {
    FixedMonthly,
    VariableMonthly,
    FlexibleMonthly,
    BiMonthly,
    Quarterly,
    CustomInterval,
}

impl PatternCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedMonthly => "fixed_monthly",
            Self::VariableMonthly => "variable_monthly",
            Self::FlexibleMonthly => "flexible_monthly",
            Self::BiMonthly => "bi_monthly",
            Self::Quarterly => "quarterly",
            Self::CustomInterval => "custom_interval",
        }
    }

    /// All three monthly sub-cases share matching tolerance and day hints
    pub fn is_monthly_family(&self) -> bool {
        matches!(
            self,
            Self::FixedMonthly | Self::VariableMonthly | Self::FlexibleMonthly
        )
    }

    /// Matching tolerance in whole days around an expected date.
    ///
    /// Custom intervals scale with the interval itself, never dropping
    /// below 2 days (a 28-day recharge gets max(2, round(0.15*28)) = 4).
    pub fn tolerance_days(&self, interval_days: i64) -> i64 {
        match self {
            Self::FixedMonthly | Self::VariableMonthly | Self::FlexibleMonthly => 3,
            Self::BiMonthly => 5,
            Self::Quarterly => 7,
            Self::CustomInterval => {
                let scaled = (interval_days as f64 * 0.15).round() as i64;
                scaled.max(2)
            }
        }
    }
}

impl std::str::FromStr for PatternCase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fixed_monthly" => Ok(Self::FixedMonthly),
            "variable_monthly" => Ok(Self::VariableMonthly),
            "flexible_monthly" => Ok(Self::FlexibleMonthly),
            "bi_monthly" => Ok(Self::BiMonthly),
            "quarterly" => Ok(Self::Quarterly),
            "custom_interval" => Ok(Self::CustomInterval),
            _ => Err(format!("Unknown pattern case: {}", s)),
        }
    }
}

impl std::fmt::Display for PatternCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Qualitative band of amount variability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountBehaviour {
    Fixed,
    Variable,
    HighlyVariable,
}

impl AmountBehaviour {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Variable => "variable",
            Self::HighlyVariable => "highly_variable",
        }
    }
}

impl std::str::FromStr for AmountBehaviour {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "variable" => Ok(Self::Variable),
            "highly_variable" => Ok(Self::HighlyVariable),
            _ => Err(format!("Unknown amount behaviour: {}", s)),
        }
    }
}

impl std::fmt::Display for AmountBehaviour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pattern lifecycle state
///
/// Runtime misses degrade active -> paused -> broken; a successful match
/// recovers any of them back to active. Archived is the user-facing soft
/// delete and is never entered or left by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    Active,
    Paused,
    Broken,
    Archived,
}

impl PatternStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Broken => "broken",
            Self::Archived => "archived",
        }
    }
}

impl std::str::FromStr for PatternStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "broken" => Ok(Self::Broken),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown pattern status: {}", s)),
        }
    }
}

impl std::fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A discovered recurring series. Several patterns may share the same
/// (user, payee, direction, currency) key - one per independent schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: i64,
    pub user_id: i64,
    pub payee_id: i64,
    pub direction: Direction,
    pub currency_id: i64,
    pub interval_days: i64,
    pub pattern_case: PatternCase,
    pub amount_behaviour: AmountBehaviour,
    /// Median of the inlier amount band
    pub representative_amount: Decimal,
    /// Full observed range, outliers included
    pub amount_min: Decimal,
    pub amount_max: Decimal,
    /// Rounded circular-median day of month; only set for the monthly family
    pub day_of_month_hint: Option<u32>,
    pub status: PatternStatus,
    /// Discovery-time regularity score in [0, 1]
    pub confidence: f64,
    /// Incremented on every re-discovery touching this pattern
    pub detection_version: i64,
    /// Optional advisory annotation from the summariser
    pub summary: Option<String>,
    pub last_evaluated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Pattern {
    pub fn tolerance_days(&self) -> i64 {
        self.pattern_case.tolerance_days(self.interval_days)
    }
}

/// Per-pattern fulfilment history; 1:1 with Pattern, mutated only by the
/// runtime matcher after being seeded at discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStreak {
    pub pattern_id: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub missed_count: i64,
    pub last_actual_date: Option<NaiveDate>,
    pub last_expected_date: Option<NaiveDate>,
    /// Runtime factor in [0, 1] multiplied against discovery confidence
    /// for display; +0.05 per fulfilment, -0.15 per miss
    pub confidence_multiplier: f64,
}

/// Obligation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObligationStatus {
    Expected,
    Fulfilled,
    Missed,
    Cancelled,
}

impl ObligationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expected => "expected",
            Self::Fulfilled => "fulfilled",
            Self::Missed => "missed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ObligationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "expected" => Ok(Self::Expected),
            "fulfilled" => Ok(Self::Fulfilled),
            "missed" => Ok(Self::Missed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown obligation status: {}", s)),
        }
    }
}

impl std::fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An expected future occurrence of a pattern. Exactly one obligation per
/// live pattern is `expected` at rest; resolved obligations persist for
/// history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obligation {
    pub id: i64,
    pub pattern_id: i64,
    pub expected_date: NaiveDate,
    pub tolerance_days: i64,
    pub expected_min_amount: Decimal,
    pub expected_max_amount: Decimal,
    pub status: ObligationStatus,
    pub fulfilled_by_transaction_id: Option<i64>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    /// expected_date - actual date; negative when the payment came late
    pub days_early: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Obligation {
    /// Inclusive match window in whole days
    pub fn window_contains(&self, date: NaiveDate) -> bool {
        (date - self.expected_date).num_days().abs() <= self.tolerance_days
    }

    /// Whether `date` is past the window entirely (the obligation can no
    /// longer be fulfilled by a transaction on that date)
    pub fn overdue_at(&self, date: NaiveDate) -> bool {
        (date - self.expected_date).num_days() > self.tolerance_days
    }
}

/// An append-only link between a pattern and a transaction. Ground truth
/// for series membership and the "already assigned" filter for
/// re-discovery. Never deleted outside a confirmed pattern hard-delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternTransactionLink {
    pub pattern_id: i64,
    pub transaction_id: i64,
    pub linked_at: DateTime<Utc>,
}

/// Matcher work that exhausted its retry budget. Parked, never dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: i64,
    pub transaction_id: i64,
    pub error: String,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_roundtrip() {
        assert_eq!("debit".parse::<Direction>().unwrap(), Direction::Debit);
        assert_eq!(Direction::Credit.as_str(), "credit");
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_tolerance_by_case() {
        assert_eq!(PatternCase::FixedMonthly.tolerance_days(30), 3);
        assert_eq!(PatternCase::BiMonthly.tolerance_days(60), 5);
        assert_eq!(PatternCase::Quarterly.tolerance_days(90), 7);
        // 28-day recharge: max(2, round(4.2)) = 4
        assert_eq!(PatternCase::CustomInterval.tolerance_days(28), 4);
        // short custom intervals floor at 2
        assert_eq!(PatternCase::CustomInterval.tolerance_days(10), 2);
        // long custom intervals keep scaling
        assert_eq!(PatternCase::CustomInterval.tolerance_days(200), 30);
    }

    #[test]
    fn test_obligation_window() {
        let ob = Obligation {
            id: 1,
            pattern_id: 1,
            expected_date: NaiveDate::from_ymd_opt(2026, 1, 29).unwrap(),
            tolerance_days: 3,
            expected_min_amount: Decimal::from(100),
            expected_max_amount: Decimal::from(100),
            status: ObligationStatus::Expected,
            fulfilled_by_transaction_id: None,
            fulfilled_at: None,
            days_early: None,
            created_at: Utc::now(),
        };

        assert!(ob.window_contains(NaiveDate::from_ymd_opt(2026, 1, 26).unwrap()));
        assert!(ob.window_contains(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()));
        assert!(!ob.window_contains(NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()));
        assert!(ob.overdue_at(NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()));
        assert!(!ob.overdue_at(NaiveDate::from_ymd_opt(2026, 1, 20).unwrap()));
    }
}
