//! Seasonal revenue targets and performance trend classification.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use socialmart_core::Money;

/// Seasonal weight per calendar month, January first. Peaks in November and December.
pub const SEASONAL_FACTORS: [f64; 12] = [1.0, 1.0, 1.05, 1.05, 1.1, 1.1, 1.15, 1.15, 1.2, 1.25, 1.4, 1.5];

/// Band around the reference value inside which a value counts as unchanged (5%).
pub const TREND_BAND: f64 = 0.05;

/// Seasonally weighted revenue targets.
///
/// `monthly = base * (1 + monthly_growth)^month_index * SEASONAL_FACTORS[month_index]`,
/// with a 0-based month index. A weekly target is a quarter of the monthly one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevenueTargets {
    /// Target for January before seasonal weighting
    pub base: Money,
    /// Month-over-month growth (0.05 = 5%)
    pub monthly_growth: f64,
}

impl RevenueTargets {
    /// Create a target model
    #[must_use]
    pub const fn new(base: Money, monthly_growth: f64) -> Self {
        Self { base, monthly_growth }
    }

    /// Target for the calendar month containing `at`
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn monthly(&self, at: DateTime<Utc>) -> Money {
        let month_index = at.month0() as usize;
        let growth = (1.0 + self.monthly_growth).powi(month_index as i32);
        let target = self.base.minor() as f64 * growth * SEASONAL_FACTORS[month_index % 12];
        if target.is_finite() && target > 0.0 {
            Money::from_minor(target.round() as u64)
        } else {
            Money::ZERO
        }
    }

    /// Target for a week in the month containing `at`
    #[must_use]
    pub fn weekly(&self, at: DateTime<Utc>) -> Money {
        self.monthly(at).checked_div(4).unwrap_or_default()
    }
}

/// Progress against a revenue target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalesTarget {
    /// Revenue so far
    pub current: Money,
    /// Target
    pub target: Money,
    /// `current / target * 100`, `0` without a target
    pub percentage: f64,
    /// Days left in the current calendar month, today included
    pub days_left: i64,
}

impl SalesTarget {
    /// Measure `current` against `target` at `now`
    #[must_use]
    pub fn measure(current: Money, target: Money, now: DateTime<Utc>) -> Self {
        let percentage = if target.is_zero() {
            0.0
        } else {
            current.as_major_f64() / target.as_major_f64() * 100.0
        };
        Self { current, target, percentage, days_left: days_left_in_month(now) }
    }
}

fn days_left_in_month(now: DateTime<Utc>) -> i64 {
    let today = now.date_naive();
    let (year, month) = if today.month() == 12 { (today.year() + 1, 1) } else { (today.year(), today.month() + 1) };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map_or(0, |next| (next - today).num_days())
        .max(0)
}

/// Latest value compared with the window mean.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Performance {
    /// More than 5% above the mean
    AboveAverage,
    /// More than 5% below the mean
    BelowAverage,
    /// Within 5% of the mean
    Average,
}

/// Last value compared with the first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// More than 5% above the first value
    Increasing,
    /// More than 5% below the first value
    Decreasing,
    /// Within 5% of the first value
    Stable,
}

/// Classification of a bucket series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTrend {
    /// Latest against mean
    pub performance: Performance,
    /// Last against first
    pub direction: Direction,
    /// Latest bucket value
    pub latest: f64,
    /// Mean of all buckets
    pub mean: f64,
}

fn compare(value: f64, reference: f64) -> std::cmp::Ordering {
    if value > reference * (1.0 + TREND_BAND) {
        std::cmp::Ordering::Greater
    } else if value < reference * (1.0 - TREND_BAND) {
        std::cmp::Ordering::Less
    } else {
        std::cmp::Ordering::Equal
    }
}

/// Classify a series of bucket values, oldest first.
///
/// An empty series is average and stable.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classify(values: &[f64]) -> PerformanceTrend {
    let (Some(first), Some(latest)) = (values.first().copied(), values.last().copied()) else {
        return PerformanceTrend {
            performance: Performance::Average,
            direction: Direction::Stable,
            latest: 0.0,
            mean: 0.0,
        };
    };
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    let performance = match compare(latest, mean) {
        std::cmp::Ordering::Greater => Performance::AboveAverage,
        std::cmp::Ordering::Less => Performance::BelowAverage,
        std::cmp::Ordering::Equal => Performance::Average,
    };
    let direction = match compare(latest, first) {
        std::cmp::Ordering::Greater => Direction::Increasing,
        std::cmp::Ordering::Less => Direction::Decreasing,
        std::cmp::Ordering::Equal => Direction::Stable,
    };
    PerformanceTrend { performance, direction, latest, mean }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(month: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_january_target_is_the_base() {
        let targets = RevenueTargets::new(Money::from_major(10_000), 0.05);
        assert_eq!(targets.monthly(at(1)), Money::from_major(10_000));
        assert_eq!(targets.weekly(at(1)), Money::from_major(2_500));
    }

    #[test]
    fn test_december_target_applies_growth_and_season() {
        let targets = RevenueTargets::new(Money::from_major(10_000), 0.0);
        assert_eq!(targets.monthly(at(12)), Money::from_major(15_000));
        assert!(targets.monthly(at(11)) > targets.monthly(at(6)));
    }

    #[test]
    fn test_seasonal_table_range() {
        assert!(SEASONAL_FACTORS.iter().all(|f| (1.0..=1.5).contains(f)));
        let peak = SEASONAL_FACTORS.iter().copied().fold(0.0, f64::max);
        assert!((SEASONAL_FACTORS[11] - peak).abs() < f64::EPSILON);
    }

    #[test]
    fn test_target_percentage_without_target() {
        let target = SalesTarget::measure(Money::from_major(10), Money::ZERO, at(6));
        assert!(target.percentage.abs() < f64::EPSILON);
        let target = SalesTarget::measure(Money::from_major(25), Money::from_major(100), at(6));
        assert!((target.percentage - 25.0).abs() < 1e-9);
        assert_eq!(target.days_left, 21);
    }

    #[test]
    fn test_classify() {
        let rising = classify(&[10.0, 10.0, 10.0, 40.0]);
        assert_eq!(rising.performance, Performance::AboveAverage);
        assert_eq!(rising.direction, Direction::Increasing);

        let flat = classify(&[100.0, 98.0, 102.0, 101.0]);
        assert_eq!(flat.performance, Performance::Average);
        assert_eq!(flat.direction, Direction::Stable);

        let falling = classify(&[50.0, 40.0, 10.0]);
        assert_eq!(falling.performance, Performance::BelowAverage);
        assert_eq!(falling.direction, Direction::Decreasing);

        assert_eq!(classify(&[]).direction, Direction::Stable);
    }
}
