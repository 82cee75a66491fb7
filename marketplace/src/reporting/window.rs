//! Named reporting windows.
//!
//! Named windows are aligned to UTC calendar days and include the current day, so a sale
//! settled a moment ago is always inside the window reported on.

use crate::error::ValidationError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use socialmart_core::Period;
use std::fmt;
use std::str::FromStr;

/// Length of the weekly window in days
pub const WEEKLY_DAYS: i64 = 7;
/// Length of the monthly window in days
pub const MONTHLY_DAYS: i64 = 30;
/// Longest explicit range a report accepts, in days
pub const MAX_CUSTOM_DAYS: i64 = 366;

/// Time range requested by a dashboard or report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// The current day
    Today,
    /// The last 7 days including today
    Weekly,
    /// The last 30 days including today
    Monthly,
    /// The calendar year to date
    Year,
    /// An explicit half-open period
    Custom(Period),
}

impl TimeRange {
    /// Resolve the range against `now`.
    #[must_use]
    pub fn period(&self, now: DateTime<Utc>) -> Period {
        let tomorrow = start_of_day(now.date_naive() + Duration::days(1));
        match self {
            Self::Today => Period::new(tomorrow - Duration::days(1), tomorrow),
            Self::Weekly => Period::new(tomorrow - Duration::days(WEEKLY_DAYS), tomorrow),
            Self::Monthly => Period::new(tomorrow - Duration::days(MONTHLY_DAYS), tomorrow),
            Self::Year => {
                let first = NaiveDate::from_ymd_opt(now.year(), 1, 1).unwrap_or_else(|| now.date_naive());
                Period::new(start_of_day(first), tomorrow)
            }
            Self::Custom(period) => *period,
        }
    }

    /// Resolve the range against `now`, rejecting explicit ranges reports cannot cover.
    ///
    /// # Errors
    ///
    /// [`ValidationError::RangeTooLong`] when a custom period spans more than
    /// [`MAX_CUSTOM_DAYS`] days.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<Period, ValidationError> {
        let period = self.period(now);
        if let Self::Custom(_) = self {
            let span = period.duration();
            let max = Duration::days(MAX_CUSTOM_DAYS);
            if span > max {
                let day = Duration::days(1).num_seconds();
                let days = span.num_seconds().saturating_add(day - 1) / day;
                return Err(ValidationError::RangeTooLong { days, max: MAX_CUSTOM_DAYS });
            }
        }
        Ok(period)
    }

    /// Label used in logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Year => "year",
            Self::Custom(_) => "custom",
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::Weekly
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(period) => write!(f, "{}..{}", period.start, period.end),
            other => f.write_str(other.label()),
        }
    }
}

impl FromStr for TimeRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            "year" | "yearly" => Ok(Self::Year),
            _ => Err(ValidationError::UnknownTimeRange(s.to_string())),
        }
    }
}

/// Midnight UTC at the start of `day`
#[must_use]
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}
