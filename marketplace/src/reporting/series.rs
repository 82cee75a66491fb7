//! Per-day series, growth rates and regional breakdowns.
//!
//! Every series is backfilled: each calendar day of the period has a bucket, with zeros
//! where nothing happened.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use socialmart_core::{Customer, Money, Period, Sale};
use std::collections::BTreeMap;

/// Sales of one calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    /// UTC day
    pub date: NaiveDate,
    /// Sum of sale amounts
    pub revenue: Money,
    /// Sum of sale profits
    pub profit: Money,
    /// Number of sales
    pub orders: u64,
}

/// A count for one calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    /// UTC day
    pub date: NaiveDate,
    /// Count
    pub count: u64,
}

/// Revenue and orders of one region, compared with the previous window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionalFigures {
    /// Region name
    pub region: String,
    /// Revenue in the window
    pub revenue: Money,
    /// Sales in the window
    pub orders: u64,
    /// Revenue in the previous window
    pub previous_revenue: Money,
    /// Revenue growth against the previous window, in percent
    pub growth: f64,
}

/// `(current - previous) / previous * 100`, or `0` when `previous` is zero.
#[must_use]
pub fn growth_rate(current: f64, previous: f64) -> f64 {
    if previous.abs() < f64::EPSILON {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

/// [`growth_rate`] of two amounts
#[must_use]
pub fn money_growth(current: Money, previous: Money) -> f64 {
    growth_rate(current.as_major_f64(), previous.as_major_f64())
}

/// [`growth_rate`] of two counts
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn count_growth(current: u64, previous: u64) -> f64 {
    growth_rate(current as f64, previous as f64)
}

/// One bucket per day of `period`, filled from `sales` inside it.
#[must_use]
pub fn daily_sales(period: Period, sales: &[Sale]) -> Vec<DailySales> {
    let mut buckets: BTreeMap<NaiveDate, DailySales> = period
        .days()
        .into_iter()
        .map(|date| (date, DailySales { date, revenue: Money::ZERO, profit: Money::ZERO, orders: 0 }))
        .collect();

    for sale in sales.iter().filter(|s| period.contains(s.created_at)) {
        if let Some(bucket) = buckets.get_mut(&sale.created_at.date_naive()) {
            bucket.revenue = bucket.revenue.saturating_add(sale.amount);
            bucket.profit = bucket.profit.saturating_add(sale.profit);
            bucket.orders += 1;
        }
    }
    buckets.into_values().collect()
}

/// New customers per day of `period`.
#[must_use]
pub fn daily_new_customers(period: Period, customers: &[Customer]) -> Vec<DailyCount> {
    let mut buckets: BTreeMap<NaiveDate, u64> = period.days().into_iter().map(|d| (d, 0)).collect();
    for customer in customers.iter().filter(|c| period.contains(c.created_at)) {
        if let Some(count) = buckets.get_mut(&customer.created_at.date_naive()) {
            *count += 1;
        }
    }
    buckets.into_iter().map(|(date, count)| DailyCount { date, count }).collect()
}

/// Total revenue of `sales`
#[must_use]
pub fn revenue(sales: &[Sale]) -> Money {
    sales.iter().map(|s| s.amount).sum()
}

/// Per-region figures of `current`, each compared with the same region in `previous`.
///
/// Sales without a region are left out. Ordered by revenue descending, then region name.
#[must_use]
pub fn regional_breakdown(current: &[Sale], previous: &[Sale]) -> Vec<RegionalFigures> {
    let mut before: BTreeMap<&str, Money> = BTreeMap::new();
    for sale in previous {
        if let Some(region) = sale.region.as_deref() {
            let total = before.entry(region).or_default();
            *total = total.saturating_add(sale.amount);
        }
    }

    let mut now: BTreeMap<&str, (Money, u64)> = BTreeMap::new();
    for sale in current {
        if let Some(region) = sale.region.as_deref() {
            let (total, orders) = now.entry(region).or_default();
            *total = total.saturating_add(sale.amount);
            *orders += 1;
        }
    }

    let mut figures: Vec<RegionalFigures> = now
        .into_iter()
        .map(|(region, (revenue, orders))| {
            let previous_revenue = before.get(region).copied().unwrap_or_default();
            RegionalFigures {
                region: region.to_string(),
                revenue,
                orders,
                previous_revenue,
                growth: money_growth(revenue, previous_revenue),
            }
        })
        .collect();
    figures.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.region.cmp(&b.region)));
    figures
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use socialmart_core::environment::Clock;
    use socialmart_core::{CustomerId, Platform, ProductId, SaleId, TransactionId};
    use socialmart_testing::test_clock;

    fn sale(amount: u64, region: Option<&str>, days_ago: i64) -> Sale {
        let amount = Money::from_major(amount);
        Sale {
            id: SaleId::new(),
            transaction_id: TransactionId::new(),
            product_id: ProductId::new(),
            customer_id: CustomerId::new(),
            amount,
            quantity: 1,
            profit: amount.percent(20),
            region: region.map(str::to_string),
            product_type: Platform::Instagram,
            payment_method: "flutterwave".to_string(),
            created_at: test_clock().now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_growth_against_zero_baseline_is_zero() {
        assert!(growth_rate(1_000.0, 0.0).abs() < f64::EPSILON);
        assert!((growth_rate(150.0, 100.0) - 50.0).abs() < 1e-9);
        assert!((money_growth(Money::from_major(50), Money::from_major(100)) + 50.0).abs() < 1e-9);
        assert!(count_growth(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_daily_series_is_backfilled() {
        let period = Period::trailing_days(test_clock().now(), 7);
        let series = daily_sales(period, &[sale(100, None, 1), sale(50, None, 1), sale(10, None, 30)]);

        assert_eq!(series.len(), period.days().len());
        let busy: Vec<_> = series.iter().filter(|b| b.orders > 0).collect();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].revenue, Money::from_major(150));
        assert_eq!(busy[0].profit, Money::from_major(30));
        assert_eq!(busy[0].orders, 2);
    }

    #[test]
    fn test_regional_breakdown_with_growth() {
        let current = [sale(300, Some("lagos"), 1), sale(100, Some("abuja"), 2), sale(50, None, 1)];
        let previous = [sale(200, Some("lagos"), 10)];
        let regions = regional_breakdown(&current, &previous);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region, "lagos");
        assert!((regions[0].growth - 50.0).abs() < 1e-9);
        assert_eq!(regions[1].region, "abuja");
        assert!(regions[1].growth.abs() < f64::EPSILON);
    }

    #[test]
    fn test_new_customers_per_day() {
        let now = test_clock().now();
        let period = Period::trailing_days(now, 3);
        let joined = Customer::new("Ngozi", "ngozi@example.com", now - Duration::hours(1));
        let early = Customer::new("Emeka", "emeka@example.com", now - Duration::days(10));

        let series = daily_new_customers(period, &[joined, early]);
        assert_eq!(series.iter().map(|d| d.count).sum::<u64>(), 1);
    }
}
