//! Reporting and report job tests against the in-memory entity store.
//!
//! Run with: `cargo test -p socialmart --test reporting_test`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use socialmart::reporting::targets::RevenueTargets;
use socialmart::reporting::window::MAX_CUSTOM_DAYS;
use socialmart::jobs::MIN_REPORT_INTERVAL;
use socialmart::{Marketplace, MarketplaceSettings, MarketError, ReportJob, TimeRange, ValidationError};
use socialmart_core::environment::Clock;
use socialmart_core::{
    ActivityKind, EntityStore, Money, PaymentStatus, Period, Platform, ProductStatus, StoreError,
    TransactionStatus,
};
use socialmart_runtime::{DeadlineExceeded, RetryPolicy};
use socialmart_testing::{InMemoryEntityStore, ManualClock, StoreOperation, fixtures, test_clock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn settings(report_timeout: Duration) -> MarketplaceSettings {
    MarketplaceSettings {
        retry: RetryPolicy::no_retry(),
        targets: RevenueTargets::new(Money::from_major(10_000), 0.0),
        report_timeout,
    }
}

fn marketplace(store: &InMemoryEntityStore, clock: impl Clock + 'static) -> Marketplace {
    Marketplace::new(Arc::new(store.clone()), Arc::new(clock), settings(Duration::from_secs(5)))
}

/// Seed and settle one purchase at the clock's current time
async fn settled_sale(store: &InMemoryEntityStore, market: &Marketplace, clock: &ManualClock, price: u64) {
    let purchase =
        fixtures::seed_settled_purchase(store, Platform::Instagram, Money::from_major(price), clock.now())
            .await
            .unwrap();
    market.settle_transaction(purchase.transaction.id).await.unwrap();
}

// ============================================================================
// Dashboard metrics
// ============================================================================

#[tokio::test]
async fn test_growth_is_zero_without_previous_window() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now());
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 700).await;

    let metrics = market.get_dashboard_metrics(TimeRange::Weekly).await.unwrap();

    assert_eq!(metrics.revenue.value, Money::from_major(700));
    assert_eq!(metrics.revenue.previous_value, Money::ZERO);
    assert!(metrics.revenue.growth.abs() < f64::EPSILON);
    assert!(metrics.revenue.growth.is_finite());
}

#[tokio::test]
async fn test_weekly_growth_against_previous_week() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now() - ChronoDuration::days(7));
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 100).await;
    clock.set(test_clock().now());
    settled_sale(&store, &market, &clock, 200).await;

    let metrics = market.get_dashboard_metrics(TimeRange::Weekly).await.unwrap();

    assert_eq!(metrics.revenue.value, Money::from_major(200));
    assert_eq!(metrics.revenue.previous_value, Money::from_major(100));
    assert!((metrics.revenue.growth - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_metrics_counts_and_target() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now());
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 500).await;
    let pending = fixtures::seed_purchase(&store, Platform::Tiktok, Money::from_major(100), clock.now())
        .await
        .unwrap();

    let metrics = market.get_dashboard_metrics(TimeRange::Monthly).await.unwrap();

    assert_eq!(metrics.transactions.value, 2);
    assert_eq!(metrics.transactions.by_status[TransactionStatus::Completed.as_str()], 1);
    assert_eq!(metrics.transactions.by_status[TransactionStatus::Pending.as_str()], 1);
    assert_eq!(metrics.transactions.average_ticket_size, Money::from_major(300));
    assert_eq!(metrics.customers.value, 2);
    assert_eq!(metrics.products.value, 2);
    assert_eq!(metrics.products.out_of_stock, 1);
    let untouched = store.get_product(pending.product.id).await.unwrap();
    assert_eq!(untouched.status, ProductStatus::Available);

    // June: base 10_000 * 1.1 with zero growth
    assert_eq!(metrics.sales_target.target, Money::from_major(11_000));
    assert_eq!(metrics.sales_target.current, Money::from_major(500));
    assert_eq!(metrics.sales_target.days_left, 16);
}

#[tokio::test]
async fn test_refunded_sale_leaves_revenue() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now());
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 300).await;
    let refunded =
        fixtures::seed_settled_purchase(&store, Platform::Instagram, Money::from_major(700), clock.now())
            .await
            .unwrap();
    market.settle_transaction(refunded.transaction.id).await.unwrap();

    market
        .apply_payment_update(refunded.transaction.id, TransactionStatus::Completed, PaymentStatus::Refunded)
        .await
        .unwrap();

    let metrics = market.get_dashboard_metrics(TimeRange::Weekly).await.unwrap();
    assert_eq!(metrics.revenue.value, Money::from_major(300));
    assert_eq!(metrics.sales_target.current, Money::from_major(300));

    let overview = market.get_dashboard_overview(TimeRange::Today, None).await.unwrap();
    assert_eq!(overview.sales_trends[0].orders, 1);
    assert_eq!(overview.sales_trends[0].revenue, Money::from_major(300));
}

#[tokio::test]
async fn test_unbounded_custom_range_is_rejected() {
    let store = InMemoryEntityStore::new();
    let market = marketplace(&store, test_clock());
    let period = Period::new(DateTime::<Utc>::MIN_UTC, test_clock().now());

    let result = market.get_dashboard_metrics(TimeRange::Custom(period)).await;

    assert!(matches!(
        result,
        Err(MarketError::Validation(ValidationError::RangeTooLong { max: MAX_CUSTOM_DAYS, .. }))
    ));
}

#[tokio::test]
async fn test_overlong_custom_range_is_rejected_by_every_report() {
    let store = InMemoryEntityStore::new();
    let market = marketplace(&store, test_clock());
    let now = test_clock().now();
    let range = TimeRange::Custom(Period::new(now - ChronoDuration::days(400), now));
    let expected = MarketError::Validation(ValidationError::RangeTooLong { days: 400, max: MAX_CUSTOM_DAYS });

    assert_eq!(market.get_dashboard_overview(range, None).await.unwrap_err(), expected);
    assert_eq!(market.sales_report(range, None).await.unwrap_err(), expected);
}

// ============================================================================
// Dashboard overview
// ============================================================================

#[tokio::test]
async fn test_overview_sections() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now());
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 900).await;
    settled_sale(&store, &market, &clock, 300).await;

    let overview = market.get_dashboard_overview(TimeRange::Weekly, None).await.unwrap();

    assert_eq!(overview.sales_trends.len(), 7);
    let today = overview.sales_trends.last().unwrap();
    assert_eq!(today.date, test_clock().now().date_naive());
    assert_eq!(today.orders, 2);
    assert_eq!(today.revenue, Money::from_major(1_200));

    assert_eq!(overview.regional_data.len(), 1);
    assert_eq!(overview.regional_data[0].region, "lagos");
    assert_eq!(overview.regional_data[0].orders, 2);

    assert_eq!(overview.popular_products.len(), 2);
    assert_eq!(overview.customer_growth.new_customers, 2);
    assert_eq!(overview.recent_activities.len(), 2);
    assert!(overview.recent_activities.iter().all(|a| a.kind == ActivityKind::Purchase));
}

#[tokio::test]
async fn test_overview_region_filter() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now());
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 900).await;

    let overview = market
        .get_dashboard_overview(TimeRange::Today, Some("abuja".to_string()))
        .await
        .unwrap();

    assert!(overview.regional_data.is_empty());
    assert!(overview.popular_products.is_empty());
    assert_eq!(overview.sales_trends.len(), 1);
    assert_eq!(overview.sales_trends[0].orders, 0);
}

// ============================================================================
// Sales report
// ============================================================================

#[tokio::test]
async fn test_sales_report_of_custom_period() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 400).await;
    clock.set(Utc.with_ymd_and_hms(2025, 4, 2, 9, 0, 0).unwrap());
    settled_sale(&store, &market, &clock, 600).await;

    let period = socialmart_core::Period::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
    );
    let report = market.sales_report(TimeRange::Custom(period), None).await.unwrap();

    assert_eq!(report.summary.total_revenue, Money::from_major(1_000));
    assert_eq!(report.summary.total_transactions, 2);
    assert_eq!(report.summary.average_transaction_value, Money::from_major(500));
    assert_eq!(report.monthly_sales.len(), 2);
    assert_eq!(report.monthly_sales[0].month, "Mar");
    assert_eq!(report.monthly_sales[1].month, "Apr");
    assert_eq!(report.top_products[0].revenue, Money::from_major(600));
}

// ============================================================================
// Bounded execution
// ============================================================================

#[tokio::test]
async fn test_slow_report_times_out() {
    let store = InMemoryEntityStore::new();
    store.set_latency(StoreOperation::SalesBetween, Duration::from_millis(500));
    let market = Marketplace::new(
        Arc::new(store.clone()),
        Arc::new(test_clock()),
        settings(Duration::from_millis(20)),
    );

    let result = market.sales_report(TimeRange::Weekly, None).await;

    assert_eq!(
        result.unwrap_err(),
        MarketError::Timeout(DeadlineExceeded { operation: "sales_report", limit: Duration::from_millis(20) })
    );
}

#[tokio::test]
async fn test_failed_query_is_a_dependency_error() {
    let store = InMemoryEntityStore::new();
    store.fail_next(StoreOperation::TransactionsBetween, 1);
    let market = marketplace(&store, test_clock());

    let result = market.get_dashboard_metrics(TimeRange::Today).await;

    assert!(matches!(
        result,
        Err(MarketError::Dependency { step: "dashboard_metrics", source: StoreError::Unavailable(_) })
    ));
}

// ============================================================================
// Report job
// ============================================================================

#[tokio::test]
async fn test_report_job_stores_monthly_report() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now());
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 250).await;

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let job = ReportJob::new(market, Arc::new(clock.clone()), Duration::from_secs(3_600), shutdown_rx);
    let run = job.run_once().await.unwrap();

    let saved = store.saved_reports();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].period, run.period);
    assert_eq!(run.period, TimeRange::Monthly.period(clock.now()));
    assert_eq!(saved[0].report["summary"]["total_transactions"], 1);
}

#[tokio::test]
async fn test_report_job_purges_expired_activity() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now() - ChronoDuration::days(40));
    let market = marketplace(&store, clock.clone());
    settled_sale(&store, &market, &clock, 50).await;
    clock.set(test_clock().now());

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let job = ReportJob::new(market, Arc::new(clock.clone()), Duration::from_secs(3_600), shutdown_rx);
    let run = job.run_once().await.unwrap();

    assert_eq!(run.purged.activities, 1);
    assert!(store.activity_entries().is_empty());
}

#[tokio::test]
async fn test_report_job_stops_on_shutdown() {
    let store = InMemoryEntityStore::new();
    let market = marketplace(&store, test_clock());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let job = ReportJob::new(market, Arc::new(test_clock()), Duration::from_secs(3_600), shutdown_rx);

    let handle = tokio::spawn(job.run());
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(store.saved_reports().len() <= 1);
}

#[tokio::test]
async fn test_zero_interval_job_runs_and_stops() {
    let store = InMemoryEntityStore::new();
    let market = marketplace(&store, test_clock());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let job = ReportJob::new(market, Arc::new(test_clock()), Duration::ZERO, shutdown_rx);
    assert_eq!(job.interval(), MIN_REPORT_INTERVAL);

    let handle = tokio::spawn(job.run());
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.saved_reports().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}
