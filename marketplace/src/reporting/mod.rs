//! Reporting aggregator.
//!
//! Reports are pure functions of the store's contents and the requested window. The
//! aggregator keeps no state between calls; every report runs its store queries
//! concurrently and is bounded by the configured timeout.

pub mod dashboard;
pub mod sales_report;
pub mod series;
pub mod targets;
pub mod window;

pub use dashboard::{DashboardMetrics, DashboardOverview, MetricsInputs, OverviewInputs};
pub use sales_report::SalesReport;
pub use series::{growth_rate, regional_breakdown};
pub use targets::{PerformanceTrend, RevenueTargets, SalesTarget, classify};
pub use window::TimeRange;

use crate::engine::rank_popular;
use crate::error::{MarketError, Result};
use crate::metrics as business_metrics;
use socialmart_core::entity::ACTIVITY_RETENTION;
use socialmart_core::store::ProductFilter;
use socialmart_core::{Clock, EntityStore, ProductStatus, StoreError};
use socialmart_runtime::with_deadline;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Products shown in the popular-products section
pub const POPULAR_PRODUCTS: usize = 5;
/// Activity entries shown on the overview
pub const RECENT_ACTIVITIES: usize = 10;

/// Builds dashboards and sales reports from the entity store.
#[derive(Clone)]
pub struct ReportingAggregator {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    targets: RevenueTargets,
    timeout: Duration,
}

impl ReportingAggregator {
    /// Create an aggregator; each report is cancelled after `timeout`
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        targets: RevenueTargets,
        timeout: Duration,
    ) -> Self {
        Self { store, clock, targets, timeout }
    }

    /// Sales trends, regions, popular products, customer growth and recent activity.
    ///
    /// `region` restricts sales and products; customer figures are global.
    ///
    /// # Errors
    ///
    /// [`MarketError::Validation`] for a custom range longer than
    /// [`window::MAX_CUSTOM_DAYS`], [`MarketError::Timeout`] past the deadline,
    /// [`MarketError::Dependency`] on store failure.
    pub async fn dashboard_overview(
        &self,
        range: TimeRange,
        region: Option<String>,
    ) -> Result<DashboardOverview> {
        let now = self.clock.now();
        let period = range.resolve(now)?;
        let previous = period.previous();
        let store = &self.store;

        self.bounded("dashboard_overview", async move {
            let filter = ProductFilter {
                statuses: vec![ProductStatus::Available, ProductStatus::Sold],
                with_sales_only: true,
                region: region.clone(),
            };
            let (sales, previous_sales, products, joined, previously_joined, recent_activities) =
                futures::try_join!(
                    store.sales_between(period, region.clone()),
                    store.sales_between(previous, region.clone()),
                    store.list_products(filter),
                    store.customers_joined_between(period),
                    store.customers_joined_between(previous),
                    store.recent_activity(now - ACTIVITY_RETENTION, RECENT_ACTIVITIES),
                )
                .map_err(|e| query_error("dashboard_overview", e))?;

            let inputs = OverviewInputs {
                sales,
                previous_sales,
                popular_products: rank_popular(&products, POPULAR_PRODUCTS),
                joined,
                previously_joined,
                recent_activities,
            };
            Ok(DashboardOverview::assemble(period, region, inputs))
        })
        .await
    }

    /// Revenue against target, customers, transactions and products.
    ///
    /// The target is weekly for the weekly and daily ranges and monthly otherwise.
    ///
    /// # Errors
    ///
    /// [`MarketError::Validation`] for a custom range longer than
    /// [`window::MAX_CUSTOM_DAYS`], [`MarketError::Timeout`] past the deadline,
    /// [`MarketError::Dependency`] on store failure.
    pub async fn dashboard_metrics(&self, range: TimeRange) -> Result<DashboardMetrics> {
        let now = self.clock.now();
        let period = range.resolve(now)?;
        let previous = period.previous();
        let store = &self.store;
        let target = match range {
            TimeRange::Today | TimeRange::Weekly => self.targets.weekly(now),
            _ => self.targets.monthly(now),
        };

        self.bounded("dashboard_metrics", async move {
            let (sales, previous_sales, customer_count, joined, previously_joined, transactions, previous_transactions, products) =
                futures::try_join!(
                    store.sales_between(period, None),
                    store.sales_between(previous, None),
                    store.count_customers(),
                    store.customers_joined_between(period),
                    store.customers_joined_between(previous),
                    store.transactions_between(period),
                    store.transactions_between(previous),
                    store.list_products(ProductFilter::all()),
                )
                .map_err(|e| query_error("dashboard_metrics", e))?;

            let inputs = MetricsInputs {
                sales,
                previous_sales,
                customer_count,
                joined: joined.len() as u64,
                previously_joined: previously_joined.len() as u64,
                transactions,
                previous_transactions: previous_transactions.len() as u64,
                products,
            };
            let sales_target = SalesTarget::measure(series::revenue(&inputs.sales), target, now);
            Ok(DashboardMetrics::assemble(period, sales_target, &inputs))
        })
        .await
    }

    /// Summary, top products, monthly sales and regions of a range.
    ///
    /// # Errors
    ///
    /// [`MarketError::Validation`] for a custom range longer than
    /// [`window::MAX_CUSTOM_DAYS`], [`MarketError::Timeout`] past the deadline,
    /// [`MarketError::Dependency`] on store failure.
    pub async fn sales_report(&self, range: TimeRange, region: Option<String>) -> Result<SalesReport> {
        let period = range.resolve(self.clock.now())?;
        let previous = period.previous();
        let store = &self.store;

        self.bounded("sales_report", async move {
            let (sales, previous_sales, products) = futures::try_join!(
                store.sales_between(period, region.clone()),
                store.sales_between(previous, region.clone()),
                store.list_products(ProductFilter::all()),
            )
            .map_err(|e| query_error("sales_report", e))?;

            Ok(SalesReport::assemble(period, region, &sales, &previous_sales, &products))
        })
        .await
    }

    /// Run a report under the deadline and record its duration.
    async fn bounded<T, F>(&self, report: &'static str, build: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = with_deadline(report, self.timeout, build).await.map_err(MarketError::from);
        business_metrics::record_report_duration(report, started.elapsed().as_secs_f64());
        result?
    }
}

fn query_error(report: &'static str, error: StoreError) -> MarketError {
    tracing::warn!(report, %error, "Report query failed");
    MarketError::dependency(report, error)
}
