//! Scheduled report generation and retention.
//!
//! Each run builds the monthly sales report, stores a snapshot of it and purges activity
//! and view rows past their retention. The loop keeps running after a failed run.

use crate::error::{MarketError, Result};
use crate::reporting::TimeRange;
use crate::service::Marketplace;
use socialmart_core::store::PurgeCounts;
use socialmart_core::{Clock, Period, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Shortest interval the job runs at
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one job run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportRun {
    /// Period of the stored report
    pub period: Period,
    /// Expired rows removed
    pub purged: PurgeCounts,
}

/// Periodic report job.
pub struct ReportJob {
    marketplace: Marketplace,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ReportJob {
    /// Create a job running every `interval` until `shutdown` turns `true`.
    ///
    /// Intervals below [`MIN_REPORT_INTERVAL`] are raised to it.
    #[must_use]
    pub fn new(
        marketplace: Marketplace,
        clock: Arc<dyn Clock>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        if interval < MIN_REPORT_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis(),
                min_ms = MIN_REPORT_INTERVAL.as_millis(),
                "Report interval too short, using minimum"
            );
        }
        let interval = interval.max(MIN_REPORT_INTERVAL);
        Self { marketplace, clock, interval, shutdown }
    }

    /// Interval between runs
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Build and store the monthly report, then purge expired rows.
    ///
    /// # Errors
    ///
    /// Propagates report failures; [`MarketError::Dependency`] when storing or purging fails.
    #[tracing::instrument(skip_all)]
    pub async fn run_once(&self) -> Result<ReportRun> {
        let report = self.marketplace.sales_report(TimeRange::Monthly, None).await?;
        let generated_at = self.clock.now();
        let period = report.period;

        let snapshot = serde_json::to_value(&report)
            .map_err(|e| MarketError::dependency("save_sales_report", StoreError::Serialization(e.to_string())))?;
        let store = self.marketplace.store();
        store
            .save_sales_report(period, snapshot, generated_at)
            .await
            .map_err(|e| MarketError::dependency("save_sales_report", e))?;

        let purged = store
            .purge_expired(generated_at)
            .await
            .map_err(|e| MarketError::dependency("purge_expired", e))?;

        tracing::info!(
            start = %period.start,
            end = %period.end,
            revenue = %report.summary.total_revenue,
            purged_activities = purged.activities,
            purged_views = purged.views,
            "Sales report stored"
        );
        Ok(ReportRun { period, purged })
    }

    /// Run until shutdown. The first run starts immediately.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "Report job started");

        while !*self.shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(error = %e, "Report job run failed");
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        tracing::info!("Report job stopped");
    }
}
