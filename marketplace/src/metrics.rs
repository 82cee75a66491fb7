//! Business metrics for the marketplace.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `marketplace_settlements_total{outcome}` - Settlement calls by outcome
//!   (settled, already_settled, failed, rejected)
//! - `marketplace_revenue_minor_total` - Settled revenue in minor units
//! - `marketplace_product_views_total{unique}` - Recorded product views
//! - `marketplace_segment_changes_total{tier}` - Customers moved into a tier
//!
//! ## Histograms
//! - `marketplace_settlement_duration_seconds` - Time taken by one settlement call
//! - `marketplace_report_duration_seconds{report}` - Time taken to build a report

use metrics::{describe_counter, describe_histogram};
use socialmart_core::CustomerTier;

/// Register descriptions of all business metrics.
///
/// Call once at startup, before any metric is recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "marketplace_settlements_total",
        "Settlement calls by outcome (settled, already_settled, failed, rejected)"
    );
    describe_histogram!(
        "marketplace_settlement_duration_seconds",
        "Time taken by one settlement call"
    );
    describe_counter!(
        "marketplace_revenue_minor_total",
        "Settled revenue in minor currency units"
    );
    describe_counter!(
        "marketplace_product_views_total",
        "Recorded product views, labelled by uniqueness"
    );
    describe_histogram!(
        "marketplace_report_duration_seconds",
        "Time taken to build a dashboard or sales report"
    );
    describe_counter!(
        "marketplace_segment_changes_total",
        "Customers moved into a tier"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Outcome label of a settlement call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// This call created the sale
    Settled,
    /// The sale already existed
    AlreadySettled,
    /// A store failure outlasted the retries
    Failed,
    /// The input was invalid
    Rejected,
}

impl SettlementOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Settled => "settled",
            Self::AlreadySettled => "already_settled",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

/// Record the end of a settlement call.
pub fn record_settlement(outcome: SettlementOutcome, duration_secs: f64) {
    metrics::counter!("marketplace_settlements_total", "outcome" => outcome.label()).increment(1);
    metrics::histogram!("marketplace_settlement_duration_seconds").record(duration_secs);
    tracing::debug!(outcome = outcome.label(), duration_secs, "Recorded settlement metric");
}

/// Record revenue of a newly settled sale.
pub fn record_revenue(amount_minor: u64) {
    metrics::counter!("marketplace_revenue_minor_total").increment(amount_minor);
}

/// Record a product view.
pub fn record_product_view(unique: bool) {
    let label = if unique { "true" } else { "false" };
    metrics::counter!("marketplace_product_views_total", "unique" => label).increment(1);
}

/// Record the time taken to build `report`.
pub fn record_report_duration(report: &'static str, duration_secs: f64) {
    metrics::histogram!("marketplace_report_duration_seconds", "report" => report)
        .record(duration_secs);
    tracing::debug!(report, duration_secs, "Recorded report metric");
}

/// Record a customer entering `tier`.
pub fn record_segment_change(tier: CustomerTier) {
    metrics::counter!("marketplace_segment_changes_total", "tier" => tier.as_str()).increment(1);
}
