//! Service facade called by the HTTP and webhook layers.
//!
//! [`Marketplace`] wires the settlement coordinator and the reporting aggregator to one
//! entity store and clock, and adds the smaller operations (views, segments, credentials)
//! that need no orchestration of their own.

use crate::config::Config;
use crate::engine::ProductPerformance;
use crate::error::{MarketError, Result, ValidationError, lookup_error};
use crate::metrics as business_metrics;
use crate::reporting::{
    DashboardMetrics, DashboardOverview, ReportingAggregator, RevenueTargets, SalesReport,
    TimeRange,
};
use crate::settlement::{PaymentUpdate, SettlementCoordinator};
use socialmart_core::entity::{AccountCredentials, UNIQUE_VIEW_WINDOW};
use socialmart_core::store::{SegmentCounts, ViewOutcome};
use socialmart_core::{
    Clock, CustomerId, CustomerTier, EntityStore, Money, PaymentStatus, ProductId, ProductView,
    Sale, TransactionId, TransactionStatus,
};
use socialmart_runtime::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// Tunables of the marketplace services.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketplaceSettings {
    /// Retry policy for each settlement step
    pub retry: RetryPolicy,
    /// Revenue target model
    pub targets: RevenueTargets,
    /// Upper bound for one report
    pub report_timeout: Duration,
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            targets: RevenueTargets::new(Money::from_major(10_000), 0.05),
            report_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for MarketplaceSettings {
    fn from(config: &Config) -> Self {
        Self {
            retry: config.settlement_retry_policy(),
            targets: RevenueTargets::new(config.target_base(), config.reporting.target_monthly_growth),
            report_timeout: config.report_timeout(),
        }
    }
}

/// Who is asking for purchased credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requester {
    /// A signed-in customer
    Customer(CustomerId),
    /// An administrator
    Administrator,
}

/// Entry point of the marketplace core.
#[derive(Clone)]
pub struct Marketplace {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    settlement: SettlementCoordinator,
    reporting: ReportingAggregator,
}

impl Marketplace {
    /// Build the services over one store and clock
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>, settings: MarketplaceSettings) -> Self {
        let settlement = SettlementCoordinator::new(Arc::clone(&store), Arc::clone(&clock), settings.retry);
        let reporting = ReportingAggregator::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            settings.targets,
            settings.report_timeout,
        );
        Self { store, clock, settlement, reporting }
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// The settlement coordinator
    #[must_use]
    pub const fn settlement(&self) -> &SettlementCoordinator {
        &self.settlement
    }

    /// The reporting aggregator
    #[must_use]
    pub const fn reporting(&self) -> &ReportingAggregator {
        &self.reporting
    }

    // ========================================================================
    // Products
    // ========================================================================

    /// Record a product-detail view.
    ///
    /// Total views always increase; unique views only when the viewer has not viewed the
    /// product in the last 24 hours.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownProduct`] or a store failure.
    pub async fn record_view(&self, product_id: ProductId, viewer_id: CustomerId) -> Result<ViewOutcome> {
        let viewed_at = self.clock.now();
        let view = ProductView { product_id, viewer_id, viewed_at };
        let outcome = self
            .store
            .record_product_view(view, viewed_at - UNIQUE_VIEW_WINDOW)
            .await
            .map_err(|e| lookup_error("record_view", e, ValidationError::UnknownProduct(product_id)))?;

        business_metrics::record_product_view(outcome.unique);
        tracing::debug!(product_id = %product_id, unique = outcome.unique, "View recorded");
        Ok(outcome)
    }

    /// Derived figures of one product (conversion rate, average price, popularity).
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownProduct`] or a store failure.
    pub async fn product_performance(&self, product_id: ProductId) -> Result<ProductPerformance> {
        let product = self
            .store
            .get_product(product_id)
            .await
            .map_err(|e| lookup_error("load_product", e, ValidationError::UnknownProduct(product_id)))?;
        Ok(ProductPerformance::from(&product))
    }

    // ========================================================================
    // Settlement
    // ========================================================================

    /// Settle a completed and paid transaction, returning its one sale.
    ///
    /// Safe to call repeatedly; later calls return the same sale and finish any steps an
    /// earlier call left undone.
    ///
    /// # Errors
    ///
    /// See [`SettlementCoordinator::settle`].
    pub async fn settle_transaction(&self, transaction_id: TransactionId) -> Result<Sale> {
        self.settlement.settle(transaction_id).await.map(|receipt| receipt.sale)
    }

    /// Apply a payment gateway status update, settling when it completes the payment.
    ///
    /// # Errors
    ///
    /// See [`SettlementCoordinator::apply_payment_update`].
    pub async fn apply_payment_update(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
        payment_status: PaymentStatus,
    ) -> Result<PaymentUpdate> {
        self.settlement.apply_payment_update(transaction_id, status, payment_status).await
    }

    /// Credentials of the account bought in a settled transaction.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Forbidden`] unless the requester is the buyer or an administrator
    /// - [`ValidationError::NotSettled`] before settlement
    /// - [`ValidationError::UnknownTransaction`] / [`ValidationError::UnknownProduct`]
    pub async fn reveal_credentials(
        &self,
        transaction_id: TransactionId,
        requester: Requester,
    ) -> Result<AccountCredentials> {
        let transaction = self.store.get_transaction(transaction_id).await.map_err(|e| {
            lookup_error("load_transaction", e, ValidationError::UnknownTransaction(transaction_id))
        })?;

        if let Requester::Customer(customer_id) = requester {
            if customer_id != transaction.buyer_id {
                tracing::warn!(transaction_id = %transaction_id, "Credential request by non-buyer");
                return Err(MarketError::Forbidden(format!(
                    "customer {customer_id} did not buy transaction {transaction_id}"
                )));
            }
        }
        if !transaction.is_settled() {
            return Err(ValidationError::NotSettled {
                transaction_id,
                status: transaction.status,
                payment_status: transaction.payment_status,
            }
            .into());
        }

        let product_id = transaction.product_id;
        let product = self
            .store
            .get_product(product_id)
            .await
            .map_err(|e| lookup_error("load_product", e, ValidationError::UnknownProduct(product_id)))?;
        tracing::info!(transaction_id = %transaction_id, product_id = %product_id, "Credentials revealed");
        Ok(product.credentials)
    }

    // ========================================================================
    // Customers
    // ========================================================================

    /// Stored tier of a customer.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownCustomer`] or a store failure.
    pub async fn get_customer_segment(&self, customer_id: CustomerId) -> Result<CustomerTier> {
        let customer = self.store.get_customer(customer_id).await.map_err(|e| {
            lookup_error("load_customer", e, ValidationError::UnknownCustomer(customer_id))
        })?;
        Ok(customer.segment)
    }

    /// Add spend outside settlement and return the tier for the new total.
    ///
    /// # Errors
    ///
    /// [`ValidationError::NonPositiveSpend`] for a zero amount,
    /// [`ValidationError::UnknownCustomer`] or a store failure.
    pub async fn update_customer_spend(&self, customer_id: CustomerId, amount: Money) -> Result<CustomerTier> {
        if amount.is_zero() {
            return Err(ValidationError::NonPositiveSpend.into());
        }
        let customer = self
            .store
            .increment_customer_spend(customer_id, amount, self.clock.now())
            .await
            .map_err(|e| lookup_error("update_spend", e, ValidationError::UnknownCustomer(customer_id)))?;
        self.settlement.refresh_segment(&customer).await
    }

    /// Set a customer's tier by hand. The next spend update recomputes it.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownCustomer`] or a store failure.
    pub async fn override_customer_segment(&self, customer_id: CustomerId, tier: CustomerTier) -> Result<()> {
        self.store
            .set_customer_segment(customer_id, tier, None)
            .await
            .map_err(|e| lookup_error("override_segment", e, ValidationError::UnknownCustomer(customer_id)))?;
        business_metrics::record_segment_change(tier);
        tracing::info!(customer_id = %customer_id, %tier, "Customer segment overridden");
        Ok(())
    }

    /// Number of customers per tier.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub async fn segment_distribution(&self) -> Result<SegmentCounts> {
        self.store
            .segment_counts()
            .await
            .map_err(|e| MarketError::dependency("segment_counts", e))
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Dashboard overview of a range.
    ///
    /// # Errors
    ///
    /// See [`ReportingAggregator::dashboard_overview`].
    pub async fn get_dashboard_overview(
        &self,
        range: TimeRange,
        region: Option<String>,
    ) -> Result<DashboardOverview> {
        self.reporting.dashboard_overview(range, region).await
    }

    /// Dashboard headline figures of a range.
    ///
    /// # Errors
    ///
    /// See [`ReportingAggregator::dashboard_metrics`].
    pub async fn get_dashboard_metrics(&self, range: TimeRange) -> Result<DashboardMetrics> {
        self.reporting.dashboard_metrics(range).await
    }

    /// Sales report of a range.
    ///
    /// # Errors
    ///
    /// See [`ReportingAggregator::sales_report`].
    pub async fn sales_report(&self, range: TimeRange, region: Option<String>) -> Result<SalesReport> {
        self.reporting.sales_report(range, region).await
    }
}
