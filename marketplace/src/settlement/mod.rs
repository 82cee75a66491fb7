//! Settlement coordinator.
//!
//! Turns a settled transaction (completed and paid) into a [`Sale`] plus the aggregate
//! updates that follow from it:
//!
//! ```text
//! begin_settlement ──► product counters ──► customer metrics ──► purchase activity ──► finish
//!   (Sale + record)     + popularity         + segment
//! ```
//!
//! # Idempotency
//!
//! The sale is created together with a per-transaction settlement record, and the store
//! rejects a second sale for the same transaction. A duplicate call therefore never creates a
//! second sale: it loads the existing one and resumes at the first step whose flag is still
//! unset. Each step flips its flag in the same store unit as its increment, so no increment
//! is ever applied twice.
//!
//! # Failures
//!
//! Transient store errors are retried in place with exponential backoff. Once retries are
//! exhausted the call fails with [`MarketError::Dependency`] naming the step; calling
//! [`SettlementCoordinator::settle`] again finishes the remaining steps.

pub mod transitions;

use crate::engine::{popularity, segment_for};
use crate::error::{MarketError, Result, ValidationError, lookup_error};
use crate::metrics::{self as business_metrics, SettlementOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socialmart_core::store::StepOutcome;
use socialmart_core::{
    ActivityEntry, ActivityId, ActivityKind, Clock, Customer, CustomerTier, EntityStore,
    PaymentStatus, Product, Sale, SaleId, StoreError, Transaction, TransactionId,
    TransactionStatus,
};
use socialmart_runtime::{RetryPolicy, retry_with_predicate};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

pub use transitions::{check_transition, payment_transition_allowed, status_transition_allowed};

/// Margin applied when a transaction carries no explicit profit.
///
/// Cost basis is not tracked anywhere, so this is a placeholder rule.
pub const DEFAULT_PROFIT_PERCENT: u64 = 20;

/// Result of a settlement call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// The one sale of the transaction
    pub sale: Sale,
    /// Whether this call created the sale
    pub newly_created: bool,
}

/// Result of a payment status update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpdate {
    /// Transaction after the update
    pub transaction: Transaction,
    /// Settlement triggered by the update, when it left the transaction settled
    pub settlement: Option<SettlementReceipt>,
}

/// Build the sale for a settled transaction from the current product snapshot.
///
/// Explicit metadata (`profit`, `quantity`, `region`) wins over the defaults: 20% profit,
/// one unit, the product's region.
#[must_use]
pub fn build_sale(transaction: &Transaction, product: &Product, at: DateTime<Utc>) -> Sale {
    let metadata = &transaction.metadata;
    Sale {
        id: SaleId::new(),
        transaction_id: transaction.id,
        product_id: transaction.product_id,
        customer_id: transaction.buyer_id,
        amount: transaction.amount,
        quantity: metadata.quantity().unwrap_or(1),
        profit: metadata
            .profit()
            .unwrap_or_else(|| transaction.amount.percent(DEFAULT_PROFIT_PERCENT)),
        region: metadata.region().map(str::to_string).or_else(|| product.region.clone()),
        product_type: product.platform,
        payment_method: transaction.payment_method.clone(),
        created_at: at,
    }
}

/// Orchestrates settlement and payment status updates.
#[derive(Clone)]
pub struct SettlementCoordinator {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl SettlementCoordinator {
    /// Create a coordinator over `store`
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Settle a transaction. Safe to call any number of times for the same id.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Validation`] if the transaction is unknown, not settled or has a
    ///   zero amount
    /// - [`MarketError::Dependency`] if the store keeps failing; a later call resumes
    /// - [`MarketError::Conflict`] if the store rejects the sale but holds none for the
    ///   transaction
    #[tracing::instrument(skip_all, fields(transaction_id = %transaction_id))]
    pub async fn settle(&self, transaction_id: TransactionId) -> Result<SettlementReceipt> {
        let started = Instant::now();
        let result = self.settle_inner(transaction_id).await;

        let outcome = match &result {
            Ok(receipt) if receipt.newly_created => SettlementOutcome::Settled,
            Ok(_) => SettlementOutcome::AlreadySettled,
            Err(MarketError::Validation(_)) => SettlementOutcome::Rejected,
            Err(_) => SettlementOutcome::Failed,
        };
        business_metrics::record_settlement(outcome, started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => tracing::info!(
                sale_id = %receipt.sale.id,
                newly_created = receipt.newly_created,
                "Settlement finished"
            ),
            Err(error) => tracing::warn!(%error, "Settlement failed"),
        }
        result
    }

    async fn settle_inner(&self, transaction_id: TransactionId) -> Result<SettlementReceipt> {
        let transaction = self
            .step("load_transaction", || self.store.get_transaction(transaction_id))
            .await
            .map_err(|e| missing(e, ValidationError::UnknownTransaction(transaction_id)))?;

        if !transaction.is_settled() {
            return Err(ValidationError::NotSettled {
                transaction_id,
                status: transaction.status,
                payment_status: transaction.payment_status,
            }
            .into());
        }
        if transaction.amount.is_zero() {
            return Err(ValidationError::ZeroAmount(transaction_id).into());
        }

        let product_id = transaction.product_id;
        let product = self
            .step("load_product", || self.store.get_product(product_id))
            .await
            .map_err(|e| missing(e, ValidationError::UnknownProduct(product_id)))?;

        tracing::info!(product_id = %product_id, amount = %transaction.amount, "Settlement started");
        let sale = build_sale(&transaction, &product, self.clock.now());

        let created = self.step("create_sale", || self.store.begin_settlement(sale.clone())).await;
        let receipt = match created {
            Ok(_) => {
                business_metrics::record_revenue(sale.amount.minor());
                SettlementReceipt { sale, newly_created: true }
            }
            Err(MarketError::Dependency { source: StoreError::Duplicate { .. }, .. }) => {
                tracing::warn!("Sale already exists, resuming settlement");
                let existing = self
                    .step("load_sale", || self.store.find_sale_by_transaction(transaction_id))
                    .await?
                    .ok_or_else(|| {
                        MarketError::Conflict(format!(
                            "sale rejected as duplicate but none stored for {transaction_id}"
                        ))
                    })?;
                SettlementReceipt { sale: existing, newly_created: false }
            }
            Err(error) => return Err(error),
        };

        self.resume(&receipt.sale).await?;
        Ok(receipt)
    }

    /// Run every step of `sale`'s settlement record that has not been applied yet.
    async fn resume(&self, sale: &Sale) -> Result<()> {
        let tx = sale.transaction_id;
        let progress = self
            .step("load_progress", || self.store.settlement_progress(tx))
            .await?
            .ok_or_else(|| MarketError::Conflict(format!("sale {} has no settlement record", sale.id)))?;

        if progress.completed_at.is_some() {
            tracing::debug!("Settlement already complete");
            return Ok(());
        }

        let product = match self
            .step("update_product", || {
                self.store.apply_product_sale(tx, sale.product_id, sale.amount, sale.created_at)
            })
            .await?
        {
            StepOutcome::Applied(product) => product,
            StepOutcome::AlreadyApplied => {
                tracing::debug!(step = "update_product", "Step already applied");
                self.step("load_product", || self.store.get_product(sale.product_id)).await?
            }
        };
        self.refresh_popularity(&product).await?;

        let customer = match self
            .step("update_customer", || {
                self.store.apply_customer_spend(tx, sale.customer_id, sale.amount, sale.created_at)
            })
            .await?
        {
            StepOutcome::Applied(customer) => customer,
            StepOutcome::AlreadyApplied => {
                tracing::debug!(step = "update_customer", "Step already applied");
                self.step("load_customer", || self.store.get_customer(sale.customer_id)).await?
            }
        };
        self.refresh_segment(&customer).await?;

        let entry = ActivityEntry {
            id: ActivityId::new(),
            customer_id: sale.customer_id,
            product_id: Some(sale.product_id),
            transaction_id: Some(tx),
            kind: ActivityKind::Purchase,
            details: Some(format!("Purchased {} account for {}", sale.product_type, sale.amount)),
            created_at: sale.created_at,
        };
        let logged = self
            .step("log_activity", || self.store.append_settlement_activity(tx, entry.clone()))
            .await?;
        if !logged.was_applied() {
            tracing::debug!(step = "log_activity", "Step already applied");
        }

        let now = self.clock.now();
        self.step("finish", || self.store.finish_settlement(tx, now)).await?;
        Ok(())
    }

    /// Store the popularity of `product` unless a newer sale has been applied since the
    /// snapshot was taken; that sale's settlement writes its own score.
    async fn refresh_popularity(&self, product: &Product) -> Result<()> {
        let score = popularity(product, self.clock.now());
        let written = self
            .step("refresh_popularity", || {
                self.store.set_product_popularity(product.id, score, product.sales.count)
            })
            .await?;
        tracing::debug!(product_id = %product.id, score, written, "Popularity refreshed");
        Ok(())
    }

    /// Store the tier matching `customer`'s total spend unless the total has moved since the
    /// snapshot. Returns the tier for the snapshot's total.
    ///
    /// # Errors
    ///
    /// [`MarketError::Dependency`] if the store keeps failing.
    pub async fn refresh_segment(&self, customer: &Customer) -> Result<CustomerTier> {
        let tier = segment_for(customer.metrics.total_spent);
        if tier == customer.segment {
            return Ok(tier);
        }
        let total = customer.metrics.total_spent;
        let written = self
            .step("refresh_segment", || self.store.set_customer_segment(customer.id, tier, Some(total)))
            .await?;
        if written {
            business_metrics::record_segment_change(tier);
            tracing::info!(customer_id = %customer.id, from = %customer.segment, to = %tier, "Customer segment changed");
        }
        Ok(tier)
    }

    /// Apply a gateway status update and settle when it leaves the transaction completed
    /// and paid.
    ///
    /// Re-asserting the current statuses writes nothing; if they are completed and paid the
    /// settlement still runs, finishing any interrupted steps.
    ///
    /// # Errors
    ///
    /// [`MarketError::Validation`] for unknown transactions or disallowed transitions, and
    /// any error of [`SettlementCoordinator::settle`].
    #[tracing::instrument(skip_all, fields(transaction_id = %transaction_id))]
    pub async fn apply_payment_update(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
        payment_status: PaymentStatus,
    ) -> Result<PaymentUpdate> {
        let current = self
            .step("load_transaction", || self.store.get_transaction(transaction_id))
            .await
            .map_err(|e| missing(e, ValidationError::UnknownTransaction(transaction_id)))?;

        check_transition((current.status, current.payment_status), (status, payment_status))?;

        let transaction = if current.status == status && current.payment_status == payment_status {
            current
        } else {
            let now = self.clock.now();
            let updated = self
                .step("update_status", || {
                    self.store.update_transaction_status(transaction_id, status, payment_status, now)
                })
                .await?;
            tracing::info!(%status, %payment_status, "Transaction status updated");
            updated
        };

        let settlement = if transaction.is_settled() {
            Some(self.settle(transaction_id).await?)
        } else {
            None
        };
        Ok(PaymentUpdate { transaction, settlement })
    }

    /// Run one store call with the retry policy.
    async fn step<T, F, Fut>(&self, step: &'static str, run: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        retry_with_predicate(&self.retry, step, run, StoreError::is_retryable)
            .await
            .map_err(|source| MarketError::dependency(step, source))
    }
}

/// Report a missing record as invalid input; pass other failures through.
fn missing(error: MarketError, invalid: ValidationError) -> MarketError {
    match error {
        MarketError::Dependency { step, source } => lookup_error(step, source, invalid),
        other => other,
    }
}
