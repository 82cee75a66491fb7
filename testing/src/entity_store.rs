//! In-memory entity store for fast, deterministic tests.
//!
//! All data sits behind one lock, so every operation is atomic with respect to concurrent
//! callers, matching the guarantees of the SQL store. Tests can make selected operations
//! fail or stall to exercise retry and timeout paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only lock poisoning panics

use chrono::{DateTime, Utc};
use socialmart_core::entity::{ACTIVITY_RETENTION, VIEW_RETENTION};
use socialmart_core::store::{
    PurgeCounts, ProductFilter, SegmentCounts, StepOutcome, StoreFuture, ViewOutcome,
};
use socialmart_core::{
    ActivityEntry, Customer, CustomerId, CustomerTier, EntityStore, Money, PaymentStatus, Period,
    Product, ProductId, ProductStatus, ProductView, Sale, SettlementProgress, StoreError,
    Transaction, TransactionId, TransactionStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Store operations that can be targeted by failure or latency injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `get_product`
    GetProduct,
    /// `list_products`
    ListProducts,
    /// `record_product_view`
    RecordProductView,
    /// `set_product_popularity`
    SetProductPopularity,
    /// `get_customer`
    GetCustomer,
    /// `increment_customer_spend`
    IncrementCustomerSpend,
    /// `set_customer_segment`
    SetCustomerSegment,
    /// `customers_joined_between`
    CustomersJoinedBetween,
    /// `get_transaction`
    GetTransaction,
    /// `update_transaction_status`
    UpdateTransactionStatus,
    /// `transactions_between`
    TransactionsBetween,
    /// `begin_settlement`
    BeginSettlement,
    /// `apply_product_sale`
    ApplyProductSale,
    /// `apply_customer_spend`
    ApplyCustomerSpend,
    /// `append_settlement_activity`
    AppendSettlementActivity,
    /// `finish_settlement`
    FinishSettlement,
    /// `sales_between`
    SalesBetween,
    /// `recent_activity`
    RecentActivity,
    /// `save_sales_report`
    SaveSalesReport,
}

/// A report persisted through `save_sales_report`.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedReport {
    /// Reported period
    pub period: Period,
    /// Report body
    pub report: serde_json::Value,
    /// Generation time
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    transactions: HashMap<TransactionId, Transaction>,
    // Keyed by transaction: at most one sale per transaction
    sales: HashMap<TransactionId, Sale>,
    settlements: HashMap<TransactionId, SettlementProgress>,
    views: Vec<ProductView>,
    activity: Vec<ActivityEntry>,
    reports: Vec<SavedReport>,
}

#[derive(Debug, Default)]
struct Faults {
    failures: HashMap<StoreOperation, usize>,
    latency: HashMap<StoreOperation, Duration>,
}

/// In-memory [`EntityStore`].
///
/// Clones share the same data.
///
/// ```
/// use socialmart_testing::{InMemoryEntityStore, StoreOperation};
///
/// let store = InMemoryEntityStore::new();
/// // The next two customer-spend steps fail with `StoreError::Unavailable`
/// store.fail_next(StoreOperation::ApplyCustomerSpend, 2);
/// assert_eq!(store.sale_count(), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryEntityStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `operation` fail with [`StoreError::Unavailable`]
    pub fn fail_next(&self, operation: StoreOperation, times: usize) {
        self.faults.lock().unwrap().failures.insert(operation, times);
    }

    /// Delay every call of `operation` by `latency`
    pub fn set_latency(&self, operation: StoreOperation, latency: Duration) {
        self.faults.lock().unwrap().latency.insert(operation, latency);
    }

    /// Number of stored sales
    #[must_use]
    pub fn sale_count(&self) -> usize {
        self.state.read().unwrap().sales.len()
    }

    /// Every stored activity entry, oldest first
    #[must_use]
    pub fn activity_entries(&self) -> Vec<ActivityEntry> {
        self.state.read().unwrap().activity.clone()
    }

    /// Number of stored view rows (including expired ones not yet purged)
    #[must_use]
    pub fn view_rows(&self) -> usize {
        self.state.read().unwrap().views.len()
    }

    /// Reports persisted so far
    #[must_use]
    pub fn saved_reports(&self) -> Vec<SavedReport> {
        self.state.read().unwrap().reports.clone()
    }

    async fn enter(&self, operation: StoreOperation) -> Result<(), StoreError> {
        let (fail, latency) = {
            let mut faults = self.faults.lock().unwrap();
            let fail = match faults.failures.get_mut(&operation) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (fail, faults.latency.get(&operation).copied())
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StoreError::Unavailable(format!("injected failure in {operation:?}")));
        }
        Ok(())
    }
}

impl EntityStore for InMemoryEntityStore {
    fn insert_product(&self, product: Product) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            if state.products.contains_key(&product.id) {
                return Err(StoreError::duplicate("product", product.id));
            }
            state.products.insert(product.id, product);
            Ok(())
        })
    }

    fn get_product(&self, id: ProductId) -> StoreFuture<'_, Product> {
        Box::pin(async move {
            self.enter(StoreOperation::GetProduct).await?;
            let state = self.state.read().unwrap();
            state.products.get(&id).cloned().ok_or_else(|| StoreError::not_found("product", id))
        })
    }

    fn list_products(&self, filter: ProductFilter) -> StoreFuture<'_, Vec<Product>> {
        Box::pin(async move {
            self.enter(StoreOperation::ListProducts).await?;
            let state = self.state.read().unwrap();
            let mut products: Vec<Product> =
                state.products.values().filter(|p| filter.matches(p)).cloned().collect();
            products.sort_by_key(|p| (p.created_at, p.id));
            Ok(products)
        })
    }

    fn record_product_view(
        &self,
        view: ProductView,
        dedupe_since: DateTime<Utc>,
    ) -> StoreFuture<'_, ViewOutcome> {
        Box::pin(async move {
            self.enter(StoreOperation::RecordProductView).await?;
            let mut guard = self.state.write().unwrap();
            let State { products, views, .. } = &mut *guard;

            let product = products
                .get_mut(&view.product_id)
                .ok_or_else(|| StoreError::not_found("product", view.product_id))?;
            let unique = !views.iter().any(|v| {
                v.product_id == view.product_id
                    && v.viewer_id == view.viewer_id
                    && v.viewed_at >= dedupe_since
            });

            views.push(view);
            product.views.total += 1;
            if unique {
                product.views.unique += 1;
            }

            Ok(ViewOutcome {
                unique,
                total_views: product.views.total,
                unique_views: product.views.unique,
            })
        })
    }

    fn set_product_popularity(
        &self,
        id: ProductId,
        score: f64,
        observed_sales_count: u64,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter(StoreOperation::SetProductPopularity).await?;
            let mut state = self.state.write().unwrap();
            let product =
                state.products.get_mut(&id).ok_or_else(|| StoreError::not_found("product", id))?;
            if product.sales.count != observed_sales_count {
                return Ok(false);
            }
            product.popularity = score;
            Ok(true)
        })
    }

    fn insert_customer(&self, customer: Customer) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            if state.customers.contains_key(&customer.id) {
                return Err(StoreError::duplicate("customer", customer.id));
            }
            state.customers.insert(customer.id, customer);
            Ok(())
        })
    }

    fn get_customer(&self, id: CustomerId) -> StoreFuture<'_, Customer> {
        Box::pin(async move {
            self.enter(StoreOperation::GetCustomer).await?;
            let state = self.state.read().unwrap();
            state.customers.get(&id).cloned().ok_or_else(|| StoreError::not_found("customer", id))
        })
    }

    fn increment_customer_spend(
        &self,
        id: CustomerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Customer> {
        Box::pin(async move {
            self.enter(StoreOperation::IncrementCustomerSpend).await?;
            let mut state = self.state.write().unwrap();
            let customer = state
                .customers
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("customer", id))?;
            customer.metrics.total_spent = customer.metrics.total_spent.saturating_add(amount);
            customer.metrics.total_orders += 1;
            customer.metrics.last_order_at = Some(at);
            Ok(customer.clone())
        })
    }

    fn set_customer_segment(
        &self,
        id: CustomerId,
        tier: CustomerTier,
        observed_total: Option<Money>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter(StoreOperation::SetCustomerSegment).await?;
            let mut state = self.state.write().unwrap();
            let customer = state
                .customers
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("customer", id))?;
            if observed_total.is_some_and(|total| total != customer.metrics.total_spent) {
                return Ok(false);
            }
            customer.segment = tier;
            Ok(true)
        })
    }

    fn customers_joined_between(&self, period: Period) -> StoreFuture<'_, Vec<Customer>> {
        Box::pin(async move {
            self.enter(StoreOperation::CustomersJoinedBetween).await?;
            let state = self.state.read().unwrap();
            let mut customers: Vec<Customer> = state
                .customers
                .values()
                .filter(|c| period.contains(c.created_at))
                .cloned()
                .collect();
            customers.sort_by_key(|c| (c.created_at, c.id));
            Ok(customers)
        })
    }

    fn count_customers(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move { Ok(self.state.read().unwrap().customers.len() as u64) })
    }

    fn segment_counts(&self) -> StoreFuture<'_, SegmentCounts> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            let mut counts = SegmentCounts::default();
            for customer in state.customers.values() {
                counts.add(customer.segment, 1);
            }
            Ok(counts)
        })
    }

    fn insert_transaction(&self, transaction: Transaction) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            if state.transactions.contains_key(&transaction.id) {
                return Err(StoreError::duplicate("transaction", transaction.id));
            }
            state.transactions.insert(transaction.id, transaction);
            Ok(())
        })
    }

    fn get_transaction(&self, id: TransactionId) -> StoreFuture<'_, Transaction> {
        Box::pin(async move {
            self.enter(StoreOperation::GetTransaction).await?;
            let state = self.state.read().unwrap();
            state
                .transactions
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("transaction", id))
        })
    }

    fn update_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        payment_status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Transaction> {
        Box::pin(async move {
            self.enter(StoreOperation::UpdateTransactionStatus).await?;
            let mut state = self.state.write().unwrap();
            let transaction = state
                .transactions
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("transaction", id))?;
            transaction.status = status;
            transaction.payment_status = payment_status;
            transaction.updated_at = at;
            Ok(transaction.clone())
        })
    }

    fn transactions_between(&self, period: Period) -> StoreFuture<'_, Vec<Transaction>> {
        Box::pin(async move {
            self.enter(StoreOperation::TransactionsBetween).await?;
            let state = self.state.read().unwrap();
            let mut transactions: Vec<Transaction> = state
                .transactions
                .values()
                .filter(|t| period.contains(t.created_at))
                .cloned()
                .collect();
            transactions.sort_by_key(|t| (t.created_at, t.id));
            Ok(transactions)
        })
    }

    fn begin_settlement(&self, sale: Sale) -> StoreFuture<'_, SettlementProgress> {
        Box::pin(async move {
            self.enter(StoreOperation::BeginSettlement).await?;
            let mut state = self.state.write().unwrap();
            if state.sales.contains_key(&sale.transaction_id) {
                return Err(StoreError::duplicate("sale", sale.transaction_id));
            }
            let progress = SettlementProgress::started(&sale);
            state.settlements.insert(sale.transaction_id, progress.clone());
            state.sales.insert(sale.transaction_id, sale);
            Ok(progress)
        })
    }

    fn find_sale_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> StoreFuture<'_, Option<Sale>> {
        Box::pin(async move { Ok(self.state.read().unwrap().sales.get(&transaction_id).cloned()) })
    }

    fn settlement_progress(
        &self,
        transaction_id: TransactionId,
    ) -> StoreFuture<'_, Option<SettlementProgress>> {
        Box::pin(async move {
            Ok(self.state.read().unwrap().settlements.get(&transaction_id).cloned())
        })
    }

    fn apply_product_sale(
        &self,
        transaction_id: TransactionId,
        product_id: ProductId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, StepOutcome<Product>> {
        Box::pin(async move {
            self.enter(StoreOperation::ApplyProductSale).await?;
            let mut guard = self.state.write().unwrap();
            let State { settlements, products, .. } = &mut *guard;

            let progress = settlements
                .get_mut(&transaction_id)
                .ok_or_else(|| StoreError::not_found("settlement", transaction_id))?;
            if progress.product_applied {
                return Ok(StepOutcome::AlreadyApplied);
            }
            let product = products
                .get_mut(&product_id)
                .ok_or_else(|| StoreError::not_found("product", product_id))?;

            product.sales.count += 1;
            product.sales.total_revenue = product.sales.total_revenue.saturating_add(amount);
            product.sales.last_sale_at = Some(at);
            product.status = ProductStatus::Sold;
            product.updated_at = at;
            progress.product_applied = true;
            Ok(StepOutcome::Applied(product.clone()))
        })
    }

    fn apply_customer_spend(
        &self,
        transaction_id: TransactionId,
        customer_id: CustomerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, StepOutcome<Customer>> {
        Box::pin(async move {
            self.enter(StoreOperation::ApplyCustomerSpend).await?;
            let mut guard = self.state.write().unwrap();
            let State { settlements, customers, .. } = &mut *guard;

            let progress = settlements
                .get_mut(&transaction_id)
                .ok_or_else(|| StoreError::not_found("settlement", transaction_id))?;
            if progress.customer_applied {
                return Ok(StepOutcome::AlreadyApplied);
            }
            let customer = customers
                .get_mut(&customer_id)
                .ok_or_else(|| StoreError::not_found("customer", customer_id))?;

            customer.metrics.total_spent = customer.metrics.total_spent.saturating_add(amount);
            customer.metrics.total_orders += 1;
            customer.metrics.last_order_at = Some(at);
            progress.customer_applied = true;
            Ok(StepOutcome::Applied(customer.clone()))
        })
    }

    fn append_settlement_activity(
        &self,
        transaction_id: TransactionId,
        entry: ActivityEntry,
    ) -> StoreFuture<'_, StepOutcome<()>> {
        Box::pin(async move {
            self.enter(StoreOperation::AppendSettlementActivity).await?;
            let mut guard = self.state.write().unwrap();
            let State { settlements, activity, .. } = &mut *guard;

            let progress = settlements
                .get_mut(&transaction_id)
                .ok_or_else(|| StoreError::not_found("settlement", transaction_id))?;
            if progress.activity_logged {
                return Ok(StepOutcome::AlreadyApplied);
            }
            activity.push(entry);
            progress.activity_logged = true;
            Ok(StepOutcome::Applied(()))
        })
    }

    fn finish_settlement(
        &self,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, SettlementProgress> {
        Box::pin(async move {
            self.enter(StoreOperation::FinishSettlement).await?;
            let mut state = self.state.write().unwrap();
            let progress = state
                .settlements
                .get_mut(&transaction_id)
                .ok_or_else(|| StoreError::not_found("settlement", transaction_id))?;
            progress.completed_at.get_or_insert(at);
            Ok(progress.clone())
        })
    }

    fn sales_between(&self, period: Period, region: Option<String>) -> StoreFuture<'_, Vec<Sale>> {
        Box::pin(async move {
            self.enter(StoreOperation::SalesBetween).await?;
            let state = self.state.read().unwrap();
            let mut sales: Vec<Sale> = state
                .sales
                .values()
                .filter(|s| period.contains(s.created_at))
                .filter(|s| region.as_ref().is_none_or(|r| s.region.as_ref() == Some(r)))
                .filter(|s| {
                    state
                        .transactions
                        .get(&s.transaction_id)
                        .is_none_or(|t| t.payment_status != PaymentStatus::Refunded)
                })
                .cloned()
                .collect();
            sales.sort_by_key(|s| (s.created_at, s.id));
            Ok(sales)
        })
    }

    fn append_activity(&self, entry: ActivityEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.state.write().unwrap().activity.push(entry);
            Ok(())
        })
    }

    fn recent_activity(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<ActivityEntry>> {
        Box::pin(async move {
            self.enter(StoreOperation::RecentActivity).await?;
            let state = self.state.read().unwrap();
            let mut entries: Vec<ActivityEntry> =
                state.activity.iter().filter(|a| a.created_at >= since).cloned().collect();
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            entries.truncate(limit);
            Ok(entries)
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, PurgeCounts> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            let activity_cutoff = now - ACTIVITY_RETENTION;
            let view_cutoff = now - VIEW_RETENTION;

            let activities_before = state.activity.len();
            state.activity.retain(|a| a.created_at >= activity_cutoff);
            let views_before = state.views.len();
            state.views.retain(|v| v.viewed_at >= view_cutoff);

            Ok(PurgeCounts {
                activities: (activities_before - state.activity.len()) as u64,
                views: (views_before - state.views.len()) as u64,
            })
        })
    }

    fn save_sales_report(
        &self,
        period: Period,
        report: serde_json::Value,
        generated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter(StoreOperation::SaveSalesReport).await?;
            self.state.write().unwrap().reports.push(SavedReport { period, report, generated_at });
            Ok(())
        })
    }
}
