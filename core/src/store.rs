//! Entity store contract.
//!
//! The store is the only shared mutable resource of the marketplace. Every operation that
//! touches a contended aggregate (product sales counters, customer spend) is a single atomic
//! unit inside the store: callers never fetch-modify-save those fields.
//!
//! # Settlement record
//!
//! Settlement is guarded by a per-transaction record created together with the [`Sale`]
//! in [`EntityStore::begin_settlement`]. The store enforces one sale per transaction id
//! and reports a second attempt as [`StoreError::Duplicate`]. The remaining steps each flip
//! their flag on the record in the same unit as the increment they perform, so a retried
//! settlement never applies an increment twice.
//!
//! # Implementations
//!
//! - `PostgresEntityStore` (in `socialmart-postgres`): production storage
//! - `InMemoryEntityStore` (in `socialmart-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures rather than `async fn` so the store can be shared as
//! `Arc<dyn EntityStore>`.

use crate::entity::{ActivityEntry, Customer, Product, ProductView, Sale, SettlementProgress, Transaction};
use crate::types::{
    CustomerId, CustomerTier, Money, PaymentStatus, Period, ProductId, ProductStatus,
    TransactionId, TransactionStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every [`EntityStore`] method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during entity store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record ("product", "customer", ...)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate {entity}: {key}")]
    Duplicate {
        /// Kind of record
        entity: &'static str,
        /// Conflicting key
        key: String,
    },

    /// The backing storage could not be reached or rejected the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded for storage.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The operation did not complete in time.
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// A stored value could not be decoded.
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`]
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Shorthand for [`StoreError::Duplicate`]
    pub fn duplicate(entity: &'static str, key: impl fmt::Display) -> Self {
        Self::Duplicate { entity, key: key.to_string() }
    }

    /// Whether retrying the same operation may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Result of a guarded settlement step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome<T> {
    /// The step ran now; carries the post-update snapshot.
    Applied(T),
    /// The step's flag was already set; nothing changed.
    AlreadyApplied,
}

impl<T> StepOutcome<T> {
    /// Post-update snapshot, if the step ran now
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::AlreadyApplied => None,
        }
    }

    /// Whether the step ran now
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Result of recording a product view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOutcome {
    /// No earlier view by the same viewer inside the dedupe window
    pub unique: bool,
    /// Total views after the increment
    pub total_views: u64,
    /// Unique views after the increment
    pub unique_views: u64,
}

/// Filter for [`EntityStore::list_products`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Accepted statuses (empty = any)
    pub statuses: Vec<ProductStatus>,
    /// Only products with at least one sale
    pub with_sales_only: bool,
    /// Only products in this region
    pub region: Option<String>,
}

impl ProductFilter {
    /// Matches every product
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether `product` passes the filter
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&product.status))
            && (!self.with_sales_only || product.sales.count > 0)
            && self.region.as_ref().is_none_or(|r| product.region.as_deref() == Some(r.as_str()))
    }
}

/// Number of customers in each tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCounts {
    /// Bronze customers
    pub bronze: u64,
    /// Silver customers
    pub silver: u64,
    /// Gold customers
    pub gold: u64,
    /// Platinum customers
    pub platinum: u64,
}

impl SegmentCounts {
    /// Adds one customer of `tier`
    pub const fn add(&mut self, tier: CustomerTier, count: u64) {
        match tier {
            CustomerTier::Bronze => self.bronze += count,
            CustomerTier::Silver => self.silver += count,
            CustomerTier::Gold => self.gold += count,
            CustomerTier::Platinum => self.platinum += count,
        }
    }

    /// Count for `tier`
    #[must_use]
    pub const fn get(&self, tier: CustomerTier) -> u64 {
        match tier {
            CustomerTier::Bronze => self.bronze,
            CustomerTier::Silver => self.silver,
            CustomerTier::Gold => self.gold,
            CustomerTier::Platinum => self.platinum,
        }
    }

    /// Sum across tiers
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.bronze + self.silver + self.gold + self.platinum
    }
}

/// Rows removed by [`EntityStore::purge_expired`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeCounts {
    /// Activity entries older than the activity retention
    pub activities: u64,
    /// Product views older than the view retention
    pub views: u64,
}

/// Persistence contract consumed by the marketplace.
///
/// Implementations must be `Send + Sync`; every method is one atomic unit with respect to
/// concurrent callers.
pub trait EntityStore: Send + Sync {
    // ------------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------------

    /// Insert a new product.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the id exists; `Unavailable` on storage failure.
    fn insert_product(&self, product: Product) -> StoreFuture<'_, ()>;

    /// Load a product.
    ///
    /// # Errors
    ///
    /// `NotFound` if no product has this id.
    fn get_product(&self, id: ProductId) -> StoreFuture<'_, Product>;

    /// Load every product matching `filter`.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn list_products(&self, filter: ProductFilter) -> StoreFuture<'_, Vec<Product>>;

    /// Log a view and increment the view counters in one unit.
    ///
    /// The view is unique when the viewer has no logged view of the product at or after
    /// `dedupe_since`. `total` always increments; `unique` increments only for unique views.
    ///
    /// # Errors
    ///
    /// `NotFound` if the product does not exist.
    fn record_product_view(
        &self,
        view: ProductView,
        dedupe_since: DateTime<Utc>,
    ) -> StoreFuture<'_, ViewOutcome>;

    /// Store a popularity score if the product's sales count still equals
    /// `observed_sales_count`. Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// `NotFound` if the product does not exist.
    fn set_product_popularity(
        &self,
        id: ProductId,
        score: f64,
        observed_sales_count: u64,
    ) -> StoreFuture<'_, bool>;

    // ------------------------------------------------------------------------
    // Customers
    // ------------------------------------------------------------------------

    /// Insert a new customer.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the id exists.
    fn insert_customer(&self, customer: Customer) -> StoreFuture<'_, ()>;

    /// Load a customer.
    ///
    /// # Errors
    ///
    /// `NotFound` if no customer has this id.
    fn get_customer(&self, id: CustomerId) -> StoreFuture<'_, Customer>;

    /// Atomically add `amount` to `total_spent`, one to `total_orders` and set
    /// `last_order_at`. Returns the updated customer.
    ///
    /// # Errors
    ///
    /// `NotFound` if the customer does not exist.
    fn increment_customer_spend(
        &self,
        id: CustomerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Customer>;

    /// Store a segment. With `Some(total)` the write only happens while `total_spent`
    /// still equals `total`; `None` writes unconditionally. Returns whether the write
    /// happened.
    ///
    /// # Errors
    ///
    /// `NotFound` if the customer does not exist.
    fn set_customer_segment(
        &self,
        id: CustomerId,
        tier: CustomerTier,
        observed_total: Option<Money>,
    ) -> StoreFuture<'_, bool>;

    /// Customers created inside `period`, oldest first.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn customers_joined_between(&self, period: Period) -> StoreFuture<'_, Vec<Customer>>;

    /// Number of customers.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn count_customers(&self) -> StoreFuture<'_, u64>;

    /// Number of customers per tier.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn segment_counts(&self) -> StoreFuture<'_, SegmentCounts>;

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// Insert a new transaction.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the id exists.
    fn insert_transaction(&self, transaction: Transaction) -> StoreFuture<'_, ()>;

    /// Load a transaction.
    ///
    /// # Errors
    ///
    /// `NotFound` if no transaction has this id.
    fn get_transaction(&self, id: TransactionId) -> StoreFuture<'_, Transaction>;

    /// Overwrite both status fields and `updated_at`. Transition rules are enforced by the
    /// caller.
    ///
    /// # Errors
    ///
    /// `NotFound` if the transaction does not exist.
    fn update_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        payment_status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Transaction>;

    /// Transactions created inside `period`, oldest first.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn transactions_between(&self, period: Period) -> StoreFuture<'_, Vec<Transaction>>;

    // ------------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------------

    /// Insert `sale` and a fresh settlement record for its transaction in one unit.
    ///
    /// # Errors
    ///
    /// `Duplicate` if a sale already exists for the transaction.
    fn begin_settlement(&self, sale: Sale) -> StoreFuture<'_, SettlementProgress>;

    /// The sale created for a transaction, if any.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn find_sale_by_transaction(&self, transaction_id: TransactionId)
    -> StoreFuture<'_, Option<Sale>>;

    /// The settlement record of a transaction, if any.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn settlement_progress(
        &self,
        transaction_id: TransactionId,
    ) -> StoreFuture<'_, Option<SettlementProgress>>;

    /// Unless `product_applied` is set: set it, add one to `sales.count`, add `amount` to
    /// `sales.total_revenue`, set `sales.last_sale_at = at` and `status = sold`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the settlement record or the product does not exist.
    fn apply_product_sale(
        &self,
        transaction_id: TransactionId,
        product_id: ProductId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, StepOutcome<Product>>;

    /// Unless `customer_applied` is set: set it, add `amount` to `total_spent`, one to
    /// `total_orders` and set `last_order_at = at`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the settlement record or the customer does not exist.
    fn apply_customer_spend(
        &self,
        transaction_id: TransactionId,
        customer_id: CustomerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, StepOutcome<Customer>>;

    /// Unless `activity_logged` is set: set it and append `entry`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the settlement record does not exist.
    fn append_settlement_activity(
        &self,
        transaction_id: TransactionId,
        entry: ActivityEntry,
    ) -> StoreFuture<'_, StepOutcome<()>>;

    /// Set `completed_at` (first call wins) and return the record.
    ///
    /// # Errors
    ///
    /// `NotFound` if the settlement record does not exist.
    fn finish_settlement(
        &self,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, SettlementProgress>;

    // ------------------------------------------------------------------------
    // Sales, activity, retention, reports
    // ------------------------------------------------------------------------

    /// Sales created inside `period`, optionally restricted to one region, oldest first.
    ///
    /// Sales whose transaction was refunded are left out.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn sales_between(&self, period: Period, region: Option<String>) -> StoreFuture<'_, Vec<Sale>>;

    /// Append an activity entry outside settlement.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn append_activity(&self, entry: ActivityEntry) -> StoreFuture<'_, ()>;

    /// Entries created at or after `since`, newest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn recent_activity(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<ActivityEntry>>;

    /// Delete activity entries and views past their retention at `now`.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, PurgeCounts>;

    /// Persist a generated sales report snapshot.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    fn save_sales_report(
        &self,
        period: Period,
        report: serde_json::Value,
        generated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;

    #[test]
    fn test_retryable_errors() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(StoreError::Timeout("slow".into()).is_retryable());
        assert!(!StoreError::duplicate("sale", "tx").is_retryable());
        assert!(!StoreError::not_found("product", "p").is_retryable());
    }

    #[test]
    fn test_product_filter_matches() {
        let mut product = Product::new(Platform::Instagram, "handle", Money::from_major(5), Utc::now());
        product.region = Some("lagos".to_string());

        let eligible = ProductFilter {
            statuses: vec![ProductStatus::Available, ProductStatus::Sold],
            with_sales_only: true,
            region: None,
        };
        assert!(!eligible.matches(&product));
        product.sales.count = 1;
        assert!(eligible.matches(&product));

        let elsewhere = ProductFilter { region: Some("abuja".to_string()), ..ProductFilter::all() };
        assert!(!elsewhere.matches(&product));
        assert!(ProductFilter::all().matches(&product));
    }

    #[test]
    fn test_segment_counts_total() {
        let mut counts = SegmentCounts::default();
        counts.add(CustomerTier::Gold, 2);
        counts.add(CustomerTier::Bronze, 3);
        assert_eq!(counts.get(CustomerTier::Gold), 2);
        assert_eq!(counts.total(), 5);
    }
}
