//! Settlement integration tests against the in-memory entity store.
//!
//! Run with: `cargo test -p socialmart --test settlement_test`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::Duration as ChronoDuration;
use socialmart::{Marketplace, MarketplaceSettings, MarketError, ValidationError};
use socialmart_core::environment::Clock;
use socialmart_core::{
    ActivityKind, CustomerTier, EntityStore, Money, PaymentStatus, Platform, ProductStatus,
    StoreError, TransactionId, TransactionStatus,
};
use socialmart_runtime::RetryPolicy;
use socialmart_testing::{
    InMemoryEntityStore, ManualClock, StoreOperation, fixtures, init_test_tracing, test_clock,
};
use std::sync::Arc;
use std::time::Duration;

/// Two retries, 1ms apart
fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(2)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

fn marketplace(store: &InMemoryEntityStore, clock: impl Clock + 'static) -> Marketplace {
    let settings = MarketplaceSettings { retry: fast_retry(), ..MarketplaceSettings::default() };
    Marketplace::new(Arc::new(store.clone()), Arc::new(clock), settings)
}

// ============================================================================
// Exactly-once settlement
// ============================================================================

#[tokio::test]
async fn test_settling_twice_creates_one_sale() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_settled_purchase(&store, Platform::Instagram, Money::from_major(500), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());

    let first = market.settlement().settle(purchase.transaction.id).await.unwrap();
    let second = market.settlement().settle(purchase.transaction.id).await.unwrap();

    assert!(first.newly_created);
    assert!(!second.newly_created);
    assert_eq!(first.sale.id, second.sale.id);
    assert_eq!(store.sale_count(), 1);

    let product = store.get_product(purchase.product.id).await.unwrap();
    assert_eq!(product.sales.count, 1);
    assert_eq!(product.sales.total_revenue, Money::from_major(500));
    assert_eq!(product.status, ProductStatus::Sold);

    let customer = store.get_customer(purchase.customer.id).await.unwrap();
    assert_eq!(customer.metrics.total_orders, 1);
    assert_eq!(customer.metrics.total_spent, Money::from_major(500));

    let purchases: Vec<_> =
        store.activity_entries().into_iter().filter(|a| a.kind == ActivityKind::Purchase).collect();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].transaction_id, Some(purchase.transaction.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settlement_creates_one_sale() {
    init_test_tracing();
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_settled_purchase(&store, Platform::Tiktok, Money::from_major(250), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let market = market.clone();
            let id = purchase.transaction.id;
            tokio::spawn(async move { market.settle_transaction(id).await })
        })
        .collect();

    let mut sale_ids = Vec::new();
    for handle in handles {
        sale_ids.push(handle.await.unwrap().unwrap().id);
    }

    sale_ids.dedup();
    assert_eq!(sale_ids.len(), 1, "every caller must see the same sale");
    assert_eq!(store.sale_count(), 1);

    let product = store.get_product(purchase.product.id).await.unwrap();
    assert_eq!(product.sales.count, 1);
    let customer = store.get_customer(purchase.customer.id).await.unwrap();
    assert_eq!(customer.metrics.total_orders, 1);
    assert_eq!(customer.metrics.total_spent, Money::from_major(250));
}

#[tokio::test]
async fn test_settlement_resumes_after_exhausted_retries() {
    init_test_tracing();
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_settled_purchase(&store, Platform::Youtube, Money::from_major(80), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());

    // One attempt plus two retries
    store.fail_next(StoreOperation::ApplyCustomerSpend, 3);
    let failed = market.settle_transaction(purchase.transaction.id).await;
    assert!(matches!(
        failed,
        Err(MarketError::Dependency { step: "update_customer", source: StoreError::Unavailable(_) })
    ));

    assert_eq!(store.sale_count(), 1);
    assert_eq!(store.get_product(purchase.product.id).await.unwrap().sales.count, 1);
    assert_eq!(store.get_customer(purchase.customer.id).await.unwrap().metrics.total_orders, 0);

    let receipt = market.settlement().settle(purchase.transaction.id).await.unwrap();
    assert!(!receipt.newly_created);

    assert_eq!(store.sale_count(), 1);
    assert_eq!(store.get_product(purchase.product.id).await.unwrap().sales.count, 1);
    let customer = store.get_customer(purchase.customer.id).await.unwrap();
    assert_eq!(customer.metrics.total_orders, 1);
    assert_eq!(customer.metrics.total_spent, Money::from_major(80));
    assert_eq!(store.activity_entries().len(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried_in_place() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_settled_purchase(&store, Platform::Twitter, Money::from_major(40), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());

    store.fail_next(StoreOperation::ApplyProductSale, 2);
    let receipt = market.settlement().settle(purchase.transaction.id).await.unwrap();

    assert!(receipt.newly_created);
    assert_eq!(store.get_product(purchase.product.id).await.unwrap().sales.count, 1);
}

// ============================================================================
// Derived updates
// ============================================================================

#[tokio::test]
async fn test_large_purchase_promotes_customer_to_gold() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase =
        fixtures::seed_settled_purchase(&store, Platform::Youtube, Money::from_major(600_000), now)
            .await
            .unwrap();
    let market = marketplace(&store, test_clock());

    market.settle_transaction(purchase.transaction.id).await.unwrap();

    let customer = store.get_customer(purchase.customer.id).await.unwrap();
    assert_eq!(customer.segment, CustomerTier::Gold);
    assert_eq!(customer.metrics.total_orders, 1);
    assert_eq!(market.get_customer_segment(purchase.customer.id).await.unwrap(), CustomerTier::Gold);
}

#[tokio::test]
async fn test_settlement_refreshes_popularity() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_settled_purchase(&store, Platform::Facebook, Money::from_major(90), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());

    market.settle_transaction(purchase.transaction.id).await.unwrap();

    // One sale, no unique views, sold just now: 1 * 0.4 + 0 + 1 / (0 + 1) * 0.3
    let product = store.get_product(purchase.product.id).await.unwrap();
    assert!((product.popularity - 0.7).abs() < 1e-9, "popularity was {}", product.popularity);
    assert_eq!(product.sales.last_sale_at, Some(now));
}

#[tokio::test]
async fn test_sale_uses_clock_and_product_snapshot() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now());
    let purchase =
        fixtures::seed_settled_purchase(&store, Platform::Instagram, Money::from_major(1_000), clock.now())
            .await
            .unwrap();
    let market = marketplace(&store, clock.clone());

    clock.advance(ChronoDuration::hours(3));
    let sale = market.settle_transaction(purchase.transaction.id).await.unwrap();

    assert_eq!(sale.created_at, test_clock().now() + ChronoDuration::hours(3));
    assert_eq!(sale.profit, Money::from_major(200));
    assert_eq!(sale.region.as_deref(), Some("lagos"));
    assert_eq!(sale.product_type, Platform::Instagram);
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_unsettled_transaction_is_rejected() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_purchase(&store, Platform::Tiktok, Money::from_major(20), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());

    let result = market.settle_transaction(purchase.transaction.id).await;

    assert!(matches!(
        result,
        Err(MarketError::Validation(ValidationError::NotSettled {
            status: TransactionStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            ..
        }))
    ));
    assert_eq!(store.sale_count(), 0);
}

#[tokio::test]
async fn test_unknown_transaction_is_rejected() {
    let store = InMemoryEntityStore::new();
    let market = marketplace(&store, test_clock());
    let id = TransactionId::new();

    let result = market.settle_transaction(id).await;

    assert_eq!(result.unwrap_err(), MarketError::Validation(ValidationError::UnknownTransaction(id)));
}

#[tokio::test]
async fn test_zero_amount_is_rejected() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_settled_purchase(&store, Platform::Twitter, Money::ZERO, now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());

    let result = market.settle_transaction(purchase.transaction.id).await;

    assert!(matches!(result, Err(MarketError::Validation(ValidationError::ZeroAmount(_)))));
    assert_eq!(store.sale_count(), 0);
}

// ============================================================================
// Payment updates
// ============================================================================

#[tokio::test]
async fn test_payment_completion_triggers_settlement() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_purchase(&store, Platform::Instagram, Money::from_major(300), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());
    let id = purchase.transaction.id;

    let processing = market
        .apply_payment_update(id, TransactionStatus::Processing, PaymentStatus::Unpaid)
        .await
        .unwrap();
    assert_eq!(processing.transaction.status, TransactionStatus::Processing);
    assert!(processing.settlement.is_none());

    let completed = market
        .apply_payment_update(id, TransactionStatus::Completed, PaymentStatus::Paid)
        .await
        .unwrap();
    assert!(completed.transaction.is_settled());
    assert!(completed.settlement.as_ref().unwrap().newly_created);

    // Webhook redelivery
    let redelivered = market
        .apply_payment_update(id, TransactionStatus::Completed, PaymentStatus::Paid)
        .await
        .unwrap();
    assert!(!redelivered.settlement.as_ref().unwrap().newly_created);
    assert_eq!(store.sale_count(), 1);
}

#[tokio::test]
async fn test_disallowed_transition_is_rejected() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_settled_purchase(&store, Platform::Youtube, Money::from_major(10), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());
    let id = purchase.transaction.id;

    let result = market
        .apply_payment_update(id, TransactionStatus::Pending, PaymentStatus::Paid)
        .await;
    assert!(matches!(
        result,
        Err(MarketError::Validation(ValidationError::StatusTransition {
            from: TransactionStatus::Completed,
            to: TransactionStatus::Pending,
        }))
    ));

    let stored = store.get_transaction(id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_refund_does_not_settle() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_settled_purchase(&store, Platform::Facebook, Money::from_major(60), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());
    let id = purchase.transaction.id;

    let update = market
        .apply_payment_update(id, TransactionStatus::Completed, PaymentStatus::Refunded)
        .await
        .unwrap();

    assert_eq!(update.transaction.payment_status, PaymentStatus::Refunded);
    assert!(update.settlement.is_none());
    assert_eq!(store.sale_count(), 0);
}
