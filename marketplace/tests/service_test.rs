//! Marketplace service tests: views, segments and credential access.
//!
//! Run with: `cargo test -p socialmart --test service_test`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::Duration;
use socialmart::{Marketplace, MarketplaceSettings, MarketError, Requester, ValidationError};
use socialmart_core::entity::AccountCredentials;
use socialmart_core::environment::Clock;
use socialmart_core::{
    CustomerId, CustomerTier, EntityStore, Money, Platform, ProductId, Transaction,
};
use socialmart_testing::{InMemoryEntityStore, ManualClock, fixtures, test_clock};
use std::sync::Arc;

fn marketplace(store: &InMemoryEntityStore, clock: impl Clock + 'static) -> Marketplace {
    Marketplace::new(Arc::new(store.clone()), Arc::new(clock), MarketplaceSettings::default())
}

// ============================================================================
// Product views
// ============================================================================

#[tokio::test]
async fn test_repeat_view_within_a_day_is_not_unique() {
    let store = InMemoryEntityStore::new();
    let clock = ManualClock::new(test_clock().now());
    let purchase = fixtures::seed_purchase(&store, Platform::Instagram, Money::from_major(100), clock.now())
        .await
        .unwrap();
    let market = marketplace(&store, clock.clone());
    let viewer = CustomerId::new();

    let first = market.record_view(purchase.product.id, viewer).await.unwrap();
    clock.advance(Duration::hours(1));
    let second = market.record_view(purchase.product.id, viewer).await.unwrap();

    assert!(first.unique);
    assert!(!second.unique);
    assert_eq!(second.total_views, 2);
    assert_eq!(second.unique_views, 1);

    clock.advance(Duration::hours(24));
    let next_day = market.record_view(purchase.product.id, viewer).await.unwrap();
    assert!(next_day.unique);
    assert_eq!(next_day.unique_views, 2);
}

#[tokio::test]
async fn test_views_by_different_viewers_are_unique() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let purchase = fixtures::seed_purchase(&store, Platform::Tiktok, Money::from_major(50), now)
        .await
        .unwrap();
    let market = marketplace(&store, test_clock());

    for _ in 0..3 {
        market.record_view(purchase.product.id, CustomerId::new()).await.unwrap();
    }

    let product = store.get_product(purchase.product.id).await.unwrap();
    assert_eq!(product.views.total, 3);
    assert_eq!(product.views.unique, 3);
}

#[tokio::test]
async fn test_view_of_unknown_product_is_rejected() {
    let store = InMemoryEntityStore::new();
    let market = marketplace(&store, test_clock());
    let product_id = ProductId::new();

    let result = market.record_view(product_id, CustomerId::new()).await;

    assert_eq!(result.unwrap_err(), MarketError::Validation(ValidationError::UnknownProduct(product_id)));
}

#[tokio::test]
async fn test_conversion_rate_of_product() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let mut product = fixtures::product(Platform::Youtube, Money::from_major(1_000), now);
    product.sales.count = 3;
    product.sales.total_revenue = Money::from_major(2_700);
    product.views.total = 80;
    product.views.unique = 50;
    store.insert_product(product.clone()).await.unwrap();
    let market = marketplace(&store, test_clock());

    let performance = market.product_performance(product.id).await.unwrap();

    assert!((performance.conversion_rate - 6.0).abs() < 1e-9);
    assert_eq!(performance.average_sale_price, Money::from_major(900));
}

// ============================================================================
// Customer segments
// ============================================================================

#[tokio::test]
async fn test_spend_update_recomputes_segment() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let customer = fixtures::customer("Chidi", now);
    store.insert_customer(customer.clone()).await.unwrap();
    let market = marketplace(&store, test_clock());

    let tier = market.update_customer_spend(customer.id, Money::from_major(150_000)).await.unwrap();
    assert_eq!(tier, CustomerTier::Silver);

    let tier = market.update_customer_spend(customer.id, Money::from_major(850_000)).await.unwrap();
    assert_eq!(tier, CustomerTier::Platinum);

    let stored = store.get_customer(customer.id).await.unwrap();
    assert_eq!(stored.segment, CustomerTier::Platinum);
    assert_eq!(stored.metrics.total_spent, Money::from_major(1_000_000));
    assert_eq!(stored.metrics.total_orders, 2);
}

#[tokio::test]
async fn test_zero_spend_is_rejected() {
    let store = InMemoryEntityStore::new();
    let customer = fixtures::customer("Dayo", test_clock().now());
    store.insert_customer(customer.clone()).await.unwrap();
    let market = marketplace(&store, test_clock());

    let result = market.update_customer_spend(customer.id, Money::ZERO).await;

    assert_eq!(result.unwrap_err(), MarketError::Validation(ValidationError::NonPositiveSpend));
    assert_eq!(store.get_customer(customer.id).await.unwrap().metrics.total_orders, 0);
}

#[tokio::test]
async fn test_override_holds_until_next_spend_update() {
    let store = InMemoryEntityStore::new();
    let customer = fixtures::customer("Efe", test_clock().now());
    store.insert_customer(customer.clone()).await.unwrap();
    let market = marketplace(&store, test_clock());

    market.override_customer_segment(customer.id, CustomerTier::Platinum).await.unwrap();
    assert_eq!(market.get_customer_segment(customer.id).await.unwrap(), CustomerTier::Platinum);

    let tier = market.update_customer_spend(customer.id, Money::from_major(10)).await.unwrap();
    assert_eq!(tier, CustomerTier::Bronze);
    assert_eq!(market.get_customer_segment(customer.id).await.unwrap(), CustomerTier::Bronze);
}

#[tokio::test]
async fn test_segment_distribution() {
    let store = InMemoryEntityStore::new();
    let now = test_clock().now();
    let market = marketplace(&store, test_clock());
    for (name, spend) in [("a", 10), ("b", 200_000), ("c", 250_000), ("d", 2_000_000)] {
        let customer = fixtures::customer(name, now);
        store.insert_customer(customer.clone()).await.unwrap();
        market.update_customer_spend(customer.id, Money::from_major(spend)).await.unwrap();
    }

    let counts = market.segment_distribution().await.unwrap();

    assert_eq!(counts.get(CustomerTier::Bronze), 1);
    assert_eq!(counts.get(CustomerTier::Silver), 2);
    assert_eq!(counts.get(CustomerTier::Gold), 0);
    assert_eq!(counts.get(CustomerTier::Platinum), 1);
    assert_eq!(counts.total(), 4);
}

#[tokio::test]
async fn test_unknown_customer_segment() {
    let store = InMemoryEntityStore::new();
    let market = marketplace(&store, test_clock());
    let id = CustomerId::new();

    let result = market.get_customer_segment(id).await;

    assert_eq!(result.unwrap_err(), MarketError::Validation(ValidationError::UnknownCustomer(id)));
}

// ============================================================================
// Credentials
// ============================================================================

async fn seed_listing_with_credentials(store: &InMemoryEntityStore) -> Transaction {
    let now = test_clock().now();
    let mut product = fixtures::product(Platform::Instagram, Money::from_major(400), now);
    product.credentials = AccountCredentials {
        email: "handover@example.com".to_string(),
        password: "s3cret".to_string(),
        phone_number: "+2348000000001".to_string(),
        additional_info: String::new(),
    };
    let buyer = fixtures::customer("Funmi", now);
    let transaction = Transaction::new(buyer.id, product.id, product.price, now);

    store.insert_product(product).await.unwrap();
    store.insert_customer(buyer).await.unwrap();
    store.insert_transaction(transaction.clone()).await.unwrap();
    transaction
}

#[tokio::test]
async fn test_credentials_require_settlement() {
    let store = InMemoryEntityStore::new();
    let transaction = seed_listing_with_credentials(&store).await;
    let market = marketplace(&store, test_clock());

    let result = market
        .reveal_credentials(transaction.id, Requester::Customer(transaction.buyer_id))
        .await;

    assert!(matches!(result, Err(MarketError::Validation(ValidationError::NotSettled { .. }))));
}

#[tokio::test]
async fn test_credentials_after_settlement() {
    let store = InMemoryEntityStore::new();
    let transaction = seed_listing_with_credentials(&store).await;
    let market = marketplace(&store, test_clock());
    market
        .apply_payment_update(
            transaction.id,
            socialmart_core::TransactionStatus::Completed,
            socialmart_core::PaymentStatus::Paid,
        )
        .await
        .unwrap();

    let for_buyer = market
        .reveal_credentials(transaction.id, Requester::Customer(transaction.buyer_id))
        .await
        .unwrap();
    assert_eq!(for_buyer.email, "handover@example.com");

    let for_admin = market.reveal_credentials(transaction.id, Requester::Administrator).await.unwrap();
    assert_eq!(for_admin, for_buyer);
}

#[tokio::test]
async fn test_credentials_are_hidden_from_other_customers() {
    let store = InMemoryEntityStore::new();
    let transaction = seed_listing_with_credentials(&store).await;
    let market = marketplace(&store, test_clock());
    market
        .apply_payment_update(
            transaction.id,
            socialmart_core::TransactionStatus::Completed,
            socialmart_core::PaymentStatus::Paid,
        )
        .await
        .unwrap();

    let result = market
        .reveal_credentials(transaction.id, Requester::Customer(CustomerId::new()))
        .await;

    assert!(matches!(result, Err(MarketError::Forbidden(_))));
}
