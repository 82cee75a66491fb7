//! # Socialmart Testing
//!
//! Testing utilities for the Socialmart marketplace:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryEntityStore`] with failure and latency injection
//! - Fixture builders for products, customers and transactions
//! - `proptest` strategies for domain values
//!
//! ## Example
//!
//! ```
//! use socialmart_core::{EntityStore, Money, Platform};
//! use socialmart_testing::{InMemoryEntityStore, fixtures, test_clock};
//! use socialmart_core::environment::Clock;
//!
//! # async fn example() -> Result<(), socialmart_core::StoreError> {
//! let store = InMemoryEntityStore::new();
//! let now = test_clock().now();
//! let purchase = fixtures::seed_purchase(&store, Platform::Instagram, Money::from_major(500), now).await?;
//! assert_eq!(store.get_product(purchase.product.id).await?.sales.count, 0);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use socialmart_core::environment::Clock;
use std::sync::{Arc, Mutex};

pub mod entity_store;

pub use entity_store::{InMemoryEntityStore, StoreOperation};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Arc, Clock, DateTime, Duration, Mutex, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// ```
    /// use socialmart_testing::mocks::FixedClock;
    /// use socialmart_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when the test advances it.
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self { time: Arc::new(Mutex::new(time)) }
        }

        /// Move the clock forward by `by`
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }

        /// Jump to `time`
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap() = time;
        }
    }

    impl Clock for ManualClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-06-15 12:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice: the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Fixture builders.
pub mod fixtures {
    use chrono::{DateTime, Utc};
    use socialmart_core::{
        Customer, EntityStore, Money, PaymentStatus, Platform, Product, StoreError, Transaction,
        TransactionStatus,
    };

    /// A listed product, its prospective buyer and a pending transaction between them.
    #[derive(Clone, Debug)]
    pub struct Purchase {
        /// Listed product
        pub product: Product,
        /// Buyer
        pub customer: Customer,
        /// Pending, unpaid transaction for the product's price
        pub transaction: Transaction,
    }

    /// An available product priced `price`, listed in `lagos`
    #[must_use]
    pub fn product(platform: Platform, price: Money, at: DateTime<Utc>) -> Product {
        let mut product = Product::new(platform, format!("{platform}_handle"), price, at);
        product.region = Some("lagos".to_string());
        product.stats.followers = 12_000;
        product.stats.engagement = 3.5;
        product
    }

    /// An active bronze customer
    #[must_use]
    pub fn customer(name: &str, at: DateTime<Utc>) -> Customer {
        Customer::new(name, format!("{}@example.com", name.to_lowercase()), at)
    }

    /// Mark a transaction completed and paid (the settled state) without storing it
    #[must_use]
    pub fn settled(mut transaction: Transaction) -> Transaction {
        transaction.status = TransactionStatus::Completed;
        transaction.payment_status = PaymentStatus::Paid;
        transaction
    }

    /// Insert a product, a customer and a pending transaction for `price`.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn seed_purchase(
        store: &dyn EntityStore,
        platform: Platform,
        price: Money,
        at: DateTime<Utc>,
    ) -> Result<Purchase, StoreError> {
        let product = product(platform, price, at);
        let customer = customer("Ada", at);
        let transaction = Transaction::new(customer.id, product.id, price, at);

        store.insert_product(product.clone()).await?;
        store.insert_customer(customer.clone()).await?;
        store.insert_transaction(transaction.clone()).await?;

        Ok(Purchase { product, customer, transaction })
    }

    /// Like [`seed_purchase`] but the stored transaction is already completed and paid.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn seed_settled_purchase(
        store: &dyn EntityStore,
        platform: Platform,
        price: Money,
        at: DateTime<Utc>,
    ) -> Result<Purchase, StoreError> {
        let product = product(platform, price, at);
        let customer = customer("Ada", at);
        let transaction = settled(Transaction::new(customer.id, product.id, price, at));

        store.insert_product(product.clone()).await?;
        store.insert_customer(customer.clone()).await?;
        store.insert_transaction(transaction.clone()).await?;

        Ok(Purchase { product, customer, transaction })
    }
}

/// Property-based testing strategies.
pub mod properties {
    use proptest::prelude::*;
    use socialmart_core::Money;

    /// Any amount up to one hundred million major units
    pub fn money() -> impl Strategy<Value = Money> {
        (0u64..=10_000_000_000).prop_map(Money::from_minor)
    }

    /// Two ordered amounts `(lower, higher)`
    pub fn ordered_money_pair() -> impl Strategy<Value = (Money, Money)> {
        (money(), money()).prop_map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
    }
}

/// Install a test subscriber honouring `RUST_LOG`; repeated calls are ignored.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub use mocks::{FixedClock, ManualClock, test_clock};
