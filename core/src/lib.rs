//! # Socialmart Core
//!
//! Domain types and the persistence contract of the Socialmart marketplace, where buyers
//! purchase social-media accounts listed by sellers.
//!
//! ## Modules
//!
//! - [`types`]: identifiers, [`Money`](types::Money), status enumerations, [`Period`](types::Period)
//! - [`entity`]: stored records (`Product`, `Customer`, `Transaction`, `Sale`, activity, views)
//! - [`store`]: the [`EntityStore`](store::EntityStore) trait and [`StoreError`](store::StoreError)
//! - [`environment`]: injectable dependencies such as the [`Clock`](environment::Clock)
//!
//! Everything here is free of business rules; segmentation, popularity, settlement and
//! reporting live in the `socialmart` crate.

pub mod entity;
pub mod store;
pub mod types;

/// Environment traits injected into the marketplace services
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Every timestamp the marketplace writes (sale time, view time, last order date) and
    /// every window it reports on is taken from a `Clock`, never from `Utc::now()` directly.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use entity::{
    ActivityEntry, Customer, MetadataKey, Product, ProductView, Sale, SettlementProgress,
    Transaction, TransactionMetadata,
};
pub use environment::{Clock, SystemClock};
pub use store::{EntityStore, StoreError, StoreFuture};
pub use types::{
    ActivityId, ActivityKind, CustomerId, CustomerStatus, CustomerTier, Money, PaymentStatus, Period,
    Platform, ProductId, ProductStatus, SaleId, TransactionId, TransactionStatus,
};

// Re-export commonly used external types for convenience
pub use chrono;
pub use serde_json;
pub use uuid;
