//! Persistent records held by the entity store.
//!
//! Aggregate counters (`Product::sales`, `Product::views`, `Customer::metrics`) are only ever
//! changed through the atomic increment operations of [`crate::store::EntityStore`]; the
//! structs here are snapshots of stored state.

use crate::types::{
    ActivityId, ActivityKind, CustomerId, CustomerStatus, CustomerTier, Money, PaymentStatus,
    Platform, ProductId, ProductStatus, SaleId, TransactionId, TransactionStatus,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Product
// ============================================================================

/// Audience statistics of the listed account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountStats {
    /// Follower count
    pub followers: u64,
    /// Engagement rate as a percentage
    pub engagement: f64,
    /// Account age in months
    pub age_months: u32,
    /// Average likes per post
    pub average_likes: u64,
    /// Average comments per post
    pub average_comments: u64,
}

/// Security posture of the listed account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSecurity {
    /// Two-factor authentication is enabled
    pub two_factor_enabled: bool,
    /// The original sign-up email is handed over with the account
    pub original_email_available: bool,
}

/// Login credentials handed to the buyer after settlement.
///
/// Opaque strings; `Debug` output never shows them.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredentials {
    /// Login email
    pub email: String,
    /// Login password
    pub password: String,
    /// Recovery phone number
    pub phone_number: String,
    /// Free-form handover notes
    pub additional_info: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .field("phone_number", &"<redacted>")
            .field("additional_info", &"<redacted>")
            .finish()
    }
}

/// View counters of a product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCounters {
    /// Every recorded view
    pub total: u64,
    /// Views not repeated by the same viewer within 24 hours
    pub unique: u64,
}

/// Sales counters of a product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesCounters {
    /// Number of settled sales
    pub count: u64,
    /// Sum of settled sale amounts
    pub total_revenue: Money,
    /// Time of the most recent settled sale
    pub last_sale_at: Option<DateTime<Utc>>,
}

/// A social-media account listed for sale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID
    pub id: ProductId,
    /// Seller account, if the listing was not created by an administrator
    pub seller_id: Option<CustomerId>,
    /// Platform of the listed account
    pub platform: Platform,
    /// Public handle of the listed account
    pub username: String,
    /// Listing status
    pub status: ProductStatus,
    /// Listed price
    pub price: Money,
    /// Region the account targets
    pub region: Option<String>,
    /// Audience statistics
    pub stats: AccountStats,
    /// Security posture
    pub security: AccountSecurity,
    /// Sensitive handover payload
    pub credentials: AccountCredentials,
    /// View counters
    pub views: ViewCounters,
    /// Sales counters
    pub sales: SalesCounters,
    /// Popularity score, recomputed on every settled sale
    pub popularity: f64,
    /// Listing creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates an available listing with zeroed counters
    #[must_use]
    pub fn new(
        platform: Platform,
        username: impl Into<String>,
        price: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ProductId::new(),
            seller_id: None,
            platform,
            username: username.into(),
            status: ProductStatus::Available,
            price,
            region: None,
            stats: AccountStats::default(),
            security: AccountSecurity::default(),
            credentials: AccountCredentials::default(),
            views: ViewCounters::default(),
            sales: SalesCounters::default(),
            popularity: 0.0,
            created_at,
            updated_at: created_at,
        }
    }
}

// ============================================================================
// Customer
// ============================================================================

/// Aggregate spend metrics of a customer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    /// Cumulative settled spend
    pub total_spent: Money,
    /// Number of settled orders
    pub total_orders: u64,
    /// Time of the most recent settled order
    pub last_order_at: Option<DateTime<Utc>>,
}

/// A buyer account with spend metrics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer ID
    pub id: CustomerId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Spend tier
    pub segment: CustomerTier,
    /// Account status
    pub status: CustomerStatus,
    /// Spend metrics
    pub metrics: CustomerMetrics,
    /// Account creation time
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Creates an active bronze customer with zero metrics
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CustomerId::new(),
            name: name.into(),
            email: email.into(),
            segment: CustomerTier::Bronze,
            status: CustomerStatus::Active,
            metrics: CustomerMetrics::default(),
            created_at,
        }
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Recognized keys of [`TransactionMetadata`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    /// Reference the buyer was redirected with (`tx_ref`)
    GatewayReference,
    /// Transaction id assigned by the payment gateway
    GatewayTransactionId,
    /// Explicit profit in minor units, overriding the default margin
    Profit,
    /// Number of units purchased (default 1)
    Quantity,
    /// Sales region override
    Region,
    /// Email the buyer paid with
    CustomerEmail,
    /// Free-form operator note
    Note,
}

/// Optional key-value bag attached to a transaction.
///
/// Only [`MetadataKey`] keys are accepted; typed accessors parse the values that carry
/// meaning for settlement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionMetadata(BTreeMap<MetadataKey, String>);

impl TransactionMetadata {
    /// Creates an empty bag
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: MetadataKey, value: impl Into<String>) -> Self {
        self.0.insert(key, value.into());
        self
    }

    /// Inserts or replaces a value
    pub fn insert(&mut self, key: MetadataKey, value: impl Into<String>) {
        self.0.insert(key, value.into());
    }

    /// Raw value for a key
    #[must_use]
    pub fn get(&self, key: MetadataKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    /// Explicit profit, if present and parseable
    #[must_use]
    pub fn profit(&self) -> Option<Money> {
        self.get(MetadataKey::Profit)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Money::from_minor)
    }

    /// Purchased quantity, if present, parseable and non-zero
    #[must_use]
    pub fn quantity(&self) -> Option<u32> {
        self.get(MetadataKey::Quantity)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|q| *q > 0)
    }

    /// Region override, if present and non-blank
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.get(MetadataKey::Region).map(str::trim).filter(|r| !r.is_empty())
    }

    /// Iterates over the entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (MetadataKey, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Whether the bag is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A payment attempt by a buyer for one product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub id: TransactionId,
    /// Buyer
    pub buyer_id: CustomerId,
    /// Purchased product
    pub product_id: ProductId,
    /// Charged amount
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
    /// Payment method label (gateway name)
    pub payment_method: String,
    /// Processing status
    pub status: TransactionStatus,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Recognized optional metadata
    pub metadata: TransactionMetadata,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Default currency code
    pub const DEFAULT_CURRENCY: &'static str = "NGN";
    /// Default payment method
    pub const DEFAULT_PAYMENT_METHOD: &'static str = "flutterwave";

    /// Creates a pending, unpaid transaction
    #[must_use]
    pub fn new(
        buyer_id: CustomerId,
        product_id: ProductId,
        amount: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            buyer_id,
            product_id,
            amount,
            currency: Self::DEFAULT_CURRENCY.to_string(),
            payment_method: Self::DEFAULT_PAYMENT_METHOD.to_string(),
            status: TransactionStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            metadata: TransactionMetadata::new(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Settled exactly when completed and paid
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.status == TransactionStatus::Completed && self.payment_status == PaymentStatus::Paid
    }
}

// ============================================================================
// Sale
// ============================================================================

/// Permanent record of a settled transaction. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Sale ID
    pub id: SaleId,
    /// Originating transaction (unique across sales)
    pub transaction_id: TransactionId,
    /// Sold product
    pub product_id: ProductId,
    /// Buyer
    pub customer_id: CustomerId,
    /// Settled amount
    pub amount: Money,
    /// Units purchased
    pub quantity: u32,
    /// Derived or explicitly supplied profit
    pub profit: Money,
    /// Region copied from the product at creation time
    pub region: Option<String>,
    /// Platform copied from the product at creation time
    pub product_type: Platform,
    /// Payment method copied from the transaction
    pub payment_method: String,
    /// Settlement time
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Activity and views
// ============================================================================

/// Entry of the customer activity log (retained for 30 days).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Entry ID
    pub id: ActivityId,
    /// Subject customer
    pub customer_id: CustomerId,
    /// Related product
    pub product_id: Option<ProductId>,
    /// Related transaction
    pub transaction_id: Option<TransactionId>,
    /// Event type
    pub kind: ActivityKind,
    /// Human-readable detail
    pub details: Option<String>,
    /// Event time
    pub created_at: DateTime<Utc>,
}

/// One product-detail view (retained for 24 hours).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    /// Viewed product
    pub product_id: ProductId,
    /// Viewing customer
    pub viewer_id: CustomerId,
    /// View time
    pub viewed_at: DateTime<Utc>,
}

// ============================================================================
// Settlement progress
// ============================================================================

/// Settlement record of one transaction, created together with its [`Sale`].
///
/// Each flag is flipped in the same store unit as the increment it guards, so a retried
/// settlement resumes at the first step whose flag is still unset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementProgress {
    /// Settled transaction
    pub transaction_id: TransactionId,
    /// Sale created for it
    pub sale_id: SaleId,
    /// Product counters incremented
    pub product_applied: bool,
    /// Customer metrics incremented
    pub customer_applied: bool,
    /// Purchase activity written
    pub activity_logged: bool,
    /// Sale creation time
    pub started_at: DateTime<Utc>,
    /// Time every step was done
    pub completed_at: Option<DateTime<Utc>>,
}

impl SettlementProgress {
    /// Fresh record with no step applied
    #[must_use]
    pub const fn started(sale: &Sale) -> Self {
        Self {
            transaction_id: sale.transaction_id,
            sale_id: sale.id,
            product_applied: false,
            customer_applied: false,
            activity_logged: false,
            started_at: sale.created_at,
            completed_at: None,
        }
    }

    /// Whether every guarded step has been applied
    #[must_use]
    pub const fn all_steps_applied(&self) -> bool {
        self.product_applied && self.customer_applied && self.activity_logged
    }
}

// ============================================================================
// Retention
// ============================================================================

/// How long activity entries stay visible.
pub const ACTIVITY_RETENTION: Duration = Duration::days(30);

/// How long product views stay visible.
pub const VIEW_RETENTION: Duration = Duration::hours(24);

/// Window inside which a repeated view by the same viewer is not unique.
pub const UNIQUE_VIEW_WINDOW: Duration = Duration::hours(24);
