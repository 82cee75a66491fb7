//! Value objects shared by every layer of the marketplace.
//!
//! Identifiers, the [`Money`] amount type, the enumerations stored on entities and the
//! half-open [`Period`] used by every range query.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a product listing
    ProductId
);
entity_id!(
    /// Unique identifier for a customer (a buyer account)
    CustomerId
);
entity_id!(
    /// Unique identifier for a payment transaction
    TransactionId
);
entity_id!(
    /// Unique identifier for a sale record
    SaleId
);
entity_id!(
    /// Unique identifier for an activity log entry
    ActivityId
);

// ============================================================================
// Money
// ============================================================================

/// Non-negative monetary amount in minor units (kobo, cents).
///
/// The marketplace is currency-agnostic: thresholds and targets are stated in major
/// units and converted with [`Money::from_major`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Creates a `Money` value from major units, saturating on overflow
    #[must_use]
    pub const fn from_major(major: u64) -> Self {
        Self(major.saturating_mul(100))
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Returns the amount in major units as a float (for ratios and display)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_major_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two amounts, clamping at `u64::MAX`
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// `percent`% of this amount, rounded down to the nearest minor unit
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn percent(self, percent: u64) -> Self {
        // u128 intermediate: no overflow for any u64 amount
        Self((self.0 as u128 * percent as u128 / 100) as u64)
    }

    /// Integer division by a count, `None` when the count is zero
    #[must_use]
    pub const fn checked_div(self, count: u64) -> Option<Self> {
        match self.0.checked_div(count) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Error returned when a stored or user-supplied label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// What was being parsed (e.g. "platform")
    pub kind: &'static str,
    /// The rejected label
    pub value: String,
}

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $label)] $variant),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable lowercase label used in storage and reports
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(
    /// Social platform the listed account belongs to
    Platform, "platform" {
        /// Instagram account
        Instagram => "instagram",
        /// Facebook account
        Facebook => "facebook",
        /// Twitter/X account
        Twitter => "twitter",
        /// `WhatsApp` account
        Whatsapp => "whatsapp",
        /// `YouTube` channel
        Youtube => "youtube",
        /// `TikTok` account
        Tiktok => "tiktok",
        /// Foreign phone number
        ForeignNumber => "foreignnumber",
        /// `WhatsApp`-registered phone number
        WhatsappNumber => "whatsappnumber",
    }
);

labelled_enum!(
    /// Listing status of a product
    ProductStatus, "product status" {
        /// Listed and purchasable
        Available => "available",
        /// Purchased through a settled transaction
        Sold => "sold",
        /// Held while a purchase is in flight
        Pending => "pending",
        /// Withdrawn by the seller; never hard-deleted
        Deleted => "deleted",
    }
);

labelled_enum!(
    /// Processing status of a transaction
    TransactionStatus, "transaction status" {
        /// Created, awaiting payment
        Pending => "pending",
        /// Payment in progress at the gateway
        Processing => "processing",
        /// Gateway reported success
        Completed => "completed",
        /// Gateway reported failure
        Failed => "failed",
        /// Cancelled by buyer or administrator
        Cancelled => "cancelled",
    }
);

labelled_enum!(
    /// Payment status of a transaction
    PaymentStatus, "payment status" {
        /// No funds received
        Unpaid => "unpaid",
        /// Funds received
        Paid => "paid",
        /// Payment attempt failed
        Failed => "failed",
        /// Funds returned to the buyer
        Refunded => "refunded",
    }
);

labelled_enum!(
    /// Customer spend tier, ordered from lowest to highest
    CustomerTier, "customer tier" {
        /// Default tier
        Bronze => "bronze",
        /// Cumulative spend of at least 100 000
        Silver => "silver",
        /// Cumulative spend of at least 500 000
        Gold => "gold",
        /// Cumulative spend of at least 1 000 000
        Platinum => "platinum",
    }
);

labelled_enum!(
    /// Whether a customer account is active
    CustomerStatus, "customer status" {
        /// Active account
        Active => "active",
        /// Deactivated account
        Inactive => "inactive",
    }
);

labelled_enum!(
    /// Type of an activity log entry
    ActivityKind, "activity kind" {
        /// Settled purchase
        Purchase => "purchase",
        /// Product detail view
        View => "view",
        /// Session start
        Login => "login",
        /// Profile change
        UpdateProfile => "update_profile",
        /// Anything else
        Other => "other",
    }
);

impl CustomerTier {
    /// Numeric rank used for ordering (bronze = 0)
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Bronze => 0,
            Self::Silver => 1,
            Self::Gold => 2,
            Self::Platinum => 3,
        }
    }
}

impl PartialOrd for CustomerTier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CustomerTier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Default for CustomerTier {
    fn default() -> Self {
        Self::Bronze
    }
}

// ============================================================================
// Periods
// ============================================================================

/// Half-open time interval `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound
    pub end: DateTime<Utc>,
}

impl Period {
    /// Creates a period, swapping the bounds if they are reversed
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// The `days`-long period ending at `end`
    #[must_use]
    pub fn trailing_days(end: DateTime<Utc>, days: i64) -> Self {
        Self::new(end - Duration::days(days), end)
    }

    /// Length of the period
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The equal-length period immediately preceding this one.
    ///
    /// Clamped at the earliest representable instant.
    #[must_use]
    pub fn previous(&self) -> Self {
        let start = self
            .start
            .checked_sub_signed(self.duration())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: self.start }
    }

    /// Whether `instant` falls inside the period
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Calendar days (UTC) touched by the period, in order
    #[must_use]
    pub fn days(&self) -> Vec<NaiveDate> {
        if self.end <= self.start {
            return Vec::new();
        }
        let first = self.start.date_naive();
        // The end bound is exclusive, so a period ending exactly at midnight stops the day before
        let last = (self.end - Duration::nanoseconds(1)).date_naive();
        first.iter_days().take_while(|day| *day <= last).collect()
    }
}
