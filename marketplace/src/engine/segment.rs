//! Customer segmentation by cumulative spend.

use socialmart_core::{CustomerTier, Money};

/// Lowest spend of a platinum customer
pub const PLATINUM_THRESHOLD: Money = Money::from_major(1_000_000);
/// Lowest spend of a gold customer
pub const GOLD_THRESHOLD: Money = Money::from_major(500_000);
/// Lowest spend of a silver customer
pub const SILVER_THRESHOLD: Money = Money::from_major(100_000);

/// Tier for a cumulative spend. Thresholds are inclusive lower bounds.
///
/// ```
/// use socialmart::engine::segment_for;
/// use socialmart_core::{CustomerTier, Money};
///
/// assert_eq!(segment_for(Money::from_major(600_000)), CustomerTier::Gold);
/// assert_eq!(segment_for(Money::ZERO), CustomerTier::Bronze);
/// ```
#[must_use]
pub const fn segment_for(total_spent: Money) -> CustomerTier {
    let spent = total_spent.minor();
    if spent >= PLATINUM_THRESHOLD.minor() {
        CustomerTier::Platinum
    } else if spent >= GOLD_THRESHOLD.minor() {
        CustomerTier::Gold
    } else if spent >= SILVER_THRESHOLD.minor() {
        CustomerTier::Silver
    } else {
        CustomerTier::Bronze
    }
}
