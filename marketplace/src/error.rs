//! Error types of the marketplace services.
//!
//! Every fallible service call returns [`MarketError`]. Division-by-zero cases in the
//! metrics and reporting code never surface here: they resolve to zero.

use socialmart_core::{
    CustomerId, PaymentStatus, ProductId, StoreError, TransactionId, TransactionStatus,
};
use socialmart_runtime::DeadlineExceeded;
use thiserror::Error;

/// Malformed or out-of-range input. Reported to the caller, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No transaction has this id
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TransactionId),

    /// No product has this id
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// No customer has this id
    #[error("Unknown customer: {0}")]
    UnknownCustomer(CustomerId),

    /// Settlement or credential reveal was requested for an unsettled transaction
    #[error("Transaction {transaction_id} is not settled ({status}/{payment_status})")]
    NotSettled {
        /// Transaction
        transaction_id: TransactionId,
        /// Current status
        status: TransactionStatus,
        /// Current payment status
        payment_status: PaymentStatus,
    },

    /// A settled transaction carried no amount
    #[error("Transaction {0} has a zero amount")]
    ZeroAmount(TransactionId),

    /// A spend update carried no amount
    #[error("Spend amount must be positive")]
    NonPositiveSpend,

    /// A running total would overflow
    #[error("Amount overflow for {0}")]
    AmountOverflow(String),

    /// The requested status change is not allowed
    #[error("Invalid status transition {from} -> {to}")]
    StatusTransition {
        /// Current status
        from: TransactionStatus,
        /// Requested status
        to: TransactionStatus,
    },

    /// The requested payment status change is not allowed
    #[error("Invalid payment transition {from} -> {to}")]
    PaymentTransition {
        /// Current payment status
        from: PaymentStatus,
        /// Requested payment status
        to: PaymentStatus,
    },

    /// A named time range was not recognized
    #[error("Unknown time range: {0}")]
    UnknownTimeRange(String),

    /// An explicit reporting range is longer than reports allow
    #[error("Time range of {days} days exceeds the {max} day maximum")]
    RangeTooLong {
        /// Requested length in whole days, rounded up
        days: i64,
        /// Longest accepted range
        max: i64,
    },
}

/// Errors returned by the marketplace services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Rejected input
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store reported a conflicting write that could not be resolved to the
    /// existing record
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The entity store failed during `step`; retrying the call is safe
    #[error("Entity store failed during {step}: {source}")]
    Dependency {
        /// Step that failed
        step: &'static str,
        /// Store error of the last attempt
        source: StoreError,
    },

    /// A bounded report query ran out of time
    #[error(transparent)]
    Timeout(#[from] DeadlineExceeded),

    /// The requester may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl MarketError {
    /// Wrap a store error raised during `step`
    #[must_use]
    pub const fn dependency(step: &'static str, source: StoreError) -> Self {
        Self::Dependency { step, source }
    }

    /// Whether the caller may retry the same request
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Dependency { .. } | Self::Timeout(_))
    }
}

/// Convert a store error from a lookup, reporting a missing record as invalid input.
pub(crate) fn lookup_error(step: &'static str, error: StoreError, missing: ValidationError) -> MarketError {
    match error {
        StoreError::NotFound { .. } => MarketError::Validation(missing),
        other => MarketError::dependency(step, other),
    }
}

/// Result alias for marketplace operations
pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_record_is_validation_error() {
        let id = TransactionId::new();
        let err = lookup_error(
            "load_transaction",
            StoreError::not_found("transaction", id),
            ValidationError::UnknownTransaction(id),
        );
        assert_eq!(err, MarketError::Validation(ValidationError::UnknownTransaction(id)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_outage_is_dependency_error() {
        let id = TransactionId::new();
        let err = lookup_error(
            "load_transaction",
            StoreError::Unavailable("connection reset".into()),
            ValidationError::UnknownTransaction(id),
        );
        assert!(matches!(err, MarketError::Dependency { step: "load_transaction", .. }));
        assert!(err.is_retryable());
    }
}
