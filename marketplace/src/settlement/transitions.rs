//! Allowed changes of a transaction's two status fields.
//!
//! Re-asserting the current value is always allowed and changes nothing.

use crate::error::ValidationError;
use socialmart_core::{PaymentStatus, TransactionStatus};

/// Whether a transaction may move from `from` to `to`.
#[must_use]
pub const fn status_transition_allowed(from: TransactionStatus, to: TransactionStatus) -> bool {
    use TransactionStatus::{Cancelled, Completed, Failed, Pending, Processing};
    matches!(
        (from, to),
        (Pending, Pending)
            | (Processing, Processing)
            | (Completed, Completed)
            | (Failed, Failed)
            | (Cancelled, Cancelled)
            | (Pending, Processing | Completed | Failed | Cancelled)
            | (Processing, Completed | Failed | Cancelled)
    )
}

/// Whether a payment status may move from `from` to `to`.
#[must_use]
pub const fn payment_transition_allowed(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::{Failed, Paid, Refunded, Unpaid};
    matches!(
        (from, to),
        (Unpaid, Unpaid)
            | (Paid, Paid)
            | (Failed, Failed)
            | (Refunded, Refunded)
            | (Unpaid, Paid | Failed)
            | (Failed, Paid)
            | (Paid, Refunded)
    )
}

/// Check both fields at once.
///
/// # Errors
///
/// The first disallowed change, status before payment.
pub fn check_transition(
    current: (TransactionStatus, PaymentStatus),
    requested: (TransactionStatus, PaymentStatus),
) -> Result<(), ValidationError> {
    if !status_transition_allowed(current.0, requested.0) {
        return Err(ValidationError::StatusTransition { from: current.0, to: requested.0 });
    }
    if !payment_transition_allowed(current.1, requested.1) {
        return Err(ValidationError::PaymentTransition { from: current.1, to: requested.1 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses_only_accept_themselves() {
        for terminal in [TransactionStatus::Completed, TransactionStatus::Failed, TransactionStatus::Cancelled] {
            for to in TransactionStatus::ALL {
                assert_eq!(status_transition_allowed(terminal, *to), terminal == *to, "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn test_processing_cannot_go_back_to_pending() {
        assert!(status_transition_allowed(TransactionStatus::Pending, TransactionStatus::Processing));
        assert!(!status_transition_allowed(TransactionStatus::Processing, TransactionStatus::Pending));
    }

    #[test]
    fn test_payment_transitions() {
        assert!(payment_transition_allowed(PaymentStatus::Failed, PaymentStatus::Paid));
        assert!(payment_transition_allowed(PaymentStatus::Paid, PaymentStatus::Refunded));
        assert!(!payment_transition_allowed(PaymentStatus::Refunded, PaymentStatus::Paid));
        assert!(!payment_transition_allowed(PaymentStatus::Unpaid, PaymentStatus::Refunded));
    }

    #[test]
    fn test_check_transition_reports_status_first() {
        let err = check_transition(
            (TransactionStatus::Cancelled, PaymentStatus::Refunded),
            (TransactionStatus::Completed, PaymentStatus::Paid),
        );
        assert_eq!(
            err,
            Err(ValidationError::StatusTransition {
                from: TransactionStatus::Cancelled,
                to: TransactionStatus::Completed,
            })
        );
    }
}
