//! Payment status state machine.

use std::fmt;

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created and redirected to the gateway; awaiting settlement.
    Pending,

    /// Settled by an authentic result notification.
    Paid,

    /// Abandoned or declined before settlement.
    Failed,

    /// Returned to the payer out of band.
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Paid) | (Pending, Failed)
            // Refunds arrive out of band from any non-refunded state
                | (Pending, Refunded)
                | (Paid, Refunded)
                | (Failed, Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Paid, Failed, Refunded],
            Paid => vec![Refunded],
            Failed => vec![Refunded],
            Refunded => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_be_paid_or_failed() {
        let status = PaymentStatus::Pending;
        assert_eq!(status.transition_to(PaymentStatus::Paid), Ok(PaymentStatus::Paid));
        assert_eq!(
            status.transition_to(PaymentStatus::Failed),
            Ok(PaymentStatus::Failed)
        );
    }

    #[test]
    fn paid_cannot_return_to_pending_or_fail() {
        let status = PaymentStatus::Paid;
        assert!(status.transition_to(PaymentStatus::Pending).is_err());
        assert!(status.transition_to(PaymentStatus::Failed).is_err());
        assert!(status.transition_to(PaymentStatus::Paid).is_err());
    }

    #[test]
    fn failed_cannot_be_paid() {
        assert!(PaymentStatus::Failed
            .transition_to(PaymentStatus::Paid)
            .is_err());
    }

    #[test]
    fn every_non_refunded_state_can_be_refunded() {
        for status in [PaymentStatus::Pending, PaymentStatus::Paid, PaymentStatus::Failed] {
            assert!(status.can_transition_to(&PaymentStatus::Refunded));
        }
    }

    #[test]
    fn refunded_is_terminal() {
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            for target in status.valid_transitions() {
                assert!(status.can_transition_to(&target));
            }
        }
    }

    #[test]
    fn status_round_trips_through_storage_text() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(PaymentStatus::parse("settled").is_err());
    }
}
