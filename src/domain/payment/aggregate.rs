//! Payment aggregate entity.
//!
//! A Payment is one attempt to collect money through the gateway. It is
//! created pending and mutated exactly once by settlement or cancellation.
//!
//! # Design Decisions
//!
//! - **Exact money**: amounts are `Decimal`, never floats
//! - **Kind-tagged fields**: subscription reference and package size live in
//!   `PaymentKind`, not as loose optionals
//! - **Immutable correlation**: `init_correlation` is written at creation and
//!   never touched again

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{Amount, CorrelationBag, Currency, PaymentError, PaymentKind, PaymentStatus};
use crate::domain::foundation::{InvoiceId, PaymentId, StateMachine, Timestamp, UserId};

/// Payment aggregate.
///
/// # Invariants
///
/// - `invoice_id` is unique and assigned once
/// - `amount` and `currency` never change after creation
/// - `status` only moves along `PaymentStatus` edges
/// - each of `paid_at`, `failed_at`, `refunded_at` is set at most once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,

    /// Owning user. Ownership checks belong to the caller.
    pub user_id: UserId,

    /// Purpose of the payment; decides the side effect on settlement.
    pub kind: PaymentKind,

    pub invoice_id: InvoiceId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PaymentStatus,

    /// Correlation bag issued at creation.
    pub init_correlation: CorrelationBag,

    /// Raw callback fields recorded at settlement, for audit.
    pub callback_payload: Option<JsonValue>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub paid_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
    pub refunded_at: Option<Timestamp>,
}

impl Payment {
    /// Creates a new pending payment.
    pub fn create(
        user_id: UserId,
        kind: PaymentKind,
        invoice_id: InvoiceId,
        amount: Amount,
        currency: Currency,
        init_correlation: CorrelationBag,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: PaymentId::new(),
            user_id,
            kind,
            invoice_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            init_correlation,
            callback_payload: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            failed_at: None,
            refunded_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    /// Settles the payment and records the callback that settled it.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the payment is pending.
    pub fn mark_paid(&mut self, callback_payload: JsonValue) -> Result<(), PaymentError> {
        self.transition_to(PaymentStatus::Paid, "settle")?;
        let now = Timestamp::now();
        self.paid_at = Some(now);
        self.callback_payload = Some(callback_payload);
        self.updated_at = now;
        Ok(())
    }

    /// Marks the payment as failed.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the payment is pending.
    pub fn mark_failed(&mut self) -> Result<(), PaymentError> {
        self.transition_to(PaymentStatus::Failed, "fail")?;
        let now = Timestamp::now();
        self.failed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Marks the payment as refunded. Refund workflows live outside this crate.
    ///
    /// # Errors
    ///
    /// `InvalidState` if already refunded.
    pub fn mark_refunded(&mut self) -> Result<(), PaymentError> {
        self.transition_to(PaymentStatus::Refunded, "refund")?;
        let now = Timestamp::now();
        self.refunded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn transition_to(
        &mut self,
        target: PaymentStatus,
        operation: &'static str,
    ) -> Result<(), PaymentError> {
        self.status = self
            .status
            .transition_to(target)
            .map_err(|_| PaymentError::InvalidState {
                payment_id: self.id.to_string(),
                status: self.status.to_string(),
                operation,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending_payment() -> Payment {
        Payment::create(
            UserId::new("user-1").unwrap(),
            PaymentKind::credit_package(20).unwrap(),
            InvoiceId::new(500).unwrap(),
            Amount::parse("1790.00").unwrap(),
            Currency::new("RUB").unwrap(),
            CorrelationBag::issue(&UserId::new("user-1").unwrap(), InvoiceId::new(500).unwrap()),
        )
    }

    // ══════════════════════════════════════════════════════════════
    // Creation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn create_starts_pending_without_terminal_stamps() {
        let payment = pending_payment();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.paid_at.is_none());
        assert!(payment.failed_at.is_none());
        assert!(payment.refunded_at.is_none());
        assert!(payment.callback_payload.is_none());
        assert_eq!(payment.init_correlation.len(), 2);
    }

    // ══════════════════════════════════════════════════════════════
    // Transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn mark_paid_stamps_paid_at_and_payload() {
        let mut payment = pending_payment();

        payment.mark_paid(json!({"OutSum": "1790.00"})).unwrap();

        assert_eq!(payment.status, PaymentStatus::Paid);
        assert!(payment.paid_at.is_some());
        assert_eq!(payment.callback_payload, Some(json!({"OutSum": "1790.00"})));
    }

    #[test]
    fn mark_paid_twice_is_invalid_state() {
        let mut payment = pending_payment();
        payment.mark_paid(json!({})).unwrap();
        let first_paid_at = payment.paid_at;

        let result = payment.mark_paid(json!({}));

        assert!(matches!(result, Err(PaymentError::InvalidState { .. })));
        assert_eq!(payment.paid_at, first_paid_at);
    }

    #[test]
    fn failed_payment_cannot_be_paid() {
        let mut payment = pending_payment();
        payment.mark_failed().unwrap();

        assert!(payment.mark_paid(json!({})).is_err());
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(payment.failed_at.is_some());
    }

    #[test]
    fn paid_payment_can_be_refunded_once() {
        let mut payment = pending_payment();
        payment.mark_paid(json!({})).unwrap();

        payment.mark_refunded().unwrap();

        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert!(payment.refunded_at.is_some());
        assert!(payment.mark_refunded().is_err());
    }

    #[test]
    fn transitions_preserve_amount_and_correlation() {
        let mut payment = pending_payment();
        let amount = payment.amount;
        let bag = payment.init_correlation.clone();

        payment.mark_paid(json!({})).unwrap();

        assert_eq!(payment.amount, amount);
        assert_eq!(payment.init_correlation, bag);
    }
}
