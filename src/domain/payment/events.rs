//! Payment domain events and their persisted form.
//!
//! Every successful transition appends exactly one immutable record to the
//! payment's event log. Creating a pending payment is not a transition and
//! writes no record. Records are never updated or deleted.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::Payment;
use crate::domain::foundation::{EventId, PaymentId, Timestamp};

/// Events that occur during a payment's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentEventType {
    /// State transition: Pending → Paid
    ///
    /// Trigger: authentic result notification
    Paid,

    /// State transition: Pending → Failed
    Failed,

    /// State transition: any → Refunded
    Refunded,
}

impl PaymentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentEventType::Paid => "payment.paid",
            PaymentEventType::Failed => "payment.failed",
            PaymentEventType::Refunded => "payment.refunded",
        }
    }
}

/// One row of the append-only payment event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEventRecord {
    pub id: EventId,
    pub payment_id: PaymentId,
    pub event_type: String,
    pub payload: JsonValue,
    pub occurred_at: Timestamp,
}

impl PaymentEventRecord {
    fn new(payment: &Payment, event_type: PaymentEventType, payload: JsonValue) -> Self {
        Self {
            id: EventId::new(),
            payment_id: payment.id,
            event_type: event_type.as_str().to_string(),
            payload,
            occurred_at: payment.updated_at,
        }
    }

    /// Settlement record; carries the raw callback for audit.
    pub fn paid(payment: &Payment) -> Self {
        Self::new(
            payment,
            PaymentEventType::Paid,
            json!({
                "invoice_id": payment.invoice_id.value(),
                "amount": payment.amount.to_signing_string(),
                "callback": payment.callback_payload.clone().unwrap_or(JsonValue::Null),
            }),
        )
    }

    pub fn failed(payment: &Payment, reason: &str) -> Self {
        Self::new(
            payment,
            PaymentEventType::Failed,
            json!({
                "invoice_id": payment.invoice_id.value(),
                "reason": reason,
            }),
        )
    }

    pub fn refunded(payment: &Payment) -> Self {
        Self::new(
            payment,
            PaymentEventType::Refunded,
            json!({ "invoice_id": payment.invoice_id.value() }),
        )
    }
}
