//! Error taxonomy for payment initiation and settlement.
//!
//! Every rejection the subsystem can produce maps to one variant, with
//! retryability and an HTTP status hint so the calling boundary can decide
//! whether the gateway should redeliver.

use http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Errors produced while creating or settling payments.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// Malformed amount, invoice ID or other inbound field.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Gateway credentials are missing or invalid; the service refuses to operate.
    #[error("payment gateway misconfigured: {0}")]
    Configuration(String),

    /// Signature did not match any accepted signature base.
    #[error("signature mismatch for invoice {invoice_id}")]
    Signature { invoice_id: i64 },

    /// Correlation bag does not bind the callback to this payment.
    #[error("correlation mismatch for invoice {invoice_id}: {reason}")]
    Replay { invoice_id: i64, reason: String },

    /// Callback amount differs from the stored amount.
    #[error("amount mismatch for invoice {invoice_id}: expected {expected}, received {received}")]
    AmountMismatch {
        invoice_id: i64,
        expected: String,
        received: String,
    },

    /// Test-mode marker does not match the configured mode.
    #[error("mode mismatch for invoice {invoice_id}: service test_mode={configured_test_mode}")]
    ModeMismatch {
        invoice_id: i64,
        configured_test_mode: bool,
    },

    /// No payment matches the identifier.
    #[error("payment not found: {0}")]
    NotFound(String),

    /// Payment is in a status the operation cannot act on.
    #[error("payment {payment_id} is {status}, cannot {operation}")]
    InvalidState {
        payment_id: String,
        status: String,
        operation: &'static str,
    },

    /// Subscription activation or credit grant failed.
    #[error("side effect failed: {0}")]
    SideEffect(String),

    /// Storage failure; the whole delivery may be retried.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PaymentError::Configuration(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        PaymentError::Storage(message.into())
    }

    /// Returns true if redelivering the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Storage(_) | PaymentError::SideEffect(_))
    }

    /// Returns true for rejections that indicate a forged, replayed or
    /// misrouted callback.
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            PaymentError::Signature { .. }
                | PaymentError::Replay { .. }
                | PaymentError::AmountMismatch { .. }
                | PaymentError::ModeMismatch { .. }
        )
    }

    /// Maps the error to a status code for the HTTP boundary.
    ///
    /// - 4xx: rejected, the gateway must not treat it as acknowledged
    /// - 5xx: transient, the gateway redelivers
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_)
            | PaymentError::Signature { .. }
            | PaymentError::Replay { .. }
            | PaymentError::AmountMismatch { .. }
            | PaymentError::ModeMismatch { .. } => StatusCode::BAD_REQUEST,

            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::InvalidState { .. } => StatusCode::CONFLICT,
            PaymentError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,

            PaymentError::SideEffect(_) | PaymentError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            PaymentError::Validation(e) => e.to_string(),
            PaymentError::NotFound(_) => "payment not found".to_string(),
            PaymentError::InvalidState { status, .. } => {
                format!("payment is already {}", status)
            }
            e if e.is_security_rejection() => "payment notification rejected".to_string(),
            PaymentError::Configuration(_) => "payments are temporarily unavailable".to_string(),
            _ => "internal error".to_string(),
        }
    }
}

impl From<DomainError> for PaymentError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::PaymentNotFound => PaymentError::NotFound(err.message),
            ErrorCode::ValidationFailed => PaymentError::Validation(
                ValidationError::invalid_format("payment", err.message),
            ),
            _ => PaymentError::Storage(err.to_string()),
        }
    }
}
