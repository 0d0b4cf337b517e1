//! CancelPaymentHandler - Abandons a pending checkout.
//!
//! Runs under the same row lock as settlement, so a cancel racing a result
//! notification resolves to exactly one terminal state.

use std::sync::Arc;

use crate::domain::foundation::{InvoiceId, PaymentId};
use crate::domain::payment::{Payment, PaymentError, PaymentEventRecord, PaymentStatus};
use crate::ports::{PaymentRepository, PaymentTransaction};

#[derive(Debug, Clone)]
pub struct CancelPaymentCommand {
    pub payment_id: PaymentId,
    /// Recorded on the `payment.failed` event.
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum CancelPaymentResult {
    Cancelled(Payment),
    /// The payment had already failed; nothing changed.
    AlreadyCancelled(Payment),
}

impl CancelPaymentResult {
    pub fn payment(&self) -> &Payment {
        match self {
            CancelPaymentResult::Cancelled(payment) => payment,
            CancelPaymentResult::AlreadyCancelled(payment) => payment,
        }
    }
}

pub struct CancelPaymentHandler {
    repository: Arc<dyn PaymentRepository>,
}

impl CancelPaymentHandler {
    pub fn new(repository: Arc<dyn PaymentRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(
        &self,
        cmd: CancelPaymentCommand,
    ) -> Result<CancelPaymentResult, PaymentError> {
        // 1. Resolve the invoice the row lock is keyed on
        let invoice_id = self
            .repository
            .find_by_id(&cmd.payment_id)
            .await?
            .map(|p| p.invoice_id)
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", cmd.payment_id)))?;

        // 2. Lock and transition
        let mut tx = self.repository.begin().await?;
        match cancel_locked(tx.as_mut(), invoice_id, &cmd).await {
            Ok(result) => {
                tx.commit().await?;
                if let CancelPaymentResult::Cancelled(payment) = &result {
                    tracing::info!(
                        payment_id = %payment.id,
                        invoice_id = payment.invoice_id.value(),
                        reason = %cmd.reason,
                        "Payment cancelled"
                    );
                }
                Ok(result)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(error = %rollback_error, "Rollback after failed cancel failed");
                }
                Err(error)
            }
        }
    }
}

async fn cancel_locked(
    tx: &mut dyn PaymentTransaction,
    invoice_id: InvoiceId,
    cmd: &CancelPaymentCommand,
) -> Result<CancelPaymentResult, PaymentError> {
    let mut payment = tx
        .lock_by_invoice_id(invoice_id)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("payment {}", cmd.payment_id)))?;

    if payment.status == PaymentStatus::Failed {
        return Ok(CancelPaymentResult::AlreadyCancelled(payment));
    }

    payment.mark_failed().map_err(|e| {
        tracing::warn!(
            payment_id = %payment.id,
            status = %payment.status,
            "Cancel requested for settled payment"
        );
        e
    })?;
    tx.update(&payment).await?;
    tx.append_event(&PaymentEventRecord::failed(&payment, &cmd.reason))
        .await?;

    Ok(CancelPaymentResult::Cancelled(payment))
}
