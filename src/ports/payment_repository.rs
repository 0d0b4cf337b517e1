//! PaymentRepository port - Persistence for payments and their event log.
//!
//! Plain reads take no locks. Settlement and cancellation go through a
//! [`PaymentTransaction`], which holds an exclusive lock on the payment row
//! from `lock_by_invoice_id` until commit or rollback.
//!
//! ## Lock semantics
//!
//! Two transactions locking the same invoice serialize: the second blocks
//! until the first finishes, then observes its committed state. Different
//! invoices never contend.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, InvoiceId, PaymentId};
use crate::domain::payment::{Payment, PaymentEventRecord};

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts a new pending payment. No event is recorded.
    ///
    /// # Errors
    ///
    /// - `InvoiceConflict` if the invoice ID is already taken
    /// - `DatabaseError` on storage failure
    async fn create(&self, payment: &Payment) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    async fn find_by_invoice_id(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Payment>, DomainError>;

    /// Opens a transaction for a locked read-modify-write.
    async fn begin(&self) -> Result<Box<dyn PaymentTransaction>, DomainError>;
}

/// A storage transaction scoped to one payment row.
///
/// Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait PaymentTransaction: Send {
    /// Reads the payment and locks its row for the rest of the transaction.
    async fn lock_by_invoice_id(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Payment>, DomainError>;

    /// Writes the mutable fields of a payment locked by this transaction.
    async fn update(&mut self, payment: &Payment) -> Result<(), DomainError>;

    /// Appends an immutable event record.
    async fn append_event(&mut self, event: &PaymentEventRecord) -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
