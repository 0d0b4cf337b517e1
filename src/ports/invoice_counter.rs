//! InvoiceCounter port - Storage-backed source of invoice numbers.
//!
//! The primary operation is an atomic increment that is safe under any
//! number of concurrent callers. The remaining operations exist only for
//! the allocator's degraded-mode fallbacks.

use async_trait::async_trait;
use thiserror::Error;

/// Structured failure of a counter operation.
///
/// Adapters classify storage errors into these variants so the allocator
/// never has to inspect message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    /// The counter primitive has not been created.
    #[error("invoice counter is missing")]
    Missing,

    /// The payment store has no invoice column to scan.
    #[error("invoice column is missing from the payment store")]
    MissingColumn,

    /// Any other storage failure.
    #[error("invoice counter storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait InvoiceCounter: Send + Sync {
    /// Atomically increments the counter and returns the new value.
    async fn next_value(&self) -> Result<i64, CounterError>;

    /// Creates the counter, seeding it above any invoice already assigned.
    async fn create(&self) -> Result<(), CounterError>;

    /// Highest invoice number held by any stored payment.
    async fn max_assigned(&self) -> Result<Option<i64>, CounterError>;
}
