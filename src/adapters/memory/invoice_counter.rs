//! In-memory invoice counter.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::InMemoryPaymentStore;
use crate::ports::{CounterError, InvoiceCounter};

/// Atomic counter mirroring a storage sequence.
///
/// Starts either present or missing, so the allocator's fallback chain can
/// be exercised without a database.
pub struct InMemoryInvoiceCounter {
    store: Arc<InMemoryPaymentStore>,
    value: AtomicI64,
    exists: AtomicBool,
    creatable: bool,
}

impl InMemoryInvoiceCounter {
    pub fn new(store: Arc<InMemoryPaymentStore>) -> Self {
        Self {
            store,
            value: AtomicI64::new(0),
            exists: AtomicBool::new(true),
            creatable: true,
        }
    }

    /// A counter that has not been created yet.
    pub fn missing(store: Arc<InMemoryPaymentStore>) -> Self {
        Self {
            exists: AtomicBool::new(false),
            ..Self::new(store)
        }
    }

    /// A missing counter whose creation always fails.
    pub fn missing_and_uncreatable(store: Arc<InMemoryPaymentStore>) -> Self {
        Self {
            creatable: false,
            ..Self::missing(store)
        }
    }
}

#[async_trait]
impl InvoiceCounter for InMemoryInvoiceCounter {
    async fn next_value(&self) -> Result<i64, CounterError> {
        if !self.exists.load(Ordering::Acquire) {
            return Err(CounterError::Missing);
        }
        Ok(self.value.fetch_add(1, Ordering::AcqRel) + 1)
    }

    async fn create(&self) -> Result<(), CounterError> {
        if !self.creatable {
            return Err(CounterError::Storage("counter creation not permitted".to_string()));
        }
        let floor = self
            .store
            .max_invoice_id()
            .await
            .map(|id| id.value())
            .unwrap_or(0);
        self.value.fetch_max(floor, Ordering::AcqRel);
        self.exists.store(true, Ordering::Release);
        Ok(())
    }

    async fn max_assigned(&self) -> Result<Option<i64>, CounterError> {
        Ok(self.store.max_invoice_id().await.map(|id| id.value()))
    }
}
