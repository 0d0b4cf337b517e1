//! In-memory implementation of PaymentRepository.
//!
//! Row locks are emulated with one `tokio::sync::Mutex` per invoice ID. The
//! guard lives inside the transaction, so concurrent settlements of the same
//! invoice serialize exactly as they do under `SELECT ... FOR UPDATE`. A lock
//! entry is removed once the last transaction holding or awaiting it ends, so
//! the lock table only holds invoices that are in use.
//!
//! # Limitations
//!
//! Locks exist only inside this process. Running more than one instance
//! against the same logical store would let two deliveries settle the same
//! payment; use the PostgreSQL adapter for multi-instance deployments.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard as SyncMutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::foundation::{DomainError, ErrorCode, InvoiceId, PaymentId};
use crate::domain::payment::{Payment, PaymentEventRecord};
use crate::ports::{PaymentRepository, PaymentTransaction};

#[derive(Default)]
struct StoreState {
    payments: HashMap<PaymentId, Payment>,
    by_invoice: HashMap<InvoiceId, PaymentId>,
    events: Vec<PaymentEventRecord>,
}

type RowLocks = SyncMutex<HashMap<InvoiceId, Arc<Mutex<()>>>>;

/// The lock table is only touched briefly and never across an await.
fn lock_table(row_locks: &RowLocks) -> SyncMutexGuard<'_, HashMap<InvoiceId, Arc<Mutex<()>>>> {
    row_locks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory payment store with per-invoice row locks.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<StoreState>>,
    row_locks: Arc<RowLocks>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest invoice ID held by any stored payment.
    pub async fn max_invoice_id(&self) -> Option<InvoiceId> {
        self.state.read().await.by_invoice.keys().max().copied()
    }

    // === Test Helpers ===

    /// Events recorded for a payment, oldest first.
    pub async fn events_for(&self, payment_id: &PaymentId) -> Vec<PaymentEventRecord> {
        self.state
            .read()
            .await
            .events
            .iter()
            .filter(|e| &e.payment_id == payment_id)
            .cloned()
            .collect()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Stores a payment as-is, replacing any row with the same ID and
    /// skipping transition rules.
    pub async fn insert_raw(&self, payment: Payment) {
        let mut state = self.state.write().await;
        state.by_invoice.insert(payment.invoice_id, payment.id);
        state.payments.insert(payment.id, payment);
    }

    /// Makes the next transaction commit fail with a storage error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Invoices with a live row-lock entry.
    pub fn row_lock_count(&self) -> usize {
        lock_table(&self.row_locks).len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentStore {
    async fn create(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if state.by_invoice.contains_key(&payment.invoice_id) {
            return Err(DomainError::new(
                ErrorCode::InvoiceConflict,
                format!("Invoice {} is already assigned", payment.invoice_id),
            ));
        }
        state.by_invoice.insert(payment.invoice_id, payment.id);
        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.state.read().await.payments.get(id).cloned())
    }

    async fn find_by_invoice_id(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Payment>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .by_invoice
            .get(&invoice_id)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn begin(&self) -> Result<Box<dyn PaymentTransaction>, DomainError> {
        Ok(Box::new(InMemoryPaymentTransaction {
            state: Arc::clone(&self.state),
            row_locks: Arc::clone(&self.row_locks),
            fail_commit: Arc::clone(&self.fail_next_commit),
            guards: HashMap::new(),
            locked: HashSet::new(),
            updates: Vec::new(),
            events: Vec::new(),
        }))
    }
}

/// Staged writes plus the row-lock guards held by one transaction.
///
/// Nothing reaches the store until `commit`; dropping the transaction
/// discards the staged writes and releases its locks.
pub struct InMemoryPaymentTransaction {
    state: Arc<RwLock<StoreState>>,
    row_locks: Arc<RowLocks>,
    fail_commit: Arc<AtomicBool>,
    guards: HashMap<InvoiceId, OwnedMutexGuard<()>>,
    locked: HashSet<PaymentId>,
    updates: Vec<Payment>,
    events: Vec<PaymentEventRecord>,
}

impl InMemoryPaymentTransaction {
    async fn acquire(&mut self, invoice_id: InvoiceId) {
        if self.guards.contains_key(&invoice_id) {
            return;
        }
        let lock = {
            let mut table = lock_table(&self.row_locks);
            Arc::clone(
                table
                    .entry(invoice_id)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let guard = lock.lock_owned().await;
        self.guards.insert(invoice_id, guard);
    }
}

impl Drop for InMemoryPaymentTransaction {
    fn drop(&mut self) {
        let released: Vec<InvoiceId> = self.guards.drain().map(|(id, _guard)| id).collect();
        if released.is_empty() {
            return;
        }

        // Entries still referenced belong to a waiting transaction.
        let mut table = lock_table(&self.row_locks);
        for invoice_id in released {
            let unused = table
                .get(&invoice_id)
                .map_or(false, |lock| Arc::strong_count(lock) == 1);
            if unused {
                table.remove(&invoice_id);
            }
        }
    }
}

#[async_trait]
impl PaymentTransaction for InMemoryPaymentTransaction {
    async fn lock_by_invoice_id(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Payment>, DomainError> {
        self.acquire(invoice_id).await;

        let state = self.state.read().await;
        let payment = state
            .by_invoice
            .get(&invoice_id)
            .and_then(|id| state.payments.get(id))
            .cloned();
        drop(state);

        if let Some(payment) = &payment {
            self.locked.insert(payment.id);
        }
        Ok(payment)
    }

    async fn update(&mut self, payment: &Payment) -> Result<(), DomainError> {
        if !self.locked.contains(&payment.id) {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                format!("Payment {} was not locked by this transaction", payment.id),
            ));
        }
        self.updates.push(payment.clone());
        Ok(())
    }

    async fn append_event(&mut self, event: &PaymentEventRecord) -> Result<(), DomainError> {
        self.events.push(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(DomainError::database("Simulated commit failure"));
        }

        let mut this = self;
        let store = Arc::clone(&this.state);
        let mut state = store.write().await;
        for payment in this.updates.drain(..) {
            state.payments.insert(payment.id, payment);
        }
        state.events.append(&mut this.events);
        drop(state);
        // Dropping the transaction releases its row locks.
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}
