//! Invoice number allocation.
//!
//! The storage counter is the only source used in normal operation. When it
//! is missing, an ordered chain of fallbacks keeps payment creation alive:
//!
//! 1. `PrimaryCounter` - atomic increment of the storage counter
//! 2. `CreateCounterThenRetry` - create the counter, retry once
//! 3. `MaxPlusOne` - one above the highest stored invoice; races under
//!    concurrent use, accepted as a degraded-mode risk
//! 4. `ClockSynthesis` - derived from the wall clock, last resort only
//!
//! Each strategy returns an [`Allocation`]; the allocator never inspects
//! error text.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::PaymentError;
use crate::domain::foundation::InvoiceId;
use crate::ports::{CounterError, InvoiceCounter};

/// Result of one allocation strategy.
#[derive(Debug)]
pub enum Allocation {
    /// An invoice number was produced.
    Issued(InvoiceId),
    /// This strategy cannot serve; try the next one.
    FallThrough(String),
    /// Stop the chain and fail the request.
    Fatal(PaymentError),
}

#[async_trait]
pub trait AllocationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, counter: &dyn InvoiceCounter) -> Allocation;
}

fn issue(value: i64) -> Allocation {
    match InvoiceId::new(value) {
        Ok(id) => Allocation::Issued(id),
        Err(e) => Allocation::Fatal(PaymentError::storage(format!(
            "invoice counter produced an invalid value: {}",
            e
        ))),
    }
}

/// Atomic increment of the storage counter.
pub struct PrimaryCounter;

#[async_trait]
impl AllocationStrategy for PrimaryCounter {
    fn name(&self) -> &'static str {
        "primary_counter"
    }

    async fn attempt(&self, counter: &dyn InvoiceCounter) -> Allocation {
        match counter.next_value().await {
            Ok(value) => issue(value),
            Err(CounterError::Missing) => Allocation::FallThrough("counter missing".to_string()),
            Err(e) => Allocation::Fatal(PaymentError::storage(e.to_string())),
        }
    }
}

/// Creates a missing counter and retries the increment once.
pub struct CreateCounterThenRetry;

#[async_trait]
impl AllocationStrategy for CreateCounterThenRetry {
    fn name(&self) -> &'static str {
        "create_counter_then_retry"
    }

    async fn attempt(&self, counter: &dyn InvoiceCounter) -> Allocation {
        if let Err(e) = counter.create().await {
            return Allocation::FallThrough(format!("counter creation failed: {}", e));
        }
        match counter.next_value().await {
            Ok(value) => issue(value),
            Err(e) => Allocation::FallThrough(format!("retry after creation failed: {}", e)),
        }
    }
}

/// One above the highest stored invoice number.
pub struct MaxPlusOne;

#[async_trait]
impl AllocationStrategy for MaxPlusOne {
    fn name(&self) -> &'static str {
        "max_plus_one"
    }

    async fn attempt(&self, counter: &dyn InvoiceCounter) -> Allocation {
        match counter.max_assigned().await {
            Ok(None) => issue(1),
            Ok(Some(max)) => match max.checked_add(1) {
                Some(next) => issue(next.max(1)),
                None => Allocation::FallThrough("invoice numbers exhausted".to_string()),
            },
            Err(e) => Allocation::FallThrough(format!("max invoice query failed: {}", e)),
        }
    }
}

/// Clock-derived invoice numbers, strictly increasing within the process.
#[derive(Default)]
pub struct ClockSynthesis {
    last: AtomicI64,
}

impl ClockSynthesis {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> i64 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let candidate = ((nanos % i64::MAX as u128) as i64).max(1);

        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = if candidate > current {
                candidate
            } else if current < i64::MAX {
                current + 1
            } else {
                1
            };
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

#[async_trait]
impl AllocationStrategy for ClockSynthesis {
    fn name(&self) -> &'static str {
        "clock_synthesis"
    }

    async fn attempt(&self, _counter: &dyn InvoiceCounter) -> Allocation {
        issue(self.next())
    }
}

/// Produces invoice numbers by walking the strategy chain in order.
pub struct InvoiceAllocator {
    counter: Arc<dyn InvoiceCounter>,
    strategies: Vec<Box<dyn AllocationStrategy>>,
}

impl InvoiceAllocator {
    /// Allocator with the standard fallback chain.
    pub fn new(counter: Arc<dyn InvoiceCounter>) -> Self {
        Self::with_strategies(
            counter,
            vec![
                Box::new(PrimaryCounter),
                Box::new(CreateCounterThenRetry),
                Box::new(MaxPlusOne),
                Box::new(ClockSynthesis::new()),
            ],
        )
    }

    pub fn with_strategies(
        counter: Arc<dyn InvoiceCounter>,
        strategies: Vec<Box<dyn AllocationStrategy>>,
    ) -> Self {
        Self {
            counter,
            strategies,
        }
    }

    /// Allocates the next invoice number.
    ///
    /// # Errors
    ///
    /// `Storage` if a strategy fails fatally or every strategy falls through.
    pub async fn allocate(&self) -> Result<InvoiceId, PaymentError> {
        for (position, strategy) in self.strategies.iter().enumerate() {
            match strategy.attempt(self.counter.as_ref()).await {
                Allocation::Issued(invoice_id) => {
                    if position + 1 == self.strategies.len() && position > 0 {
                        tracing::error!(
                            strategy = strategy.name(),
                            invoice_id = invoice_id.value(),
                            "Invoice number synthesized by last-resort strategy"
                        );
                    } else if position > 0 {
                        tracing::warn!(
                            strategy = strategy.name(),
                            invoice_id = invoice_id.value(),
                            "Invoice number allocated by fallback strategy"
                        );
                    }
                    return Ok(invoice_id);
                }
                Allocation::FallThrough(reason) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        reason = %reason,
                        "Invoice allocation strategy unavailable, falling back"
                    );
                }
                Allocation::Fatal(error) => {
                    tracing::error!(
                        strategy = strategy.name(),
                        error = %error,
                        "Invoice allocation failed"
                    );
                    return Err(error);
                }
            }
        }

        Err(PaymentError::storage(
            "no invoice allocation strategy could produce a number",
        ))
    }
}
