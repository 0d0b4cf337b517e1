//! Payment domain - Payment aggregate, amounts, correlation and allocation.
//!
//! A payment is created pending with a freshly allocated invoice number and
//! a correlation bag, then settled exactly once by an authentic gateway
//! notification.

mod aggregate;
mod amount;
mod correlation;
mod errors;
mod events;
mod invoice_allocator;
mod kind;
mod replay;
mod status;

pub use aggregate::Payment;
pub use amount::{amounts_equal, Amount, Currency, MINOR_UNIT_DIGITS};
pub use correlation::{
    is_correlation_key, CorrelationBag, CORRELATION_PREFIX, NONCE_KEY, USER_KEY,
};
pub use errors::PaymentError;
pub use events::{PaymentEventRecord, PaymentEventType};
pub use invoice_allocator::{
    Allocation, AllocationStrategy, ClockSynthesis, CreateCounterThenRetry, InvoiceAllocator,
    MaxPlusOne, PrimaryCounter,
};
pub use kind::{PaymentKind, MAX_CREDIT_PACKAGE_SIZE};
pub use replay::{validate_correlation, CorrelationCheck, LegacyCorrelationPolicy};
pub use status::PaymentStatus;
