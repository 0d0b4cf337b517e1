//! In-memory adapters for tests and single-process deployments.

mod invoice_counter;
mod payment_store;

pub use invoice_counter::InMemoryInvoiceCounter;
pub use payment_store::{InMemoryPaymentStore, InMemoryPaymentTransaction};
