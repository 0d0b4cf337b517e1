//! Adapters - Implementations of port interfaces.
//!
//! - `postgres` - PostgreSQL storage with `FOR UPDATE` row locks
//! - `memory` - In-process storage for tests and single-node use

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryInvoiceCounter, InMemoryPaymentStore};
pub use postgres::{PostgresInvoiceSequence, PostgresPaymentRepository};
