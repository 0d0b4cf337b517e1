//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `PaymentRepository` - Payment rows, lookups and locking transactions
//! - `PaymentTransaction` - Row-locked unit of work for state transitions
//! - `InvoiceCounter` - Source of monotonic invoice IDs
//!
//! ## Capability Ports
//!
//! - `SubscriptionActivator` - Activates a paid subscription
//! - `CreditGranter` - Grants purchased credits

mod credit_granter;
mod invoice_counter;
mod payment_repository;
mod subscription_activator;

pub use credit_granter::CreditGranter;
pub use invoice_counter::{CounterError, InvoiceCounter};
pub use payment_repository::{PaymentRepository, PaymentTransaction};
pub use subscription_activator::SubscriptionActivator;
