//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `payment` - Payment aggregate, amounts, correlation and invoice allocation
//! - `robokassa` - Gateway credentials, signatures, links and callbacks

pub mod foundation;
pub mod payment;
pub mod robokassa;
