//! Payment Confirmation - Asynchronous settlement of gateway payments.
//!
//! Allocates invoice IDs, signs checkout links, and settles payments from
//! the gateway's result notifications exactly once under a row lock,
//! dispatching the purchased side effect in the same transaction.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
