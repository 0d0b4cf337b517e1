//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers (write) are kept apart from query handlers (read).

pub mod handlers;
pub mod side_effects;

pub use handlers::*;
pub use side_effects::{grant_reason, DispatchedSideEffect, SideEffectDispatcher};
