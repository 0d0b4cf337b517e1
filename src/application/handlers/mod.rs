//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod payment;

pub use payment::{
    CancelPaymentCommand, CancelPaymentHandler, CancelPaymentResult, CreatePaymentCommand,
    CreatePaymentHandler, CreatePaymentResult, GetPaymentHandler, GetPaymentQuery,
    HandleResultWebhookCommand, HandleResultWebhookHandler, HandleSuccessRedirectCommand,
    HandleSuccessRedirectHandler, SuccessRedirectResult, WebhookOutcome,
};
