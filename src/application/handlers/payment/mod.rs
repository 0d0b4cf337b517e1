//! Payment handlers.
//!
//! ## Commands
//! - Creating a payment and its signed checkout link
//! - Settling a payment from the gateway's result notification
//! - Cancelling a pending payment
//!
//! ## Queries
//! - Verifying the success redirect
//! - Get payment details

mod cancel_payment;
mod create_payment;
mod get_payment;
mod handle_result_webhook;
mod handle_success_redirect;

use crate::domain::payment::Amount;

// Commands
pub use cancel_payment::{CancelPaymentCommand, CancelPaymentHandler, CancelPaymentResult};
pub use create_payment::{CreatePaymentCommand, CreatePaymentHandler, CreatePaymentResult};
pub use handle_result_webhook::{
    HandleResultWebhookCommand, HandleResultWebhookHandler, WebhookOutcome,
};

// Queries
pub use get_payment::{GetPaymentHandler, GetPaymentQuery};
pub use handle_success_redirect::{
    HandleSuccessRedirectCommand, HandleSuccessRedirectHandler, SuccessRedirectResult,
};

/// `OutSum` texts to try when verifying a gateway signature.
///
/// The stored amount's signing form comes first. The inbound text follows
/// when it differs, since the gateway signs the amount as it transmits it.
pub(crate) fn out_sum_candidates(stored: &Amount, received: &str) -> Vec<String> {
    let canonical = stored.to_signing_string();
    let mut candidates = vec![canonical];
    if !received.is_empty() && received != candidates[0] {
        candidates.push(received.to_string());
    }
    candidates
}
