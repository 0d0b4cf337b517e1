//! Robokassa gateway protocol.
//!
//! # Module Structure
//!
//! - `algorithm` - configurable digest algorithm
//! - `credentials` - validated merchant credentials
//! - `signature` - canonical signature bases, signing and verification
//! - `link` - signed checkout URL
//! - `notification` - parsing of inbound callbacks

mod algorithm;
pub(crate) mod credentials;
mod link;
mod notification;
mod signature;

pub use algorithm::HashAlgorithm;
pub use credentials::{check_credentials, CredentialDefect, RobokassaCredentials};
pub use link::PaymentLinkBuilder;
pub use notification::{
    GatewayCallback, INVOICE_ID_FIELD, OUT_SUM_FIELD, SIGNATURE_FIELD, TEST_MODE_FIELD,
};
pub use signature::{SignatureBase, SignatureEngine, SignedFields};
