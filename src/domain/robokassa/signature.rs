//! Signature bases and digests for the gateway protocol.
//!
//! Field order and encoding are fixed by the gateway:
//!
//! - initiation: `login:OutSum:InvId[:urlencode(Receipt)]:password1[:Shp_pairs]`
//! - success redirect: `OutSum:InvId:password1[:Shp_pairs]`
//! - result notification: `OutSum:InvId:password2[:Shp_pairs]`
//!
//! `Shp_pairs` is the correlation bag rendered by
//! [`CorrelationBag::signature_suffix`].

use subtle::ConstantTimeEq;

use super::RobokassaCredentials;
use crate::domain::foundation::InvoiceId;
use crate::domain::payment::CorrelationBag;

/// Fields signed by one protocol operation.
#[derive(Debug, Clone, Copy)]
pub enum SignedFields<'a> {
    Initiation {
        out_sum: &'a str,
        invoice_id: InvoiceId,
        receipt: Option<&'a str>,
        correlation: &'a CorrelationBag,
    },
    SuccessRedirect {
        out_sum: &'a str,
        invoice_id: InvoiceId,
        correlation: &'a CorrelationBag,
    },
    ResultNotification {
        out_sum: &'a str,
        invoice_id: InvoiceId,
        correlation: &'a CorrelationBag,
    },
}

/// Canonical string whose digest is the signature value.
///
/// Contains a password; never log it.
pub struct SignatureBase(String);

impl SignatureBase {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SignatureBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignatureBase([REDACTED])")
    }
}

/// Builds, signs and verifies signature bases with one set of credentials.
#[derive(Debug, Clone, Copy)]
pub struct SignatureEngine<'a> {
    credentials: &'a RobokassaCredentials,
}

impl<'a> SignatureEngine<'a> {
    pub fn new(credentials: &'a RobokassaCredentials) -> Self {
        Self { credentials }
    }

    pub fn base(&self, fields: SignedFields<'_>) -> SignatureBase {
        let invoice_text;
        let encoded_receipt;
        let suffix;
        let mut parts: Vec<&str> = Vec::with_capacity(6);

        let correlation = match fields {
            SignedFields::Initiation {
                out_sum,
                invoice_id,
                receipt,
                correlation,
            } => {
                invoice_text = invoice_id.to_string();
                parts.push(self.credentials.merchant_login());
                parts.push(out_sum);
                parts.push(&invoice_text);
                if let Some(receipt) = receipt {
                    encoded_receipt = urlencoding::encode(receipt);
                    parts.push(&encoded_receipt);
                }
                parts.push(self.credentials.password1());
                correlation
            }
            SignedFields::SuccessRedirect {
                out_sum,
                invoice_id,
                correlation,
            } => {
                invoice_text = invoice_id.to_string();
                parts.push(out_sum);
                parts.push(&invoice_text);
                parts.push(self.credentials.password1());
                correlation
            }
            SignedFields::ResultNotification {
                out_sum,
                invoice_id,
                correlation,
            } => {
                invoice_text = invoice_id.to_string();
                parts.push(out_sum);
                parts.push(&invoice_text);
                parts.push(self.credentials.password2());
                correlation
            }
        };

        suffix = correlation.signature_suffix();
        if let Some(suffix) = suffix.as_deref() {
            parts.push(suffix);
        }

        SignatureBase(parts.join(":"))
    }

    /// Lowercase hex digest of the base for `fields`.
    pub fn sign(&self, fields: SignedFields<'_>) -> String {
        let base = self.base(fields);
        self.credentials
            .algorithm()
            .digest_hex(base.as_str().as_bytes())
    }

    /// Checks a provided signature value in constant time.
    ///
    /// Hex case is ignored. Values of the wrong length never match.
    pub fn verify(&self, fields: SignedFields<'_>, provided: &str) -> bool {
        let expected = self.sign(fields);
        let provided = provided.trim().to_ascii_lowercase();
        if provided.len() != expected.len() {
            return false;
        }
        expected.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}
