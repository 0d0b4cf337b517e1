//! Binding a callback to the payment it claims to settle.
//!
//! A valid signature proves the message came from the gateway; it does not
//! prove the message belongs to *this* payment. The correlation bag captured
//! at creation must reappear, key for key, in the callback.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::correlation::CorrelationBag;
use super::errors::PaymentError;
use crate::domain::foundation::{InvoiceId, Timestamp};

/// Controls whether payments created without a correlation bag may still
/// settle on signature, invoice ID and amount alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCorrelationPolicy {
    pub allow_uncorrelated: bool,
    /// Payments created at or after this instant must carry a bag.
    pub cutoff: Option<Timestamp>,
}

impl LegacyCorrelationPolicy {
    pub fn permissive() -> Self {
        Self {
            allow_uncorrelated: true,
            cutoff: None,
        }
    }

    pub fn strict() -> Self {
        Self {
            allow_uncorrelated: false,
            cutoff: None,
        }
    }

    fn permits(&self, created_at: &Timestamp) -> bool {
        self.allow_uncorrelated
            && self
                .cutoff
                .map_or(true, |cutoff| created_at.is_before(&cutoff))
    }
}

impl Default for LegacyCorrelationPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

/// How a callback passed correlation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationCheck {
    /// Every stored pair was present with an identical value.
    Matched,
    /// Legacy payment without a stored bag; check skipped by policy.
    LegacySkipped,
}

/// Checks an inbound correlation bag against the stored one.
pub fn validate_correlation(
    invoice_id: InvoiceId,
    expected: &CorrelationBag,
    inbound: &CorrelationBag,
    created_at: &Timestamp,
    policy: &LegacyCorrelationPolicy,
) -> Result<CorrelationCheck, PaymentError> {
    if expected.is_empty() {
        if policy.permits(created_at) {
            return Ok(CorrelationCheck::LegacySkipped);
        }
        return Err(PaymentError::Replay {
            invoice_id: invoice_id.value(),
            reason: "payment has no stored correlation and legacy settlement is disabled"
                .to_string(),
        });
    }

    for (key, expected_value) in expected.iter() {
        let received = inbound
            .get_ignore_case(key)
            .ok_or_else(|| PaymentError::Replay {
                invoice_id: invoice_id.value(),
                reason: format!("missing correlation key {}", key),
            })?;

        if !values_match(expected_value, received) {
            return Err(PaymentError::Replay {
                invoice_id: invoice_id.value(),
                reason: format!("correlation value mismatch for {}", key),
            });
        }
    }

    Ok(CorrelationCheck::Matched)
}

fn values_match(expected: &str, received: &str) -> bool {
    let expected = expected.as_bytes();
    let received = received.as_bytes();
    expected.len() == received.len() && bool::from(expected.ct_eq(received))
}
