//! Correlation bag round-tripped through the gateway.
//!
//! Keys carrying the reserved `Shp_` prefix are echoed back by the gateway
//! unchanged and participate in every signature base. The bag captured at
//! creation is the ground truth a later callback is checked against.

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{InvoiceId, UserId};

/// Reserved key prefix, matched case-insensitively.
pub const CORRELATION_PREFIX: &str = "Shp_";

/// Key carrying the paying user's identifier.
pub const USER_KEY: &str = "Shp_user";

/// Key carrying the per-payment nonce.
pub const NONCE_KEY: &str = "Shp_nonce";

const NONCE_RANDOM_BYTES: usize = 8;

/// Returns true when `key` carries the reserved correlation prefix.
pub fn is_correlation_key(key: &str) -> bool {
    key.len() >= CORRELATION_PREFIX.len()
        && key.as_bytes()[..CORRELATION_PREFIX.len()]
            .eq_ignore_ascii_case(CORRELATION_PREFIX.as_bytes())
}

/// Opaque key/value tokens bound to one payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationBag(BTreeMap<String, String>);

impl CorrelationBag {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Issues the bag for a new payment: the user plus a nonce combining
    /// user, invoice and a random component.
    pub fn issue(user_id: &UserId, invoice_id: InvoiceId) -> Self {
        let mut random = [0u8; NONCE_RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut random);
        let nonce = format!("{}-{}-{}", user_id, invoice_id, hex::encode(random));

        let mut bag = Self::new();
        bag.insert(USER_KEY, user_id.as_str());
        bag.insert(NONCE_KEY, nonce);
        bag
    }

    /// Collects the prefixed fields out of an inbound key/value payload.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        Self(
            fields
                .into_iter()
                .filter(|(key, _)| is_correlation_key(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Looks a key up ignoring ASCII case.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Prefixed pairs in protocol order: case-insensitive key sort, ties
    /// broken by the exact key so the order is total.
    pub fn signature_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .iter()
            .filter(|(key, _)| is_correlation_key(key))
            .collect();
        pairs.sort_by(|(a, _), (b, _)| {
            a.to_ascii_lowercase()
                .cmp(&b.to_ascii_lowercase())
                .then_with(|| a.cmp(b))
        });
        pairs
    }

    /// Colon-joined `key=urlEncode(value)` suffix for signature bases.
    ///
    /// Returns `None` when the bag has no prefixed keys.
    pub fn signature_suffix(&self) -> Option<String> {
        let pairs = self.signature_pairs();
        if pairs.is_empty() {
            return None;
        }
        Some(
            pairs
                .into_iter()
                .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
                .collect::<Vec<_>>()
                .join(":"),
        )
    }
}
