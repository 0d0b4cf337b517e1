//! Feature flags configuration

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::foundation::Timestamp;
use crate::domain::payment::LegacyCorrelationPolicy;

/// Feature flags for enabling/disabling functionality
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// Settle payments stored without a correlation bag on signature,
    /// invoice ID and amount alone
    #[serde(default = "default_allow_uncorrelated")]
    pub allow_uncorrelated_legacy_payments: bool,

    /// Only payments created before this instant may use the carve-out
    #[serde(default)]
    pub legacy_correlation_cutoff: Option<DateTime<Utc>>,
}

impl FeatureFlags {
    pub fn legacy_correlation_policy(&self) -> LegacyCorrelationPolicy {
        LegacyCorrelationPolicy {
            allow_uncorrelated: self.allow_uncorrelated_legacy_payments,
            cutoff: self.legacy_correlation_cutoff.map(Timestamp::from_datetime),
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            allow_uncorrelated_legacy_payments: default_allow_uncorrelated(),
            legacy_correlation_cutoff: None,
        }
    }
}

fn default_allow_uncorrelated() -> bool {
    true
}
