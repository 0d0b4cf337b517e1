//! Robokassa gateway configuration
//!
//! `RobokassaConfig` is the raw deserialized section. `RobokassaSettings` is
//! built from it once at startup and never changes afterwards: it holds either
//! validated credentials or the permanent error explaining why there are none.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use super::error::ValidationError;
use crate::domain::payment::PaymentError;
use crate::domain::robokassa::{
    check_credentials, CredentialDefect, HashAlgorithm, RobokassaCredentials,
};

/// Robokassa merchant configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RobokassaConfig {
    /// Merchant identifier issued by the gateway
    pub merchant_login: String,

    /// Signs initiation links and success redirects
    pub password1: SecretString,

    /// Verifies result notifications
    pub password2: SecretString,

    /// Sandbox credentials; adds the test marker to links
    #[serde(default)]
    pub test_mode: bool,

    /// `md5` or `sha256`
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,

    /// Checkout endpoint
    #[serde(default = "default_payment_url")]
    pub payment_url: String,
}

impl RobokassaConfig {
    /// Validate Robokassa configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.parse_algorithm()?;
        let payment_url = self.parse_payment_url()?;
        check_credentials(
            &self.merchant_login,
            &self.password1,
            &self.password2,
            &payment_url,
        )
        .map_err(ValidationError::from)
    }

    fn parse_algorithm(&self) -> Result<HashAlgorithm, ValidationError> {
        self.hash_algorithm
            .parse()
            .map_err(|_| ValidationError::UnsupportedHashAlgorithm(self.hash_algorithm.clone()))
    }

    fn parse_payment_url(&self) -> Result<Url, ValidationError> {
        Url::parse(&self.payment_url).map_err(|e| ValidationError::InvalidPaymentUrl(e.to_string()))
    }

    fn to_credentials(&self) -> Result<RobokassaCredentials, PaymentError> {
        let algorithm = self
            .parse_algorithm()
            .map_err(|e| PaymentError::configuration(e.to_string()))?;
        let payment_url = self
            .parse_payment_url()
            .map_err(|e| PaymentError::configuration(e.to_string()))?;

        RobokassaCredentials::new(
            self.merchant_login.trim(),
            self.password1.clone(),
            self.password2.clone(),
            algorithm,
            self.test_mode,
            payment_url,
        )
    }
}

impl From<CredentialDefect> for ValidationError {
    fn from(defect: CredentialDefect) -> Self {
        match defect {
            CredentialDefect::EmptyMerchantLogin => {
                ValidationError::MissingRequired("ROBOKASSA__MERCHANT_LOGIN")
            }
            CredentialDefect::EmptyPassword1 => {
                ValidationError::MissingRequired("ROBOKASSA__PASSWORD1")
            }
            CredentialDefect::EmptyPassword2 => {
                ValidationError::MissingRequired("ROBOKASSA__PASSWORD2")
            }
            CredentialDefect::IdenticalPasswords => ValidationError::IdenticalGatewayPasswords,
            CredentialDefect::NotAbsoluteHttpUrl(url) => ValidationError::InvalidPaymentUrl(url),
        }
    }
}

fn default_hash_algorithm() -> String {
    "md5".to_string()
}

fn default_payment_url() -> String {
    "https://auth.robokassa.ru/Merchant/Index.aspx".to_string()
}

/// Immutable gateway settings shared by every payment operation.
///
/// A broken configuration does not panic: every call to
/// [`RobokassaSettings::credentials`] returns the same `Configuration` error
/// until the process is restarted with fixed configuration.
#[derive(Debug, Clone)]
pub struct RobokassaSettings {
    inner: Result<Arc<RobokassaCredentials>, PaymentError>,
}

impl RobokassaSettings {
    pub fn from_config(config: &RobokassaConfig) -> Self {
        let inner = config.to_credentials().map(Arc::new);
        if let Err(e) = &inner {
            tracing::error!(error = %e, "Robokassa configuration rejected; payments disabled");
        }
        Self { inner }
    }

    pub fn from_credentials(credentials: RobokassaCredentials) -> Self {
        Self {
            inner: Ok(Arc::new(credentials)),
        }
    }

    /// Validated credentials, or the permanent configuration error.
    pub fn credentials(&self) -> Result<&RobokassaCredentials, PaymentError> {
        match &self.inner {
            Ok(credentials) => Ok(credentials.as_ref()),
            Err(e) => Err(e.clone()),
        }
    }

    pub fn is_operational(&self) -> bool {
        self.inner.is_ok()
    }
}
