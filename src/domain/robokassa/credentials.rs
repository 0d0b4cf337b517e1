//! Validated merchant credentials.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::HashAlgorithm;
use crate::domain::payment::PaymentError;

/// Merchant credentials for one runtime instance.
///
/// Test and production credentials are never mixed: `test_mode` belongs to
/// the same value as the passwords it was issued with.
/// A rule that raw credential material breaks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialDefect {
    #[error("merchant login is empty")]
    EmptyMerchantLogin,

    #[error("password1 is empty")]
    EmptyPassword1,

    #[error("password2 is empty")]
    EmptyPassword2,

    #[error("password1 and password2 must differ")]
    IdenticalPasswords,

    #[error("payment URL '{0}' is not an absolute http(s) URL")]
    NotAbsoluteHttpUrl(String),
}

/// The single set of credential rules, shared by configuration loading and
/// [`RobokassaCredentials::new`].
pub fn check_credentials(
    merchant_login: &str,
    password1: &SecretString,
    password2: &SecretString,
    payment_url: &Url,
) -> Result<(), CredentialDefect> {
    if merchant_login.trim().is_empty() {
        return Err(CredentialDefect::EmptyMerchantLogin);
    }
    if password1.expose_secret().is_empty() {
        return Err(CredentialDefect::EmptyPassword1);
    }
    if password2.expose_secret().is_empty() {
        return Err(CredentialDefect::EmptyPassword2);
    }
    if password1.expose_secret() == password2.expose_secret() {
        return Err(CredentialDefect::IdenticalPasswords);
    }
    if !matches!(payment_url.scheme(), "http" | "https") || !payment_url.has_host() {
        return Err(CredentialDefect::NotAbsoluteHttpUrl(payment_url.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct RobokassaCredentials {
    merchant_login: String,
    /// Signs initiation and success-redirect bases.
    password1: SecretString,
    /// Verifies result notifications.
    password2: SecretString,
    algorithm: HashAlgorithm,
    test_mode: bool,
    payment_url: Url,
}

impl RobokassaCredentials {
    /// # Errors
    ///
    /// `Configuration` when a field is empty, the passwords coincide or the
    /// payment URL is not absolute http(s).
    pub fn new(
        merchant_login: impl Into<String>,
        password1: SecretString,
        password2: SecretString,
        algorithm: HashAlgorithm,
        test_mode: bool,
        payment_url: Url,
    ) -> Result<Self, PaymentError> {
        let merchant_login = merchant_login.into();
        check_credentials(&merchant_login, &password1, &password2, &payment_url)
            .map_err(|defect| PaymentError::configuration(defect.to_string()))?;

        Ok(Self {
            merchant_login,
            password1,
            password2,
            algorithm,
            test_mode,
            payment_url,
        })
    }

    pub fn merchant_login(&self) -> &str {
        &self.merchant_login
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn payment_url(&self) -> &Url {
        &self.payment_url
    }

    pub(crate) fn password1(&self) -> &str {
        self.password1.expose_secret()
    }

    pub(crate) fn password2(&self) -> &str {
        self.password2.expose_secret()
    }
}

impl std::fmt::Debug for RobokassaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobokassaCredentials")
            .field("merchant_login", &self.merchant_login)
            .field("password1", &"[REDACTED]")
            .field("password2", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("test_mode", &self.test_mode)
            .field("payment_url", &self.payment_url.as_str())
            .finish()
    }
}
