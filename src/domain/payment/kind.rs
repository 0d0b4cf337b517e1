//! Payment purpose.
//!
//! The kind decides which side effect fires on settlement, and carries the
//! fields that only make sense for that purpose.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SubscriptionId, ValidationError};

/// Upper bound on credits purchasable in a single package.
pub const MAX_CREDIT_PACKAGE_SIZE: u32 = 100_000;

/// What a payment buys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentKind {
    /// Activates the referenced subscription.
    Subscription { subscription_id: SubscriptionId },

    /// Grants `credits` to the paying user.
    CreditPackage { credits: u32 },
}

impl PaymentKind {
    pub fn subscription(subscription_id: SubscriptionId) -> Self {
        PaymentKind::Subscription { subscription_id }
    }

    /// Creates a credit-package kind, validating the package size.
    pub fn credit_package(credits: u32) -> Result<Self, ValidationError> {
        if credits == 0 || credits > MAX_CREDIT_PACKAGE_SIZE {
            return Err(ValidationError::out_of_range(
                "credit_package_size",
                1,
                i64::from(MAX_CREDIT_PACKAGE_SIZE),
                i64::from(credits),
            ));
        }
        Ok(PaymentKind::CreditPackage { credits })
    }

    /// Storage tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            PaymentKind::Subscription { .. } => "subscription",
            PaymentKind::CreditPackage { .. } => "credit_package",
        }
    }

    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        match self {
            PaymentKind::Subscription { subscription_id } => Some(subscription_id),
            PaymentKind::CreditPackage { .. } => None,
        }
    }

    pub fn credit_package_size(&self) -> Option<u32> {
        match self {
            PaymentKind::CreditPackage { credits } => Some(*credits),
            PaymentKind::Subscription { .. } => None,
        }
    }

    /// Rebuilds a kind from its storage columns.
    pub fn from_parts(
        tag: &str,
        subscription_id: Option<String>,
        credit_package_size: Option<i32>,
    ) -> Result<Self, ValidationError> {
        match tag {
            "subscription" => {
                let id = subscription_id
                    .ok_or_else(|| ValidationError::empty_field("subscription_id"))?;
                Ok(PaymentKind::subscription(SubscriptionId::new(id)?))
            }
            "credit_package" => {
                let size = credit_package_size
                    .ok_or_else(|| ValidationError::empty_field("credit_package_size"))?;
                let size = u32::try_from(size).map_err(|_| {
                    ValidationError::out_of_range(
                        "credit_package_size",
                        1,
                        i64::from(MAX_CREDIT_PACKAGE_SIZE),
                        i64::from(size),
                    )
                })?;
                PaymentKind::credit_package(size)
            }
            other => Err(ValidationError::invalid_format(
                "kind",
                format!("unknown payment kind '{}'", other),
            )),
        }
    }
}
