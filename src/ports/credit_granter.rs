//! CreditGranter port - Capability owned by the credits module.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};

/// Adds purchased credits to a user's balance.
///
/// `reason` is a stable key per payment; implementations must treat a
/// repeated reason as already granted.
#[async_trait]
pub trait CreditGranter: Send + Sync {
    async fn grant_credits(
        &self,
        user_id: &UserId,
        amount: u32,
        reason: &str,
    ) -> Result<(), DomainError>;
}
