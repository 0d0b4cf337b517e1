//! SubscriptionActivator port - Capability owned by the subscription module.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriptionId};

/// Activates a subscription once its payment settles.
///
/// Implementations must be idempotent: activating an active subscription
/// succeeds without changing it.
#[async_trait]
pub trait SubscriptionActivator: Send + Sync {
    async fn activate_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<(), DomainError>;
}
