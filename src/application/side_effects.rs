//! Side effects of a settled payment.
//!
//! Exactly one capability is called per settlement, chosen by the payment's
//! kind. The caller invokes the dispatcher only inside the settlement
//! transaction, after the idempotency check, so a payment reaches this code
//! at most once per committed transition.

use std::sync::Arc;

use crate::domain::foundation::{PaymentId, SubscriptionId, UserId};
use crate::domain::payment::{Payment, PaymentError, PaymentKind};
use crate::ports::{CreditGranter, SubscriptionActivator};

/// What the dispatcher did for a settled payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchedSideEffect {
    SubscriptionActivated {
        subscription_id: SubscriptionId,
    },
    CreditsGranted {
        user_id: UserId,
        credits: u32,
        reason: String,
    },
}

/// Stable reason key handed to the credit capability.
pub fn grant_reason(payment_id: &PaymentId) -> String {
    format!("payment:{}", payment_id)
}

pub struct SideEffectDispatcher {
    subscriptions: Arc<dyn SubscriptionActivator>,
    credits: Arc<dyn CreditGranter>,
}

impl SideEffectDispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionActivator>,
        credits: Arc<dyn CreditGranter>,
    ) -> Self {
        Self {
            subscriptions,
            credits,
        }
    }

    /// Calls the capability matching the payment's kind.
    ///
    /// # Errors
    ///
    /// `SideEffect` when the capability fails; the caller must roll back.
    pub async fn dispatch(&self, payment: &Payment) -> Result<DispatchedSideEffect, PaymentError> {
        match &payment.kind {
            PaymentKind::Subscription { subscription_id } => {
                self.subscriptions
                    .activate_subscription(subscription_id)
                    .await
                    .map_err(|e| PaymentError::SideEffect(e.to_string()))?;

                tracing::info!(
                    payment_id = %payment.id,
                    subscription_id = %subscription_id,
                    "Subscription activated for settled payment"
                );
                Ok(DispatchedSideEffect::SubscriptionActivated {
                    subscription_id: subscription_id.clone(),
                })
            }
            PaymentKind::CreditPackage { credits } => {
                let reason = grant_reason(&payment.id);
                self.credits
                    .grant_credits(&payment.user_id, *credits, &reason)
                    .await
                    .map_err(|e| PaymentError::SideEffect(e.to_string()))?;

                tracing::info!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    credits = *credits,
                    "Credits granted for settled payment"
                );
                Ok(DispatchedSideEffect::CreditsGranted {
                    user_id: payment.user_id.clone(),
                    credits: *credits,
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::foundation::DomainError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════════════════

    #[derive(Default)]
    pub struct RecordingActivator {
        pub activated: Mutex<Vec<SubscriptionId>>,
        pub fail: bool,
    }

    #[async_trait]
    impl SubscriptionActivator for RecordingActivator {
        async fn activate_subscription(
            &self,
            subscription_id: &SubscriptionId,
        ) -> Result<(), DomainError> {
            if self.fail {
                return Err(DomainError::database("subscription service unavailable"));
            }
            self.activated.lock().unwrap().push(subscription_id.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingGranter {
        pub grants: Mutex<Vec<(UserId, u32, String)>>,
        pub fail: bool,
    }

    impl RecordingGranter {
        pub fn grant_count(&self) -> usize {
            self.grants.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CreditGranter for RecordingGranter {
        async fn grant_credits(
            &self,
            user_id: &UserId,
            amount: u32,
            reason: &str,
        ) -> Result<(), DomainError> {
            if self.fail {
                return Err(DomainError::database("credit ledger unavailable"));
            }
            self.grants
                .lock()
                .unwrap()
                .push((user_id.clone(), amount, reason.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{RecordingActivator, RecordingGranter};
    use super::*;
    use crate::domain::foundation::InvoiceId;
    use crate::domain::payment::{Amount, CorrelationBag, Currency};

    fn payment(kind: PaymentKind) -> Payment {
        Payment::create(
            UserId::new("user-1").unwrap(),
            kind,
            InvoiceId::new(1).unwrap(),
            Amount::parse("100").unwrap(),
            Currency::new("RUB").unwrap(),
            CorrelationBag::new(),
        )
    }

    #[tokio::test]
    async fn credit_package_grants_credits_with_stable_reason() {
        let activator = Arc::new(RecordingActivator::default());
        let granter = Arc::new(RecordingGranter::default());
        let dispatcher = SideEffectDispatcher::new(activator.clone(), granter.clone());
        let payment = payment(PaymentKind::credit_package(20).unwrap());

        let effect = dispatcher.dispatch(&payment).await.unwrap();

        let grants = granter.grants.lock().unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].1, 20);
        assert_eq!(grants[0].2, format!("payment:{}", payment.id));
        assert!(activator.activated.lock().unwrap().is_empty());
        assert!(matches!(effect, DispatchedSideEffect::CreditsGranted { credits: 20, .. }));
    }

    #[tokio::test]
    async fn subscription_activates_subscription_only() {
        let activator = Arc::new(RecordingActivator::default());
        let granter = Arc::new(RecordingGranter::default());
        let dispatcher = SideEffectDispatcher::new(activator.clone(), granter.clone());
        let payment = payment(PaymentKind::subscription(SubscriptionId::new("sub-9").unwrap()));

        dispatcher.dispatch(&payment).await.unwrap();

        assert_eq!(activator.activated.lock().unwrap()[0].as_str(), "sub-9");
        assert_eq!(granter.grant_count(), 0);
    }

    #[tokio::test]
    async fn capability_failure_is_side_effect_error() {
        let granter = Arc::new(RecordingGranter {
            fail: true,
            ..Default::default()
        });
        let dispatcher =
            SideEffectDispatcher::new(Arc::new(RecordingActivator::default()), granter);
        let payment = payment(PaymentKind::credit_package(5).unwrap());

        let result = dispatcher.dispatch(&payment).await;

        assert!(matches!(result, Err(PaymentError::SideEffect(_))));
        assert!(result.unwrap_err().is_retryable());
    }
}
