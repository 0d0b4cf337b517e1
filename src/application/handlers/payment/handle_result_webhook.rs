//! HandleResultWebhookHandler - Authoritative settlement of a payment.
//!
//! ## Processing order
//!
//! 1. Parse and range-check `InvId` and `OutSum`
//! 2. Open a transaction and lock the payment row by invoice
//! 3. Unknown invoice → `NotFound`
//! 4. Verify the signature against the locked payment's amount
//! 5. Check the correlation bag
//! 6. Already paid → commit the no-op and acknowledge
//! 7. Compare amounts exactly
//! 8. Reject test/production mode mixing
//! 9. Mark paid and append the settlement event
//! 10. Dispatch the side effect
//! 11. Commit
//!
//! Any failure rolls the transaction back, so a failed side effect leaves the
//! payment pending for the gateway's next delivery.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::out_sum_candidates;
use crate::application::side_effects::{DispatchedSideEffect, SideEffectDispatcher};
use crate::config::RobokassaSettings;
use crate::domain::payment::{
    validate_correlation, CorrelationCheck, LegacyCorrelationPolicy, Payment, PaymentError,
    PaymentEventRecord, PaymentStatus,
};
use crate::domain::robokassa::{
    GatewayCallback, RobokassaCredentials, SignatureEngine, SignedFields,
};
use crate::ports::{PaymentRepository, PaymentTransaction};

/// Command carrying the raw form fields of a result notification.
#[derive(Debug, Clone)]
pub struct HandleResultWebhookCommand {
    pub fields: BTreeMap<String, String>,
}

/// Outcome of an accepted notification.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// This delivery settled the payment.
    Settled {
        payment: Payment,
        side_effect: DispatchedSideEffect,
    },
    /// An earlier delivery already settled the payment; nothing was done.
    AlreadySettled { payment: Payment },
}

impl WebhookOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            WebhookOutcome::Settled { payment, .. } => payment,
            WebhookOutcome::AlreadySettled { payment } => payment,
        }
    }

    /// Response body the gateway expects to stop redelivering.
    pub fn acknowledgement(&self) -> String {
        format!("OK{}", self.payment().invoice_id)
    }
}

/// Handler for result notifications.
pub struct HandleResultWebhookHandler {
    repository: Arc<dyn PaymentRepository>,
    dispatcher: Arc<SideEffectDispatcher>,
    settings: Arc<RobokassaSettings>,
    legacy_policy: LegacyCorrelationPolicy,
}

impl HandleResultWebhookHandler {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        dispatcher: Arc<SideEffectDispatcher>,
        settings: Arc<RobokassaSettings>,
        legacy_policy: LegacyCorrelationPolicy,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            settings,
            legacy_policy,
        }
    }

    #[tracing::instrument(skip(self, cmd))]
    pub async fn handle(
        &self,
        cmd: HandleResultWebhookCommand,
    ) -> Result<WebhookOutcome, PaymentError> {
        let credentials = self.settings.credentials()?;

        // 1. Parse
        let callback = GatewayCallback::from_form(cmd.fields).map_err(|e| {
            tracing::warn!(error = %e, "Malformed result notification");
            e
        })?;

        // 2. Lock
        let mut tx = self.repository.begin().await?;

        match self.settle(credentials, &callback, tx.as_mut()).await {
            Ok(outcome) => {
                // 11. Commit
                tx.commit().await.map_err(|e| {
                    tracing::error!(
                        invoice_id = callback.invoice_id.value(),
                        error = %e,
                        "Settlement commit failed; gateway will redeliver"
                    );
                    PaymentError::from(e)
                })?;
                Ok(outcome)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(
                        invoice_id = callback.invoice_id.value(),
                        error = %rollback_error,
                        "Rollback after failed settlement also failed"
                    );
                }
                Err(error)
            }
        }
    }

    async fn settle(
        &self,
        credentials: &RobokassaCredentials,
        callback: &GatewayCallback,
        tx: &mut dyn PaymentTransaction,
    ) -> Result<WebhookOutcome, PaymentError> {
        let invoice_id = callback.invoice_id;

        // 3. Find
        let mut payment = tx
            .lock_by_invoice_id(invoice_id)
            .await?
            .ok_or_else(|| {
                tracing::info!(invoice_id = invoice_id.value(), "Notification for unknown invoice");
                PaymentError::NotFound(format!("invoice {}", invoice_id))
            })?;

        // 4. Signature
        verify_signature(credentials, callback, &payment)?;

        // 5. Correlation
        let check = validate_correlation(
            invoice_id,
            &payment.init_correlation,
            &callback.correlation,
            &payment.created_at,
            &self.legacy_policy,
        )
        .map_err(|e| {
            tracing::warn!(
                invoice_id = invoice_id.value(),
                payment_id = %payment.id,
                user_id = %payment.user_id,
                error = %e,
                "Correlation rejected"
            );
            e
        })?;
        if check == CorrelationCheck::LegacySkipped {
            tracing::warn!(
                invoice_id = invoice_id.value(),
                payment_id = %payment.id,
                "Settling legacy payment without correlation check"
            );
        }

        // 6. Idempotency
        match payment.status {
            PaymentStatus::Paid => {
                tracing::info!(
                    invoice_id = invoice_id.value(),
                    payment_id = %payment.id,
                    "Redelivered notification for settled payment"
                );
                return Ok(WebhookOutcome::AlreadySettled { payment });
            }
            PaymentStatus::Pending => {}
            other => {
                tracing::warn!(
                    invoice_id = invoice_id.value(),
                    payment_id = %payment.id,
                    status = %other,
                    "Notification for payment that cannot be settled"
                );
                return Err(PaymentError::InvalidState {
                    payment_id: payment.id.to_string(),
                    status: other.to_string(),
                    operation: "settle",
                });
            }
        }

        // 7. Amount
        if payment.amount != callback.amount {
            tracing::warn!(
                invoice_id = invoice_id.value(),
                payment_id = %payment.id,
                expected = %payment.amount.as_decimal(),
                received = %callback.out_sum,
                "Amount mismatch"
            );
            return Err(PaymentError::AmountMismatch {
                invoice_id: invoice_id.value(),
                expected: payment.amount.as_decimal().to_string(),
                received: callback.out_sum.clone(),
            });
        }

        // 8. Mode
        if callback.is_test != credentials.test_mode() {
            tracing::warn!(
                invoice_id = invoice_id.value(),
                payment_id = %payment.id,
                configured_test_mode = credentials.test_mode(),
                received_test_marker = callback.is_test,
                "Test and production traffic mixed"
            );
            return Err(PaymentError::ModeMismatch {
                invoice_id: invoice_id.value(),
                configured_test_mode: credentials.test_mode(),
            });
        }

        // 9. Transition
        payment.mark_paid(callback.to_payload())?;
        tx.update(&payment).await?;
        tx.append_event(&PaymentEventRecord::paid(&payment)).await?;

        // 10. Side effect
        let side_effect = self.dispatcher.dispatch(&payment).await.map_err(|e| {
            tracing::error!(
                invoice_id = invoice_id.value(),
                payment_id = %payment.id,
                error = %e,
                "Side effect failed; rolling back settlement"
            );
            e
        })?;

        tracing::info!(
            invoice_id = invoice_id.value(),
            payment_id = %payment.id,
            user_id = %payment.user_id,
            "Payment settled"
        );

        Ok(WebhookOutcome::Settled {
            payment,
            side_effect,
        })
    }
}

fn verify_signature(
    credentials: &RobokassaCredentials,
    callback: &GatewayCallback,
    payment: &Payment,
) -> Result<(), PaymentError> {
    let engine = SignatureEngine::new(credentials);
    let authentic = out_sum_candidates(&payment.amount, &callback.out_sum)
        .iter()
        .any(|out_sum| {
            engine.verify(
                SignedFields::ResultNotification {
                    out_sum: out_sum.as_str(),
                    invoice_id: callback.invoice_id,
                    correlation: &callback.correlation,
                },
                &callback.signature,
            )
        });

    if !authentic {
        tracing::warn!(
            invoice_id = callback.invoice_id.value(),
            payment_id = %payment.id,
            user_id = %payment.user_id,
            received_out_sum = %callback.out_sum,
            algorithm = %credentials.algorithm(),
            "Result notification signature mismatch"
        );
        return Err(PaymentError::Signature {
            invoice_id: callback.invoice_id.value(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPaymentStore;
    use crate::application::side_effects::test_support::{RecordingActivator, RecordingGranter};
    use crate::domain::foundation::{InvoiceId, SubscriptionId, UserId};
    use crate::domain::payment::{Amount, CorrelationBag, Currency, PaymentKind};
    use crate::domain::robokassa::credentials::test_support::credentials;
    use crate::domain::robokassa::HashAlgorithm;

    struct Fixture {
        store: Arc<InMemoryPaymentStore>,
        activator: Arc<RecordingActivator>,
        granter: Arc<RecordingGranter>,
        handler: HandleResultWebhookHandler,
    }

    fn fixture_with(
        granter: RecordingGranter,
        policy: LegacyCorrelationPolicy,
        test_mode: bool,
    ) -> Fixture {
        let store = Arc::new(InMemoryPaymentStore::new());
        let activator = Arc::new(RecordingActivator::default());
        let granter = Arc::new(granter);
        let dispatcher = Arc::new(SideEffectDispatcher::new(
            activator.clone(),
            granter.clone(),
        ));
        let handler = HandleResultWebhookHandler::new(
            store.clone(),
            dispatcher,
            Arc::new(RobokassaSettings::from_credentials(credentials(
                HashAlgorithm::Md5,
                test_mode,
            ))),
            policy,
        );
        Fixture {
            store,
            activator,
            granter,
            handler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            RecordingGranter::default(),
            LegacyCorrelationPolicy::permissive(),
            false,
        )
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    async fn seed(store: &InMemoryPaymentStore, invoice: i64, kind: PaymentKind) -> Payment {
        let invoice_id = InvoiceId::new(invoice).unwrap();
        let payment = Payment::create(
            user(),
            kind,
            invoice_id,
            Amount::parse_payable("1790.00").unwrap(),
            Currency::new("RUB").unwrap(),
            CorrelationBag::issue(&user(), invoice_id),
        );
        store.create(&payment).await.unwrap();
        payment
    }

    async fn seed_credits(store: &InMemoryPaymentStore, invoice: i64) -> Payment {
        seed(store, invoice, PaymentKind::credit_package(20).unwrap()).await
    }

    /// Builds a gateway form signed with the second password.
    fn signed_form(
        out_sum: &str,
        invoice_id: InvoiceId,
        correlation: &CorrelationBag,
    ) -> BTreeMap<String, String> {
        let creds = credentials(HashAlgorithm::Md5, false);
        let signature = SignatureEngine::new(&creds).sign(SignedFields::ResultNotification {
            out_sum,
            invoice_id,
            correlation,
        });
        let mut fields = BTreeMap::new();
        fields.insert("OutSum".to_string(), out_sum.to_string());
        fields.insert("InvId".to_string(), invoice_id.to_string());
        fields.insert("SignatureValue".to_string(), signature);
        for (key, value) in correlation.iter() {
            fields.insert(key.to_string(), value.to_string());
        }
        fields
    }

    fn command_for(payment: &Payment) -> HandleResultWebhookCommand {
        HandleResultWebhookCommand {
            fields: signed_form("1790.00", payment.invoice_id, &payment.init_correlation),
        }
    }

    async fn reload(store: &InMemoryPaymentStore, payment: &Payment) -> Payment {
        store.find_by_id(&payment.id).await.unwrap().unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Settlement
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn settles_pending_payment_and_grants_credits() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 7).await;

        let outcome = fx.handler.handle(command_for(&payment)).await.unwrap();

        assert_eq!(outcome.acknowledgement(), "OK7");
        match &outcome {
            WebhookOutcome::Settled { side_effect, .. } => assert_eq!(
                side_effect,
                &DispatchedSideEffect::CreditsGranted {
                    user_id: user(),
                    credits: 20,
                    reason: format!("payment:{}", payment.id),
                }
            ),
            other => panic!("expected Settled, got {:?}", other),
        }

        let stored = reload(&fx.store, &payment).await;
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert!(stored.paid_at.is_some());
        assert_eq!(stored.callback_payload.as_ref().unwrap()["OutSum"], "1790.00");
        assert_eq!(fx.granter.grant_count(), 1);

        let events = fx.store.events_for(&payment.id).await;
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["payment.paid"]);
    }

    #[tokio::test]
    async fn settles_subscription_payment_by_activating_it() {
        let fx = fixture();
        let kind = PaymentKind::subscription(SubscriptionId::new("sub-42").unwrap());
        let payment = seed(&fx.store, 3, kind).await;

        fx.handler.handle(command_for(&payment)).await.unwrap();

        let activated = fx.activator.activated.lock().unwrap().clone();
        assert_eq!(activated, vec![SubscriptionId::new("sub-42").unwrap()]);
        assert_eq!(fx.granter.grant_count(), 0);
    }

    #[tokio::test]
    async fn accepts_amount_without_trailing_zeros() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 8).await;
        let cmd = HandleResultWebhookCommand {
            fields: signed_form("1790", payment.invoice_id, &payment.init_correlation),
        };

        let outcome = fx.handler.handle(cmd).await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Settled { .. }));
    }

    #[tokio::test]
    async fn accepts_uppercase_signature_hex() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 9).await;
        let mut cmd = command_for(&payment);
        let upper = cmd.fields["SignatureValue"].to_uppercase();
        cmd.fields.insert("SignatureValue".to_string(), upper);

        assert!(fx.handler.handle(cmd).await.is_ok());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Idempotency
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn redelivery_acknowledges_without_side_effects() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 11).await;

        fx.handler.handle(command_for(&payment)).await.unwrap();
        let second = fx.handler.handle(command_for(&payment)).await.unwrap();

        assert!(matches!(second, WebhookOutcome::AlreadySettled { .. }));
        assert_eq!(second.acknowledgement(), "OK11");
        assert_eq!(fx.granter.grant_count(), 1);

        assert_eq!(fx.store.events_for(&payment.id).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_deliveries_settle_once() {
        let fx = Arc::new(fixture());
        let payment = seed_credits(&fx.store, 12).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let fx = fx.clone();
            let cmd = command_for(&payment);
            tasks.push(tokio::spawn(async move { fx.handler.handle(cmd).await }));
        }

        let mut settled = 0;
        for task in tasks {
            if let WebhookOutcome::Settled { .. } = task.await.unwrap().unwrap() {
                settled += 1;
            }
        }

        assert_eq!(settled, 1);
        assert_eq!(fx.granter.grant_count(), 1);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejections
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let fx = fixture();
        let cmd = HandleResultWebhookCommand {
            fields: signed_form("10.00", InvoiceId::new(404).unwrap(), &CorrelationBag::new()),
        };

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, PaymentError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_form_is_validation_error() {
        let fx = fixture();
        let mut fields = BTreeMap::new();
        fields.insert("OutSum".to_string(), "10.00".to_string());
        fields.insert("InvId".to_string(), "abc".to_string());
        fields.insert("SignatureValue".to_string(), "00".to_string());

        let err = fx
            .handler
            .handle(HandleResultWebhookCommand { fields })
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_and_payment_stays_pending() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 13).await;
        let mut cmd = command_for(&payment);
        cmd.fields
            .insert("SignatureValue".to_string(), "0".repeat(32));

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, PaymentError::Signature { invoice_id: 13 }));
        assert!(err.is_security_rejection());
        assert!(reload(&fx.store, &payment).await.is_pending());
        assert_eq!(fx.granter.grant_count(), 0);
    }

    #[tokio::test]
    async fn tampered_correlation_breaks_signature() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 14).await;
        let mut cmd = command_for(&payment);
        cmd.fields
            .insert("Shp_user".to_string(), "attacker".to_string());

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, PaymentError::Signature { .. }));
    }

    #[tokio::test]
    async fn correctly_signed_foreign_correlation_is_replay() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 15).await;
        let mut foreign = CorrelationBag::new();
        foreign.insert("Shp_user", "user-1");
        foreign.insert("Shp_nonce", "user-1-15-0000000000000000");
        let cmd = HandleResultWebhookCommand {
            fields: signed_form("1790.00", payment.invoice_id, &foreign),
        };

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, PaymentError::Replay { invoice_id: 15, .. }));
        assert!(reload(&fx.store, &payment).await.is_pending());
    }

    #[tokio::test]
    async fn signed_amount_mismatch_is_rejected() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 16).await;
        let cmd = HandleResultWebhookCommand {
            fields: signed_form("1.00", payment.invoice_id, &payment.init_correlation),
        };

        let err = fx.handler.handle(cmd).await.unwrap_err();

        // Verifies on the raw OutSum candidate.
        assert!(matches!(err, PaymentError::AmountMismatch { invoice_id: 16, .. }));
        assert!(reload(&fx.store, &payment).await.is_pending());
    }

    #[tokio::test]
    async fn test_marker_in_production_mode_is_rejected() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 17).await;
        let mut cmd = command_for(&payment);
        cmd.fields.insert("IsTest".to_string(), "1".to_string());

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(
            err,
            PaymentError::ModeMismatch {
                configured_test_mode: false,
                ..
            }
        ));
        assert!(reload(&fx.store, &payment).await.is_pending());
    }

    #[tokio::test]
    async fn production_callback_in_test_mode_is_rejected() {
        let fx = fixture_with(
            RecordingGranter::default(),
            LegacyCorrelationPolicy::permissive(),
            true,
        );
        let payment = seed_credits(&fx.store, 18).await;

        let err = fx.handler.handle(command_for(&payment)).await.unwrap_err();

        assert!(matches!(
            err,
            PaymentError::ModeMismatch {
                configured_test_mode: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_payment_cannot_be_settled() {
        let fx = fixture();
        let mut payment = seed_credits(&fx.store, 19).await;
        payment.mark_failed().unwrap();
        fx.store.insert_raw(payment.clone()).await;

        let err = fx.handler.handle(command_for(&payment)).await.unwrap_err();

        assert!(matches!(
            err,
            PaymentError::InvalidState {
                operation: "settle",
                ..
            }
        ));
        assert_eq!(fx.granter.grant_count(), 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure Atomicity
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn side_effect_failure_rolls_back_settlement() {
        let fx = fixture_with(
            RecordingGranter {
                fail: true,
                ..Default::default()
            },
            LegacyCorrelationPolicy::permissive(),
            false,
        );
        let payment = seed_credits(&fx.store, 21).await;

        let err = fx.handler.handle(command_for(&payment)).await.unwrap_err();

        assert!(matches!(err, PaymentError::SideEffect(_)));
        assert!(err.is_retryable());
        assert!(reload(&fx.store, &payment).await.is_pending());
        assert!(fx.store.events_for(&payment.id).await.is_empty());
    }

    #[tokio::test]
    async fn commit_failure_leaves_payment_pending_for_redelivery() {
        let fx = fixture();
        let payment = seed_credits(&fx.store, 22).await;
        fx.store.fail_next_commit();

        let err = fx.handler.handle(command_for(&payment)).await.unwrap_err();

        assert!(matches!(err, PaymentError::Storage(_)));
        assert!(reload(&fx.store, &payment).await.is_pending());

        // Redelivery settles; the capability sees the call twice and must
        // dedupe on the grant reason.
        let outcome = fx.handler.handle(command_for(&payment)).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Settled { .. }));
        assert_eq!(fx.granter.grant_count(), 2);
        let reasons: Vec<_> = fx
            .granter
            .grants
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, reason)| reason.clone())
            .collect();
        assert_eq!(reasons[0], reasons[1]);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Legacy Payments
    // ════════════════════════════════════════════════════════════════════════════

    async fn seed_legacy(store: &InMemoryPaymentStore, invoice: i64) -> Payment {
        let payment = Payment::create(
            user(),
            PaymentKind::credit_package(20).unwrap(),
            InvoiceId::new(invoice).unwrap(),
            Amount::parse_payable("1790.00").unwrap(),
            Currency::new("RUB").unwrap(),
            CorrelationBag::new(),
        );
        store.insert_raw(payment.clone()).await;
        payment
    }

    #[tokio::test]
    async fn legacy_payment_settles_when_permitted() {
        let fx = fixture();
        let payment = seed_legacy(&fx.store, 31).await;

        let outcome = fx.handler.handle(command_for(&payment)).await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Settled { .. }));
    }

    #[tokio::test]
    async fn legacy_payment_is_replay_under_strict_policy() {
        let fx = fixture_with(
            RecordingGranter::default(),
            LegacyCorrelationPolicy::strict(),
            false,
        );
        let payment = seed_legacy(&fx.store, 32).await;

        let err = fx.handler.handle(command_for(&payment)).await.unwrap_err();

        assert!(matches!(err, PaymentError::Replay { .. }));
        assert_eq!(fx.granter.grant_count(), 0);
    }
}
