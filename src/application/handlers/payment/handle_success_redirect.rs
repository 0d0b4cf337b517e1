//! HandleSuccessRedirectHandler - Verifies the browser's return from checkout.
//!
//! The redirect is signed with the first password. It only reports where the
//! payment stands; settlement happens exclusively through the result
//! notification.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::out_sum_candidates;
use crate::config::RobokassaSettings;
use crate::domain::foundation::{InvoiceId, PaymentId};
use crate::domain::payment::{PaymentError, PaymentStatus};
use crate::domain::robokassa::{GatewayCallback, SignatureEngine, SignedFields};
use crate::ports::PaymentRepository;

/// Command carrying the query parameters of the success redirect.
#[derive(Debug, Clone)]
pub struct HandleSuccessRedirectCommand {
    pub fields: BTreeMap<String, String>,
}

/// Current standing of the payment the user returned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessRedirectResult {
    pub payment_id: PaymentId,
    pub invoice_id: InvoiceId,
    pub status: PaymentStatus,
}

pub struct HandleSuccessRedirectHandler {
    repository: Arc<dyn PaymentRepository>,
    settings: Arc<RobokassaSettings>,
}

impl HandleSuccessRedirectHandler {
    pub fn new(repository: Arc<dyn PaymentRepository>, settings: Arc<RobokassaSettings>) -> Self {
        Self {
            repository,
            settings,
        }
    }

    #[tracing::instrument(skip(self, cmd))]
    pub async fn handle(
        &self,
        cmd: HandleSuccessRedirectCommand,
    ) -> Result<SuccessRedirectResult, PaymentError> {
        let credentials = self.settings.credentials()?;
        let redirect = GatewayCallback::from_form(cmd.fields)?;

        let payment = self
            .repository
            .find_by_invoice_id(redirect.invoice_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("invoice {}", redirect.invoice_id)))?;

        let engine = SignatureEngine::new(credentials);
        let authentic = out_sum_candidates(&payment.amount, &redirect.out_sum)
            .iter()
            .any(|out_sum| {
                engine.verify(
                    SignedFields::SuccessRedirect {
                        out_sum: out_sum.as_str(),
                        invoice_id: redirect.invoice_id,
                        correlation: &redirect.correlation,
                    },
                    &redirect.signature,
                )
            });
        if !authentic {
            tracing::warn!(
                invoice_id = redirect.invoice_id.value(),
                payment_id = %payment.id,
                user_id = %payment.user_id,
                "Success redirect signature mismatch"
            );
            return Err(PaymentError::Signature {
                invoice_id: redirect.invoice_id.value(),
            });
        }

        tracing::debug!(
            invoice_id = redirect.invoice_id.value(),
            payment_id = %payment.id,
            status = %payment.status,
            "Success redirect verified"
        );

        Ok(SuccessRedirectResult {
            payment_id: payment.id,
            invoice_id: payment.invoice_id,
            status: payment.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPaymentStore;
    use crate::domain::foundation::UserId;
    use crate::domain::payment::{Amount, CorrelationBag, Currency, Payment, PaymentKind};
    use crate::domain::robokassa::credentials::test_support::credentials;
    use crate::domain::robokassa::HashAlgorithm;

    async fn seeded() -> (Arc<InMemoryPaymentStore>, HandleSuccessRedirectHandler, Payment) {
        let store = Arc::new(InMemoryPaymentStore::new());
        let user = UserId::new("user-1").unwrap();
        let invoice_id = InvoiceId::new(5).unwrap();
        let payment = Payment::create(
            user.clone(),
            PaymentKind::credit_package(20).unwrap(),
            invoice_id,
            Amount::parse_payable("1790.00").unwrap(),
            Currency::new("RUB").unwrap(),
            CorrelationBag::issue(&user, invoice_id),
        );
        store.create(&payment).await.unwrap();
        let handler = HandleSuccessRedirectHandler::new(
            store.clone(),
            Arc::new(RobokassaSettings::from_credentials(credentials(
                HashAlgorithm::Sha256,
                false,
            ))),
        );
        (store, handler, payment)
    }

    fn redirect_form(payment: &Payment, fields: SignedFields<'_>) -> BTreeMap<String, String> {
        let creds = credentials(HashAlgorithm::Sha256, false);
        let signature = SignatureEngine::new(&creds).sign(fields);
        let mut form = BTreeMap::new();
        form.insert("OutSum".to_string(), "1790.00".to_string());
        form.insert("InvId".to_string(), payment.invoice_id.to_string());
        form.insert("SignatureValue".to_string(), signature);
        for (key, value) in payment.init_correlation.iter() {
            form.insert(key.to_string(), value.to_string());
        }
        form
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Verification
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn reports_status_without_settling() {
        let (store, handler, payment) = seeded().await;
        let fields = redirect_form(
            &payment,
            SignedFields::SuccessRedirect {
                out_sum: "1790.00",
                invoice_id: payment.invoice_id,
                correlation: &payment.init_correlation,
            },
        );

        let result = handler
            .handle(HandleSuccessRedirectCommand { fields })
            .await
            .unwrap();

        assert_eq!(result.payment_id, payment.id);
        assert_eq!(result.status, PaymentStatus::Pending);
        let stored = store.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(store.events_for(&payment.id).await.is_empty());
    }

    #[tokio::test]
    async fn result_password_signature_is_rejected() {
        let (_store, handler, payment) = seeded().await;
        let fields = redirect_form(
            &payment,
            SignedFields::ResultNotification {
                out_sum: "1790.00",
                invoice_id: payment.invoice_id,
                correlation: &payment.init_correlation,
            },
        );

        let err = handler
            .handle(HandleSuccessRedirectCommand { fields })
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Signature { invoice_id: 5 }));
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let (_store, handler, payment) = seeded().await;
        let mut fields = redirect_form(
            &payment,
            SignedFields::SuccessRedirect {
                out_sum: "1790.00",
                invoice_id: payment.invoice_id,
                correlation: &payment.init_correlation,
            },
        );
        fields.insert("InvId".to_string(), "6".to_string());

        let err = handler
            .handle(HandleSuccessRedirectCommand { fields })
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::NotFound(_)));
    }
}
