//! Redirect URL for sending a payer to the gateway.

use url::Url;

use super::{RobokassaCredentials, SignatureEngine, SignedFields};
use crate::domain::foundation::InvoiceId;
use crate::domain::payment::{Amount, CorrelationBag};

/// Builds the signed checkout URL for one payment.
///
/// Correlation pairs are echoed as query parameters so the gateway returns
/// them unchanged on every callback.
pub struct PaymentLinkBuilder<'a> {
    credentials: &'a RobokassaCredentials,
    invoice_id: InvoiceId,
    amount: Amount,
    correlation: &'a CorrelationBag,
    description: Option<String>,
    receipt: Option<String>,
}

impl<'a> PaymentLinkBuilder<'a> {
    pub fn new(
        credentials: &'a RobokassaCredentials,
        invoice_id: InvoiceId,
        amount: Amount,
        correlation: &'a CorrelationBag,
    ) -> Self {
        Self {
            credentials,
            invoice_id,
            amount,
            correlation,
            description: None,
            receipt: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fiscal receipt JSON; signed in url-encoded form.
    pub fn receipt(mut self, receipt: impl Into<String>) -> Self {
        self.receipt = Some(receipt.into());
        self
    }

    pub fn build(self) -> Url {
        let out_sum = self.amount.to_signing_string();
        let signature = SignatureEngine::new(self.credentials).sign(SignedFields::Initiation {
            out_sum: &out_sum,
            invoice_id: self.invoice_id,
            receipt: self.receipt.as_deref(),
            correlation: self.correlation,
        });

        let mut url = self.credentials.payment_url().clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("MerchantLogin", self.credentials.merchant_login())
                .append_pair("OutSum", &out_sum)
                .append_pair("InvId", &self.invoice_id.to_string())
                .append_pair("SignatureValue", &signature);
            if let Some(description) = &self.description {
                query.append_pair("Description", description);
            }
            if let Some(receipt) = &self.receipt {
                query.append_pair("Receipt", &urlencoding::encode(receipt));
            }
            if self.credentials.test_mode() {
                query.append_pair("IsTest", "1");
            }
            for (key, value) in self.correlation.signature_pairs() {
                query.append_pair(key, value);
            }
        }
        url
    }
}
