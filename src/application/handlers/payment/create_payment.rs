//! CreatePaymentHandler - Command handler for starting a gateway checkout.

use std::sync::Arc;

use url::Url;

use crate::config::RobokassaSettings;
use crate::domain::foundation::{ErrorCode, UserId};
use crate::domain::payment::{
    Amount, CorrelationBag, Currency, InvoiceAllocator, Payment, PaymentError, PaymentKind,
};
use crate::domain::robokassa::PaymentLinkBuilder;
use crate::ports::PaymentRepository;

/// Command to create a pending payment.
#[derive(Debug, Clone)]
pub struct CreatePaymentCommand {
    pub user_id: UserId,
    pub kind: PaymentKind,
    /// Requested amount as entered, e.g. `"1790.00"`.
    pub amount: String,
    pub currency: String,
    pub description: Option<String>,
    /// Fiscal receipt JSON.
    pub receipt: Option<String>,
}

/// Result of successful payment creation.
#[derive(Debug, Clone)]
pub struct CreatePaymentResult {
    pub payment: Payment,
    pub payment_url: Url,
}

/// Handler for creating payments.
///
/// Allocates an invoice number, issues the correlation bag, persists the
/// pending payment with its creation event and builds the signed redirect.
pub struct CreatePaymentHandler {
    repository: Arc<dyn PaymentRepository>,
    allocator: Arc<InvoiceAllocator>,
    settings: Arc<RobokassaSettings>,
}

impl CreatePaymentHandler {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        allocator: Arc<InvoiceAllocator>,
        settings: Arc<RobokassaSettings>,
    ) -> Self {
        Self {
            repository,
            allocator,
            settings,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id, kind = cmd.kind.tag()))]
    pub async fn handle(
        &self,
        cmd: CreatePaymentCommand,
    ) -> Result<CreatePaymentResult, PaymentError> {
        // 1. Refuse to operate on broken configuration
        let credentials = self.settings.credentials()?;

        // 2. Validate inputs
        let amount = Amount::parse_payable(&cmd.amount)?;
        let currency = Currency::new(cmd.currency)?;

        // 3. Allocate invoice number
        let invoice_id = self.allocator.allocate().await?;

        // 4. Capture correlation and persist
        let correlation = CorrelationBag::issue(&cmd.user_id, invoice_id);
        let payment = Payment::create(
            cmd.user_id,
            cmd.kind,
            invoice_id,
            amount,
            currency,
            correlation,
        );

        self.repository
            .create(&payment)
            .await
            .map_err(|e| match e.code {
                ErrorCode::InvoiceConflict => {
                    tracing::error!(
                        invoice_id = invoice_id.value(),
                        "Allocated invoice number already in use"
                    );
                    PaymentError::storage(e.to_string())
                }
                _ => PaymentError::from(e),
            })?;

        // 5. Build redirect
        let mut link = PaymentLinkBuilder::new(
            credentials,
            payment.invoice_id,
            payment.amount,
            &payment.init_correlation,
        );
        if let Some(description) = cmd.description {
            link = link.description(description);
        }
        if let Some(receipt) = cmd.receipt {
            link = link.receipt(receipt);
        }
        let payment_url = link.build();

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = payment.invoice_id.value(),
            amount = %payment.amount,
            "Payment created"
        );

        Ok(CreatePaymentResult {
            payment,
            payment_url,
        })
    }
}
