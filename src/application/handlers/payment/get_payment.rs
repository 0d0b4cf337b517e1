//! GetPaymentHandler - Reads a payment for status polling.

use std::sync::Arc;

use crate::domain::foundation::PaymentId;
use crate::domain::payment::{Payment, PaymentError};
use crate::ports::PaymentRepository;

#[derive(Debug, Clone)]
pub struct GetPaymentQuery {
    pub payment_id: PaymentId,
}

pub struct GetPaymentHandler {
    repository: Arc<dyn PaymentRepository>,
}

impl GetPaymentHandler {
    pub fn new(repository: Arc<dyn PaymentRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(&self, query: GetPaymentQuery) -> Result<Payment, PaymentError> {
        self.repository
            .find_by_id(&query.payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", query.payment_id)))
    }
}
