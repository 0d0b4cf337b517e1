//! PostgreSQL implementation of PaymentRepository.
//!
//! Settlement transactions lock the payment row with `SELECT ... FOR UPDATE`
//! and bound the wait with a transaction-local `lock_timeout`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, InvoiceId, PaymentId, Timestamp, UserId,
};
use crate::domain::payment::{
    Amount, CorrelationBag, Currency, Payment, PaymentEventRecord, PaymentKind, PaymentStatus,
};
use crate::ports::{PaymentRepository, PaymentTransaction};

const PAYMENT_COLUMNS: &str = r#"
    id, user_id, kind, subscription_id, credit_package_size, invoice_id,
    amount, currency, status, init_correlation, callback_payload,
    created_at, updated_at, paid_at, failed_at, refunded_at
"#;

/// PostgreSQL implementation of the PaymentRepository port.
pub struct PostgresPaymentRepository {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

/// Database row representation of a payment.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: String,
    kind: String,
    subscription_id: Option<String>,
    credit_package_size: Option<i32>,
    invoice_id: i64,
    amount: Decimal,
    currency: String,
    status: String,
    init_correlation: JsonValue,
    callback_payload: Option<JsonValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid {} in payment row: {}", field, e),
            )
            .with_detail("payment_id", row.id.to_string())
        };

        let kind = PaymentKind::from_parts(
            &row.kind,
            row.subscription_id.clone(),
            row.credit_package_size,
        )
        .map_err(|e| corrupt("kind", &e))?;
        let init_correlation: CorrelationBag =
            serde_json::from_value(row.init_correlation.clone())
                .map_err(|e| corrupt("init_correlation", &e))?;

        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            user_id: UserId::new(row.user_id.clone()).map_err(|e| corrupt("user_id", &e))?,
            kind,
            invoice_id: InvoiceId::new(row.invoice_id).map_err(|e| corrupt("invoice_id", &e))?,
            amount: Amount::try_from(row.amount).map_err(|e| corrupt("amount", &e))?,
            currency: Currency::new(row.currency.trim()).map_err(|e| corrupt("currency", &e))?,
            status: PaymentStatus::parse(&row.status).map_err(|e| corrupt("status", &e))?,
            init_correlation,
            callback_payload: row.callback_payload,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            failed_at: row.failed_at.map(Timestamp::from_datetime),
            refunded_at: row.refunded_at.map(Timestamp::from_datetime),
        })
    }
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("{}: {}", context, e))
}

fn credit_package_column(kind: &PaymentKind) -> Result<Option<i32>, DomainError> {
    kind.credit_package_size()
        .map(|size| {
            i32::try_from(size).map_err(|_| {
                DomainError::new(ErrorCode::ValidationFailed, "credit package size too large")
            })
        })
        .transpose()
}

fn correlation_column(bag: &CorrelationBag) -> Result<JsonValue, DomainError> {
    serde_json::to_value(bag).map_err(|e| {
        DomainError::new(
            ErrorCode::InternalError,
            format!("Failed to serialize correlation: {}", e),
        )
    })
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, kind, subscription_id, credit_package_size, invoice_id,
                amount, currency, status, init_correlation, callback_payload,
                created_at, updated_at, paid_at, failed_at, refunded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.as_str())
        .bind(payment.kind.tag())
        .bind(payment.kind.subscription_id().map(|s| s.as_str()))
        .bind(credit_package_column(&payment.kind)?)
        .bind(payment.invoice_id.value())
        .bind(Decimal::from(payment.amount))
        .bind(payment.currency.as_str())
        .bind(payment.status.as_str())
        .bind(correlation_column(&payment.init_correlation)?)
        .bind(&payment.callback_payload)
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .bind(payment.paid_at.map(|t| *t.as_datetime()))
        .bind(payment.failed_at.map(|t| *t.as_datetime()))
        .bind(payment.refunded_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("payments_invoice_id_key") {
                    return DomainError::new(
                        ErrorCode::InvoiceConflict,
                        format!("Invoice {} is already assigned", payment.invoice_id),
                    );
                }
            }
            db_error("Failed to insert payment", e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let query = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_invoice_id(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Payment>, DomainError> {
        let query = format!("SELECT {} FROM payments WHERE invoice_id = $1", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&query)
            .bind(invoice_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find payment by invoice", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn PaymentTransaction>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        // SET does not accept bind parameters
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to set lock timeout", e))?;

        Ok(Box::new(PostgresPaymentTransaction { tx }))
    }
}

/// An open PostgreSQL transaction; dropping it rolls back.
pub struct PostgresPaymentTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PaymentTransaction for PostgresPaymentTransaction {
    async fn lock_by_invoice_id(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Payment>, DomainError> {
        let query = format!(
            "SELECT {} FROM payments WHERE invoice_id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        );
        let row: Option<PaymentRow> = sqlx::query_as(&query)
            .bind(invoice_id.value())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("Failed to lock payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn update(&mut self, payment: &Payment) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $2,
                callback_payload = $3,
                updated_at = $4,
                paid_at = $5,
                failed_at = $6,
                refunded_at = $7
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(&payment.callback_payload)
        .bind(payment.updated_at.as_datetime())
        .bind(payment.paid_at.map(|t| *t.as_datetime()))
        .bind(payment.failed_at.map(|t| *t.as_datetime()))
        .bind(payment.refunded_at.map(|t| *t.as_datetime()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to update payment", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::PaymentNotFound,
                format!("Payment {} not found", payment.id),
            ));
        }
        Ok(())
    }

    async fn append_event(&mut self, event: &PaymentEventRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payment_events (id, payment_id, event_type, payload, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.payment_id.as_uuid())
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.occurred_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to append payment event", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| db_error("Failed to roll back transaction", e))
    }
}
