//! PostgreSQL sequence backing invoice allocation.
//!
//! Failures are classified by SQLSTATE. Message matching is kept to one
//! function and only consulted when the driver supplies no code.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::ports::{CounterError, InvoiceCounter};

const SEQUENCE_NAME: &str = "payment_invoice_id_seq";

/// `undefined_table`; also raised for a missing sequence.
const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";
const SQLSTATE_UNDEFINED_COLUMN: &str = "42703";

pub struct PostgresInvoiceSequence {
    pool: PgPool,
}

impl PostgresInvoiceSequence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn classify(e: sqlx::Error) -> CounterError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.code().as_deref() {
            Some(SQLSTATE_UNDEFINED_TABLE) => return CounterError::Missing,
            Some(SQLSTATE_UNDEFINED_COLUMN) => return CounterError::MissingColumn,
            Some(_) => return CounterError::Storage(e.to_string()),
            None => {}
        }
    }
    classify_by_message(&e.to_string())
}

/// Last-resort classification for errors that carry no SQLSTATE.
fn classify_by_message(message: &str) -> CounterError {
    let lower = message.to_ascii_lowercase();
    if lower.contains(SEQUENCE_NAME) && lower.contains("does not exist") {
        CounterError::Missing
    } else if lower.contains("column") && lower.contains("does not exist") {
        CounterError::MissingColumn
    } else {
        CounterError::Storage(message.to_string())
    }
}

#[async_trait]
impl InvoiceCounter for PostgresInvoiceSequence {
    async fn next_value(&self) -> Result<i64, CounterError> {
        sqlx::query_scalar::<_, i64>("SELECT nextval('payment_invoice_id_seq')")
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }

    async fn create(&self) -> Result<(), CounterError> {
        sqlx::query(
            "CREATE SEQUENCE IF NOT EXISTS payment_invoice_id_seq \
             AS BIGINT START WITH 1 MINVALUE 1",
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        // Seed above any invoice handed out while the sequence was missing
        sqlx::query(
            r#"
            SELECT setval(
                'payment_invoice_id_seq',
                COALESCE(MAX(invoice_id), 1),
                MAX(invoice_id) IS NOT NULL
            )
            FROM payments
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        tracing::info!(sequence = SEQUENCE_NAME, "Invoice sequence created");
        Ok(())
    }

    async fn max_assigned(&self) -> Result<Option<i64>, CounterError> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(invoice_id) FROM payments")
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }
}
