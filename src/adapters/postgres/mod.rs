//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresPaymentRepository` - payments, event log and row-locked transactions
//! - `PostgresInvoiceSequence` - sequence-backed invoice counter

mod invoice_sequence;
mod payment_repository;

pub use invoice_sequence::PostgresInvoiceSequence;
pub use payment_repository::{PostgresPaymentRepository, PostgresPaymentTransaction};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::domain::foundation::DomainError;

/// Opens a connection pool sized by configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await
        .map_err(|e| DomainError::database(format!("Failed to connect to database: {}", e)))
}

/// Applies the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    tracing::info!("Running database migrations");
    let start = std::time::Instant::now();

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::database(format!("Migration failed: {}", e)))?;

    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "Migrations applied");
    Ok(())
}
