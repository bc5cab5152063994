//! Document number generation
//!
//! Numbers are `<PREFIX><YYYYMMDD><seq>` with the sequence starting at 1
//! per (prefix, day). Allocation is a single upsert against
//! `document_counters`: the ON CONFLICT increment takes the counter row
//! lock, so concurrent callers serialize and each observes a distinct
//! sequence. Each attempt commits its own short transaction; a number
//! allocated for a document that later rolls back is burned, never reused.

use chrono::NaiveDate;
use shared::{format_document_number, DocPrefix};

use crate::config::NumberingConfig;
use crate::db::TenantDb;
use crate::error::{AppError, AppResult};

/// Document numbering service
#[derive(Clone)]
pub struct NumberingService {
    db: TenantDb,
    max_retries: u32,
}

impl NumberingService {
    /// Create a new NumberingService instance with the default retry budget
    pub fn new(db: TenantDb) -> Self {
        Self::with_config(db, &NumberingConfig::default())
    }

    pub fn with_config(db: TenantDb, config: &NumberingConfig) -> Self {
        Self {
            db,
            max_retries: config.max_retries,
        }
    }

    /// Allocate the next number for (prefix, date)
    pub async fn generate(&self, prefix: DocPrefix, date: NaiveDate) -> AppResult<String> {
        for attempt in 0..=self.max_retries {
            match self.allocate_once(prefix, date).await {
                Ok(seq) => return Ok(format_document_number(prefix, date, seq)),
                Err(AppError::Database(err)) if is_retryable(&err) && attempt < self.max_retries => {
                    tracing::debug!(
                        prefix = prefix.as_str(),
                        attempt,
                        error = %err,
                        "document number allocation retry"
                    );
                }
                Err(AppError::Database(err)) if is_retryable(&err) => {
                    tracing::warn!(
                        prefix = prefix.as_str(),
                        retries = self.max_retries,
                        error = %err,
                        "document number retry budget exhausted"
                    );
                    return Err(AppError::NumberGenerationFailed(prefix.as_str().to_string()));
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::NumberGenerationFailed(prefix.as_str().to_string()))
    }

    async fn allocate_once(&self, prefix: DocPrefix, date: NaiveDate) -> AppResult<u32> {
        let mut tx = self.db.begin().await?;

        let seq: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO document_counters (prefix, counter_date, last_seq)
            VALUES ($1, $2, 1)
            ON CONFLICT (prefix, counter_date)
            DO UPDATE SET last_seq = document_counters.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(prefix.as_str())
        .bind(date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(seq as u32)
    }
}

/// Serialization failures and deadlocks are worth another attempt; anything
/// else propagates.
fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}
