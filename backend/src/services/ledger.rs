//! Append-only transaction ledger
//!
//! Every quantity change lands here as one immutable row linked to the
//! balance it mutated and the business document that caused it. Rows are
//! never updated after commit except for the cancellation flag, and
//! cancellation never touches balances: reversal is a new entry with the
//! negated delta.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use shared::{DocumentRef, TransactionType};

use crate::db::TenantDb;
use crate::error::{AppError, AppResult};
use crate::services::balance::InventoryBalance;

/// Ledger service
#[derive(Clone)]
pub struct LedgerService {
    db: TenantDb,
}

/// An immutable ledger entry
#[derive(Debug, Clone, Serialize)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub transaction_no: String,
    pub balance_id: Uuid,
    pub transaction_type: TransactionType,
    pub quantity_change: Decimal,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub unit_price: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub batch_number: Option<String>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub source_type: String,
    pub source_id: Uuid,
    pub source_no: String,
    pub is_cancelled: bool,
    pub cancelled_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl InventoryTransaction {
    pub fn document_ref(&self) -> DocumentRef {
        DocumentRef::new(self.source_type.clone(), self.source_id, self.source_no.clone())
    }
}

/// Parameters for one append, assembled by the execution engine inside its
/// transaction. `before` is the row-locked snapshot read before the
/// mutation, `after` the row returned by the conditional update.
pub(crate) struct AppendEntry<'a> {
    pub transaction_no: String,
    pub before: &'a InventoryBalance,
    pub after: &'a InventoryBalance,
    pub delta: Decimal,
    pub transaction_type: TransactionType,
    pub document: &'a DocumentRef,
    pub unit_price: Option<Decimal>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub created_by: Uuid,
}

/// Row type for ledger queries
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    transaction_no: String,
    balance_id: Uuid,
    transaction_type: String,
    quantity_change: Decimal,
    quantity_before: Decimal,
    quantity_after: Decimal,
    unit_price: Option<Decimal>,
    total_amount: Option<Decimal>,
    batch_number: Option<String>,
    from_location: Option<String>,
    to_location: Option<String>,
    source_type: String,
    source_id: Uuid,
    source_no: String,
    is_cancelled: bool,
    cancelled_reason: Option<String>,
    cancelled_by: Option<Uuid>,
    cancelled_at: Option<DateTime<Utc>>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_entity(self) -> AppResult<InventoryTransaction> {
        let transaction_type =
            TransactionType::from_str(&self.transaction_type).ok_or_else(|| {
                AppError::ConsistencyViolation(format!(
                    "unknown transaction_type tag: {}",
                    self.transaction_type
                ))
            })?;
        Ok(InventoryTransaction {
            id: self.id,
            transaction_no: self.transaction_no,
            balance_id: self.balance_id,
            transaction_type,
            quantity_change: self.quantity_change,
            quantity_before: self.quantity_before,
            quantity_after: self.quantity_after,
            unit_price: self.unit_price,
            total_amount: self.total_amount,
            batch_number: self.batch_number,
            from_location: self.from_location,
            to_location: self.to_location,
            source_type: self.source_type,
            source_id: self.source_id,
            source_no: self.source_no,
            is_cancelled: self.is_cancelled,
            cancelled_reason: self.cancelled_reason,
            cancelled_by: self.cancelled_by,
            cancelled_at: self.cancelled_at,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

const TRANSACTION_COLUMNS: &str = r#"
    id, transaction_no, balance_id, transaction_type,
    quantity_change, quantity_before, quantity_after,
    unit_price, total_amount, batch_number, from_location, to_location,
    source_type, source_id, source_no,
    is_cancelled, cancelled_reason, cancelled_by, cancelled_at,
    created_by, created_at
"#;

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: TenantDb) -> Self {
        Self { db }
    }

    /// Get a ledger entry by id
    pub async fn get(&self, transaction_id: Uuid) -> AppResult<InventoryTransaction> {
        let mut tx = self.db.begin().await?;
        let entry = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM inventory_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction".to_string()))?
        .into_entity()?;
        tx.commit().await?;
        Ok(entry)
    }

    /// All entries against one balance, oldest first (the audit trail)
    pub async fn list_for_balance(&self, balance_id: Uuid) -> AppResult<Vec<InventoryTransaction>> {
        let mut tx = self.db.begin().await?;
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM inventory_transactions WHERE balance_id = $1 ORDER BY created_at ASC",
            TRANSACTION_COLUMNS
        ))
        .bind(balance_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        rows.into_iter().map(TransactionRow::into_entity).collect()
    }

    /// All entries produced by one business document
    pub async fn list_for_source(
        &self,
        source_type: &str,
        source_id: Uuid,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let mut tx = self.db.begin().await?;
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM inventory_transactions
            WHERE source_type = $1 AND source_id = $2
            ORDER BY created_at ASC
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(source_type)
        .bind(source_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        rows.into_iter().map(TransactionRow::into_entity).collect()
    }

    /// Mark an entry cancelled. The balance is not touched; a caller that
    /// needs the quantity effect undone must post a new entry with the
    /// negated delta referencing this one.
    pub async fn cancel(
        &self,
        transaction_id: Uuid,
        reason: &str,
        cancelled_by: Uuid,
    ) -> AppResult<InventoryTransaction> {
        if reason.trim().is_empty() {
            return Err(AppError::validation("reason", "Cancellation reason is required"));
        }

        let mut tx = self.db.begin().await?;
        let updated = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE inventory_transactions
            SET is_cancelled = TRUE, cancelled_reason = $2, cancelled_by = $3, cancelled_at = now()
            WHERE id = $1 AND NOT is_cancelled
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id)
        .bind(reason)
        .bind(cancelled_by)
        .fetch_optional(&mut *tx)
        .await?;

        let entry = match updated {
            Some(row) => row.into_entity()?,
            None => {
                // Either missing or already cancelled
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM inventory_transactions WHERE id = $1)",
                )
                .bind(transaction_id)
                .fetch_one(&mut *tx)
                .await?;
                if exists {
                    return Err(AppError::invalid_transition("cancelled", "active"));
                }
                return Err(AppError::NotFound("Transaction".to_string()));
            }
        };

        tx.commit().await?;
        Ok(entry)
    }

    /// Sum of non-cancelled movement deltas for a balance. The ledger
    /// completeness invariant says this equals the balance's current
    /// quantity.
    pub async fn movement_sum(&self, balance_id: Uuid) -> AppResult<Decimal> {
        let mut tx = self.db.begin().await?;
        let sum: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT SUM(quantity_change) FROM inventory_transactions
            WHERE balance_id = $1
              AND NOT is_cancelled
              AND transaction_type NOT IN ('reserve', 'unreserve')
            "#,
        )
        .bind(balance_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(sum.unwrap_or(Decimal::ZERO))
    }

    // ========================================================================
    // In-transaction append, the only write path
    // ========================================================================

    /// Append one entry. `quantity_before`/`quantity_after` are measured
    /// against the on-hand quantity for movements and against the available
    /// split for reserve/unreserve entries. The equality check guards
    /// against a stale snapshot, which would mean a locking bug upstream.
    pub(crate) async fn append_tx(
        conn: &mut PgConnection,
        entry: AppendEntry<'_>,
    ) -> AppResult<InventoryTransaction> {
        let (quantity_before, quantity_after) = if entry.transaction_type.is_reservation() {
            (entry.before.available_quantity, entry.after.available_quantity)
        } else {
            (entry.before.current_quantity, entry.after.current_quantity)
        };

        if quantity_after != quantity_before + entry.delta {
            tracing::error!(
                balance_id = %entry.before.id,
                %quantity_before,
                %quantity_after,
                delta = %entry.delta,
                "ledger append rejected: stale balance snapshot"
            );
            return Err(AppError::ConsistencyViolation(format!(
                "quantity_after {} != quantity_before {} + delta {}",
                quantity_after, quantity_before, entry.delta
            )));
        }

        let total_amount = entry.unit_price.map(|p| p * entry.delta.abs());

        sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO inventory_transactions (
                transaction_no, balance_id, transaction_type,
                quantity_change, quantity_before, quantity_after,
                unit_price, total_amount, batch_number, from_location, to_location,
                source_type, source_id, source_no, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(&entry.transaction_no)
        .bind(entry.before.id)
        .bind(entry.transaction_type.as_str())
        .bind(entry.delta)
        .bind(quantity_before)
        .bind(quantity_after)
        .bind(entry.unit_price)
        .bind(total_amount)
        .bind(&entry.before.batch_number)
        .bind(&entry.from_location)
        .bind(&entry.to_location)
        .bind(&entry.document.source_type)
        .bind(entry.document.source_id)
        .bind(&entry.document.source_no)
        .bind(entry.created_by)
        .fetch_one(conn)
        .await?
        .into_entity()
    }
}
