//! Inventory balance store
//!
//! One row per (warehouse, item, batch, location) key. All quantity
//! mutations flow through `get_or_create` and `apply_delta`; nothing else
//! writes the quantity columns. The conditional UPDATE guards mirror
//! `shared::StockQuantities`, so a zero-row update means either the row is
//! gone or the delta would break an invariant.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use shared::{
    DocPrefix, DocumentRef, InventoryStatus, ItemRef, Pagination, PaginatedResponse,
    PaginationMeta, QualityStatus, StockQuantities, TransactionType,
};

use crate::db::TenantDb;
use crate::error::{AppError, AppResult};
use crate::services::ledger::{AppendEntry, InventoryTransaction, LedgerService};
use crate::services::numbering::NumberingService;

/// Balance store service
#[derive(Clone)]
pub struct BalanceService {
    db: TenantDb,
    numbering: NumberingService,
}

/// A ledger-backed quantity adjustment: the updated balance plus the entry
/// recording it
#[derive(Debug)]
pub struct MovementOutcome {
    pub balance: InventoryBalance,
    pub transaction: InventoryTransaction,
}

/// Full identity of a balance row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceKey {
    pub warehouse_id: Uuid,
    pub item: ItemRef,
    pub batch_number: Option<String>,
    pub location_code: Option<String>,
}

/// An inventory balance row
#[derive(Debug, Clone, Serialize)]
pub struct InventoryBalance {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub item: ItemRef,
    pub batch_number: Option<String>,
    pub location_code: Option<String>,
    pub current_quantity: Decimal,
    pub available_quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub in_transit_quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub inventory_status: InventoryStatus,
    pub quality_status: QualityStatus,
    pub safety_stock: Option<Decimal>,
    pub min_stock: Option<Decimal>,
    pub max_stock: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    pub last_count_date: Option<NaiveDate>,
    pub last_count_quantity: Option<Decimal>,
    pub variance_quantity: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryBalance {
    /// The quantity split as a pure value object
    pub fn quantities(&self) -> StockQuantities {
        StockQuantities {
            current: self.current_quantity,
            available: self.available_quantity,
            reserved: self.reserved_quantity,
            in_transit: self.in_transit_quantity,
        }
    }

    pub fn below_safety_stock(&self) -> bool {
        self.safety_stock
            .map(|s| self.current_quantity < s)
            .unwrap_or(false)
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.map(|d| d < today).unwrap_or(false)
    }
}

/// Filters for listing balances
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceFilter {
    pub warehouse_id: Option<Uuid>,
    pub inventory_status: Option<InventoryStatus>,
    pub below_safety_stock: bool,
    pub expired_only: bool,
    pub active_only: bool,
}

/// Row type for balance queries
#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    id: Uuid,
    warehouse_id: Uuid,
    item_type: String,
    item_id: Uuid,
    batch_number: Option<String>,
    location_code: Option<String>,
    current_quantity: Decimal,
    available_quantity: Decimal,
    reserved_quantity: Decimal,
    in_transit_quantity: Decimal,
    unit_cost: Decimal,
    total_cost: Decimal,
    inventory_status: String,
    quality_status: String,
    safety_stock: Option<Decimal>,
    min_stock: Option<Decimal>,
    max_stock: Option<Decimal>,
    expiry_date: Option<NaiveDate>,
    last_count_date: Option<NaiveDate>,
    last_count_quantity: Option<Decimal>,
    variance_quantity: Option<Decimal>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BalanceRow {
    /// Stored tags are written from the closed enums only, so an unknown
    /// tag means the namespace was tampered with.
    fn into_entity(self) -> AppResult<InventoryBalance> {
        let item = ItemRef::from_parts(&self.item_type, self.item_id).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown item_type tag: {}", self.item_type))
        })?;
        let inventory_status = InventoryStatus::from_str(&self.inventory_status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!(
                "unknown inventory_status tag: {}",
                self.inventory_status
            ))
        })?;
        let quality_status = QualityStatus::from_str(&self.quality_status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!(
                "unknown quality_status tag: {}",
                self.quality_status
            ))
        })?;

        Ok(InventoryBalance {
            id: self.id,
            warehouse_id: self.warehouse_id,
            item,
            batch_number: self.batch_number,
            location_code: self.location_code,
            current_quantity: self.current_quantity,
            available_quantity: self.available_quantity,
            reserved_quantity: self.reserved_quantity,
            in_transit_quantity: self.in_transit_quantity,
            unit_cost: self.unit_cost,
            total_cost: self.total_cost,
            inventory_status,
            quality_status,
            safety_stock: self.safety_stock,
            min_stock: self.min_stock,
            max_stock: self.max_stock,
            expiry_date: self.expiry_date,
            last_count_date: self.last_count_date,
            last_count_quantity: self.last_count_quantity,
            variance_quantity: self.variance_quantity,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const BALANCE_COLUMNS: &str = r#"
    id, warehouse_id, item_type, item_id, batch_number, location_code,
    current_quantity, available_quantity, reserved_quantity, in_transit_quantity,
    unit_cost, total_cost, inventory_status, quality_status,
    safety_stock, min_stock, max_stock, expiry_date,
    last_count_date, last_count_quantity, variance_quantity,
    is_active, created_at, updated_at
"#;

impl BalanceService {
    /// Create a new BalanceService instance
    pub fn new(db: TenantDb) -> Self {
        let numbering = NumberingService::new(db.clone());
        Self { db, numbering }
    }

    /// Apply a single signed movement against one balance, with its ledger
    /// entry, in one transaction. The direct path for ad-hoc corrections
    /// that do not warrant a full order document.
    pub async fn adjust_quantity(
        &self,
        balance_id: Uuid,
        delta: Decimal,
        transaction_type: TransactionType,
        document: DocumentRef,
        unit_price: Option<Decimal>,
        user_id: Uuid,
    ) -> AppResult<MovementOutcome> {
        if delta.is_zero() {
            return Err(AppError::validation("delta", "Adjustment delta cannot be zero"));
        }
        if transaction_type.is_reservation() {
            return Err(AppError::validation(
                "transaction_type",
                "Reservations go through the reservation manager",
            ));
        }
        if Decimal::from(transaction_type.direction()) * delta < Decimal::ZERO {
            return Err(AppError::validation(
                "delta",
                "Delta sign does not match the transaction type direction",
            ));
        }

        let transaction_no = self
            .numbering
            .generate(DocPrefix::Transaction, Utc::now().date_naive())
            .await?;

        let mut tx = self.db.begin().await?;
        let before = Self::get_for_update_tx(&mut *tx, balance_id).await?;

        if delta > Decimal::ZERO {
            if let Some(price) = unit_price {
                Self::blend_unit_cost_tx(&mut *tx, &before, delta, price).await?;
            }
        }

        let after = Self::apply_delta_tx(&mut *tx, balance_id, delta, transaction_type, false).await?;
        let transaction = LedgerService::append_tx(
            &mut *tx,
            AppendEntry {
                transaction_no,
                before: &before,
                after: &after,
                delta,
                transaction_type,
                document: &document,
                unit_price,
                from_location: before.location_code.clone(),
                to_location: None,
                created_by: user_id,
            },
        )
        .await?;
        let balance = Self::recompute_cost_tx(&mut *tx, balance_id).await?;
        tx.commit().await?;

        Ok(MovementOutcome { balance, transaction })
    }

    /// Get a balance by id
    pub async fn get(&self, balance_id: Uuid) -> AppResult<InventoryBalance> {
        let mut tx = self.db.begin().await?;
        let balance = Self::get_tx(&mut *tx, balance_id).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Return the balance matching the full key, creating a zeroed row if
    /// none exists. Idempotent under concurrent identical calls: the upsert
    /// resolves on the unique key and both callers observe the same row.
    pub async fn get_or_create(&self, key: &BalanceKey) -> AppResult<InventoryBalance> {
        let mut tx = self.db.begin().await?;
        let balance = Self::get_or_create_tx(&mut *tx, key).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// List balances with filters, paginated
    pub async fn list(
        &self,
        filter: &BalanceFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<InventoryBalance>> {
        let mut tx = self.db.begin().await?;

        let status_tag = filter.inventory_status.map(|s| s.as_str());
        let where_clause = r#"
            WHERE ($1::uuid IS NULL OR warehouse_id = $1)
              AND ($2::varchar IS NULL OR inventory_status = $2)
              AND (NOT $3 OR (safety_stock IS NOT NULL AND current_quantity < safety_stock))
              AND (NOT $4 OR (expiry_date IS NOT NULL AND expiry_date < CURRENT_DATE))
              AND (NOT $5 OR is_active)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM inventory_balances {}",
            where_clause
        ))
        .bind(filter.warehouse_id)
        .bind(status_tag)
        .bind(filter.below_safety_stock)
        .bind(filter.expired_only)
        .bind(filter.active_only)
        .fetch_one(&mut *tx)
        .await?;

        let rows = sqlx::query_as::<_, BalanceRow>(&format!(
            "SELECT {} FROM inventory_balances {} ORDER BY created_at DESC LIMIT $6 OFFSET $7",
            BALANCE_COLUMNS, where_clause
        ))
        .bind(filter.warehouse_id)
        .bind(status_tag)
        .bind(filter.below_safety_stock)
        .bind(filter.expired_only)
        .bind(filter.active_only)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let data = rows
            .into_iter()
            .map(BalanceRow::into_entity)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(pagination, total as u64),
        })
    }

    /// Update the unit cost and recompute the derived total
    pub async fn set_unit_cost(
        &self,
        balance_id: Uuid,
        unit_cost: Decimal,
    ) -> AppResult<InventoryBalance> {
        if unit_cost < Decimal::ZERO {
            return Err(AppError::validation("unit_cost", "Unit cost cannot be negative"));
        }
        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE inventory_balances SET unit_cost = $2 WHERE id = $1")
            .bind(balance_id)
            .bind(unit_cost)
            .execute(&mut *tx)
            .await?;
        let balance = Self::recompute_cost_tx(&mut *tx, balance_id).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Set or clear the batch expiry date (known only after receipt, from
    /// the batch master)
    pub async fn set_expiry_date(
        &self,
        balance_id: Uuid,
        expiry_date: Option<NaiveDate>,
    ) -> AppResult<InventoryBalance> {
        let mut tx = self.db.begin().await?;
        let updated = sqlx::query_as::<_, BalanceRow>(&format!(
            r#"
            UPDATE inventory_balances
            SET expiry_date = $2, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            BALANCE_COLUMNS
        ))
        .bind(balance_id)
        .bind(expiry_date)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Balance".to_string()))?
        .into_entity()?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Deactivate a balance (retired location). Only possible once the row
    /// holds no stock; rows are never hard-deleted.
    pub async fn deactivate(&self, balance_id: Uuid) -> AppResult<InventoryBalance> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query_as::<_, BalanceRow>(&format!(
            r#"
            UPDATE inventory_balances
            SET is_active = FALSE, updated_at = now()
            WHERE id = $1 AND current_quantity = 0
            RETURNING {}
            "#,
            BALANCE_COLUMNS
        ))
        .bind(balance_id)
        .fetch_optional(&mut *tx)
        .await?;

        let balance = match updated {
            Some(row) => row.into_entity()?,
            None => {
                let existing = Self::get_tx(&mut *tx, balance_id).await?;
                return Err(AppError::validation(
                    "current_quantity",
                    format!(
                        "Cannot deactivate balance holding {} units",
                        existing.current_quantity
                    ),
                ));
            }
        };

        tx.commit().await?;
        Ok(balance)
    }

    // ========================================================================
    // In-transaction entry points, composed by the execution engine and the
    // reservation manager
    // ========================================================================

    pub(crate) async fn get_tx(
        conn: &mut PgConnection,
        balance_id: Uuid,
    ) -> AppResult<InventoryBalance> {
        sqlx::query_as::<_, BalanceRow>(&format!(
            "SELECT {} FROM inventory_balances WHERE id = $1",
            BALANCE_COLUMNS
        ))
        .bind(balance_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Balance".to_string()))?
        .into_entity()
    }

    /// Row-locked read; pairs with `apply_delta_tx` inside one transaction
    /// so concurrent mutations of the same balance serialize.
    pub(crate) async fn get_for_update_tx(
        conn: &mut PgConnection,
        balance_id: Uuid,
    ) -> AppResult<InventoryBalance> {
        sqlx::query_as::<_, BalanceRow>(&format!(
            "SELECT {} FROM inventory_balances WHERE id = $1 FOR UPDATE",
            BALANCE_COLUMNS
        ))
        .bind(balance_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Balance".to_string()))?
        .into_entity()
    }

    pub(crate) async fn get_or_create_tx(
        conn: &mut PgConnection,
        key: &BalanceKey,
    ) -> AppResult<InventoryBalance> {
        if let Some(batch) = &key.batch_number {
            shared::validate_batch_number(batch)
                .map_err(|msg| AppError::validation("batch_number", msg))?;
        }

        // DO UPDATE instead of DO NOTHING so the conflicting row is
        // returned to the caller that lost the race.
        sqlx::query_as::<_, BalanceRow>(&format!(
            r#"
            INSERT INTO inventory_balances (warehouse_id, item_type, item_id, batch_number, location_code)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (warehouse_id, item_type, item_id, batch_number, location_code)
            DO UPDATE SET updated_at = now()
            RETURNING {}
            "#,
            BALANCE_COLUMNS
        ))
        .bind(key.warehouse_id)
        .bind(key.item.type_str())
        .bind(key.item.item_id())
        .bind(&key.batch_number)
        .bind(&key.location_code)
        .fetch_one(conn)
        .await?
        .into_entity()
    }

    /// Apply a signed quantity delta according to the transaction type.
    ///
    /// Movement types change `current` and `available` together (or
    /// `current` and `reserved` when `from_reserved` is set); reservation
    /// types move the available/reserved split and leave `current` alone.
    /// The guards live in the UPDATE itself, so a concurrent writer cannot
    /// slip a balance below zero between check and write.
    pub(crate) async fn apply_delta_tx(
        conn: &mut PgConnection,
        balance_id: Uuid,
        delta: Decimal,
        transaction_type: TransactionType,
        from_reserved: bool,
    ) -> AppResult<InventoryBalance> {
        if from_reserved && (transaction_type.is_reservation() || delta > Decimal::ZERO) {
            return Err(AppError::validation(
                "from_reserved",
                "Only negative movement deltas can consume a reservation",
            ));
        }

        let sql = if transaction_type.is_reservation() {
            // reserve: delta < 0 shrinks available; unreserve: delta > 0
            // grows it back. `current` untouched.
            format!(
                r#"
                UPDATE inventory_balances
                SET available_quantity = available_quantity + $2,
                    reserved_quantity = reserved_quantity - $2,
                    updated_at = now()
                WHERE id = $1
                  AND available_quantity + $2 >= 0
                  AND reserved_quantity - $2 >= 0
                RETURNING {}
                "#,
                BALANCE_COLUMNS
            )
        } else if from_reserved {
            format!(
                r#"
                UPDATE inventory_balances
                SET current_quantity = current_quantity + $2,
                    reserved_quantity = reserved_quantity + $2,
                    updated_at = now()
                WHERE id = $1
                  AND current_quantity + $2 >= 0
                  AND reserved_quantity + $2 >= 0
                RETURNING {}
                "#,
                BALANCE_COLUMNS
            )
        } else {
            format!(
                r#"
                UPDATE inventory_balances
                SET current_quantity = current_quantity + $2,
                    available_quantity = available_quantity + $2,
                    updated_at = now()
                WHERE id = $1
                  AND current_quantity + $2 >= 0
                  AND available_quantity + $2 >= 0
                RETURNING {}
                "#,
                BALANCE_COLUMNS
            )
        };

        let updated = sqlx::query_as::<_, BalanceRow>(&sql)
            .bind(balance_id)
            .bind(delta)
            .fetch_optional(&mut *conn)
            .await?;

        match updated {
            Some(row) => row.into_entity(),
            None => {
                // Zero rows: distinguish a missing row from a guard failure
                // by replaying the delta against the pure model.
                let existing = Self::get_tx(conn, balance_id).await?;
                let err = Self::expected_outcome(
                    existing.quantities(),
                    delta,
                    transaction_type,
                    from_reserved,
                )
                .err()
                .map(AppError::from)
                .unwrap_or_else(|| {
                    AppError::ConsistencyViolation(format!(
                        "delta {} on balance {} passed the model but failed the guard",
                        delta, balance_id
                    ))
                });
                Err(err)
            }
        }
    }

    /// Pure mirror of `apply_delta_tx`; used for pre-computing expected
    /// outcomes and classifying guard failures.
    pub fn expected_outcome(
        quantities: StockQuantities,
        delta: Decimal,
        transaction_type: TransactionType,
        from_reserved: bool,
    ) -> Result<StockQuantities, shared::QuantityError> {
        match transaction_type {
            TransactionType::Reserve => quantities.reserve(-delta),
            TransactionType::Unreserve => quantities.release(delta),
            _ => quantities.apply_movement(delta, from_reserved),
        }
    }

    /// Recompute the derived total cost (`current x unit_cost`)
    pub(crate) async fn recompute_cost_tx(
        conn: &mut PgConnection,
        balance_id: Uuid,
    ) -> AppResult<InventoryBalance> {
        sqlx::query_as::<_, BalanceRow>(&format!(
            r#"
            UPDATE inventory_balances
            SET total_cost = current_quantity * unit_cost, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            BALANCE_COLUMNS
        ))
        .bind(balance_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Balance".to_string()))?
        .into_entity()
    }

    /// Fold a priced receipt into the weighted-average unit cost. Called by
    /// the execution engine for inbound legs carrying a unit price, before
    /// the quantity delta is applied (the on-hand value still reflects the
    /// pre-receipt quantity).
    pub(crate) async fn blend_unit_cost_tx(
        conn: &mut PgConnection,
        balance: &InventoryBalance,
        receipt_qty: Decimal,
        receipt_price: Decimal,
    ) -> AppResult<()> {
        let new_qty = balance.current_quantity + receipt_qty;
        if new_qty <= Decimal::ZERO {
            return Ok(());
        }
        let blended = (balance.current_quantity * balance.unit_cost
            + receipt_qty * receipt_price)
            / new_qty;

        sqlx::query("UPDATE inventory_balances SET unit_cost = $2 WHERE id = $1")
            .bind(balance.id)
            .bind(blended)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Record count bookkeeping after a count adjustment posts
    pub(crate) async fn record_count_tx(
        conn: &mut PgConnection,
        balance_id: Uuid,
        count_date: NaiveDate,
        counted_quantity: Decimal,
        variance: Decimal,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE inventory_balances
            SET last_count_date = $2, last_count_quantity = $3,
                variance_quantity = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(balance_id)
        .bind(count_date)
        .bind(counted_quantity)
        .bind(variance)
        .execute(conn)
        .await?;
        Ok(())
    }
}
