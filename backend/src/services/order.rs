//! Stock order execution engine
//!
//! One document shape drives inbound, outbound, transfer and
//! count-adjustment postings. An order has no balance footprint until
//! `execute` runs it: every line's balance mutation and ledger entry posts
//! inside one database transaction, so either the whole order lands or
//! nothing does and the order stays `confirmed` for a retry.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use shared::{
    validate_positive_quantity, validate_unit, ApprovalStatus, DocPrefix, DocumentRef, ItemRef,
    OrderKind, OrderStatus, Pagination, PaginatedResponse, PaginationMeta,
};

use crate::db::TenantDb;
use crate::error::{AppError, AppResult};
use crate::services::balance::{BalanceKey, BalanceService};
use crate::services::ledger::{AppendEntry, InventoryTransaction, LedgerService};
use crate::services::numbering::NumberingService;

/// Order execution engine service
#[derive(Clone)]
pub struct OrderService {
    db: TenantDb,
    numbering: NumberingService,
}

/// A stock order document
#[derive(Debug, Clone, Serialize)]
pub struct StockOrder {
    pub id: Uuid,
    pub order_no: String,
    pub kind: OrderKind,
    pub order_date: NaiveDate,
    pub warehouse_id: Uuid,
    pub to_warehouse_id: Option<Uuid>,
    pub status: OrderStatus,
    pub approval_status: ApprovalStatus,
    pub source_type: Option<String>,
    pub source_id: Option<Uuid>,
    pub source_no: Option<String>,
    pub remark: Option<String>,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_remark: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockOrder {
    pub fn document_ref(&self) -> DocumentRef {
        DocumentRef::new("stock_order", self.id, self.order_no.clone())
    }
}

/// A stock order line
#[derive(Debug, Clone, Serialize)]
pub struct StockOrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub line_no: i32,
    pub item: ItemRef,
    /// Signed for count-adjustment lines; positive otherwise, with the
    /// order direction supplying the sign at execution
    pub quantity: Decimal,
    pub unit: String,
    pub batch_number: Option<String>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub unit_price: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// An order together with its lines
#[derive(Debug, Clone, Serialize)]
pub struct StockOrderWithLines {
    #[serde(flatten)]
    pub order: StockOrder,
    pub lines: Vec<StockOrderLine>,
}

/// Result of executing an order: the completed document plus every ledger
/// entry it produced, so callers can report exact effects without
/// re-querying
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub order: StockOrder,
    pub transactions: Vec<InventoryTransaction>,
}

/// Input for creating an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub kind: OrderKind,
    pub warehouse_id: Uuid,
    pub to_warehouse_id: Option<Uuid>,
    pub order_date: Option<NaiveDate>,
    pub source: Option<DocumentRef>,
    pub remark: Option<String>,
    pub lines: Vec<CreateOrderLineInput>,
}

/// Input for one order line
#[derive(Debug, Deserialize)]
pub struct CreateOrderLineInput {
    pub item: ItemRef,
    pub quantity: Decimal,
    pub unit: String,
    pub batch_number: Option<String>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub unit_price: Option<Decimal>,
}

/// Filters for listing orders
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub kind: Option<OrderKind>,
    pub status: Option<OrderStatus>,
    pub warehouse_id: Option<Uuid>,
}

/// Row type for order queries
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_no: String,
    order_type: String,
    order_date: NaiveDate,
    warehouse_id: Uuid,
    to_warehouse_id: Option<Uuid>,
    status: String,
    approval_status: String,
    source_type: Option<String>,
    source_id: Option<Uuid>,
    source_no: Option<String>,
    remark: Option<String>,
    created_by: Uuid,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    approval_remark: Option<String>,
    cancelled_by: Option<Uuid>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_reason: Option<String>,
    executed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_entity(self) -> AppResult<StockOrder> {
        let kind = OrderKind::from_str(&self.order_type).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown order_type tag: {}", self.order_type))
        })?;
        let status = OrderStatus::from_str(&self.status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown order status tag: {}", self.status))
        })?;
        let approval_status = ApprovalStatus::from_str(&self.approval_status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!(
                "unknown approval_status tag: {}",
                self.approval_status
            ))
        })?;
        Ok(StockOrder {
            id: self.id,
            order_no: self.order_no,
            kind,
            order_date: self.order_date,
            warehouse_id: self.warehouse_id,
            to_warehouse_id: self.to_warehouse_id,
            status,
            approval_status,
            source_type: self.source_type,
            source_id: self.source_id,
            source_no: self.source_no,
            remark: self.remark,
            created_by: self.created_by,
            approved_by: self.approved_by,
            approved_at: self.approved_at,
            approval_remark: self.approval_remark,
            cancelled_by: self.cancelled_by,
            cancelled_at: self.cancelled_at,
            cancelled_reason: self.cancelled_reason,
            executed_at: self.executed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row type for line queries
#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: Uuid,
    order_id: Uuid,
    line_no: i32,
    item_type: String,
    item_id: Uuid,
    quantity: Decimal,
    unit: String,
    batch_number: Option<String>,
    from_location: Option<String>,
    to_location: Option<String>,
    unit_price: Option<Decimal>,
    total_amount: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl LineRow {
    fn into_entity(self) -> AppResult<StockOrderLine> {
        let item = ItemRef::from_parts(&self.item_type, self.item_id).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown item_type tag: {}", self.item_type))
        })?;
        Ok(StockOrderLine {
            id: self.id,
            order_id: self.order_id,
            line_no: self.line_no,
            item,
            quantity: self.quantity,
            unit: self.unit,
            batch_number: self.batch_number,
            from_location: self.from_location,
            to_location: self.to_location,
            unit_price: self.unit_price,
            total_amount: self.total_amount,
            created_at: self.created_at,
        })
    }
}

const ORDER_COLUMNS: &str = r#"
    id, order_no, order_type, order_date, warehouse_id, to_warehouse_id,
    status, approval_status, source_type, source_id, source_no, remark,
    created_by, approved_by, approved_at, approval_remark,
    cancelled_by, cancelled_at, cancelled_reason, executed_at,
    created_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    id, order_id, line_no, item_type, item_id, quantity, unit,
    batch_number, from_location, to_location, unit_price, total_amount,
    created_at
"#;

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: TenantDb) -> Self {
        let numbering = NumberingService::new(db.clone());
        Self { db, numbering }
    }

    fn order_prefix(kind: OrderKind) -> DocPrefix {
        match kind {
            OrderKind::Inbound => DocPrefix::Inbound,
            OrderKind::Outbound => DocPrefix::Outbound,
            OrderKind::Transfer => DocPrefix::Transfer,
            OrderKind::CountAdjust => DocPrefix::Adjustment,
        }
    }

    /// Create a draft order with its lines. The document number is issued
    /// here and stays with the order even if it is later cancelled.
    pub async fn create(
        &self,
        input: CreateOrderInput,
        user_id: Uuid,
    ) -> AppResult<StockOrderWithLines> {
        Self::validate_input(&input)?;

        let order_date = input.order_date.unwrap_or_else(|| Utc::now().date_naive());
        let order_no = self
            .numbering
            .generate(Self::order_prefix(input.kind), order_date)
            .await?;

        let mut tx = self.db.begin().await?;

        let order = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO stock_orders (
                order_no, order_type, order_date, warehouse_id, to_warehouse_id,
                source_type, source_id, source_no, remark, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(&order_no)
        .bind(input.kind.as_str())
        .bind(order_date)
        .bind(input.warehouse_id)
        .bind(input.to_warehouse_id)
        .bind(input.source.as_ref().map(|s| s.source_type.clone()))
        .bind(input.source.as_ref().map(|s| s.source_id))
        .bind(input.source.as_ref().map(|s| s.source_no.clone()))
        .bind(&input.remark)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for (idx, line) in input.lines.iter().enumerate() {
            let total_amount = line.unit_price.map(|p| p * line.quantity.abs());
            let row = sqlx::query_as::<_, LineRow>(&format!(
                r#"
                INSERT INTO stock_order_lines (
                    order_id, line_no, item_type, item_id, quantity, unit,
                    batch_number, from_location, to_location, unit_price, total_amount
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING {}
                "#,
                LINE_COLUMNS
            ))
            .bind(order.id)
            .bind((idx + 1) as i32)
            .bind(line.item.type_str())
            .bind(line.item.item_id())
            .bind(line.quantity)
            .bind(&line.unit)
            .bind(&line.batch_number)
            .bind(&line.from_location)
            .bind(&line.to_location)
            .bind(line.unit_price)
            .bind(total_amount)
            .fetch_one(&mut *tx)
            .await?
            .into_entity()?;
            lines.push(row);
        }

        tx.commit().await?;
        Ok(StockOrderWithLines { order, lines })
    }

    /// Confirm a draft order, making it eligible for approval. No balance
    /// effect.
    pub async fn confirm(&self, order_id: Uuid, _user_id: Uuid) -> AppResult<StockOrder> {
        let mut tx = self.db.begin().await?;
        let order = Self::lock_order_tx(&mut *tx, order_id).await?;

        if !order.status.can_confirm() {
            return Err(AppError::invalid_transition(
                order.status.as_str(),
                OrderStatus::Draft.as_str(),
            ));
        }

        let line_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_order_lines WHERE order_id = $1")
                .bind(order_id)
                .fetch_one(&mut *tx)
                .await?;
        if line_count == 0 {
            return Err(AppError::validation("lines", "Order has no line items"));
        }

        let order = Self::set_status_tx(&mut *tx, order_id, OrderStatus::Confirmed).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Approve a confirmed order, readying it for execution
    pub async fn approve(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        remark: Option<String>,
    ) -> AppResult<StockOrder> {
        self.review(order_id, user_id, remark, true).await
    }

    /// Reject a confirmed order; a rejected order is cancelled
    pub async fn reject(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        remark: Option<String>,
    ) -> AppResult<StockOrder> {
        self.review(order_id, user_id, remark, false).await
    }

    async fn review(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        remark: Option<String>,
        approve: bool,
    ) -> AppResult<StockOrder> {
        let mut tx = self.db.begin().await?;
        let order = Self::lock_order_tx(&mut *tx, order_id).await?;

        if order.status != OrderStatus::Confirmed || order.approval_status != ApprovalStatus::Pending
        {
            return Err(AppError::invalid_transition(
                format!("{}/{}", order.status.as_str(), order.approval_status.as_str()),
                "confirmed/pending",
            ));
        }

        let (approval, status) = if approve {
            (ApprovalStatus::Approved, OrderStatus::Confirmed)
        } else {
            (ApprovalStatus::Rejected, OrderStatus::Cancelled)
        };

        let order = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE stock_orders
            SET approval_status = $2, status = $3,
                approved_by = $4, approved_at = now(), approval_remark = $5,
                cancelled_by = CASE WHEN $3 = 'cancelled' THEN $4 ELSE cancelled_by END,
                cancelled_at = CASE WHEN $3 = 'cancelled' THEN now() ELSE cancelled_at END,
                cancelled_reason = CASE WHEN $3 = 'cancelled' THEN 'rejected' ELSE cancelled_reason END,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(approval.as_str())
        .bind(status.as_str())
        .bind(user_id)
        .bind(&remark)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;

        tx.commit().await?;
        Ok(order)
    }

    /// Execute an approved order: post every line's balance mutation and
    /// ledger entry in one transaction. Any failure rolls all of it back
    /// and the order stays `confirmed` for a retry after remediation.
    pub async fn execute(&self, order_id: Uuid, user_id: Uuid) -> AppResult<ExecutionOutcome> {
        // Lines are immutable after create, so leg counting outside the
        // posting transaction is safe. Numbers allocated here are burned
        // if the execution rolls back; they are never reused.
        let with_lines = self.get(order_id).await?;

        // Unlocked pre-check; the authoritative guard re-runs under the
        // order row lock inside execute_tx.
        if !with_lines.order.status.can_execute() {
            return Err(AppError::invalid_transition(
                with_lines.order.status.as_str(),
                OrderStatus::Confirmed.as_str(),
            ));
        }
        if with_lines.order.approval_status != ApprovalStatus::Approved {
            return Err(AppError::invalid_transition(
                with_lines.order.approval_status.as_str(),
                ApprovalStatus::Approved.as_str(),
            ));
        }

        let legs = with_lines.lines.len() * if with_lines.order.kind.has_destination() { 2 } else { 1 };

        let today = Utc::now().date_naive();
        let mut transaction_nos = Vec::with_capacity(legs);
        for _ in 0..legs {
            transaction_nos.push(self.numbering.generate(DocPrefix::Transaction, today).await?);
        }

        let mut tx = self.db.begin().await?;
        let outcome = Self::execute_tx(&mut *tx, order_id, &mut transaction_nos, user_id).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Cancel a draft or confirmed order. Completed orders are immutable;
    /// correction requires a compensating order.
    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: &str,
        user_id: Uuid,
    ) -> AppResult<StockOrder> {
        if reason.trim().is_empty() {
            return Err(AppError::validation("reason", "Cancellation reason is required"));
        }

        let mut tx = self.db.begin().await?;
        let order = Self::lock_order_tx(&mut *tx, order_id).await?;

        if !order.status.can_cancel() {
            return Err(AppError::invalid_transition(
                order.status.as_str(),
                "draft or confirmed",
            ));
        }

        let order = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE stock_orders
            SET status = 'cancelled', cancelled_by = $2, cancelled_at = now(),
                cancelled_reason = $3, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(user_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;

        tx.commit().await?;
        Ok(order)
    }

    /// Get an order with its lines
    pub async fn get(&self, order_id: Uuid) -> AppResult<StockOrderWithLines> {
        let mut tx = self.db.begin().await?;

        let order = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM stock_orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?
        .into_entity()?;

        let lines = Self::lines_tx(&mut *tx, order_id).await?;
        tx.commit().await?;

        Ok(StockOrderWithLines { order, lines })
    }

    /// List orders with filters, paginated
    pub async fn list(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<StockOrder>> {
        let mut tx = self.db.begin().await?;

        let where_clause = r#"
            WHERE ($1::varchar IS NULL OR order_type = $1)
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR warehouse_id = $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM stock_orders {}",
            where_clause
        ))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.warehouse_id)
        .fetch_one(&mut *tx)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM stock_orders {} ORDER BY created_at DESC LIMIT $4 OFFSET $5",
            ORDER_COLUMNS, where_clause
        ))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.warehouse_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let data = rows
            .into_iter()
            .map(OrderRow::into_entity)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(pagination, total as u64),
        })
    }

    // ========================================================================
    // In-transaction execution, shared with the count reconciler
    // ========================================================================

    /// Post an order inside an already-open transaction. Pre-allocated
    /// transaction numbers are consumed one per leg.
    pub(crate) async fn execute_tx(
        conn: &mut PgConnection,
        order_id: Uuid,
        transaction_nos: &mut Vec<String>,
        user_id: Uuid,
    ) -> AppResult<ExecutionOutcome> {
        let order = Self::lock_order_tx(&mut *conn, order_id).await?;

        if !order.status.can_execute() {
            return Err(AppError::invalid_transition(
                order.status.as_str(),
                OrderStatus::Confirmed.as_str(),
            ));
        }
        if order.approval_status != ApprovalStatus::Approved {
            return Err(AppError::invalid_transition(
                order.approval_status.as_str(),
                ApprovalStatus::Approved.as_str(),
            ));
        }

        let lines = Self::lines_tx(&mut *conn, order_id).await?;
        if lines.is_empty() {
            return Err(AppError::validation("lines", "Order has no line items"));
        }

        let document = order.document_ref();
        let mut transactions = Vec::new();

        for line in &lines {
            let postings =
                Self::post_line_tx(&mut *conn, &order, line, &document, transaction_nos, user_id)
                    .await?;
            transactions.extend(postings);
        }

        let order = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE stock_orders
            SET status = 'completed', executed_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await?
        .into_entity()?;

        Ok(ExecutionOutcome { order, transactions })
    }

    /// Post one line: a single leg for inbound/outbound/count-adjust, two
    /// legs for a transfer.
    async fn post_line_tx(
        conn: &mut PgConnection,
        order: &StockOrder,
        line: &StockOrderLine,
        document: &DocumentRef,
        transaction_nos: &mut Vec<String>,
        user_id: Uuid,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let negative = line.quantity < Decimal::ZERO;
        let source_type = order.kind.source_leg(negative);
        let source_delta = match order.kind {
            // count-adjust lines already carry the signed variance
            OrderKind::CountAdjust => line.quantity,
            _ => line.quantity * Decimal::from(source_type.direction()),
        };

        let source_location = match order.kind {
            OrderKind::Inbound => line.to_location.clone(),
            _ => line.from_location.clone(),
        };
        let source_key = BalanceKey {
            warehouse_id: order.warehouse_id,
            item: line.item,
            batch_number: line.batch_number.clone(),
            location_code: source_location,
        };

        let mut transactions = Vec::new();

        // The ON CONFLICT upsert row-locks the balance for the rest of
        // this transaction, so the snapshot below cannot go stale.
        let before = BalanceService::get_or_create_tx(&mut *conn, &source_key).await?;

        if source_delta > Decimal::ZERO {
            if let Some(price) = line.unit_price {
                BalanceService::blend_unit_cost_tx(&mut *conn, &before, source_delta, price)
                    .await?;
            }
        }

        let after =
            BalanceService::apply_delta_tx(&mut *conn, before.id, source_delta, source_type, false)
                .await?;
        let entry = LedgerService::append_tx(
            &mut *conn,
            AppendEntry {
                transaction_no: Self::next_no(transaction_nos)?,
                before: &before,
                after: &after,
                delta: source_delta,
                transaction_type: source_type,
                document,
                unit_price: line.unit_price,
                from_location: line.from_location.clone(),
                to_location: line.to_location.clone(),
                created_by: user_id,
            },
        )
        .await?;
        let source_balance = BalanceService::recompute_cost_tx(&mut *conn, before.id).await?;
        transactions.push(entry);

        if let Some(dest_type) = order.kind.destination_leg() {
            let to_warehouse = order.to_warehouse_id.ok_or_else(|| {
                AppError::ConsistencyViolation("transfer order without destination".to_string())
            })?;
            let dest_key = BalanceKey {
                warehouse_id: to_warehouse,
                item: line.item,
                batch_number: line.batch_number.clone(),
                location_code: line.to_location.clone(),
            };

            let dest_before = BalanceService::get_or_create_tx(&mut *conn, &dest_key).await?;
            // the destination inherits the source's carrying cost
            if source_balance.unit_cost > Decimal::ZERO {
                BalanceService::blend_unit_cost_tx(
                    &mut *conn,
                    &dest_before,
                    line.quantity,
                    source_balance.unit_cost,
                )
                .await?;
            }

            let dest_after = BalanceService::apply_delta_tx(
                &mut *conn,
                dest_before.id,
                line.quantity,
                dest_type,
                false,
            )
            .await?;
            let entry = LedgerService::append_tx(
                &mut *conn,
                AppendEntry {
                    transaction_no: Self::next_no(transaction_nos)?,
                    before: &dest_before,
                    after: &dest_after,
                    delta: line.quantity,
                    transaction_type: dest_type,
                    document,
                    unit_price: line.unit_price,
                    from_location: line.from_location.clone(),
                    to_location: line.to_location.clone(),
                    created_by: user_id,
                },
            )
            .await?;
            BalanceService::recompute_cost_tx(&mut *conn, dest_before.id).await?;
            transactions.push(entry);
        }

        Ok(transactions)
    }

    fn next_no(transaction_nos: &mut Vec<String>) -> AppResult<String> {
        if transaction_nos.is_empty() {
            return Err(AppError::ConsistencyViolation(
                "execution ran out of pre-allocated transaction numbers".to_string(),
            ));
        }
        Ok(transaction_nos.remove(0))
    }

    pub(crate) async fn lock_order_tx(
        conn: &mut PgConnection,
        order_id: Uuid,
    ) -> AppResult<StockOrder> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM stock_orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?
        .into_entity()
    }

    pub(crate) async fn lines_tx(
        conn: &mut PgConnection,
        order_id: Uuid,
    ) -> AppResult<Vec<StockOrderLine>> {
        let rows = sqlx::query_as::<_, LineRow>(&format!(
            "SELECT {} FROM stock_order_lines WHERE order_id = $1 ORDER BY line_no ASC",
            LINE_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(LineRow::into_entity).collect()
    }

    async fn set_status_tx(
        conn: &mut PgConnection,
        order_id: Uuid,
        status: OrderStatus,
    ) -> AppResult<StockOrder> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE stock_orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(status.as_str())
        .fetch_one(conn)
        .await?
        .into_entity()
    }

    fn validate_input(input: &CreateOrderInput) -> AppResult<()> {
        if input.kind.has_destination() {
            match input.to_warehouse_id {
                None => {
                    return Err(AppError::validation(
                        "to_warehouse_id",
                        "Transfer orders require a destination warehouse",
                    ))
                }
                Some(dest) if dest == input.warehouse_id => {
                    return Err(AppError::validation(
                        "to_warehouse_id",
                        "Transfer destination must differ from the source warehouse",
                    ))
                }
                Some(_) => {}
            }
        }

        for (idx, line) in input.lines.iter().enumerate() {
            let field = format!("lines[{}]", idx);
            match input.kind {
                OrderKind::CountAdjust => {
                    if line.quantity.is_zero() {
                        return Err(AppError::validation(field, "Adjustment quantity cannot be zero"));
                    }
                }
                _ => validate_positive_quantity(line.quantity)
                    .map_err(|msg| AppError::validation(field.clone(), msg))?,
            }
            validate_unit(&line.unit).map_err(|msg| AppError::validation(field.clone(), msg))?;
            if let Some(batch) = &line.batch_number {
                shared::validate_batch_number(batch)
                    .map_err(|msg| AppError::validation(field, msg))?;
            }
            if let Some(price) = line.unit_price {
                if price < Decimal::ZERO {
                    return Err(AppError::validation(
                        format!("lines[{}].unit_price", idx),
                        "Unit price cannot be negative",
                    ));
                }
            }
        }

        Ok(())
    }
}
