//! Physical count reconciler
//!
//! A count plan snapshots a warehouse's book quantities, collects counted
//! actuals, and closes the gap through a single count-adjustment order so
//! every correction flows through the same ledger path as any other
//! movement. Records already adjusted are never adjusted twice.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{
    tracked_order_reuse, validate_non_negative_quantity, variance, AdjustDisposition,
    CountPlanStatus, DocPrefix, DocumentRef, ItemRef, OrderKind, Pagination, PaginatedResponse,
    PaginationMeta, TrackedOrderReuse,
};

use crate::db::TenantDb;
use crate::error::{AppError, AppResult};
use crate::services::balance::BalanceService;
use crate::services::numbering::NumberingService;
use crate::services::order::{
    CreateOrderInput, CreateOrderLineInput, ExecutionOutcome, OrderService,
};

/// Count plan reconciliation service
#[derive(Clone)]
pub struct CountService {
    db: TenantDb,
    numbering: NumberingService,
    orders: OrderService,
}

/// A count plan
#[derive(Debug, Clone, Serialize)]
pub struct CountPlan {
    pub id: Uuid,
    pub plan_no: String,
    pub warehouse_id: Uuid,
    pub plan_date: NaiveDate,
    pub status: CountPlanStatus,
    pub remark: Option<String>,
    pub created_by: Uuid,
    pub completed_at: Option<DateTime<Utc>>,
    pub adjusted_at: Option<DateTime<Utc>>,
    pub adjust_order_id: Option<Uuid>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CountPlan {
    pub fn document_ref(&self) -> DocumentRef {
        DocumentRef::new("count_plan", self.id, self.plan_no.clone())
    }
}

/// One counted balance within a plan
#[derive(Debug, Clone, Serialize)]
pub struct CountRecord {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub balance_id: Uuid,
    pub item: ItemRef,
    pub batch_number: Option<String>,
    pub location_code: Option<String>,
    pub book_quantity: Decimal,
    pub actual_quantity: Option<Decimal>,
    pub variance_quantity: Option<Decimal>,
    pub variance_rate: Option<Decimal>,
    pub is_adjusted: bool,
    pub counted_by: Option<Uuid>,
    pub counted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a count plan
#[derive(Debug, Deserialize)]
pub struct CreateCountPlanInput {
    pub warehouse_id: Uuid,
    pub plan_date: Option<NaiveDate>,
    pub remark: Option<String>,
}

/// Result of running the adjustment: the plan in its final state and the
/// adjustment order's effects, if any variance needed posting
#[derive(Debug)]
pub struct AdjustmentOutcome {
    pub plan: CountPlan,
    pub execution: Option<ExecutionOutcome>,
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    plan_no: String,
    warehouse_id: Uuid,
    plan_date: NaiveDate,
    status: String,
    remark: Option<String>,
    created_by: Uuid,
    completed_at: Option<DateTime<Utc>>,
    adjusted_at: Option<DateTime<Utc>>,
    adjust_order_id: Option<Uuid>,
    cancelled_by: Option<Uuid>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlanRow {
    fn into_entity(self) -> AppResult<CountPlan> {
        let status = CountPlanStatus::from_str(&self.status).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown plan status tag: {}", self.status))
        })?;
        Ok(CountPlan {
            id: self.id,
            plan_no: self.plan_no,
            warehouse_id: self.warehouse_id,
            plan_date: self.plan_date,
            status,
            remark: self.remark,
            created_by: self.created_by,
            completed_at: self.completed_at,
            adjusted_at: self.adjusted_at,
            adjust_order_id: self.adjust_order_id,
            cancelled_by: self.cancelled_by,
            cancelled_at: self.cancelled_at,
            cancelled_reason: self.cancelled_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    plan_id: Uuid,
    balance_id: Uuid,
    item_type: String,
    item_id: Uuid,
    batch_number: Option<String>,
    location_code: Option<String>,
    book_quantity: Decimal,
    actual_quantity: Option<Decimal>,
    variance_quantity: Option<Decimal>,
    variance_rate: Option<Decimal>,
    is_adjusted: bool,
    counted_by: Option<Uuid>,
    counted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_entity(self) -> AppResult<CountRecord> {
        let item = ItemRef::from_parts(&self.item_type, self.item_id).ok_or_else(|| {
            AppError::ConsistencyViolation(format!("unknown item_type tag: {}", self.item_type))
        })?;
        Ok(CountRecord {
            id: self.id,
            plan_id: self.plan_id,
            balance_id: self.balance_id,
            item,
            batch_number: self.batch_number,
            location_code: self.location_code,
            book_quantity: self.book_quantity,
            actual_quantity: self.actual_quantity,
            variance_quantity: self.variance_quantity,
            variance_rate: self.variance_rate,
            is_adjusted: self.is_adjusted,
            counted_by: self.counted_by,
            counted_at: self.counted_at,
            created_at: self.created_at,
        })
    }
}

const PLAN_COLUMNS: &str = r#"
    id, plan_no, warehouse_id, plan_date, status, remark, created_by,
    completed_at, adjusted_at, adjust_order_id,
    cancelled_by, cancelled_at, cancelled_reason, created_at, updated_at
"#;

const RECORD_COLUMNS: &str = r#"
    id, plan_id, balance_id, item_type, item_id, batch_number, location_code,
    book_quantity, actual_quantity, variance_quantity, variance_rate,
    is_adjusted, counted_by, counted_at, created_at
"#;

impl CountService {
    /// Create a new CountService instance
    pub fn new(db: TenantDb) -> Self {
        let numbering = NumberingService::new(db.clone());
        let orders = OrderService::new(db.clone());
        Self { db, numbering, orders }
    }

    /// Create a draft count plan for one warehouse
    pub async fn create_plan(
        &self,
        input: CreateCountPlanInput,
        user_id: Uuid,
    ) -> AppResult<CountPlan> {
        let plan_date = input.plan_date.unwrap_or_else(|| Utc::now().date_naive());
        let plan_no = self.numbering.generate(DocPrefix::CountPlan, plan_date).await?;

        let mut tx = self.db.begin().await?;
        let plan = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            INSERT INTO count_plans (plan_no, warehouse_id, plan_date, remark, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(&plan_no)
        .bind(input.warehouse_id)
        .bind(plan_date)
        .bind(&input.remark)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;
        tx.commit().await?;

        Ok(plan)
    }

    /// Snapshot the warehouse's active balances as count records and open
    /// the plan for counting. Book quantities are frozen at this moment;
    /// stock keeps moving while the count runs and the adjustment later
    /// reconciles against these frozen figures.
    pub async fn generate_records(&self, plan_id: Uuid, _user_id: Uuid) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;
        let plan = Self::lock_plan_tx(&mut *tx, plan_id).await?;

        if !plan.status.can_generate_records() {
            return Err(AppError::invalid_transition(
                plan.status.as_str(),
                CountPlanStatus::Draft.as_str(),
            ));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO count_records (
                plan_id, balance_id, item_type, item_id, batch_number,
                location_code, book_quantity
            )
            SELECT $1, id, item_type, item_id, batch_number, location_code, current_quantity
            FROM inventory_balances
            WHERE warehouse_id = $2 AND is_active = TRUE
            "#,
        )
        .bind(plan_id)
        .bind(plan.warehouse_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(AppError::validation(
                "warehouse_id",
                "No active balances to count in this warehouse",
            ));
        }

        Self::set_status_tx(&mut *tx, plan_id, CountPlanStatus::Counting).await?;
        tx.commit().await?;

        tracing::info!(plan_id = %plan_id, records = inserted, "count records generated");
        Ok(inserted)
    }

    /// Record a counted actual for one record and derive its variance
    pub async fn record_actual(
        &self,
        record_id: Uuid,
        actual_quantity: Decimal,
        user_id: Uuid,
    ) -> AppResult<CountRecord> {
        validate_non_negative_quantity(actual_quantity)
            .map_err(|msg| AppError::validation("actual_quantity", msg))?;

        let mut tx = self.db.begin().await?;

        let record = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM count_records WHERE id = $1 FOR UPDATE",
            RECORD_COLUMNS
        ))
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Count record".to_string()))?
        .into_entity()?;

        let plan = Self::lock_plan_tx(&mut *tx, record.plan_id).await?;
        if !plan.status.can_record_actual() {
            return Err(AppError::invalid_transition(
                plan.status.as_str(),
                CountPlanStatus::Counting.as_str(),
            ));
        }

        let (variance_qty, variance_rate) = variance(record.book_quantity, actual_quantity);

        let record = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            UPDATE count_records
            SET actual_quantity = $2, variance_quantity = $3, variance_rate = $4,
                counted_by = $5, counted_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(record_id)
        .bind(actual_quantity)
        .bind(variance_qty)
        .bind(variance_rate)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;

        tx.commit().await?;
        Ok(record)
    }

    /// Close the counting phase. Every record must have an actual.
    pub async fn complete_plan(&self, plan_id: Uuid, _user_id: Uuid) -> AppResult<CountPlan> {
        let mut tx = self.db.begin().await?;
        let plan = Self::lock_plan_tx(&mut *tx, plan_id).await?;

        if !plan.status.can_complete() {
            return Err(AppError::invalid_transition(
                plan.status.as_str(),
                CountPlanStatus::Counting.as_str(),
            ));
        }

        let uncounted: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM count_records WHERE plan_id = $1 AND actual_quantity IS NULL",
        )
        .bind(plan_id)
        .fetch_one(&mut *tx)
        .await?;
        if uncounted > 0 {
            return Err(AppError::validation(
                "records",
                format!("{} records still have no counted actual", uncounted),
            ));
        }

        let plan = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            UPDATE count_plans
            SET status = 'completed', completed_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;

        tx.commit().await?;
        Ok(plan)
    }

    /// Post the plan's variances through a count-adjustment order.
    ///
    /// Records with zero variance or an earlier adjustment are skipped, so
    /// a retried call never double-posts. If nothing needs posting the plan
    /// moves straight to adjusted with no order, and adjusting a plan that
    /// already reached adjusted succeeds with no work.
    pub async fn adjust(&self, plan_id: Uuid, user_id: Uuid) -> AppResult<AdjustmentOutcome> {
        let plan = self.get_plan(plan_id).await?;
        match plan.status.adjust_disposition() {
            AdjustDisposition::Post => {}
            AdjustDisposition::AlreadyAdjusted => {
                return Ok(AdjustmentOutcome { plan, execution: None });
            }
            AdjustDisposition::Rejected => {
                return Err(AppError::invalid_transition(
                    plan.status.as_str(),
                    CountPlanStatus::Completed.as_str(),
                ));
            }
        }

        let pending = self.pending_records(plan_id).await?;
        if pending.is_empty() {
            let plan = self.mark_adjusted(plan_id, None).await?;
            return Ok(AdjustmentOutcome { plan, execution: None });
        }

        let order = self.adjustment_order(&plan, &pending, user_id).await?;

        // One number per leg; count-adjust orders never have a destination.
        let today = Utc::now().date_naive();
        let mut transaction_nos = Vec::with_capacity(pending.len());
        for _ in 0..pending.len() {
            transaction_nos.push(self.numbering.generate(DocPrefix::Transaction, today).await?);
        }

        let mut tx = self.db.begin().await?;
        let locked = Self::lock_plan_tx(&mut *tx, plan_id).await?;
        match locked.status.adjust_disposition() {
            AdjustDisposition::Post => {}
            AdjustDisposition::AlreadyAdjusted => {
                // A concurrent adjustment committed first; ours has nothing
                // left to do.
                tx.rollback().await?;
                return Ok(AdjustmentOutcome { plan: locked, execution: None });
            }
            AdjustDisposition::Rejected => {
                return Err(AppError::invalid_transition(
                    locked.status.as_str(),
                    CountPlanStatus::Completed.as_str(),
                ));
            }
        }

        let execution =
            OrderService::execute_tx(&mut *tx, order, &mut transaction_nos, user_id).await?;

        for record in &pending {
            sqlx::query("UPDATE count_records SET is_adjusted = TRUE WHERE id = $1")
                .bind(record.id)
                .execute(&mut *tx)
                .await?;
            // actual_quantity is present on every pending record once the
            // plan is completed
            if let (Some(actual), Some(variance_qty)) =
                (record.actual_quantity, record.variance_quantity)
            {
                BalanceService::record_count_tx(
                    &mut *tx,
                    record.balance_id,
                    plan.plan_date,
                    actual,
                    variance_qty,
                )
                .await?;
            }
        }

        let plan = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            UPDATE count_plans
            SET status = 'adjusted', adjusted_at = now(), adjust_order_id = $2,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .bind(execution.order.id)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;

        tx.commit().await?;

        tracing::info!(
            plan_id = %plan_id,
            order_no = %execution.order.order_no,
            lines = pending.len(),
            "count variances posted"
        );
        Ok(AdjustmentOutcome { plan, execution: Some(execution) })
    }

    /// Cancel a plan that has not completed counting
    pub async fn cancel_plan(
        &self,
        plan_id: Uuid,
        reason: &str,
        user_id: Uuid,
    ) -> AppResult<CountPlan> {
        if reason.trim().is_empty() {
            return Err(AppError::validation("reason", "Cancellation reason is required"));
        }

        let mut tx = self.db.begin().await?;
        let plan = Self::lock_plan_tx(&mut *tx, plan_id).await?;

        if !plan.status.can_cancel() {
            return Err(AppError::invalid_transition(
                plan.status.as_str(),
                "draft or counting",
            ));
        }

        let plan = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            UPDATE count_plans
            SET status = 'cancelled', cancelled_by = $2, cancelled_at = now(),
                cancelled_reason = $3, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .bind(user_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;

        tx.commit().await?;
        Ok(plan)
    }

    /// Get a count plan
    pub async fn get_plan(&self, plan_id: Uuid) -> AppResult<CountPlan> {
        let mut tx = self.db.begin().await?;
        let plan = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {} FROM count_plans WHERE id = $1",
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Count plan".to_string()))?
        .into_entity()?;
        tx.commit().await?;
        Ok(plan)
    }

    /// List a plan's records, paginated
    pub async fn list_records(
        &self,
        plan_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<CountRecord>> {
        let mut tx = self.db.begin().await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM count_records WHERE plan_id = $1")
                .bind(plan_id)
                .fetch_one(&mut *tx)
                .await?;

        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT {} FROM count_records
            WHERE plan_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
            RECORD_COLUMNS
        ))
        .bind(plan_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let data = rows
            .into_iter()
            .map(RecordRow::into_entity)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(pagination, total as u64),
        })
    }

    async fn pending_records(&self, plan_id: Uuid) -> AppResult<Vec<CountRecord>> {
        let mut tx = self.db.begin().await?;
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT {} FROM count_records
            WHERE plan_id = $1
              AND is_adjusted = FALSE
              AND variance_quantity IS NOT NULL
              AND variance_quantity <> 0
            ORDER BY created_at ASC, id ASC
            "#,
            RECORD_COLUMNS
        ))
        .bind(plan_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        rows.into_iter().map(RecordRow::into_entity).collect()
    }

    /// Build, confirm and approve the adjustment order carrying the signed
    /// variances. Created outside the posting transaction; if posting fails
    /// the order stays confirmed and a retried adjust reuses it. A tracked
    /// order found completed or cancelled is an error, not a replacement:
    /// its lines were already posted outside this workflow and a fresh
    /// order would repost every variance.
    async fn adjustment_order(
        &self,
        plan: &CountPlan,
        pending: &[CountRecord],
        user_id: Uuid,
    ) -> AppResult<Uuid> {
        if let Some(order_id) = plan.adjust_order_id {
            let existing = self.orders.get(order_id).await?;
            match tracked_order_reuse(existing.order.status, existing.order.approval_status) {
                TrackedOrderReuse::Execute => return Ok(order_id),
                TrackedOrderReuse::Approve => {
                    self.orders.approve(order_id, user_id, None).await?;
                    return Ok(order_id);
                }
                TrackedOrderReuse::ConfirmAndApprove => {
                    self.orders.confirm(order_id, user_id).await?;
                    self.orders.approve(order_id, user_id, None).await?;
                    return Ok(order_id);
                }
                TrackedOrderReuse::Conflict => {
                    return Err(AppError::ConsistencyViolation(format!(
                        "adjustment order {} for plan {} is {}; its variances cannot be reposted",
                        existing.order.order_no,
                        plan.plan_no,
                        existing.order.status.as_str()
                    )));
                }
            }
        }

        let lines = pending
            .iter()
            .map(|record| CreateOrderLineInput {
                item: record.item,
                quantity: record.variance_quantity.unwrap_or(Decimal::ZERO),
                unit: "EA".to_string(),
                batch_number: record.batch_number.clone(),
                from_location: record.location_code.clone(),
                to_location: record.location_code.clone(),
                unit_price: None,
            })
            .collect();

        let created = self
            .orders
            .create(
                CreateOrderInput {
                    kind: OrderKind::CountAdjust,
                    warehouse_id: plan.warehouse_id,
                    to_warehouse_id: None,
                    order_date: Some(plan.plan_date),
                    source: Some(plan.document_ref()),
                    remark: Some(format!("count adjustment for {}", plan.plan_no)),
                    lines,
                },
                user_id,
            )
            .await?;
        let order_id = created.order.id;

        self.orders.confirm(order_id, user_id).await?;
        self.orders.approve(order_id, user_id, None).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE count_plans SET adjust_order_id = $2, updated_at = now() WHERE id = $1")
            .bind(plan.id)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(order_id)
    }

    async fn mark_adjusted(&self, plan_id: Uuid, order_id: Option<Uuid>) -> AppResult<CountPlan> {
        let mut tx = self.db.begin().await?;
        let plan = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            UPDATE count_plans
            SET status = 'adjusted', adjusted_at = now(),
                adjust_order_id = COALESCE($2, adjust_order_id), updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?
        .into_entity()?;
        tx.commit().await?;
        Ok(plan)
    }

    async fn lock_plan_tx(
        conn: &mut sqlx::PgConnection,
        plan_id: Uuid,
    ) -> AppResult<CountPlan> {
        sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {} FROM count_plans WHERE id = $1 FOR UPDATE",
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Count plan".to_string()))?
        .into_entity()
    }

    async fn set_status_tx(
        conn: &mut sqlx::PgConnection,
        plan_id: Uuid,
        status: CountPlanStatus,
    ) -> AppResult<()> {
        sqlx::query("UPDATE count_plans SET status = $2, updated_at = now() WHERE id = $1")
            .bind(plan_id)
            .bind(status.as_str())
            .execute(conn)
            .await?;
        Ok(())
    }
}
