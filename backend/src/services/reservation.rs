//! Reservation manager
//!
//! Moves quantity between the available and reserved splits of a balance
//! without recording a physical movement. Reservations are all-or-nothing:
//! a shortfall fails fast and the caller retries with a smaller quantity if
//! it wants a partial hold. Consuming a reservation is a real movement and
//! goes out through the standard delta path with `from_reserved` set.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{validate_positive_quantity, DocPrefix, DocumentRef, TransactionType};

use crate::db::TenantDb;
use crate::error::{AppError, AppResult};
use crate::services::balance::{BalanceService, InventoryBalance};
use crate::services::ledger::{AppendEntry, LedgerService};
use crate::services::numbering::NumberingService;

/// Reservation manager service
#[derive(Clone)]
pub struct ReservationService {
    db: TenantDb,
    numbering: NumberingService,
}

/// Result of a reservation operation: the updated balance plus the ledger
/// entry recording it, so callers can report the effect without re-querying
#[derive(Debug)]
pub struct ReservationOutcome {
    pub balance: InventoryBalance,
    pub transaction: crate::services::ledger::InventoryTransaction,
}

impl ReservationService {
    /// Create a new ReservationService instance
    pub fn new(db: TenantDb) -> Self {
        let numbering = NumberingService::new(db.clone());
        Self { db, numbering }
    }

    /// Place a soft hold of `qty` on the balance's available quantity
    pub async fn reserve(
        &self,
        balance_id: Uuid,
        qty: Decimal,
        document: DocumentRef,
        user_id: Uuid,
    ) -> AppResult<ReservationOutcome> {
        validate_positive_quantity(qty).map_err(|msg| AppError::validation("qty", msg))?;
        self.shift(balance_id, -qty, TransactionType::Reserve, document, user_id)
            .await
    }

    /// Release a previously held quantity back to available
    pub async fn release(
        &self,
        balance_id: Uuid,
        qty: Decimal,
        document: DocumentRef,
        user_id: Uuid,
    ) -> AppResult<ReservationOutcome> {
        validate_positive_quantity(qty).map_err(|msg| AppError::validation("qty", msg))?;
        self.shift(balance_id, qty, TransactionType::Unreserve, document, user_id)
            .await
    }

    /// Ship a reserved quantity: reduces `reserved` and `current` together
    /// under a real movement type. Not a release; `available` is untouched.
    pub async fn consume(
        &self,
        balance_id: Uuid,
        qty: Decimal,
        movement_type: TransactionType,
        document: DocumentRef,
        unit_price: Option<Decimal>,
        user_id: Uuid,
    ) -> AppResult<ReservationOutcome> {
        validate_positive_quantity(qty).map_err(|msg| AppError::validation("qty", msg))?;
        if movement_type.is_reservation() || movement_type.direction() > 0 {
            return Err(AppError::validation(
                "movement_type",
                "Consuming a reservation requires an outbound movement type",
            ));
        }

        let transaction_no = self
            .numbering
            .generate(DocPrefix::Transaction, Utc::now().date_naive())
            .await?;

        let mut tx = self.db.begin().await?;
        let before = BalanceService::get_for_update_tx(&mut *tx, balance_id).await?;
        let after =
            BalanceService::apply_delta_tx(&mut *tx, balance_id, -qty, movement_type, true).await?;
        let transaction = LedgerService::append_tx(
            &mut *tx,
            AppendEntry {
                transaction_no,
                before: &before,
                after: &after,
                delta: -qty,
                transaction_type: movement_type,
                document: &document,
                unit_price,
                from_location: before.location_code.clone(),
                to_location: None,
                created_by: user_id,
            },
        )
        .await?;
        let balance = BalanceService::recompute_cost_tx(&mut *tx, balance_id).await?;
        tx.commit().await?;

        Ok(ReservationOutcome { balance, transaction })
    }

    /// Shared reserve/release path: one row-locked transaction moving the
    /// available/reserved split plus its ledger entry.
    async fn shift(
        &self,
        balance_id: Uuid,
        delta: Decimal,
        transaction_type: TransactionType,
        document: DocumentRef,
        user_id: Uuid,
    ) -> AppResult<ReservationOutcome> {
        let transaction_no = self
            .numbering
            .generate(DocPrefix::Transaction, Utc::now().date_naive())
            .await?;

        let mut tx = self.db.begin().await?;
        let before = BalanceService::get_for_update_tx(&mut *tx, balance_id).await?;
        let after =
            BalanceService::apply_delta_tx(&mut *tx, balance_id, delta, transaction_type, false)
                .await?;
        let transaction = LedgerService::append_tx(
            &mut *tx,
            AppendEntry {
                transaction_no,
                before: &before,
                after: &after,
                delta,
                transaction_type,
                document: &document,
                unit_price: None,
                from_location: before.location_code.clone(),
                to_location: None,
                created_by: user_id,
            },
        )
        .await?;
        tx.commit().await?;

        Ok(ReservationOutcome {
            balance: after,
            transaction,
        })
    }
}
