//! Ledger transaction domain model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    PurchaseIn,
    OtherIn,
    SalesOut,
    OtherOut,
    TransferIn,
    TransferOut,
    AdjustmentIn,
    AdjustmentOut,
    Scrap,
    Reserve,
    Unreserve,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::PurchaseIn => "purchase_in",
            TransactionType::OtherIn => "other_in",
            TransactionType::SalesOut => "sales_out",
            TransactionType::OtherOut => "other_out",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::AdjustmentIn => "adjustment_in",
            TransactionType::AdjustmentOut => "adjustment_out",
            TransactionType::Scrap => "scrap",
            TransactionType::Reserve => "reserve",
            TransactionType::Unreserve => "unreserve",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase_in" => Some(TransactionType::PurchaseIn),
            "other_in" => Some(TransactionType::OtherIn),
            "sales_out" => Some(TransactionType::SalesOut),
            "other_out" => Some(TransactionType::OtherOut),
            "transfer_in" => Some(TransactionType::TransferIn),
            "transfer_out" => Some(TransactionType::TransferOut),
            "adjustment_in" => Some(TransactionType::AdjustmentIn),
            "adjustment_out" => Some(TransactionType::AdjustmentOut),
            "scrap" => Some(TransactionType::Scrap),
            "reserve" => Some(TransactionType::Reserve),
            "unreserve" => Some(TransactionType::Unreserve),
            _ => None,
        }
    }

    /// Sign of the quantity change this type records: +1 inbound, -1
    /// outbound. Reservation entries are signed against the available split.
    pub fn direction(&self) -> i32 {
        match self {
            TransactionType::PurchaseIn
            | TransactionType::OtherIn
            | TransactionType::TransferIn
            | TransactionType::AdjustmentIn
            | TransactionType::Unreserve => 1,
            TransactionType::SalesOut
            | TransactionType::OtherOut
            | TransactionType::TransferOut
            | TransactionType::AdjustmentOut
            | TransactionType::Scrap
            | TransactionType::Reserve => -1,
        }
    }

    /// Reservation entries move the available/reserved split only and are
    /// excluded from the ledger completeness sum.
    pub fn is_reservation(&self) -> bool {
        matches!(self, TransactionType::Reserve | TransactionType::Unreserve)
    }
}

/// Link from a ledger entry back to the business document that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Source document kind, e.g. "stock_order", "count_plan"
    pub source_type: String,
    pub source_id: Uuid,
    /// Human-readable document number of the source
    pub source_no: String,
}

impl DocumentRef {
    pub fn new(source_type: impl Into<String>, source_id: Uuid, source_no: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            source_id,
            source_no: source_no.into(),
        }
    }
}

/// Sum of non-cancelled movement deltas; the ledger-completeness invariant
/// says this equals the balance's current quantity when folded from zero.
pub fn movement_sum<'a, I>(entries: I) -> Decimal
where
    I: IntoIterator<Item = &'a (TransactionType, Decimal, bool)>,
{
    entries
        .into_iter()
        .filter(|(ty, _, cancelled)| !ty.is_reservation() && !cancelled)
        .map(|(_, delta, _)| *delta)
        .sum()
}
