//! Stock order state machine
//!
//! The four order kinds (inbound, outbound, transfer, count adjustment)
//! share one document shape and one lifecycle:
//! `draft -> confirmed -> in_progress -> completed`, with `cancelled`
//! reachable from any state before completion. Execution is gated on
//! approval.

use serde::{Deserialize, Serialize};

use super::TransactionType;

/// Kind of stock order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Inbound,
    Outbound,
    Transfer,
    CountAdjust,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Inbound => "inbound",
            OrderKind::Outbound => "outbound",
            OrderKind::Transfer => "transfer",
            OrderKind::CountAdjust => "count_adjust",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(OrderKind::Inbound),
            "outbound" => Some(OrderKind::Outbound),
            "transfer" => Some(OrderKind::Transfer),
            "count_adjust" => Some(OrderKind::CountAdjust),
            _ => None,
        }
    }

    /// Whether this kind posts against a second (destination) warehouse.
    pub fn has_destination(&self) -> bool {
        matches!(self, OrderKind::Transfer)
    }

    /// Ledger type for the source-warehouse leg of a line with the given
    /// signed quantity. Count-adjustment lines carry the variance sign;
    /// the other kinds always post the sign of their direction.
    pub fn source_leg(&self, line_quantity_is_negative: bool) -> TransactionType {
        match self {
            OrderKind::Inbound => TransactionType::PurchaseIn,
            OrderKind::Outbound => TransactionType::SalesOut,
            OrderKind::Transfer => TransactionType::TransferOut,
            OrderKind::CountAdjust => {
                if line_quantity_is_negative {
                    TransactionType::AdjustmentOut
                } else {
                    TransactionType::AdjustmentIn
                }
            }
        }
    }

    /// Ledger type for the destination leg, if the kind has one.
    pub fn destination_leg(&self) -> Option<TransactionType> {
        match self {
            OrderKind::Transfer => Some(TransactionType::TransferIn),
            _ => None,
        }
    }
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    /// Never set by the execution engine, which posts every line and
    /// completes the order inside one transaction. Kept for callers that
    /// stage partial execution externally.
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(OrderStatus::Draft),
            "confirmed" => Some(OrderStatus::Confirmed),
            "in_progress" => Some(OrderStatus::InProgress),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Draft)
    }

    /// Execution requires a confirmed order (approval checked separately).
    pub fn can_execute(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Completed orders are immutable; correction is a new compensating
    /// order, never an edit.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Draft | OrderStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// Review state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}
