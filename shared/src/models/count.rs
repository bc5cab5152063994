//! Stock count (cycle count) domain model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{ApprovalStatus, OrderStatus};

/// Count plan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPlanStatus {
    Draft,
    Counting,
    Completed,
    Adjusted,
    Cancelled,
}

impl CountPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountPlanStatus::Draft => "draft",
            CountPlanStatus::Counting => "counting",
            CountPlanStatus::Completed => "completed",
            CountPlanStatus::Adjusted => "adjusted",
            CountPlanStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CountPlanStatus::Draft),
            "counting" => Some(CountPlanStatus::Counting),
            "completed" => Some(CountPlanStatus::Completed),
            "adjusted" => Some(CountPlanStatus::Adjusted),
            "cancelled" => Some(CountPlanStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_generate_records(&self) -> bool {
        matches!(self, CountPlanStatus::Draft)
    }

    pub fn can_record_actual(&self) -> bool {
        matches!(self, CountPlanStatus::Counting)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, CountPlanStatus::Counting)
    }

    pub fn can_adjust(&self) -> bool {
        matches!(self, CountPlanStatus::Completed)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, CountPlanStatus::Draft | CountPlanStatus::Counting)
    }

    /// What an adjustment request should do for a plan in this state.
    /// A plan that already reached `adjusted` succeeds with no work, so
    /// retrying after a commit is harmless.
    pub fn adjust_disposition(&self) -> AdjustDisposition {
        if self.can_adjust() {
            AdjustDisposition::Post
        } else if matches!(self, CountPlanStatus::Adjusted) {
            AdjustDisposition::AlreadyAdjusted
        } else {
            AdjustDisposition::Rejected
        }
    }
}

/// Outcome of gating an adjustment request on the plan status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustDisposition {
    /// Variances still need posting
    Post,
    /// A prior adjustment already landed; nothing left to post
    AlreadyAdjusted,
    /// The plan has not finished counting, or was cancelled
    Rejected,
}

/// How to treat the adjustment order tracked on a plan when adjustment is
/// retried. The order is created, confirmed and approved before posting, so
/// a retry finishes whichever of those steps the earlier attempt reached. A
/// completed or cancelled tracked order means the posting already happened
/// outside the plan workflow; reposting its lines would double-count every
/// variance, so that state is a conflict, never a fresh order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedOrderReuse {
    Execute,
    Approve,
    ConfirmAndApprove,
    Conflict,
}

pub fn tracked_order_reuse(status: OrderStatus, approval: ApprovalStatus) -> TrackedOrderReuse {
    match (status, approval) {
        (OrderStatus::Confirmed, ApprovalStatus::Approved) => TrackedOrderReuse::Execute,
        (OrderStatus::Confirmed, ApprovalStatus::Pending) => TrackedOrderReuse::Approve,
        (OrderStatus::Draft, _) => TrackedOrderReuse::ConfirmAndApprove,
        _ => TrackedOrderReuse::Conflict,
    }
}

/// Variance between book and counted quantity.
///
/// Rate is expressed in percent. When the book quantity is zero the rate is
/// 100% for any surplus and 0% when the count is also zero.
pub fn variance(book: Decimal, actual: Decimal) -> (Decimal, Decimal) {
    let qty = actual - book;
    let rate = if book.is_zero() {
        if actual.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE_HUNDRED
        }
    } else {
        qty * Decimal::ONE_HUNDRED / book
    };
    (qty, rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn variance_against_zero_book() {
        assert_eq!(variance(Decimal::ZERO, Decimal::ZERO), (Decimal::ZERO, Decimal::ZERO));
        let (qty, rate) = variance(Decimal::ZERO, dec("5"));
        assert_eq!(qty, dec("5"));
        assert_eq!(rate, dec("100"));
    }

    #[test]
    fn shortage_variance_is_negative() {
        let (qty, rate) = variance(dec("60"), dec("55"));
        assert_eq!(qty, dec("-5"));
        assert!(rate > dec("-8.34") && rate < dec("-8.33"));
    }
}
