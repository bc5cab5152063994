//! Stock balance domain model
//!
//! `StockQuantities` is the single source of truth for how a quantity
//! delta affects the current/available/reserved split. The backend mirrors
//! these rules in conditional SQL updates and re-checks results against
//! this model after every mutation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Item referenced by a balance: exactly one of product or material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "item_type", content = "item_id", rename_all = "snake_case")]
pub enum ItemRef {
    Product(Uuid),
    Material(Uuid),
}

impl ItemRef {
    pub fn item_id(&self) -> Uuid {
        match self {
            ItemRef::Product(id) | ItemRef::Material(id) => *id,
        }
    }

    /// Discriminant as stored in the `item_type` column.
    pub fn type_str(&self) -> &'static str {
        match self {
            ItemRef::Product(_) => "product",
            ItemRef::Material(_) => "material",
        }
    }

    pub fn from_parts(item_type: &str, item_id: Uuid) -> Option<Self> {
        match item_type {
            "product" => Some(ItemRef::Product(item_id)),
            "material" => Some(ItemRef::Material(item_id)),
            _ => None,
        }
    }
}

/// Inventory status of a balance row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryStatus {
    Normal,
    Blocked,
    Quarantine,
    Damaged,
}

impl InventoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryStatus::Normal => "normal",
            InventoryStatus::Blocked => "blocked",
            InventoryStatus::Quarantine => "quarantine",
            InventoryStatus::Damaged => "damaged",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(InventoryStatus::Normal),
            "blocked" => Some(InventoryStatus::Blocked),
            "quarantine" => Some(InventoryStatus::Quarantine),
            "damaged" => Some(InventoryStatus::Damaged),
            _ => None,
        }
    }
}

/// Quality inspection status of a balance row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Qualified,
    Unqualified,
    Pending,
}

impl QualityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityStatus::Qualified => "qualified",
            QualityStatus::Unqualified => "unqualified",
            QualityStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "qualified" => Some(QualityStatus::Qualified),
            "unqualified" => Some(QualityStatus::Unqualified),
            "pending" => Some(QualityStatus::Pending),
            _ => None,
        }
    }
}

/// Errors from quantity arithmetic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    #[error("over-release: requested {requested}, reserved {reserved}")]
    OverRelease {
        requested: Decimal,
        reserved: Decimal,
    },
}

/// The current/available/reserved/in-transit split of one balance row.
///
/// Invariants: all four quantities are non-negative and
/// `current = available + reserved` (in-transit is a separate leg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockQuantities {
    pub current: Decimal,
    pub available: Decimal,
    pub reserved: Decimal,
    pub in_transit: Decimal,
}

impl StockQuantities {
    pub const ZERO: StockQuantities = StockQuantities {
        current: Decimal::ZERO,
        available: Decimal::ZERO,
        reserved: Decimal::ZERO,
        in_transit: Decimal::ZERO,
    };

    /// A freshly received, unreserved quantity.
    pub fn on_hand(qty: Decimal) -> Self {
        Self {
            current: qty,
            available: qty,
            reserved: Decimal::ZERO,
            in_transit: Decimal::ZERO,
        }
    }

    /// Whether the split invariant holds.
    pub fn is_consistent(&self) -> bool {
        self.current == self.available + self.reserved
            && self.current >= Decimal::ZERO
            && self.available >= Decimal::ZERO
            && self.reserved >= Decimal::ZERO
            && self.in_transit >= Decimal::ZERO
    }

    /// Physical receipt: `current` and `available` grow by `qty`.
    pub fn receive(self, qty: Decimal) -> Result<Self, QuantityError> {
        debug_assert!(qty >= Decimal::ZERO);
        Ok(Self {
            current: self.current + qty,
            available: self.available + qty,
            ..self
        })
    }

    /// Physical issue of `qty`.
    ///
    /// With `from_reserved = false` the quantity leaves the available pool;
    /// with `from_reserved = true` it consumes a previously reserved hold,
    /// leaving `available` untouched.
    pub fn issue(self, qty: Decimal, from_reserved: bool) -> Result<Self, QuantityError> {
        debug_assert!(qty >= Decimal::ZERO);
        if from_reserved {
            if self.reserved < qty {
                return Err(QuantityError::OverRelease {
                    requested: qty,
                    reserved: self.reserved,
                });
            }
            Ok(Self {
                current: self.current - qty,
                reserved: self.reserved - qty,
                ..self
            })
        } else {
            if self.available < qty {
                return Err(QuantityError::InsufficientStock {
                    requested: qty,
                    available: self.available,
                });
            }
            Ok(Self {
                current: self.current - qty,
                available: self.available - qty,
                ..self
            })
        }
    }

    /// Soft hold: moves `qty` from available to reserved, `current` untouched.
    pub fn reserve(self, qty: Decimal) -> Result<Self, QuantityError> {
        debug_assert!(qty >= Decimal::ZERO);
        if self.available < qty {
            return Err(QuantityError::InsufficientStock {
                requested: qty,
                available: self.available,
            });
        }
        Ok(Self {
            available: self.available - qty,
            reserved: self.reserved + qty,
            ..self
        })
    }

    /// Releases a hold: moves `qty` back from reserved to available.
    pub fn release(self, qty: Decimal) -> Result<Self, QuantityError> {
        debug_assert!(qty >= Decimal::ZERO);
        if self.reserved < qty {
            return Err(QuantityError::OverRelease {
                requested: qty,
                reserved: self.reserved,
            });
        }
        Ok(Self {
            available: self.available + qty,
            reserved: self.reserved - qty,
            ..self
        })
    }

    /// Applies a signed movement delta (positive receipt, negative issue).
    pub fn apply_movement(self, delta: Decimal, from_reserved: bool) -> Result<Self, QuantityError> {
        if delta >= Decimal::ZERO {
            self.receive(delta)
        } else {
            self.issue(-delta, from_reserved)
        }
    }

    /// Derived total cost for a given unit cost.
    pub fn total_cost(&self, unit_cost: Decimal) -> Decimal {
        self.current * unit_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn receive_grows_current_and_available() {
        let q = StockQuantities::ZERO.receive(dec("100")).unwrap();
        assert_eq!(q.current, dec("100"));
        assert_eq!(q.available, dec("100"));
        assert_eq!(q.reserved, Decimal::ZERO);
        assert!(q.is_consistent());
    }

    #[test]
    fn issue_beyond_available_fails() {
        let q = StockQuantities::on_hand(dec("50"));
        let err = q.issue(dec("60"), false).unwrap_err();
        assert_eq!(
            err,
            QuantityError::InsufficientStock {
                requested: dec("60"),
                available: dec("50"),
            }
        );
    }

    #[test]
    fn consume_reserved_leaves_available_untouched() {
        let q = StockQuantities::on_hand(dec("100")).reserve(dec("30")).unwrap();
        let q = q.issue(dec("30"), true).unwrap();
        assert_eq!(q.current, dec("70"));
        assert_eq!(q.available, dec("70"));
        assert_eq!(q.reserved, Decimal::ZERO);
        assert!(q.is_consistent());
    }
}
