//! Transaction ledger tests
//!
//! Tests for ledger semantics:
//! - Property 4: Ledger Completeness (non-cancelled movements sum to the
//!   balance's current quantity when folded from zero)
//! - Property 5: Reservation entries carry no movement weight
//! - Property 6: Direction mapping per transaction type

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::{movement_sum, StockQuantities, TransactionType};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Every inbound type has direction +1, every outbound -1
    #[test]
    fn test_direction_mapping() {
        let inbound = [
            TransactionType::PurchaseIn,
            TransactionType::OtherIn,
            TransactionType::TransferIn,
            TransactionType::AdjustmentIn,
        ];
        let outbound = [
            TransactionType::SalesOut,
            TransactionType::OtherOut,
            TransactionType::TransferOut,
            TransactionType::AdjustmentOut,
            TransactionType::Scrap,
        ];

        for ty in inbound {
            assert_eq!(ty.direction(), 1, "{} should be inbound", ty.as_str());
        }
        for ty in outbound {
            assert_eq!(ty.direction(), -1, "{} should be outbound", ty.as_str());
        }
    }

    /// Reservation types are flagged and never counted as movements
    #[test]
    fn test_reservation_types_flagged() {
        assert!(TransactionType::Reserve.is_reservation());
        assert!(TransactionType::Unreserve.is_reservation());
        assert!(!TransactionType::SalesOut.is_reservation());
        assert!(!TransactionType::PurchaseIn.is_reservation());
    }

    /// Type tags round-trip through their string form
    #[test]
    fn test_type_tags_round_trip() {
        let all = [
            TransactionType::PurchaseIn,
            TransactionType::OtherIn,
            TransactionType::SalesOut,
            TransactionType::OtherOut,
            TransactionType::TransferIn,
            TransactionType::TransferOut,
            TransactionType::AdjustmentIn,
            TransactionType::AdjustmentOut,
            TransactionType::Scrap,
            TransactionType::Reserve,
            TransactionType::Unreserve,
        ];
        for ty in all {
            assert_eq!(TransactionType::from_str(ty.as_str()), Some(ty));
        }
        assert_eq!(TransactionType::from_str("made_up"), None);
    }

    /// Movement sum skips reservations and cancelled entries
    #[test]
    fn test_movement_sum_filters() {
        let entries = vec![
            (TransactionType::PurchaseIn, dec("100"), false),
            (TransactionType::Reserve, dec("-30"), false),
            (TransactionType::SalesOut, dec("-40"), false),
            (TransactionType::Unreserve, dec("10"), false),
            (TransactionType::AdjustmentOut, dec("-5"), true),
        ];
        // 100 - 40; the reservation pair and the cancelled adjustment
        // carry no weight
        assert_eq!(movement_sum(&entries), dec("60"));
    }

    /// Ledger completeness on the worked outbound scenario: before 100,
    /// sales_out -40, after 60
    #[test]
    fn test_outbound_entry_quantities() {
        let before = StockQuantities::on_hand(dec("100")).reserve(dec("20")).unwrap();
        let after = before.apply_movement(dec("-40"), false).unwrap();

        assert_eq!(before.current, dec("100"));
        assert_eq!(after.current, dec("60"));
        assert_eq!(after.current - before.current, dec("-40"));
    }

    /// Reservation entries are measured against the available split, not
    /// current
    #[test]
    fn test_reservation_entry_basis() {
        let before = StockQuantities::on_hand(dec("100"));
        let after = before.reserve(dec("30")).unwrap();

        // current is unchanged; the available split moved by the delta
        assert_eq!(after.current, before.current);
        assert_eq!(after.available - before.available, dec("-30"));
    }

    /// Total amount on an entry is price times delta magnitude
    #[test]
    fn test_total_amount() {
        let delta = dec("-40");
        let unit_price = dec("12.50");
        assert_eq!(unit_price * delta.abs(), dec("500.00"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=10000i64).prop_map(|n| Decimal::new(n, 1))
    }

    fn movement_type_strategy() -> impl Strategy<Value = TransactionType> {
        prop_oneof![
            Just(TransactionType::PurchaseIn),
            Just(TransactionType::OtherIn),
            Just(TransactionType::SalesOut),
            Just(TransactionType::OtherOut),
            Just(TransactionType::AdjustmentIn),
            Just(TransactionType::AdjustmentOut),
            Just(TransactionType::Scrap),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property 4: folding a balance from zero through a stream of
        /// successful movements leaves current equal to the ledger's
        /// movement sum
        #[test]
        fn prop_ledger_completeness(
            movements in prop::collection::vec(
                (movement_type_strategy(), quantity_strategy()),
                1..30
            )
        ) {
            let mut q = StockQuantities::ZERO;
            let mut ledger: Vec<(TransactionType, Decimal, bool)> = Vec::new();

            for (ty, qty) in movements {
                let delta = qty * Decimal::from(ty.direction());
                if let Ok(next) = q.apply_movement(delta, false) {
                    q = next;
                    ledger.push((ty, delta, false));
                }
            }

            prop_assert_eq!(movement_sum(&ledger), q.current);
        }

        /// Property 5: interleaving reservation entries never changes the
        /// movement sum
        #[test]
        fn prop_reservations_carry_no_weight(
            movements in prop::collection::vec(
                (movement_type_strategy(), quantity_strategy()),
                1..20
            ),
            reservations in prop::collection::vec(quantity_strategy(), 0..10)
        ) {
            let mut ledger: Vec<(TransactionType, Decimal, bool)> = movements
                .iter()
                .map(|(ty, qty)| (*ty, qty * Decimal::from(ty.direction()), false))
                .collect();
            let base = movement_sum(&ledger);

            for qty in reservations {
                ledger.push((TransactionType::Reserve, -qty, false));
                ledger.push((TransactionType::Unreserve, qty, false));
            }

            prop_assert_eq!(movement_sum(&ledger), base);
        }

        /// Cancelling an entry removes exactly its delta from the sum
        #[test]
        fn prop_cancellation_removes_delta(
            movements in prop::collection::vec(
                (movement_type_strategy(), quantity_strategy()),
                2..20
            ),
            pick in any::<prop::sample::Index>()
        ) {
            let mut ledger: Vec<(TransactionType, Decimal, bool)> = movements
                .iter()
                .map(|(ty, qty)| (*ty, qty * Decimal::from(ty.direction()), false))
                .collect();
            let before = movement_sum(&ledger);

            let idx = pick.index(ledger.len());
            let cancelled_delta = ledger[idx].1;
            ledger[idx].2 = true;

            prop_assert_eq!(movement_sum(&ledger), before - cancelled_delta);
        }
    }
}
