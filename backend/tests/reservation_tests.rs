//! Reservation lifecycle tests
//!
//! Tests for the soft-allocation model:
//! - Property 7: Reserve/Release Round Trip (current never moves)
//! - Property 8: Reservation Capacity (never beyond available, never
//!   released beyond reserved)
//! - Property 9: Consumption draws down the reserved split

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::{QuantityError, StockQuantities};

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

    /// Reserve 30 of 100, release 10: available 80, reserved 20, current
    /// untouched throughout
    #[test]
    fn test_reserve_then_partial_release() {
        let q = StockQuantities::on_hand(dec("100"));

        let q = q.reserve(dec("30")).unwrap();
        assert_eq!(q.current, dec("100"));
        assert_eq!(q.available, dec("70"));
        assert_eq!(q.reserved, dec("30"));

        let q = q.release(dec("10")).unwrap();
        assert_eq!(q.current, dec("100"));
        assert_eq!(q.available, dec("80"));
        assert_eq!(q.reserved, dec("20"));
        assert!(q.is_consistent());
    }

    /// Reserving 150 against 100 available fails and reports both figures
    #[test]
    fn test_reserve_beyond_available() {
        let q = StockQuantities::on_hand(dec("100"));
        let err = q.reserve(dec("150")).unwrap_err();
        assert_eq!(
            err,
            QuantityError::InsufficientStock {
                requested: dec("150"),
                available: dec("100"),
            }
        );
    }

    /// Releasing more than is reserved fails
    #[test]
    fn test_release_beyond_reserved() {
        let q = StockQuantities::on_hand(dec("100")).reserve(dec("20")).unwrap();
        let err = q.release(dec("25")).unwrap_err();
        assert_eq!(
            err,
            QuantityError::OverRelease {
                requested: dec("25"),
                reserved: dec("20"),
            }
        );
    }

    /// Consuming a reservation moves the quantity out of both current and
    /// reserved, leaving available untouched
    #[test]
    fn test_consume_reserved() {
        let q = StockQuantities::on_hand(dec("100")).reserve(dec("30")).unwrap();
        let available_before = q.available;

        let q = q.issue(dec("30"), true).unwrap();
        assert_eq!(q.current, dec("70"));
        assert_eq!(q.reserved, Decimal::ZERO);
        assert_eq!(q.available, available_before);
        assert!(q.is_consistent());
    }

    /// Partial consumption leaves the remainder reserved
    #[test]
    fn test_partial_consume() {
        let q = StockQuantities::on_hand(dec("100")).reserve(dec("30")).unwrap();
        let q = q.issue(dec("12"), true).unwrap();
        assert_eq!(q.current, dec("88"));
        assert_eq!(q.reserved, dec("18"));
        assert_eq!(q.available, dec("70"));
    }

    /// Reservations stack: two reservations draw from the same available
    /// pool
    #[test]
    fn test_stacked_reservations() {
        let q = StockQuantities::on_hand(dec("100"));
        let q = q.reserve(dec("60")).unwrap();
        let q = q.reserve(dec("40")).unwrap();
        assert_eq!(q.available, Decimal::ZERO);
        assert_eq!(q.reserved, dec("100"));

        // nothing left for a third
        assert!(q.reserve(dec("0.1")).is_err());
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

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property 7: reserve followed by a full release restores the
        /// original split exactly, and current never moves in between
        #[test]
        fn prop_reserve_release_round_trip(
            have in quantity_strategy(),
            want in quantity_strategy()
        ) {
            let start = StockQuantities::on_hand(have);
            match start.reserve(want) {
                Ok(held) => {
                    prop_assert_eq!(held.current, start.current);
                    let released = held.release(want).unwrap();
                    prop_assert_eq!(released, start);
                }
                Err(_) => prop_assert!(want > have),
            }
        }

        /// Property 8: reserved never exceeds current, no matter how the
        /// reserve/release stream interleaves
        #[test]
        fn prop_reserved_bounded_by_current(
            have in quantity_strategy(),
            steps in prop::collection::vec(
                (any::<bool>(), quantity_strategy()),
                1..30
            )
        ) {
            let mut q = StockQuantities::on_hand(have);
            for (is_reserve, qty) in steps {
                let result = if is_reserve { q.reserve(qty) } else { q.release(qty) };
                if let Ok(next) = result {
                    q = next;
                }
                prop_assert!(q.reserved <= q.current);
                prop_assert!(q.is_consistent());
            }
        }

        /// Property 9: consuming exactly what was reserved conserves the
        /// available split
        #[test]
        fn prop_consumption_conserves_available(
            have in quantity_strategy(),
            take in quantity_strategy()
        ) {
            let start = StockQuantities::on_hand(have);
            if let Ok(held) = start.reserve(take) {
                let consumed = held.issue(take, true).unwrap();
                prop_assert_eq!(consumed.available, held.available);
                prop_assert_eq!(consumed.current, have - take);
                prop_assert_eq!(consumed.reserved, Decimal::ZERO);
            }
        }
    }
}
