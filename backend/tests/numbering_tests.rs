//! Document number generation tests
//!
//! Tests for the date-partitioned numbering scheme:
//! - Property 10: Number Format (`<PREFIX><YYYYMMDD><seq>`, seq padded to 4)
//! - Property 11: Uniqueness per (prefix, date, seq)
//! - Property 12: Sequences widen past 9999 without truncation

use chrono::NaiveDate;
use proptest::prelude::*;

use shared::{format_document_number, DocPrefix};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// First number of the day is sequence 0001
    #[test]
    fn test_first_number_of_day() {
        let no = format_document_number(DocPrefix::Inbound, day(2025, 1, 10), 1);
        assert_eq!(no, "IN202501100001");
    }

    /// Consecutive sequences on the same day differ only in the suffix
    #[test]
    fn test_consecutive_sequences() {
        let a = format_document_number(DocPrefix::Inbound, day(2025, 1, 10), 1);
        let b = format_document_number(DocPrefix::Inbound, day(2025, 1, 10), 2);
        assert_eq!(b, "IN202501100002");
        assert_eq!(a[..10], b[..10]);
        assert_ne!(a, b);
    }

    /// Each prefix produces a distinct namespace
    #[test]
    fn test_prefix_namespaces() {
        let date = day(2025, 3, 5);
        let all = [
            DocPrefix::Inbound,
            DocPrefix::Outbound,
            DocPrefix::Transfer,
            DocPrefix::Adjustment,
            DocPrefix::CountPlan,
            DocPrefix::Transaction,
        ];
        let numbers: Vec<String> = all
            .iter()
            .map(|p| format_document_number(*p, date, 7))
            .collect();

        for (i, a) in numbers.iter().enumerate() {
            for b in numbers.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert!(numbers[0].starts_with("IN"));
        assert!(numbers[4].starts_with("CNT"));
        assert!(numbers[5].starts_with("TRX"));
    }

    /// Day rollover resets nothing in the format itself; the date segment
    /// changes so the numbers stay distinct
    #[test]
    fn test_day_rollover() {
        let a = format_document_number(DocPrefix::Outbound, day(2025, 1, 31), 42);
        let b = format_document_number(DocPrefix::Outbound, day(2025, 2, 1), 42);
        assert_eq!(a, "OUT202501310042");
        assert_eq!(b, "OUT202502010042");
    }

    /// Sequences past 9999 widen rather than truncate or wrap
    #[test]
    fn test_sequence_widens_past_9999() {
        let date = day(2025, 6, 1);
        let at_cap = format_document_number(DocPrefix::Transaction, date, 9999);
        let past_cap = format_document_number(DocPrefix::Transaction, date, 10000);
        assert_eq!(at_cap, "TRX202506019999");
        assert_eq!(past_cap, "TRX2025060110000");
        assert_eq!(past_cap.len(), at_cap.len() + 1);
    }

    /// Low sequences are zero-padded to four digits
    #[test]
    fn test_zero_padding() {
        let no = format_document_number(DocPrefix::Adjustment, day(2025, 12, 9), 37);
        assert_eq!(no, "ADJ202512090037");
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn date_strategy() -> impl Strategy<Value = NaiveDate> {
        (2020i32..=2035, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn prefix_strategy() -> impl Strategy<Value = DocPrefix> {
        prop_oneof![
            Just(DocPrefix::Inbound),
            Just(DocPrefix::Outbound),
            Just(DocPrefix::Transfer),
            Just(DocPrefix::Adjustment),
            Just(DocPrefix::CountPlan),
            Just(DocPrefix::Transaction),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property 10: the formatted number always decomposes back into
        /// its prefix, date and sequence
        #[test]
        fn prop_format_decomposes(
            prefix in prefix_strategy(),
            date in date_strategy(),
            seq in 1u32..100000
        ) {
            let no = format_document_number(prefix, date, seq);
            prop_assert!(no.starts_with(prefix.as_str()));

            let rest = &no[prefix.as_str().len()..];
            let date_part = &rest[..8];
            let seq_part = &rest[8..];

            prop_assert_eq!(date_part, format!(
                "{:04}{:02}{:02}",
                chrono::Datelike::year(&date),
                chrono::Datelike::month(&date),
                chrono::Datelike::day(&date)
            ));
            prop_assert_eq!(seq_part.parse::<u32>().unwrap(), seq);
            prop_assert!(seq_part.len() >= 4);
        }

        /// Property 11: distinct (prefix, date, seq) triples always format
        /// to distinct numbers
        #[test]
        fn prop_distinct_inputs_distinct_numbers(
            prefix in prefix_strategy(),
            date in date_strategy(),
            a in 1u32..100000,
            b in 1u32..100000
        ) {
            let na = format_document_number(prefix, date, a);
            let nb = format_document_number(prefix, date, b);
            prop_assert_eq!(na == nb, a == b);
        }

        /// Within one prefix and day, numbers sort in allocation order as
        /// long as the sequence width is stable
        #[test]
        fn prop_lexicographic_within_day(
            prefix in prefix_strategy(),
            date in date_strategy(),
            a in 1u32..9999,
            b in 1u32..9999
        ) {
            let na = format_document_number(prefix, date, a);
            let nb = format_document_number(prefix, date, b);
            prop_assert_eq!(na < nb, a < b);
        }
    }
}
