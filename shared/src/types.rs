//! Common types used across the platform

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Document prefixes for the date-partitioned numbering scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocPrefix {
    /// Inbound stock order
    Inbound,
    /// Outbound stock order
    Outbound,
    /// Transfer order
    Transfer,
    /// Count-adjustment order
    Adjustment,
    /// Count plan
    CountPlan,
    /// Ledger transaction
    Transaction,
}

impl DocPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocPrefix::Inbound => "IN",
            DocPrefix::Outbound => "OUT",
            DocPrefix::Transfer => "TRF",
            DocPrefix::Adjustment => "ADJ",
            DocPrefix::CountPlan => "CNT",
            DocPrefix::Transaction => "TRX",
        }
    }
}

/// Format a document number: `<PREFIX><YYYYMMDD><seq>` with the sequence
/// zero-padded to four digits (wider sequences are not truncated).
pub fn format_document_number(prefix: DocPrefix, date: NaiveDate, seq: u32) -> String {
    format!(
        "{}{:04}{:02}{:02}{:04}",
        prefix.as_str(),
        date.year(),
        date.month(),
        date.day(),
        seq
    )
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (i64::from(self.page.max(1)) - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(pagination: Pagination, total_items: u64) -> Self {
        let per_page = pagination.per_page.max(1);
        let total_pages = ((total_items + u64::from(per_page) - 1) / u64::from(per_page)) as u32;
        Self {
            page: pagination.page,
            per_page: pagination.per_page,
            total_items,
            total_pages,
        }
    }
}

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_number_format() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(
            format_document_number(DocPrefix::Inbound, date, 1),
            "IN202501100001"
        );
        assert_eq!(
            format_document_number(DocPrefix::Transaction, date, 42),
            "TRX202501100042"
        );
    }

    #[test]
    fn sequence_widens_past_four_digits() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(
            format_document_number(DocPrefix::Outbound, date, 12345),
            "OUT2025123112345"
        );
    }
}
