//! Error handling for the inventory accounting core
//!
//! Every error here is a value returned to the embedding service layer;
//! none of them are used for ordinary control flow. The `code()` strings
//! are the stable contract an HTTP surface maps onto status codes.

use rust_decimal::Decimal;
use shared::QuantityError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },

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

    #[error("invalid state transition: current {current}, expected {expected}")]
    InvalidStateTransition { current: String, expected: String },

    /// Retry budget exhausted while allocating a document number.
    /// Transient; the whole operation is safe to retry.
    #[error("document number generation failed for prefix {0}")]
    NumberGenerationFailed(String),

    /// An internal invariant check failed, typically a stale snapshot or
    /// an unknown tag in storage. Never swallowed.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code for the external service layer
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::OverRelease { .. } => "OVER_RELEASE",
            AppError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            AppError::NumberGenerationFailed(_) => "NUMBER_GENERATION_FAILED",
            AppError::ConsistencyViolation(_) => "CONSISTENCY_VIOLATION",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a caller may retry the whole operation unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::NumberGenerationFailed(_))
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(current: impl Into<String>, expected: impl Into<String>) -> Self {
        AppError::InvalidStateTransition {
            current: current.into(),
            expected: expected.into(),
        }
    }
}

impl From<QuantityError> for AppError {
    fn from(err: QuantityError) -> Self {
        match err {
            QuantityError::InsufficientStock {
                requested,
                available,
            } => AppError::InsufficientStock {
                requested,
                available,
            },
            QuantityError::OverRelease {
                requested,
                reserved,
            } => AppError::OverRelease {
                requested,
                reserved,
            },
        }
    }
}

/// Result type alias for services
pub type AppResult<T> = Result<T, AppError>;
