//! Shared domain types for the Manufacturing ERP inventory core
//!
//! This crate contains the pure domain model: quantity arithmetic, closed
//! status/type enums, document number formatting, and validation helpers.
//! It is shared between the backend service layer and any embedding surface
//! and carries no database or I/O dependencies.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
