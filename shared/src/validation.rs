//! Validation utilities for the inventory core

use rust_decimal::Decimal;

/// Validate a quantity that must be strictly positive (order lines,
/// reservations, counted actuals are entered as absolute values)
pub fn validate_positive_quantity(qty: Decimal) -> Result<(), &'static str> {
    if qty <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a quantity that may be zero but not negative
pub fn validate_non_negative_quantity(qty: Decimal) -> Result<(), &'static str> {
    if qty < Decimal::ZERO {
        return Err("Quantity cannot be negative");
    }
    Ok(())
}

/// Validate a unit-of-measure code (non-empty, short)
pub fn validate_unit(unit: &str) -> Result<(), &'static str> {
    if unit.trim().is_empty() {
        return Err("Unit cannot be empty");
    }
    if unit.len() > 16 {
        return Err("Unit code too long");
    }
    Ok(())
}

/// Validate a batch number (uppercase alphanumeric plus dash, max 32)
pub fn validate_batch_number(batch: &str) -> Result<(), &'static str> {
    if batch.is_empty() || batch.len() > 32 {
        return Err("Batch number must be 1-32 characters");
    }
    if !batch
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("Batch number contains invalid characters");
    }
    Ok(())
}

/// Validate a tenant schema name before it is interpolated into
/// `SET search_path` (lowercase identifier, max 63 per PostgreSQL)
pub fn validate_schema_name(schema: &str) -> Result<(), &'static str> {
    if schema.is_empty() || schema.len() > 63 {
        return Err("Schema name must be 1-63 characters");
    }
    match schema.chars().next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return Err("Schema name must start with a lowercase letter or underscore"),
    }
    if !schema
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err("Schema name contains invalid characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_quantity() {
        assert!(validate_positive_quantity(Decimal::ONE).is_ok());
        assert!(validate_positive_quantity(Decimal::ZERO).is_err());
        assert!(validate_positive_quantity(Decimal::NEGATIVE_ONE).is_err());
    }

    #[test]
    fn batch_numbers() {
        assert!(validate_batch_number("B-20250110-01").is_ok());
        assert!(validate_batch_number("").is_err());
        assert!(validate_batch_number("bad batch!").is_err());
    }

    #[test]
    fn schema_names() {
        assert!(validate_schema_name("tenant_acme").is_ok());
        assert!(validate_schema_name("_x1").is_ok());
        assert!(validate_schema_name("1tenant").is_err());
        assert!(validate_schema_name("tenant;drop").is_err());
        assert!(validate_schema_name("Tenant").is_err());
    }
}
