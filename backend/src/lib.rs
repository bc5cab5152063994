//! Manufacturing ERP - Inventory Accounting Core
//!
//! The service-layer core behind the warehouse module: balance store,
//! append-only transaction ledger, reservations, document numbering, order
//! execution and count reconciliation. The HTTP surface, authentication and
//! tenant resolution live in external collaborators; they hand each request
//! a [`db::TenantDb`] and a user id, and get typed results back.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};

/// Initialize tracing for the embedding process. The server binary calls
/// this once at startup; tests and library consumers may skip it.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "erp_backend=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
