//! Database pool and tenant-scoped storage handles
//!
//! The core never resolves tenants itself: the external tenant context
//! builds a [`TenantDb`] per request and hands it to the services. Every
//! unit of work runs inside a transaction whose `search_path` is pinned to
//! the tenant schema, so all unqualified table references stay inside the
//! tenant namespace.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};

/// DDL applied per tenant schema.
const TENANT_SCHEMA_SQL: &str = include_str!("../migrations/tenant_schema.sql");

/// Create the shared connection pool
pub async fn connect_pool(config: &DatabaseConfig) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.url)
        .await?;
    Ok(pool)
}

/// A storage handle bound to one tenant's schema.
///
/// Cloneable and cheap; services hold one and open tenant-scoped
/// transactions through it.
#[derive(Clone)]
pub struct TenantDb {
    pool: PgPool,
    schema: String,
}

impl TenantDb {
    /// Bind a pool to a tenant schema. The schema name is validated here,
    /// once, because it is later interpolated into `SET LOCAL search_path`.
    pub fn new(pool: PgPool, schema: impl Into<String>) -> AppResult<Self> {
        let schema = schema.into();
        shared::validate_schema_name(&schema)
            .map_err(|msg| AppError::validation("schema", msg))?;
        Ok(Self { pool, schema })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Open a transaction with `search_path` pinned to the tenant schema.
    /// `SET LOCAL` scopes the setting to this transaction, so pooled
    /// connections never leak a tenant's namespace to the next caller.
    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        let stmt = format!("SET LOCAL search_path TO {}, public", self.schema);
        (&mut *tx).execute(stmt.as_str()).await?;
        Ok(tx)
    }
}

/// Create the tenant schema if absent and apply the storage layout.
/// Idempotent; called by tenant-provisioning plumbing, not per request.
pub async fn provision_tenant(pool: &PgPool, schema: &str) -> AppResult<()> {
    shared::validate_schema_name(schema).map_err(|msg| AppError::validation("schema", msg))?;

    let mut tx = pool.begin().await?;
    (&mut *tx)
        .execute(format!("CREATE SCHEMA IF NOT EXISTS {}", schema).as_str())
        .await?;
    (&mut *tx)
        .execute(format!("SET LOCAL search_path TO {}, public", schema).as_str())
        .await?;
    (&mut *tx).execute(TENANT_SCHEMA_SQL).await?;
    tx.commit().await?;

    tracing::info!(schema, "tenant schema provisioned");
    Ok(())
}
