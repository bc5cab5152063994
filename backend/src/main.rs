//! Manufacturing ERP - Tenant provisioning entrypoint
//!
//! The inventory core is consumed as a library by the API gateway; this
//! binary only provisions tenant schemas. Each argument is a schema name,
//! created if absent and migrated to the current storage layout.

use erp_backend::db::{connect_pool, provision_tenant};
use erp_backend::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    erp_backend::init_tracing();

    dotenvy::dotenv().ok();
    let config = Config::load()?;

    let schemas: Vec<String> = std::env::args().skip(1).collect();
    if schemas.is_empty() {
        anyhow::bail!("usage: provision-tenant <schema> [<schema>...]");
    }

    tracing::info!("Environment: {}", config.environment);
    let pool = connect_pool(&config.database).await?;

    for schema in &schemas {
        provision_tenant(&pool, schema).await?;
    }

    tracing::info!(count = schemas.len(), "provisioning complete");
    Ok(())
}
