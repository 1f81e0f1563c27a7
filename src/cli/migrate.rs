use anyhow::Result;
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct MigrateConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
}

/// Applies pending files from `MIGRATIONS_DIR` (default `./migrations`).
pub async fn run(cfg: MigrateConfig) -> Result<()> {
    let db = super::connect(cfg.database_url).await?;
    let applied = db.run_migrations().await?;
    info!(applied, "migrations complete");
    super::print_report("migrate", false, &json!({ "applied": applied }))?;
    db.close().await;
    Ok(())
}
