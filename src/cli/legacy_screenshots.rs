use anyhow::Result;

use crate::database_ops::legacy_migration::migrate_legacy_screenshots;

#[derive(Debug, Clone, Default)]
pub struct LegacyScreenshotsConfig {
    pub database_url: Option<String>,
    pub dry_run: bool,
}

/// Copies v1 `competitor_feature_screenshots` rows into `screenshots`.
pub async fn run(cfg: LegacyScreenshotsConfig) -> Result<()> {
    let db = super::connect(cfg.database_url).await?;
    let report = migrate_legacy_screenshots(&db, cfg.dry_run).await?;
    super::print_report("migrate-legacy-screenshots", cfg.dry_run, &report)?;
    db.close().await;
    Ok(())
}
