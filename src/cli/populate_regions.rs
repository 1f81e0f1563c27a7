use anyhow::Result;

use crate::database_ops::regions::populate_regions;

#[derive(Debug, Clone, Default)]
pub struct PopulateRegionsConfig {
    pub database_url: Option<String>,
    pub dry_run: bool,
}

pub async fn run(cfg: PopulateRegionsConfig) -> Result<()> {
    let db = super::connect(cfg.database_url).await?;
    let report = populate_regions(&db, cfg.dry_run).await?;
    super::print_report("populate-regions", cfg.dry_run, &report)?;
    db.close().await;
    Ok(())
}
