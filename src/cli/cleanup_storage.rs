use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::AppConfig;
use crate::database_ops::object_store::S3ObjectStore;
use crate::database_ops::storage_cleanup::{cleanup_storage, CleanupOptions};
use crate::database_ops::MemoryStore;

#[derive(Debug, Clone)]
pub struct CleanupStorageConfig {
    pub database_url: Option<String>,
    pub dry_run: bool,
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
}

impl Default for CleanupStorageConfig {
    fn default() -> Self {
        let defaults = CleanupOptions::default();
        Self {
            database_url: None,
            dry_run: false,
            chunk_size: defaults.chunk_size,
            chunk_delay_ms: defaults.chunk_delay.as_millis() as u64,
        }
    }
}

/// Checks every screenshot row against the S3 bucket. Objects are never deleted.
pub async fn run(cfg: CleanupStorageConfig) -> Result<()> {
    let db = super::connect(cfg.database_url.clone()).await?;
    let Some(settings) = AppConfig::from_env().s3 else {
        bail!("cleanup-storage needs S3_BUCKET (and credentials) in the environment");
    };
    let s3 = S3ObjectStore::connect(settings).await?;
    let opts = CleanupOptions {
        dry_run: cfg.dry_run,
        chunk_size: cfg.chunk_size,
        chunk_delay: Duration::from_millis(cfg.chunk_delay_ms),
    };

    let report = if cfg.dry_run {
        let snapshot = MemoryStore::snapshot(&db).await?;
        cleanup_storage(&snapshot, &s3, &opts).await?
    } else {
        cleanup_storage(&db, &s3, &opts).await?
    };

    super::print_report("cleanup-storage", cfg.dry_run, &report)?;
    db.close().await;
    Ok(())
}
