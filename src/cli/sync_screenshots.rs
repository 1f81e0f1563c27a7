use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::AppConfig;
use crate::database_ops::file_scan::{from_listing, scan_local, SCREENSHOT_PREFIX};
use crate::database_ops::object_store::{LocalObjectStore, ObjectStore, S3ObjectStore};
use crate::database_ops::screenshot_sync::{reconcile, SyncOptions, SyncReport, SyncSource};
use crate::database_ops::{CatalogStore, MemoryStore};
use crate::normalization::KeywordRules;

#[derive(Debug, Clone, Default)]
pub struct SyncScreenshotsConfig {
    pub database_url: Option<String>,
    /// Local `screenshots` directory; defaults to `$UPLOADS_DIR/screenshots`.
    pub root: Option<PathBuf>,
    /// Reconcile against the S3 listing instead of the local tree.
    pub remote: bool,
    /// JSON keyword rules replacing the built-in set.
    pub rules: Option<PathBuf>,
    pub prune: bool,
    pub mark_evidence: bool,
    pub dry_run: bool,
}

fn load_rules(path: Option<&Path>) -> Result<KeywordRules> {
    match path {
        Some(path) => KeywordRules::from_json_file(path),
        None => Ok(KeywordRules::builtin()),
    }
}

/// Object store rooted one level above `screenshots_root`, so keys read
/// `screenshots/<Competitor>/...` exactly like the remote layout.
fn local_store_for(screenshots_root: &Path, public_base: &str) -> Result<LocalObjectStore> {
    let is_screenshots_dir = screenshots_root
        .file_name()
        .is_some_and(|name| name == SCREENSHOT_PREFIX.trim_end_matches('/'));
    if !is_screenshots_dir {
        bail!(
            "--prune needs --root to point at a `screenshots` directory (got {})",
            screenshots_root.display()
        );
    }
    let parent = screenshots_root
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(LocalObjectStore::new(parent, public_base))
}

async fn run_against(
    store: &dyn CatalogStore,
    cfg: &SyncScreenshotsConfig,
    config: &AppConfig,
    rules: &KeywordRules,
) -> Result<SyncReport> {
    if cfg.remote {
        let Some(settings) = config.s3.clone() else {
            bail!("--remote needs S3_BUCKET (and credentials) in the environment");
        };
        let s3 = S3ObjectStore::connect(settings).await?;
        let listing = s3.list(SCREENSHOT_PREFIX).await?;
        let files = from_listing(&listing);
        info!(objects = listing.len(), images = files.len(), source = %s3.describe(), "remote listing loaded");
        let opts = SyncOptions {
            source: SyncSource::Remote,
            prune_missing: cfg.prune,
            mark_evidence: cfg.mark_evidence,
            ..SyncOptions::default()
        };
        return reconcile(store, &files, rules, Some(&s3), None, &opts).await;
    }

    let root = cfg.root.clone().unwrap_or_else(|| config.screenshots_dir());
    let scan_root = root.clone();
    let files = tokio::task::spawn_blocking(move || scan_local(&scan_root))
        .await
        .context("screenshot scan task failed")??;
    info!(root = %root.display(), images = files.len(), "local tree scanned");

    let prune_store = if cfg.prune {
        Some(local_store_for(&root, &config.uploads_public_base)?)
    } else {
        None
    };
    let opts = SyncOptions {
        source: SyncSource::Local,
        prune_missing: cfg.prune,
        mark_evidence: cfg.mark_evidence,
        ..SyncOptions::default()
    };
    reconcile(
        store,
        &files,
        rules,
        None,
        prune_store.as_ref().map(|s| s as &dyn ObjectStore),
        &opts,
    )
    .await
}

pub async fn run(cfg: SyncScreenshotsConfig) -> Result<()> {
    let rules = load_rules(cfg.rules.as_deref())?;
    info!(rules = rules.len(), "keyword rules loaded");

    let db = super::connect(cfg.database_url.clone()).await?;
    let config = AppConfig::from_env();
    let report = if cfg.dry_run {
        let snapshot = MemoryStore::snapshot(&db).await?;
        run_against(&snapshot, &cfg, &config, &rules).await?
    } else {
        run_against(&db, &cfg, &config, &rules).await?
    };

    super::print_report("sync-screenshots", cfg.dry_run, &report)?;
    db.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_store_sits_above_the_screenshots_dir() {
        let store = local_store_for(Path::new("/srv/uploads/screenshots"), "/uploads").unwrap();
        assert_eq!(store.root(), Path::new("/srv/uploads"));
        assert!(local_store_for(Path::new("/srv/shots"), "/uploads").is_err());
    }

    #[test]
    fn rules_default_to_builtin() {
        assert!(!load_rules(None).unwrap().is_empty());
        assert!(load_rules(Some(Path::new("/definitely/missing.json"))).is_err());
    }
}
