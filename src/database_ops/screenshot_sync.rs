//! Reconciles screenshot files (local tree or remote listing) with the
//! `screenshots` table. Idempotent: a second pass over an unchanged tree
//! creates and deletes nothing.

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entities::{
    CellUpsert, Competitor, NewScreenshot, Screenshot, ScreenshotPatch, UploadSource,
};
use super::file_scan::{normalize_relative_path, storage_relative_path, DiscoveredFile, SCREENSHOT_PREFIX};
use super::object_store::{Existence, ObjectStore};
use super::store::CatalogStore;
use crate::normalization::keywords::KeywordRules;
use crate::normalization::names::{resolve, resolve_exact};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    /// Files under the local uploads directory; `file_path` is `uploads/screenshots/...`.
    Local,
    /// Objects listed from the remote store; `file_path` is the object key.
    Remote,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub source: SyncSource,
    /// Delete rows whose local file is definitively gone (local source only).
    pub prune_missing: bool,
    /// Upsert `has_feature = true` for every cell that has screenshot evidence.
    pub mark_evidence: bool,
    /// Prefix for `file_path` of locally discovered files.
    pub local_path_prefix: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            source: SyncSource::Local,
            prune_missing: false,
            mark_evidence: false,
            local_path_prefix: "uploads/screenshots".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub orphans: usize,
    pub evidence_marked: usize,
    pub unresolved_competitors: Vec<String>,
    pub errors: usize,
}

/// Lookup tables over existing rows, kept current as rows are created.
struct ExistingIndex {
    rows: Vec<Screenshot>,
    by_path: HashMap<String, usize>,
    by_name: HashMap<(Uuid, String), usize>,
}

impl ExistingIndex {
    fn new(rows: Vec<Screenshot>) -> Self {
        let mut index = Self {
            rows: Vec::with_capacity(rows.len()),
            by_path: HashMap::new(),
            by_name: HashMap::new(),
        };
        for row in rows {
            index.push(row);
        }
        index
    }

    fn push(&mut self, row: Screenshot) {
        let idx = self.rows.len();
        self.by_path
            .entry(normalize_relative_path(&row.file_path))
            .or_insert(idx);
        self.by_name
            .entry((row.competitor_id, row.file_name.to_lowercase()))
            .or_insert(idx);
        self.rows.push(row);
    }

    fn find(&self, competitor_id: Uuid, file: &DiscoveredFile) -> Option<Existing<'_>> {
        if let Some(&idx) = self.by_path.get(&file.relative_path.to_lowercase()) {
            return Some(Existing::SamePath(&self.rows[idx]));
        }
        self.by_name
            .get(&(competitor_id, file.file_name.to_lowercase()))
            .map(|&idx| Existing::SameName(&self.rows[idx]))
    }
}

/// How a discovered file was tied to an existing row.
enum Existing<'a> {
    /// The row describes this very file.
    SamePath(&'a Screenshot),
    /// Another file of the competitor with the same name; counted as imported
    /// but never patched, so two such files cannot overwrite each other.
    SameName(&'a Screenshot),
}

fn resolve_competitor_folder<'a>(
    cache: &mut HashMap<String, Option<usize>>,
    competitors: &'a [Competitor],
    folder: &str,
) -> Option<&'a Competitor> {
    let slot = cache.entry(folder.to_string()).or_insert_with(|| {
        let hit = resolve(folder, competitors).matched()?;
        competitors.iter().position(|c| c.id == hit.id)
    });
    slot.map(|idx| &competitors[idx])
}

/// Creates rows for new files, refreshes existing ones, and optionally prunes
/// rows whose file is gone and marks evidence on the matrix.
///
/// `prune_store` is consulted for existence checks when pruning; only
/// [`Existence::NotFound`] removes a row.
pub async fn reconcile(
    store: &dyn CatalogStore,
    files: &[DiscoveredFile],
    rules: &KeywordRules,
    public_urls: Option<&dyn ObjectStore>,
    prune_store: Option<&dyn ObjectStore>,
    opts: &SyncOptions,
) -> Result<SyncReport> {
    let competitors = store.competitors().await?;
    let features = store.features().await?;
    let mut index = ExistingIndex::new(store.screenshots().await?);
    let mut report = SyncReport::default();
    let mut folder_cache: HashMap<String, Option<usize>> = HashMap::new();
    let mut unresolved: BTreeSet<String> = BTreeSet::new();

    for file in files {
        report.scanned += 1;
        let Some(competitor) =
            resolve_competitor_folder(&mut folder_cache, &competitors, &file.competitor_folder)
        else {
            if unresolved.insert(file.competitor_folder.clone()) {
                warn!(folder = %file.competitor_folder, "no competitor matches folder; skipping its files");
            }
            continue;
        };

        let feature = rules
            .match_file(&file.subfolders, &file.file_name)
            .and_then(|name| {
                let hit = resolve_exact(name, &features);
                if hit.is_none() {
                    warn!(rule_feature = name, "keyword rule targets a feature missing from the catalog");
                }
                hit
            });

        let cdn_url = match (opts.source, &file.storage_key, public_urls) {
            (SyncSource::Remote, Some(key), Some(objects)) => Some(objects.public_url(key)),
            _ => None,
        };

        if let Some(found) = index.find(competitor.id, file) {
            let existing = match found {
                Existing::SamePath(row) => row,
                Existing::SameName(row) => {
                    debug!(id = %row.id, file = %file.relative_path, "same file name already imported elsewhere; leaving row alone");
                    report.skipped += 1;
                    continue;
                }
            };
            let mut patch = ScreenshotPatch::default();
            if existing.feature_id.is_none() {
                patch.feature_id = feature.map(|f| f.id);
            }
            if file.size > 0 && existing.file_size != file.size {
                patch.file_size = Some(file.size);
            }
            if cdn_url.is_some() && existing.cdn_url != cdn_url {
                patch.cdn_url = cdn_url.clone();
            }
            if patch.is_empty() {
                report.skipped += 1;
                continue;
            }
            match store.update_screenshot(existing.id, &patch).await {
                Ok(()) => {
                    report.updated += 1;
                    debug!(id = %existing.id, file = %file.relative_path, "screenshot refreshed");
                }
                Err(err) => {
                    report.errors += 1;
                    warn!(file = %file.relative_path, error = %err, "screenshot update failed");
                }
            }
            continue;
        }

        let (file_path, upload_source) = match (opts.source, &file.storage_key) {
            (SyncSource::Remote, Some(key)) => (key.clone(), UploadSource::S3Sync),
            _ => (
                format!(
                    "{}/{}",
                    opts.local_path_prefix.trim_end_matches('/'),
                    file.relative_path
                ),
                UploadSource::AutoScan,
            ),
        };
        let new = NewScreenshot {
            competitor_id: competitor.id,
            feature_id: feature.map(|f| f.id),
            file_path,
            file_name: file.file_name.clone(),
            file_size: file.size,
            mime_type: file.mime_type().to_string(),
            cdn_url,
            is_onboarding: file.is_onboarding(),
            upload_source,
        };
        match store.insert_screenshot(&new).await {
            Ok(row) => {
                report.created += 1;
                if row.feature_id.is_none() {
                    report.orphans += 1;
                }
                index.push(row);
            }
            Err(err) => {
                report.errors += 1;
                warn!(file = %file.relative_path, error = %err, "screenshot insert failed");
            }
        }
    }
    report.unresolved_competitors = unresolved.into_iter().collect();

    if opts.prune_missing {
        if opts.source != SyncSource::Local {
            warn!("prune requested for a remote source; use cleanup-storage instead");
        } else if let Some(objects) = prune_store {
            prune_missing_files(store, objects, &index.rows, &mut report).await?;
        }
    }

    if opts.mark_evidence {
        mark_evidence(store, &mut report).await?;
    }

    info!(
        scanned = report.scanned,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        deleted = report.deleted,
        orphans = report.orphans,
        errors = report.errors,
        "screenshot sync finished"
    );
    Ok(report)
}

/// Outcome of checking rows against the local uploads directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalFileCheck {
    pub checked: usize,
    /// Rows whose file is definitively gone.
    pub missing: Vec<Uuid>,
    /// Rows whose file could not be checked.
    pub unknown: usize,
}

/// Heads the local file of every row that has no CDN copy. Only
/// [`Existence::NotFound`] counts as missing.
pub async fn check_local_files(objects: &dyn ObjectStore, rows: &[Screenshot]) -> LocalFileCheck {
    let mut check = LocalFileCheck::default();
    for row in rows.iter().filter(|r| r.cdn_url.is_none()) {
        let rel = storage_relative_path(&row.file_path);
        if rel.is_empty() {
            continue;
        }
        check.checked += 1;
        let key = format!("{SCREENSHOT_PREFIX}{rel}");
        match objects.head(&key).await {
            Existence::NotFound => check.missing.push(row.id),
            Existence::Exists => {}
            Existence::Unknown(reason) => {
                check.unknown += 1;
                warn!(id = %row.id, path = %row.file_path, reason = %reason, "could not confirm file")
            }
        }
    }
    check
}

async fn prune_missing_files(
    store: &dyn CatalogStore,
    objects: &dyn ObjectStore,
    rows: &[Screenshot],
    report: &mut SyncReport,
) -> Result<()> {
    let check = check_local_files(objects, rows).await;
    if !check.missing.is_empty() {
        report.deleted += store.delete_screenshots(&check.missing).await? as usize;
    }
    Ok(())
}

async fn mark_evidence(store: &dyn CatalogStore, report: &mut SyncReport) -> Result<()> {
    let pairs: BTreeSet<(Uuid, Uuid)> = store
        .screenshots()
        .await?
        .into_iter()
        .filter_map(|s| s.feature_id.map(|f| (s.competitor_id, f)))
        .collect();
    for (competitor_id, feature_id) in pairs {
        let cell = CellUpsert {
            competitor_id,
            feature_id,
            has_feature: true,
            implementation_quality: None,
            notes: None,
        };
        match store.upsert_competitor_feature(&cell).await {
            Ok(_) => report.evidence_marked += 1,
            Err(err) => {
                report.errors += 1;
                warn!(%competitor_id, %feature_id, error = %err, "evidence upsert failed");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::entities::Region;
    use crate::database_ops::file_scan::scan_local;
    use crate::database_ops::memory::MemoryStore;
    use crate::database_ops::object_store::LocalObjectStore;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        uploads: std::path::PathBuf,
        store: MemoryStore,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        let shots = uploads.join("screenshots");
        fs::create_dir_all(shots.join("OKX TR/TRY Nemalandırma")).unwrap();
        fs::create_dir_all(shots.join("OKX TR/Misc")).unwrap();
        fs::create_dir_all(shots.join("Paribu/Onboarding")).unwrap();
        fs::create_dir_all(shots.join("Unknown Exchange")).unwrap();
        fs::write(shots.join("OKX TR/TRY Nemalandırma/shot1.png"), [0u8; 12]).unwrap();
        fs::write(shots.join("OKX TR/Misc/random.png"), [0u8; 3]).unwrap();
        fs::write(shots.join("Paribu/Onboarding/step1.png"), [0u8; 5]).unwrap();
        fs::write(shots.join("Unknown Exchange/a.png"), [0u8; 5]).unwrap();

        let store = MemoryStore::new();
        store.add_competitor("OKX TR", Some(Region::Tr));
        store.add_competitor("Paribu", Some(Region::Tr));
        store.add_feature("TRY Nemalandırma", Some("Earn"));
        store.add_feature("User Onboarding", None);
        Fixture {
            _dir: dir,
            uploads,
            store,
        }
    }

    async fn run(fx: &Fixture, opts: &SyncOptions) -> SyncReport {
        let files = scan_local(&fx.uploads.join("screenshots")).unwrap();
        let local = LocalObjectStore::new(&fx.uploads, "/uploads");
        reconcile(
            &fx.store,
            &files,
            &KeywordRules::builtin(),
            None,
            Some(&local),
            opts,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn folder_names_map_to_competitor_and_feature() {
        let fx = fixture();
        let report = run(&fx, &SyncOptions::default()).await;

        assert_eq!(report.scanned, 4);
        assert_eq!(report.created, 3);
        assert_eq!(report.orphans, 1);
        assert_eq!(report.unresolved_competitors, vec!["Unknown Exchange".to_string()]);

        let competitors = fx.store.competitors().await.unwrap();
        let features = fx.store.features().await.unwrap();
        let okx = competitors.iter().find(|c| c.name == "OKX TR").unwrap();
        let earn = features.iter().find(|f| f.name == "TRY Nemalandırma").unwrap();
        let rows = fx.store.screenshots().await.unwrap();
        let shot = rows.iter().find(|s| s.file_name == "shot1.png").unwrap();
        assert_eq!(shot.competitor_id, okx.id);
        assert_eq!(shot.feature_id, Some(earn.id));
        assert_eq!(shot.file_path, "uploads/screenshots/OKX TR/TRY Nemalandırma/shot1.png");
        assert_eq!(shot.file_size, 12);
        assert_eq!(shot.upload_source, UploadSource::AutoScan);

        let step = rows.iter().find(|s| s.file_name == "step1.png").unwrap();
        assert!(step.is_onboarding);
        assert!(step.feature_id.is_some());
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let fx = fixture();
        run(&fx, &SyncOptions::default()).await;
        let opts = SyncOptions {
            prune_missing: true,
            ..SyncOptions::default()
        };
        let again = run(&fx, &opts).await;
        assert_eq!(again.created, 0);
        assert_eq!(again.deleted, 0);
        assert_eq!(again.updated, 0);
        assert_eq!(again.skipped, 3);
        assert_eq!(fx.store.screenshots().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn same_named_files_in_different_folders_settle() {
        let fx = fixture();
        let shots = fx.uploads.join("screenshots");
        fs::create_dir_all(shots.join("Paribu/Convert")).unwrap();
        fs::create_dir_all(shots.join("Paribu/Misc")).unwrap();
        fs::write(shots.join("Paribu/Convert/1.png"), [0u8; 12]).unwrap();
        fs::write(shots.join("Paribu/Misc/1.png"), [0u8; 3]).unwrap();

        let first = run(&fx, &SyncOptions::default()).await;
        assert_eq!(first.created, 4);
        assert_eq!(first.updated, 0);

        for _ in 0..2 {
            let again = run(&fx, &SyncOptions::default()).await;
            assert_eq!(again.created, 0);
            assert_eq!(again.updated, 0);
            assert_eq!(again.skipped, 5);
        }

        let rows = fx.store.screenshots().await.unwrap();
        let ones: Vec<&Screenshot> = rows.iter().filter(|s| s.file_name == "1.png").collect();
        assert_eq!(ones.len(), 1);
        assert_eq!(ones[0].file_size, 12);
        assert!(ones[0].file_path.ends_with("Paribu/Convert/1.png"));
    }

    #[tokio::test]
    async fn orphan_rows_pick_up_a_feature_once_a_rule_matches() {
        let fx = fixture();
        run(&fx, &SyncOptions::default()).await;

        let files = scan_local(&fx.uploads.join("screenshots")).unwrap();
        let rules = KeywordRules::from_json(
            r#"[{"pattern": "misc", "feature": "User Onboarding"},
                {"pattern": "nemalandırma", "feature": "User Onboarding"}]"#,
        )
        .unwrap();
        let report = reconcile(&fx.store, &files, &rules, None, None, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.updated, 1);

        let onboarding = fx
            .store
            .features()
            .await
            .unwrap()
            .into_iter()
            .find(|f| f.name == "User Onboarding")
            .unwrap();
        let rows = fx.store.screenshots().await.unwrap();
        let random = rows.iter().find(|s| s.file_name == "random.png").unwrap();
        assert_eq!(random.feature_id, Some(onboarding.id));
        // already-assigned rows keep their feature
        let shot = rows.iter().find(|s| s.file_name == "shot1.png").unwrap();
        assert_ne!(shot.feature_id, Some(onboarding.id));
    }

    #[tokio::test]
    async fn prune_deletes_only_rows_whose_file_is_gone() {
        let fx = fixture();
        run(&fx, &SyncOptions::default()).await;
        fs::remove_file(fx.uploads.join("screenshots/OKX TR/Misc/random.png")).unwrap();

        let report = run(
            &fx,
            &SyncOptions {
                prune_missing: true,
                ..SyncOptions::default()
            },
        )
        .await;
        assert_eq!(report.deleted, 1);
        let names: Vec<String> = fx
            .store
            .screenshots()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.file_name)
            .collect();
        assert!(!names.contains(&"random.png".to_string()));
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn local_check_reports_only_definitively_missing_files() {
        let fx = fixture();
        run(&fx, &SyncOptions::default()).await;
        fs::remove_file(fx.uploads.join("screenshots/Paribu/Onboarding/step1.png")).unwrap();

        let rows = fx.store.screenshots().await.unwrap();
        let local = LocalObjectStore::new(&fx.uploads, "/uploads");
        let check = check_local_files(&local, &rows).await;
        assert_eq!(check.checked, 3);
        assert_eq!(check.unknown, 0);
        let step = rows.iter().find(|s| s.file_name == "step1.png").unwrap();
        assert_eq!(check.missing, vec![step.id]);
        // checking never deletes
        assert_eq!(fx.store.screenshots().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn mark_evidence_sets_has_feature() {
        let fx = fixture();
        let report = run(
            &fx,
            &SyncOptions {
                mark_evidence: true,
                ..SyncOptions::default()
            },
        )
        .await;
        assert_eq!(report.evidence_marked, 2);
        let cells = fx.store.competitor_features().await.unwrap();
        assert_eq!(cells.len(), 2);
        assert!(cells.iter().all(|c| c.has_feature));
    }

    #[tokio::test]
    async fn remote_source_writes_keys_and_cdn_urls() {
        let fx = fixture();
        let remote = LocalObjectStore::new(&fx.uploads, "https://cdn.example.com");
        let listing = remote.list(SCREENSHOT_PREFIX).await.unwrap();
        let files = crate::database_ops::file_scan::from_listing(&listing);
        let opts = SyncOptions {
            source: SyncSource::Remote,
            ..SyncOptions::default()
        };
        let report = reconcile(
            &fx.store,
            &files,
            &KeywordRules::builtin(),
            Some(&remote),
            None,
            &opts,
        )
        .await
        .unwrap();
        assert_eq!(report.created, 3);

        let rows = fx.store.screenshots().await.unwrap();
        let shot = rows.iter().find(|s| s.file_name == "shot1.png").unwrap();
        assert_eq!(shot.file_path, "screenshots/OKX TR/TRY Nemalandırma/shot1.png");
        assert_eq!(
            shot.cdn_url.as_deref(),
            Some("https://cdn.example.com/screenshots/OKX TR/TRY Nemalandırma/shot1.png")
        );
        assert_eq!(shot.upload_source, UploadSource::S3Sync);
    }
}
