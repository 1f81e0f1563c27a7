//! Aligns screenshot rows with the remote object store: canonical CDN URLs
//! for objects that exist, and removal of rows whose object is definitively
//! gone. Objects themselves are never touched.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::entities::{Screenshot, ScreenshotPatch};
use super::file_scan::{is_image_file, storage_relative_path, SCREENSHOT_PREFIX};
use super::object_store::{Existence, ObjectStore};
use super::store::CatalogStore;

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub dry_run: bool,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            chunk_size: 100,
            chunk_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub objects: usize,
    pub rows: usize,
    pub kept: usize,
    pub updated: usize,
    pub deleted: usize,
    pub ambiguous: usize,
    pub errors: usize,
}

/// Object key a row points at: taken from its CDN URL when present,
/// otherwise `screenshots/<relative path>` from `file_path`.
pub fn key_for_row(row: &Screenshot) -> Option<String> {
    let source = row.cdn_url.as_deref().unwrap_or(&row.file_path);
    let decoded = urlencoding::decode(source)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| source.to_string());
    let rel = storage_relative_path(&decoded);
    if rel.is_empty() {
        None
    } else {
        Some(format!("{SCREENSHOT_PREFIX}{rel}"))
    }
}

pub async fn cleanup_storage(
    store: &dyn CatalogStore,
    objects: &dyn ObjectStore,
    opts: &CleanupOptions,
) -> Result<CleanupReport> {
    // A failed listing must not be mistaken for an empty bucket.
    let listing = objects
        .list(SCREENSHOT_PREFIX)
        .await
        .with_context(|| format!("listing {}; aborting before any write", objects.describe()))?;

    let mut by_name: HashMap<String, String> = HashMap::new();
    let mut listed: HashSet<&str> = HashSet::new();
    let mut duplicate_names = 0usize;
    for object in listing.iter().filter(|o| is_image_file(&o.key)) {
        listed.insert(object.key.as_str());
        let Some(name) = object.key.rsplit('/').next() else {
            continue;
        };
        if by_name.insert(name.to_string(), object.key.clone()).is_some() {
            duplicate_names += 1;
        }
    }
    if duplicate_names > 0 {
        warn!(duplicate_names, "several objects share a file name; rows whose own key is listed keep it");
    }

    let rows = store.screenshots().await?;
    let mut report = CleanupReport {
        objects: listing.len(),
        rows: rows.len(),
        ..CleanupReport::default()
    };

    let mut candidates: Vec<&Screenshot> = Vec::new();
    for row in &rows {
        // The row's own key beats a same-named object of another competitor.
        let own_key = key_for_row(row).filter(|k| listed.contains(k.as_str()));
        let Some(key) = own_key.or_else(|| by_name.get(&row.file_name).cloned()) else {
            candidates.push(row);
            continue;
        };
        report.kept += 1;
        let canonical = objects.public_url(&key);
        if row.cdn_url.as_deref() == Some(canonical.as_str()) {
            continue;
        }
        report.updated += 1;
        if opts.dry_run {
            continue;
        }
        let patch = ScreenshotPatch {
            cdn_url: Some(canonical),
            ..ScreenshotPatch::default()
        };
        if let Err(err) = store.update_screenshot(row.id, &patch).await {
            report.updated -= 1;
            report.errors += 1;
            warn!(id = %row.id, error = %err, "cdn url update failed");
        }
    }

    let chunk_size = opts.chunk_size.max(1);
    let chunk_count = candidates.len().div_ceil(chunk_size);
    for (i, chunk) in candidates.chunks(chunk_size).enumerate() {
        let mut doomed: Vec<Uuid> = Vec::new();
        for row in chunk {
            let Some(key) = key_for_row(row) else {
                report.ambiguous += 1;
                warn!(id = %row.id, "row has no usable path; keeping it");
                continue;
            };
            match objects.head(&key).await {
                Existence::NotFound => doomed.push(row.id),
                Existence::Exists => report.kept += 1,
                Existence::Unknown(reason) => {
                    report.ambiguous += 1;
                    warn!(id = %row.id, key = %key, reason = %reason, "existence check inconclusive; keeping row");
                }
            }
        }

        if opts.dry_run {
            report.deleted += doomed.len();
        } else if !doomed.is_empty() {
            match store.delete_screenshots(&doomed).await {
                Ok(n) => report.deleted += n as usize,
                Err(err) => {
                    report.errors += 1;
                    warn!(chunk = i, error = %err, "delete chunk failed");
                }
            }
        }
        info!(chunk = i + 1, of = chunk_count, deleted = report.deleted, "cleanup chunk done");

        if i + 1 < chunk_count && !opts.chunk_delay.is_zero() {
            tokio::time::sleep(opts.chunk_delay).await;
        }
    }

    info!(
        objects = report.objects,
        rows = report.rows,
        kept = report.kept,
        updated = report.updated,
        deleted = report.deleted,
        ambiguous = report.ambiguous,
        dry_run = opts.dry_run,
        "storage cleanup finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::entities::{NewScreenshot, Region, UploadSource};
    use crate::database_ops::memory::MemoryStore;
    use crate::database_ops::object_store::StoredObject;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Object store double with a fixed listing and scripted head answers.
    struct ScriptedStore {
        listing: Option<Vec<StoredObject>>,
        unknown: HashSet<String>,
        present: HashSet<String>,
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        fn describe(&self) -> String {
            "scripted://".into()
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://cdn.test/{key}")
        }

        async fn list(&self, _prefix: &str) -> Result<Vec<StoredObject>> {
            self.listing
                .clone()
                .ok_or_else(|| anyhow::anyhow!("connection reset"))
        }

        async fn head(&self, key: &str) -> Existence {
            if self.unknown.contains(key) {
                Existence::Unknown("timeout".into())
            } else if self.present.contains(key) {
                Existence::Exists
            } else {
                Existence::NotFound
            }
        }

        async fn put(&self, _key: &str, _body: Vec<u8>, _content_type: &str) -> Result<()> {
            Ok(())
        }
    }

    async fn seed(store: &MemoryStore, names: &[&str]) {
        let btc = store.add_competitor("BTCTurk", Some(Region::Tr));
        for name in names {
            store
                .insert_screenshot(&NewScreenshot {
                    competitor_id: btc.id,
                    feature_id: None,
                    file_path: format!("uploads/screenshots/BTCTurk/{name}"),
                    file_name: name.to_string(),
                    file_size: 1,
                    mime_type: "image/png".into(),
                    cdn_url: None,
                    is_onboarding: false,
                    upload_source: UploadSource::AutoScan,
                })
                .await
                .unwrap();
        }
    }

    fn objects(keys: &[&str]) -> Vec<StoredObject> {
        keys.iter()
            .map(|k| StoredObject {
                key: k.to_string(),
                size: 1,
            })
            .collect()
    }

    fn quick() -> CleanupOptions {
        CleanupOptions {
            dry_run: false,
            chunk_size: 2,
            chunk_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn only_definitive_not_found_deletes() {
        let store = MemoryStore::new();
        seed(&store, &["listed.png", "gone.png", "flaky.png", "late.png"]).await;
        let remote = ScriptedStore {
            listing: Some(objects(&["screenshots/BTCTurk/listed.png"])),
            unknown: HashSet::from(["screenshots/BTCTurk/flaky.png".to_string()]),
            present: HashSet::from(["screenshots/BTCTurk/late.png".to_string()]),
        };

        let report = cleanup_storage(&store, &remote, &quick()).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.ambiguous, 1);
        assert_eq!(report.kept, 2);
        assert_eq!(report.updated, 1);

        let rows = store.screenshots().await.unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.file_name.as_str()).collect();
        assert!(!names.contains(&"gone.png"));
        assert!(names.contains(&"flaky.png"));
        let listed = rows.iter().find(|r| r.file_name == "listed.png").unwrap();
        assert_eq!(
            listed.cdn_url.as_deref(),
            Some("https://cdn.test/screenshots/BTCTurk/listed.png")
        );
    }

    #[tokio::test]
    async fn rows_keep_their_own_key_when_names_collide() {
        let store = MemoryStore::new();
        seed(&store, &["1.png"]).await;
        let remote = ScriptedStore {
            listing: Some(objects(&[
                "screenshots/BTCTurk/1.png",
                "screenshots/Paribu/Convert/1.png",
            ])),
            unknown: HashSet::new(),
            present: HashSet::new(),
        };

        let report = cleanup_storage(&store, &remote, &quick()).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 0);
        let rows = store.screenshots().await.unwrap();
        assert_eq!(
            rows[0].cdn_url.as_deref(),
            Some("https://cdn.test/screenshots/BTCTurk/1.png")
        );
    }

    #[tokio::test]
    async fn failed_listing_aborts_without_writes() {
        let store = MemoryStore::new();
        seed(&store, &["a.png", "b.png"]).await;
        let remote = ScriptedStore {
            listing: None,
            unknown: HashSet::new(),
            present: HashSet::new(),
        };
        assert!(cleanup_storage(&store, &remote, &quick()).await.is_err());
        assert_eq!(store.screenshots().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dry_run_counts_but_keeps_everything() {
        let store = MemoryStore::new();
        seed(&store, &["a.png", "b.png", "c.png"]).await;
        let remote = ScriptedStore {
            listing: Some(Vec::new()),
            unknown: HashSet::new(),
            present: HashSet::new(),
        };
        let opts = CleanupOptions {
            dry_run: true,
            ..quick()
        };
        let report = cleanup_storage(&store, &remote, &opts).await.unwrap();
        assert_eq!(report.deleted, 3);
        assert_eq!(store.screenshots().await.unwrap().len(), 3);
    }

    #[test]
    fn row_keys_come_from_cdn_url_or_path() {
        let now = chrono::Utc::now();
        let mut row = Screenshot {
            id: Uuid::new_v4(),
            competitor_id: Uuid::new_v4(),
            feature_id: None,
            file_path: "uploads/screenshots/OKX TR/Convert/a.png".into(),
            file_name: "a.png".into(),
            file_size: 0,
            mime_type: "image/png".into(),
            cdn_url: None,
            is_onboarding: false,
            upload_source: UploadSource::Manual,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(
            key_for_row(&row).as_deref(),
            Some("screenshots/OKX TR/Convert/a.png")
        );
        row.cdn_url = Some("https://cdn.test/screenshots/OKX%20TR/Convert/a.png".into());
        assert_eq!(
            key_for_row(&row).as_deref(),
            Some("screenshots/OKX TR/Convert/a.png")
        );
        row.cdn_url = None;
        row.file_path = String::new();
        assert_eq!(key_for_row(&row), None);
    }
}
