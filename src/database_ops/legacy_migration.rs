//! Copies v1 evidence rows (`competitor_feature_screenshots`) into the v2
//! `screenshots` table. Safe to re-run: rows already mirrored are skipped.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::entities::{LegacyScreenshot, NewScreenshot, UploadSource};
use super::file_scan::{mime_for, normalize_relative_path};
use super::store::CatalogStore;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LegacyReport {
    pub legacy_rows: usize,
    pub migrated: usize,
    pub already_present: usize,
    pub skipped_empty: usize,
    pub errors: usize,
}

fn file_name_of(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
}

fn new_row(legacy: &LegacyScreenshot) -> NewScreenshot {
    let path = legacy.screenshot_path.trim();
    let is_url = path.starts_with("http://") || path.starts_with("https://");
    let file_name = file_name_of(path.split('?').next().unwrap_or(path));
    NewScreenshot {
        competitor_id: legacy.competitor_id,
        feature_id: Some(legacy.feature_id),
        file_path: path.to_string(),
        file_name: file_name.to_string(),
        file_size: 0,
        mime_type: mime_for(file_name).to_string(),
        cdn_url: is_url.then(|| path.to_string()),
        is_onboarding: false,
        upload_source: UploadSource::LegacyMigration,
    }
}

pub async fn migrate_legacy_screenshots(
    store: &dyn CatalogStore,
    dry_run: bool,
) -> Result<LegacyReport> {
    let legacy = store.legacy_screenshots().await?;
    let existing = store.screenshots().await?;
    let mut seen_paths: HashSet<String> = existing
        .iter()
        .map(|s| normalize_relative_path(&s.file_path))
        .collect();
    let mut seen_names: HashSet<(Uuid, String)> = existing
        .iter()
        .map(|s| (s.competitor_id, s.file_name.to_lowercase()))
        .collect();

    let mut report = LegacyReport {
        legacy_rows: legacy.len(),
        ..LegacyReport::default()
    };

    for row in &legacy {
        if row.screenshot_path.trim().is_empty() {
            report.skipped_empty += 1;
            continue;
        }
        let new = new_row(row);
        let path_key = normalize_relative_path(&new.file_path);
        let name_key = (new.competitor_id, new.file_name.to_lowercase());
        if seen_paths.contains(&path_key) || seen_names.contains(&name_key) {
            report.already_present += 1;
            continue;
        }
        if !dry_run {
            if let Err(err) = store.insert_screenshot(&new).await {
                report.errors += 1;
                warn!(legacy_id = %row.id, error = %err, "legacy screenshot copy failed");
                continue;
            }
        }
        seen_paths.insert(path_key);
        seen_names.insert(name_key);
        report.migrated += 1;
    }

    info!(
        legacy_rows = report.legacy_rows,
        migrated = report.migrated,
        already_present = report.already_present,
        dry_run,
        "legacy screenshot migration finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::entities::{CellUpsert, Region};
    use crate::database_ops::memory::MemoryStore;

    #[tokio::test]
    async fn copies_each_legacy_row_once() {
        let store = MemoryStore::new();
        let btc = store.add_competitor("BTCTurk", Some(Region::Tr));
        let convert = store.add_feature("Convert", None);
        let cell = store
            .upsert_competitor_feature(&CellUpsert {
                competitor_id: btc.id,
                feature_id: convert.id,
                has_feature: true,
                implementation_quality: None,
                notes: None,
            })
            .await
            .unwrap();
        store.add_legacy_screenshot(&cell, "uploads/screenshots/BTCTurk/convert-1.png");
        store.add_legacy_screenshot(&cell, "https://cdn.test/screenshots/BTCTurk/convert-2.jpg");
        store.add_legacy_screenshot(&cell, "  ");

        let first = migrate_legacy_screenshots(&store, false).await.unwrap();
        assert_eq!(first.migrated, 2);
        assert_eq!(first.skipped_empty, 1);

        let rows = store.screenshots().await.unwrap();
        let remote = rows.iter().find(|r| r.file_name == "convert-2.jpg").unwrap();
        assert_eq!(remote.mime_type, "image/jpeg");
        assert_eq!(
            remote.cdn_url.as_deref(),
            Some("https://cdn.test/screenshots/BTCTurk/convert-2.jpg")
        );
        assert!(rows.iter().all(|r| r.feature_id == Some(convert.id)));

        let second = migrate_legacy_screenshots(&store, false).await.unwrap();
        assert_eq!(second.migrated, 0);
        assert_eq!(second.already_present, 2);
        assert_eq!(store.screenshots().await.unwrap().len(), 2);
    }

    #[test]
    fn file_names_come_from_the_last_segment() {
        assert_eq!(file_name_of("uploads/screenshots/X/a.png"), "a.png");
        assert_eq!(file_name_of("C:\\shots\\b.webp"), "b.webp");
        assert_eq!(file_name_of("plain.png"), "plain.png");
    }
}
