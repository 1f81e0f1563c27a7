//! In-memory [`CatalogStore`]. `--dry-run` loads a snapshot of the database
//! into it and runs the real workflow against the copy.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::entities::{
    CellUpsert, Competitor, CompetitorFeature, Feature, ImplementationQuality, LegacyScreenshot,
    NewScreenshot, Region, Screenshot, ScreenshotPatch,
};
use super::store::CatalogStore;

#[derive(Debug, Default, Clone)]
struct Tables {
    competitors: Vec<Competitor>,
    features: Vec<Feature>,
    cells: Vec<CompetitorFeature>,
    screenshots: Vec<Screenshot>,
    legacy: Vec<LegacyScreenshot>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every table the admin workflows read out of `source`.
    pub async fn snapshot(source: &dyn CatalogStore) -> Result<Self> {
        let tables = Tables {
            competitors: source.competitors().await?,
            features: source.features().await?,
            cells: source.competitor_features().await?,
            screenshots: source.screenshots().await?,
            legacy: source.legacy_screenshots().await?,
        };
        Ok(Self {
            tables: Mutex::new(tables),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_competitor(&self, name: &str, region: Option<Region>) -> Competitor {
        let now = Utc::now();
        let competitor = Competitor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            website: None,
            description: None,
            logo_url: None,
            industry: None,
            region,
            created_at: now,
            updated_at: now,
        };
        self.lock().competitors.push(competitor.clone());
        competitor
    }

    pub fn add_feature(&self, name: &str, category: Option<&str>) -> Feature {
        let now = Utc::now();
        let feature = Feature {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: category.map(str::to_string),
            description: None,
            priority: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().features.push(feature.clone());
        feature
    }

    pub fn add_legacy_screenshot(&self, cell: &CompetitorFeature, path: &str) -> LegacyScreenshot {
        let legacy = LegacyScreenshot {
            id: Uuid::new_v4(),
            competitor_feature_id: cell.id,
            competitor_id: cell.competitor_id,
            feature_id: cell.feature_id,
            screenshot_path: path.to_string(),
            caption: None,
            display_order: 0,
            created_at: Utc::now(),
        };
        self.lock().legacy.push(legacy.clone());
        legacy
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn competitors(&self) -> Result<Vec<Competitor>> {
        Ok(self.lock().competitors.clone())
    }

    async fn features(&self) -> Result<Vec<Feature>> {
        Ok(self.lock().features.clone())
    }

    async fn competitor_features(&self) -> Result<Vec<CompetitorFeature>> {
        Ok(self.lock().cells.clone())
    }

    async fn screenshots(&self) -> Result<Vec<Screenshot>> {
        Ok(self.lock().screenshots.clone())
    }

    async fn legacy_screenshots(&self) -> Result<Vec<LegacyScreenshot>> {
        Ok(self.lock().legacy.clone())
    }

    async fn upsert_competitor_feature(&self, cell: &CellUpsert) -> Result<CompetitorFeature> {
        let mut tables = self.lock();
        if !tables.competitors.iter().any(|c| c.id == cell.competitor_id) {
            bail!("competitor {} does not exist", cell.competitor_id);
        }
        if !tables.features.iter().any(|f| f.id == cell.feature_id) {
            bail!("feature {} does not exist", cell.feature_id);
        }
        let now = Utc::now();
        if let Some(row) = tables
            .cells
            .iter_mut()
            .find(|r| r.competitor_id == cell.competitor_id && r.feature_id == cell.feature_id)
        {
            row.has_feature = cell.has_feature;
            if let Some(quality) = cell.implementation_quality {
                row.implementation_quality = quality;
            }
            if let Some(notes) = &cell.notes {
                row.notes = Some(notes.clone());
            }
            row.updated_at = now;
            return Ok(row.clone());
        }
        let row = CompetitorFeature {
            id: Uuid::new_v4(),
            competitor_id: cell.competitor_id,
            feature_id: cell.feature_id,
            has_feature: cell.has_feature,
            implementation_quality: cell
                .implementation_quality
                .unwrap_or_else(|| ImplementationQuality::default_for(cell.has_feature)),
            notes: cell.notes.clone(),
            screenshots: serde_json::Value::Array(Vec::new()),
            created_at: now,
            updated_at: now,
        };
        tables.cells.push(row.clone());
        Ok(row)
    }

    async fn set_competitor_region(&self, competitor_id: Uuid, region: Region) -> Result<()> {
        let mut tables = self.lock();
        if let Some(c) = tables.competitors.iter_mut().find(|c| c.id == competitor_id) {
            c.region = Some(region);
            c.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_screenshot(&self, new: &NewScreenshot) -> Result<Screenshot> {
        let now = Utc::now();
        let row = Screenshot {
            id: Uuid::new_v4(),
            competitor_id: new.competitor_id,
            feature_id: new.feature_id,
            file_path: new.file_path.clone(),
            file_name: new.file_name.clone(),
            file_size: new.file_size,
            mime_type: new.mime_type.clone(),
            cdn_url: new.cdn_url.clone(),
            is_onboarding: new.is_onboarding,
            upload_source: new.upload_source,
            created_at: now,
            updated_at: now,
        };
        self.lock().screenshots.push(row.clone());
        Ok(row)
    }

    async fn update_screenshot(&self, id: Uuid, patch: &ScreenshotPatch) -> Result<()> {
        let mut tables = self.lock();
        if let Some(row) = tables.screenshots.iter_mut().find(|s| s.id == id) {
            if let Some(feature_id) = patch.feature_id {
                row.feature_id = Some(feature_id);
            }
            if let Some(size) = patch.file_size {
                row.file_size = size;
            }
            if let Some(url) = &patch.cdn_url {
                row.cdn_url = Some(url.clone());
            }
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_screenshots(&self, ids: &[Uuid]) -> Result<u64> {
        let mut tables = self.lock();
        let before = tables.screenshots.len();
        tables.screenshots.retain(|s| !ids.contains(&s.id));
        Ok((before - tables.screenshots.len()) as u64)
    }
}
