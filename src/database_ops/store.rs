//! The persistence seam the admin workflows run against.
//!
//! `Db` implements it over Postgres; [`super::memory::MemoryStore`] implements
//! it in memory for dry runs and tests.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::db::Db;
use super::entities::{
    CellUpsert, Competitor, CompetitorFeature, Feature, LegacyScreenshot, NewScreenshot, Region,
    Screenshot, ScreenshotPatch,
};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn competitors(&self) -> Result<Vec<Competitor>>;
    async fn features(&self) -> Result<Vec<Feature>>;
    async fn competitor_features(&self) -> Result<Vec<CompetitorFeature>>;
    async fn screenshots(&self) -> Result<Vec<Screenshot>>;
    async fn legacy_screenshots(&self) -> Result<Vec<LegacyScreenshot>>;

    async fn upsert_competitor_feature(&self, cell: &CellUpsert) -> Result<CompetitorFeature>;
    async fn set_competitor_region(&self, competitor_id: Uuid, region: Region) -> Result<()>;
    async fn insert_screenshot(&self, new: &NewScreenshot) -> Result<Screenshot>;
    async fn update_screenshot(&self, id: Uuid, patch: &ScreenshotPatch) -> Result<()>;
    /// Deletes database rows only. Returns the number of rows removed.
    async fn delete_screenshots(&self, ids: &[Uuid]) -> Result<u64>;
}

#[async_trait]
impl CatalogStore for Db {
    async fn competitors(&self) -> Result<Vec<Competitor>> {
        Ok(self.list_competitors(None).await?)
    }

    async fn features(&self) -> Result<Vec<Feature>> {
        Ok(self.list_features(None).await?)
    }

    async fn competitor_features(&self) -> Result<Vec<CompetitorFeature>> {
        Ok(self.list_cells().await?)
    }

    async fn screenshots(&self) -> Result<Vec<Screenshot>> {
        Ok(self.all_screenshots().await?)
    }

    async fn legacy_screenshots(&self) -> Result<Vec<LegacyScreenshot>> {
        Ok(Db::legacy_screenshots(self).await?)
    }

    async fn upsert_competitor_feature(&self, cell: &CellUpsert) -> Result<CompetitorFeature> {
        Ok(self.upsert_cell(cell).await?)
    }

    async fn set_competitor_region(&self, competitor_id: Uuid, region: Region) -> Result<()> {
        Ok(Db::set_competitor_region(self, competitor_id, region).await?)
    }

    async fn insert_screenshot(&self, new: &NewScreenshot) -> Result<Screenshot> {
        Ok(Db::insert_screenshot(self, new).await?)
    }

    async fn update_screenshot(&self, id: Uuid, patch: &ScreenshotPatch) -> Result<()> {
        Ok(self.patch_screenshot(id, patch).await?)
    }

    async fn delete_screenshots(&self, ids: &[Uuid]) -> Result<u64> {
        Ok(Db::delete_screenshots(self, ids).await?)
    }
}
