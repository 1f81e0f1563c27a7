//! SQL for the catalog tables. Everything here returns `sqlx::Result` so the
//! API layer can tell "row not found" and constraint violations apart.

use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::db::Db;
use super::entities::{
    CellUpsert, Competitor, CompetitorFeature, Feature, LegacyScreenshot, NewScreenshot,
    OnboardingScreenshot, Region, Screenshot, ScreenshotPatch,
};

const COMPETITOR_COLUMNS: &str =
    "c.id, c.name, c.website, c.description, c.logo_url, c.industry, c.region, c.created_at, c.updated_at";
const CELL_COLUMNS: &str = "id, competitor_id, feature_id, has_feature, implementation_quality, notes, screenshots, created_at, updated_at";
const ONBOARDING_ORDER: &str = "display_order ASC, step_number ASC NULLS LAST, created_at ASC";

#[derive(Debug, Clone, Default)]
pub struct NewCompetitor {
    pub name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub industry: Option<String>,
    pub region: Option<Region>,
}

#[derive(Debug, Clone, Default)]
pub struct CompetitorChanges {
    pub name: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub industry: Option<String>,
    pub region: Option<Region>,
}

#[derive(Debug, Clone, Default)]
pub struct NewFeature {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureChanges {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScreenshotFilter {
    pub feature_id: Option<Uuid>,
    pub competitor_id: Option<Uuid>,
    pub is_onboarding: Option<bool>,
    pub region: Option<Region>,
}

/// Screenshot row joined with the names the gallery shows next to it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub screenshot: Screenshot,
    pub competitor_name: String,
    pub competitor_region: Option<Region>,
    pub feature_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOnboardingScreenshot {
    pub competitor_id: Uuid,
    pub screenshot_path: String,
    pub cdn_url: Option<String>,
    pub step_number: Option<i32>,
    pub step_description: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct OnboardingChanges {
    pub step_number: Option<i32>,
    pub step_description: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotStats {
    pub total: i64,
    pub with_feature: i64,
    pub orphans: i64,
    pub onboarding: i64,
    pub legacy_unmigrated: i64,
}

/// Onboarding screenshots of one competitor.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingCount {
    pub id: Uuid,
    pub name: String,
    pub screenshot_count: i64,
}

// v1 rows already mirrored by migrate-legacy-screenshots are not counted twice.
const UNMIGRATED_LEGACY: &str = "NOT EXISTS (
    SELECT 1 FROM screenshots s
     WHERE s.upload_source = 'legacy-migration'
       AND s.competitor_id = cf.competitor_id
       AND s.file_path = l.screenshot_path)";

impl Db {
    pub async fn list_competitors(&self, region: Option<Region>) -> sqlx::Result<Vec<Competitor>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COMPETITOR_COLUMNS} FROM competitors c"));
        if let Some(region) = region {
            qb.push(" WHERE c.region = ").push_bind(region);
        }
        qb.push(" ORDER BY c.name ASC");
        qb.build_query_as::<Competitor>().fetch_all(&self.pool).await
    }

    pub async fn get_competitor(&self, id: Uuid) -> sqlx::Result<Competitor> {
        sqlx::query_as::<_, Competitor>(&format!(
            "SELECT {COMPETITOR_COLUMNS} FROM competitors c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn create_competitor(&self, new: &NewCompetitor) -> sqlx::Result<Competitor> {
        sqlx::query_as::<_, Competitor>(
            "INSERT INTO competitors AS c (name, website, description, logo_url, industry, region)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING c.*",
        )
        .bind(&new.name)
        .bind(&new.website)
        .bind(&new.description)
        .bind(&new.logo_url)
        .bind(&new.industry)
        .bind(new.region)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_competitor(
        &self,
        id: Uuid,
        changes: &CompetitorChanges,
    ) -> sqlx::Result<Competitor> {
        sqlx::query_as::<_, Competitor>(
            "UPDATE competitors AS c SET
                name = COALESCE($2, c.name),
                website = COALESCE($3, c.website),
                description = COALESCE($4, c.description),
                logo_url = COALESCE($5, c.logo_url),
                industry = COALESCE($6, c.industry),
                region = COALESCE($7, c.region),
                updated_at = now()
             WHERE c.id = $1
             RETURNING c.*",
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.website)
        .bind(&changes.description)
        .bind(&changes.logo_url)
        .bind(&changes.industry)
        .bind(changes.region)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_competitor(&self, id: Uuid) -> sqlx::Result<bool> {
        let res = sqlx::query("DELETE FROM competitors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_competitor_region(&self, id: Uuid, region: Region) -> sqlx::Result<()> {
        sqlx::query("UPDATE competitors SET region = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(region)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_features(&self, category: Option<&str>) -> sqlx::Result<Vec<Feature>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM features");
        if let Some(category) = category {
            qb.push(" WHERE lower(category) = lower(")
                .push_bind(category.to_string())
                .push(")");
        }
        qb.push(" ORDER BY category ASC NULLS LAST, name ASC");
        qb.build_query_as::<Feature>().fetch_all(&self.pool).await
    }

    pub async fn get_feature(&self, id: Uuid) -> sqlx::Result<Feature> {
        sqlx::query_as::<_, Feature>("SELECT * FROM features WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn create_feature(&self, new: &NewFeature) -> sqlx::Result<Feature> {
        sqlx::query_as::<_, Feature>(
            "INSERT INTO features (name, category, description, priority)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.category)
        .bind(&new.description)
        .bind(&new.priority)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_feature(&self, id: Uuid, changes: &FeatureChanges) -> sqlx::Result<Feature> {
        sqlx::query_as::<_, Feature>(
            "UPDATE features SET
                name = COALESCE($2, name),
                category = COALESCE($3, category),
                description = COALESCE($4, description),
                priority = COALESCE($5, priority),
                updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.category)
        .bind(&changes.description)
        .bind(&changes.priority)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_feature(&self, id: Uuid) -> sqlx::Result<bool> {
        let res = sqlx::query("DELETE FROM features WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Competitors whose matrix cell for `feature_id` is positive.
    pub async fn competitors_with_feature(&self, feature_id: Uuid) -> sqlx::Result<Vec<Competitor>> {
        sqlx::query_as::<_, Competitor>(&format!(
            "SELECT {COMPETITOR_COLUMNS}
               FROM competitors c
               JOIN competitor_features cf ON cf.competitor_id = c.id
              WHERE cf.feature_id = $1 AND cf.has_feature
              ORDER BY c.name ASC"
        ))
        .bind(feature_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_cells(&self) -> sqlx::Result<Vec<CompetitorFeature>> {
        sqlx::query_as::<_, CompetitorFeature>(&format!(
            "SELECT {CELL_COLUMNS} FROM competitor_features"
        ))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn cells_for_competitor(&self, competitor_id: Uuid) -> sqlx::Result<Vec<CompetitorFeature>> {
        sqlx::query_as::<_, CompetitorFeature>(&format!(
            "SELECT {CELL_COLUMNS} FROM competitor_features WHERE competitor_id = $1"
        ))
        .bind(competitor_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn upsert_cell(&self, cell: &CellUpsert) -> sqlx::Result<CompetitorFeature> {
        upsert_cell_query(cell).fetch_one(&self.pool).await
    }

    /// All-or-nothing batch upsert for the bulk-update endpoint.
    pub async fn upsert_cells(&self, cells: &[CellUpsert]) -> sqlx::Result<Vec<CompetitorFeature>> {
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(cells.len());
        for cell in cells {
            out.push(upsert_cell_query(cell).fetch_one(&mut *tx).await?);
        }
        tx.commit().await?;
        Ok(out)
    }

    pub async fn all_screenshots(&self) -> sqlx::Result<Vec<Screenshot>> {
        sqlx::query_as::<_, Screenshot>("SELECT * FROM screenshots ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn list_screenshots(&self, filter: &ScreenshotFilter) -> sqlx::Result<Vec<ScreenshotListing>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT s.*, c.name AS competitor_name, c.region AS competitor_region, f.name AS feature_name
               FROM screenshots s
               JOIN competitors c ON c.id = s.competitor_id
               LEFT JOIN features f ON f.id = s.feature_id
              WHERE TRUE",
        );
        if let Some(feature_id) = filter.feature_id {
            qb.push(" AND s.feature_id = ").push_bind(feature_id);
        }
        if let Some(competitor_id) = filter.competitor_id {
            qb.push(" AND s.competitor_id = ").push_bind(competitor_id);
        }
        if let Some(is_onboarding) = filter.is_onboarding {
            qb.push(" AND s.is_onboarding = ").push_bind(is_onboarding);
        }
        if let Some(region) = filter.region {
            qb.push(" AND c.region = ").push_bind(region);
        }
        qb.push(" ORDER BY s.created_at DESC");
        qb.build_query_as::<ScreenshotListing>()
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_screenshot(&self, id: Uuid) -> sqlx::Result<ScreenshotListing> {
        sqlx::query_as::<_, ScreenshotListing>(
            "SELECT s.*, c.name AS competitor_name, c.region AS competitor_region, f.name AS feature_name
               FROM screenshots s
               JOIN competitors c ON c.id = s.competitor_id
               LEFT JOIN features f ON f.id = s.feature_id
              WHERE s.id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn insert_screenshot(&self, new: &NewScreenshot) -> sqlx::Result<Screenshot> {
        sqlx::query_as::<_, Screenshot>(
            "INSERT INTO screenshots
                (competitor_id, feature_id, file_path, file_name, file_size, mime_type, cdn_url, is_onboarding, upload_source)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(new.competitor_id)
        .bind(new.feature_id)
        .bind(&new.file_path)
        .bind(&new.file_name)
        .bind(new.file_size)
        .bind(&new.mime_type)
        .bind(&new.cdn_url)
        .bind(new.is_onboarding)
        .bind(new.upload_source)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn patch_screenshot(&self, id: Uuid, patch: &ScreenshotPatch) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE screenshots SET
                feature_id = COALESCE($2, feature_id),
                file_size = COALESCE($3, file_size),
                cdn_url = COALESCE($4, cdn_url),
                updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch.feature_id)
        .bind(patch.file_size)
        .bind(&patch.cdn_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Explicit reassignment; `None` turns the screenshot back into an orphan.
    pub async fn assign_screenshot_feature(
        &self,
        id: Uuid,
        feature_id: Option<Uuid>,
    ) -> sqlx::Result<Screenshot> {
        sqlx::query_as::<_, Screenshot>(
            "UPDATE screenshots SET feature_id = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(feature_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_screenshot(&self, id: Uuid) -> sqlx::Result<Screenshot> {
        sqlx::query_as::<_, Screenshot>("DELETE FROM screenshots WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn delete_screenshots(&self, ids: &[Uuid]) -> sqlx::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let res = sqlx::query("DELETE FROM screenshots WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn screenshot_stats(&self) -> sqlx::Result<ScreenshotStats> {
        let (total, with_feature, onboarding): (i64, i64, i64) = sqlx::query_as(
            "SELECT count(*),
                    count(*) FILTER (WHERE feature_id IS NOT NULL),
                    count(*) FILTER (WHERE is_onboarding)
               FROM screenshots",
        )
        .fetch_one(&self.pool)
        .await?;
        let legacy_unmigrated: i64 = sqlx::query_scalar(&format!(
            "SELECT count(*)
               FROM competitor_feature_screenshots l
               JOIN competitor_features cf ON cf.id = l.competitor_feature_id
              WHERE {UNMIGRATED_LEGACY}"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(ScreenshotStats {
            total,
            with_feature,
            orphans: total - with_feature,
            onboarding,
            legacy_unmigrated,
        })
    }

    /// Evidence per `(competitor, feature)` cell: v2 rows plus v1 rows not yet migrated.
    pub async fn screenshot_counts_by_cell(&self) -> sqlx::Result<Vec<(Uuid, Uuid, i64)>> {
        sqlx::query_as::<_, (Uuid, Uuid, i64)>(&format!(
            "SELECT competitor_id, feature_id, sum(n)::BIGINT FROM (
                SELECT competitor_id, feature_id, count(*) AS n
                  FROM screenshots WHERE feature_id IS NOT NULL
                 GROUP BY 1, 2
                UNION ALL
                SELECT cf.competitor_id, cf.feature_id, count(*) AS n
                  FROM competitor_feature_screenshots l
                  JOIN competitor_features cf ON cf.id = l.competitor_feature_id
                 WHERE {UNMIGRATED_LEGACY}
                 GROUP BY 1, 2
             ) counts GROUP BY 1, 2"
        ))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn legacy_screenshots(&self) -> sqlx::Result<Vec<LegacyScreenshot>> {
        sqlx::query_as::<_, LegacyScreenshot>(
            "SELECT l.id, l.competitor_feature_id, cf.competitor_id, cf.feature_id,
                    l.screenshot_path, l.caption, l.display_order, l.created_at
               FROM competitor_feature_screenshots l
               JOIN competitor_features cf ON cf.id = l.competitor_feature_id
              ORDER BY l.display_order ASC, l.created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Every competitor, by name, with its onboarding screenshot count.
    pub async fn onboarding_counts(&self) -> sqlx::Result<Vec<OnboardingCount>> {
        sqlx::query_as::<_, OnboardingCount>(
            "SELECT c.id, c.name, count(o.id) AS screenshot_count
               FROM competitors c
               LEFT JOIN onboarding_screenshots o ON o.competitor_id = c.id
              GROUP BY c.id, c.name
              ORDER BY c.name ASC",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_onboarding(&self, competitor_id: Uuid) -> sqlx::Result<Vec<OnboardingScreenshot>> {
        sqlx::query_as::<_, OnboardingScreenshot>(&format!(
            "SELECT * FROM onboarding_screenshots WHERE competitor_id = $1 ORDER BY {ONBOARDING_ORDER}"
        ))
        .bind(competitor_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn insert_onboarding(
        &self,
        new: &NewOnboardingScreenshot,
    ) -> sqlx::Result<OnboardingScreenshot> {
        sqlx::query_as::<_, OnboardingScreenshot>(
            "INSERT INTO onboarding_screenshots
                (competitor_id, screenshot_path, cdn_url, step_number, step_description, display_order)
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, (
                SELECT COALESCE(max(display_order) + 1, 0)
                  FROM onboarding_screenshots WHERE competitor_id = $1)))
             RETURNING *",
        )
        .bind(new.competitor_id)
        .bind(&new.screenshot_path)
        .bind(&new.cdn_url)
        .bind(new.step_number)
        .bind(&new.step_description)
        .bind(new.display_order)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_onboarding(
        &self,
        id: Uuid,
        changes: &OnboardingChanges,
    ) -> sqlx::Result<OnboardingScreenshot> {
        sqlx::query_as::<_, OnboardingScreenshot>(
            "UPDATE onboarding_screenshots SET
                step_number = COALESCE($2, step_number),
                step_description = COALESCE($3, step_description),
                display_order = COALESCE($4, display_order)
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(changes.step_number)
        .bind(&changes.step_description)
        .bind(changes.display_order)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_onboarding(&self, id: Uuid) -> sqlx::Result<OnboardingScreenshot> {
        sqlx::query_as::<_, OnboardingScreenshot>(
            "DELETE FROM onboarding_screenshots WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    /// Applies `(id, display_order)` pairs for one competitor in a single
    /// transaction. Ids belonging to another competitor are ignored.
    pub async fn reorder_onboarding(
        &self,
        competitor_id: Uuid,
        order: &[(Uuid, i32)],
    ) -> sqlx::Result<Vec<OnboardingScreenshot>> {
        let mut tx = self.pool.begin().await?;
        for (id, display_order) in order {
            sqlx::query(
                "UPDATE onboarding_screenshots SET display_order = $3
                  WHERE id = $1 AND competitor_id = $2",
            )
            .bind(id)
            .bind(competitor_id)
            .bind(display_order)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.list_onboarding(competitor_id).await
    }
}

fn upsert_cell_query(
    cell: &CellUpsert,
) -> sqlx::query::QueryAs<'_, Postgres, CompetitorFeature, sqlx::postgres::PgArguments> {
    sqlx::query_as::<_, CompetitorFeature>(
        "INSERT INTO competitor_features AS cf
            (competitor_id, feature_id, has_feature, implementation_quality, notes)
         VALUES ($1, $2, $3, COALESCE($4, CASE WHEN $3 THEN 'good' ELSE 'none' END), $5)
         ON CONFLICT (competitor_id, feature_id) DO UPDATE SET
            has_feature = EXCLUDED.has_feature,
            implementation_quality = COALESCE($4, cf.implementation_quality),
            notes = COALESCE($5, cf.notes),
            updated_at = now()
         RETURNING cf.id, cf.competitor_id, cf.feature_id, cf.has_feature,
                   cf.implementation_quality, cf.notes, cf.screenshots,
                   cf.created_at, cf.updated_at",
    )
    .bind(cell.competitor_id)
    .bind(cell.feature_id)
    .bind(cell.has_feature)
    .bind(cell.implementation_quality)
    .bind(&cell.notes)
}
