// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::analytics::MatrixView;
use crate::api::error::ApiError;
use crate::database_ops::catalog::{
    CompetitorChanges, FeatureChanges, NewCompetitor, NewFeature, OnboardingChanges, OnboardingCount,
    ScreenshotStats,
};
use crate::database_ops::entities::{
    CellUpsert, Competitor, CompetitorFeature, Feature, ImplementationQuality,
    OnboardingScreenshot, Region,
};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub meta: Meta,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
            meta: Meta::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            details: None,
            meta: Meta::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub uptime_seconds: u64,
}

/// Case-insensitive region from a query string; an empty value means "any".
pub fn parse_region(raw: Option<&str>) -> Result<Option<Region>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<Region>()
            .map(Some)
            .map_err(|e| ApiError::BadRequest(e.to_string())),
    }
}

// ---- competitors ----

#[derive(Debug, Deserialize)]
pub struct CompetitorQuery {
    pub region: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompetitorRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(url)]
    pub website: Option<String>,
    pub description: Option<String>,
    #[validate(url)]
    pub logo_url: Option<String>,
    #[validate(length(max = 255))]
    pub industry: Option<String>,
    /// Derived from the name when omitted.
    pub region: Option<Region>,
}

impl CreateCompetitorRequest {
    pub fn into_new(self) -> NewCompetitor {
        let name = self.name.trim().to_string();
        let region = self
            .region
            .unwrap_or_else(|| crate::normalization::region_for(&name));
        NewCompetitor {
            name,
            website: self.website,
            description: self.description,
            logo_url: self.logo_url,
            industry: self.industry,
            region: Some(region),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompetitorRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(url)]
    pub website: Option<String>,
    pub description: Option<String>,
    #[validate(url)]
    pub logo_url: Option<String>,
    #[validate(length(max = 255))]
    pub industry: Option<String>,
    pub region: Option<Region>,
}

impl From<UpdateCompetitorRequest> for CompetitorChanges {
    fn from(req: UpdateCompetitorRequest) -> Self {
        CompetitorChanges {
            name: req.name.map(|n| n.trim().to_string()),
            website: req.website,
            description: req.description,
            logo_url: req.logo_url,
            industry: req.industry,
            region: req.region,
        }
    }
}

/// A matrix cell with its feature attached.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorFeatureDetail {
    #[serde(flatten)]
    pub cell: CompetitorFeature,
    pub feature: Option<Feature>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorDetail {
    #[serde(flatten)]
    pub competitor: Competitor,
    pub features: Vec<CompetitorFeatureDetail>,
}

// ---- features ----

#[derive(Debug, Deserialize)]
pub struct FeatureQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeatureRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 255))]
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub priority: Option<String>,
}

impl From<CreateFeatureRequest> for NewFeature {
    fn from(req: CreateFeatureRequest) -> Self {
        NewFeature {
            name: req.name.trim().to_string(),
            category: req.category,
            description: req.description,
            priority: req.priority,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeatureRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub priority: Option<String>,
}

impl From<UpdateFeatureRequest> for FeatureChanges {
    fn from(req: UpdateFeatureRequest) -> Self {
        FeatureChanges {
            name: req.name.map(|n| n.trim().to_string()),
            category: req.category,
            description: req.description,
            priority: req.priority,
        }
    }
}

// ---- matrix ----

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCellRequest {
    pub has_feature: bool,
    pub implementation_quality: Option<ImplementationQuality>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl UpdateCellRequest {
    pub fn into_upsert(self, competitor_id: Uuid, feature_id: Uuid) -> CellUpsert {
        CellUpsert {
            competitor_id,
            feature_id,
            has_feature: self.has_feature,
            implementation_quality: self.implementation_quality,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkCellUpdate {
    pub competitor_id: Uuid,
    pub feature_id: Uuid,
    pub has_feature: bool,
    pub implementation_quality: Option<ImplementationQuality>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkUpdateRequest {
    #[validate(length(min = 1, max = 1000), nested)]
    pub updates: Vec<BulkCellUpdate>,
}

impl BulkUpdateRequest {
    pub fn into_upserts(self) -> Vec<CellUpsert> {
        self.updates
            .into_iter()
            .map(|u| CellUpsert {
                competitor_id: u.competitor_id,
                feature_id: u.feature_id,
                has_feature: u.has_feature,
                implementation_quality: u.implementation_quality,
                notes: u.notes,
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixResponse {
    #[serde(flatten)]
    pub view: MatrixView,
    pub screenshot_stats: ScreenshotStats,
}

// ---- screenshots ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotQuery {
    pub feature_id: Option<Uuid>,
    pub competitor_id: Option<Uuid>,
    pub is_onboarding: Option<bool>,
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignFeatureRequest {
    /// `null` turns the screenshot back into an orphan.
    pub feature_id: Option<Uuid>,
}

// ---- onboarding ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingGallery {
    pub competitor_id: Uuid,
    pub competitor_name: String,
    pub onboarding_screenshots: Vec<OnboardingScreenshot>,
    pub total_steps: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingStats {
    pub total_screenshots: i64,
    pub competitors_with_onboarding: usize,
    pub total_competitors: usize,
    pub competitor_stats: Vec<OnboardingCount>,
}

impl From<Vec<OnboardingCount>> for OnboardingStats {
    fn from(competitor_stats: Vec<OnboardingCount>) -> Self {
        Self {
            total_screenshots: competitor_stats.iter().map(|c| c.screenshot_count).sum(),
            competitors_with_onboarding: competitor_stats
                .iter()
                .filter(|c| c.screenshot_count > 0)
                .count(),
            total_competitors: competitor_stats.len(),
            competitor_stats,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingUpdateRequest {
    #[validate(range(min = 1))]
    pub step_number: Option<i32>,
    #[validate(length(max = 2000))]
    pub step_description: Option<String>,
    #[validate(range(min = 0))]
    pub display_order: Option<i32>,
}

impl From<OnboardingUpdateRequest> for OnboardingChanges {
    fn from(req: OnboardingUpdateRequest) -> Self {
        OnboardingChanges {
            step_number: req.step_number,
            step_description: req.step_description,
            display_order: req.display_order,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItem {
    pub id: Uuid,
    #[validate(range(min = 0))]
    pub display_order: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReorderRequest {
    #[validate(length(min = 1), nested)]
    pub screenshots: Vec<ReorderItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onboarding_stats_summarize_counts() {
        let count = |name: &str, n: i64| OnboardingCount {
            id: Uuid::new_v4(),
            name: name.into(),
            screenshot_count: n,
        };
        let stats = OnboardingStats::from(vec![count("BTCTurk", 4), count("Kraken", 0), count("Paribu", 2)]);
        assert_eq!(stats.total_screenshots, 6);
        assert_eq!(stats.competitors_with_onboarding, 2);
        assert_eq!(stats.total_competitors, 3);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["competitorStats"][1]["screenshotCount"], 0);
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let json = serde_json::to_value(ApiResponse::success(1)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 1);
        assert!(json.get("error").is_none());
        assert!(json.get("details").is_none());
        assert!(json["meta"]["requestId"].is_string());
    }

    #[test]
    fn create_competitor_derives_region_from_name() {
        let req: CreateCompetitorRequest =
            serde_json::from_str(r#"{"name":" Binance TR "}"#).unwrap();
        let new = req.into_new();
        assert_eq!(new.name, "Binance TR");
        assert_eq!(new.region, Some(Region::Tr));

        let req: CreateCompetitorRequest =
            serde_json::from_str(r#"{"name":"Paribu","region":"Global"}"#).unwrap();
        assert_eq!(req.into_new().region, Some(Region::Global));
    }

    #[test]
    fn validation_rejects_bad_payloads() {
        let req: CreateCompetitorRequest =
            serde_json::from_str(r#"{"name":"","website":"not a url"}"#).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("website"));

        let reorder: ReorderRequest = serde_json::from_str(
            r#"{"screenshots":[{"id":"00000000-0000-0000-0000-000000000001","displayOrder":-1}]}"#,
        )
        .unwrap();
        assert!(reorder.validate().is_err());

        let bulk: BulkUpdateRequest = serde_json::from_str(r#"{"updates":[]}"#).unwrap();
        assert!(bulk.validate().is_err());
    }

    #[test]
    fn region_query_is_case_insensitive() {
        assert_eq!(parse_region(Some("tr")).unwrap(), Some(Region::Tr));
        assert_eq!(parse_region(Some("")).unwrap(), None);
        assert_eq!(parse_region(None).unwrap(), None);
        assert!(parse_region(Some("mars")).is_err());
    }
}
