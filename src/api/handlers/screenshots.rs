use actix_multipart::Multipart;
use actix_web::web;
use uuid::Uuid;

use super::{created, ok, HandlerResult};
use crate::api::error::ApiError;
use crate::api::models::{parse_region, AssignFeatureRequest, ScreenshotQuery};
use crate::api::uploads::{read_form, FileKind, UploadFolder, UploadStorage};
use crate::database_ops::catalog::ScreenshotFilter;
use crate::database_ops::entities::{NewScreenshot, UploadSource};
use crate::database_ops::Db;

pub async fn list(db: web::Data<Db>, query: web::Query<ScreenshotQuery>) -> HandlerResult {
    let query = query.into_inner();
    let filter = ScreenshotFilter {
        feature_id: query.feature_id,
        competitor_id: query.competitor_id,
        is_onboarding: query.is_onboarding,
        region: parse_region(query.region.as_deref())?,
    };
    ok(db.list_screenshots(&filter).await?)
}

pub async fn get(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let shot = db
        .get_screenshot(path.into_inner())
        .await
        .map_err(|e| ApiError::from_sqlx("screenshot", e))?;
    ok(shot)
}

/// Multipart form: `screenshot` (file), `competitorId`, optional `featureId`.
pub async fn upload(
    db: web::Data<Db>,
    storage: web::Data<UploadStorage>,
    payload: Multipart,
) -> HandlerResult {
    let mut form = read_form(payload, "screenshot", FileKind::Image).await?;
    let competitor_id: Uuid = form
        .parsed("competitorId")?
        .ok_or_else(|| ApiError::BadRequest("competitorId is required".into()))?;
    let feature_id: Option<Uuid> = form.parsed("featureId")?;
    let file = form
        .file
        .take()
        .ok_or_else(|| ApiError::BadRequest("no file uploaded in field 'screenshot'".into()))?;

    let competitor = db
        .get_competitor(competitor_id)
        .await
        .map_err(|e| ApiError::from_sqlx("competitor", e))?;
    if let Some(feature_id) = feature_id {
        db.get_feature(feature_id)
            .await
            .map_err(|e| ApiError::from_sqlx("feature", e))?;
    }

    let stored = storage
        .store(&competitor.name, UploadFolder::Features, file)
        .await?;
    let row = db
        .insert_screenshot(&NewScreenshot {
            competitor_id,
            feature_id,
            file_path: stored.file_path,
            file_name: stored.file_name,
            file_size: stored.file_size,
            mime_type: stored.mime_type,
            cdn_url: stored.cdn_url,
            is_onboarding: false,
            upload_source: UploadSource::Manual,
        })
        .await
        .map_err(|e| ApiError::from_sqlx("screenshot", e))?;
    tracing::info!(id = %row.id, competitor = %competitor.name, "screenshot uploaded");
    created(row)
}

pub async fn assign_feature(
    db: web::Data<Db>,
    path: web::Path<Uuid>,
    body: web::Json<AssignFeatureRequest>,
) -> HandlerResult {
    let id = path.into_inner();
    let feature_id = body.into_inner().feature_id;
    if let Some(feature_id) = feature_id {
        db.get_feature(feature_id)
            .await
            .map_err(|e| ApiError::from_sqlx("feature", e))?;
    }
    let row = db
        .assign_screenshot_feature(id, feature_id)
        .await
        .map_err(|e| ApiError::from_sqlx("screenshot", e))?;
    ok(row)
}

/// Removes the row only; the stored file stays where it is.
pub async fn delete(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let row = db
        .delete_screenshot(path.into_inner())
        .await
        .map_err(|e| ApiError::from_sqlx("screenshot", e))?;
    tracing::info!(id = %row.id, file = %row.file_path, "screenshot row deleted");
    ok(row)
}
