use actix_multipart::Multipart;
use actix_web::web;
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, HandlerResult};
use crate::api::error::ApiError;
use crate::api::models::{OnboardingGallery, OnboardingStats, OnboardingUpdateRequest, ReorderRequest};
use crate::api::uploads::{read_form, FileKind, UploadFolder, UploadStorage};
use crate::database_ops::catalog::{NewOnboardingScreenshot, OnboardingChanges};
use crate::database_ops::entities::{NewScreenshot, UploadSource};
use crate::database_ops::Db;

pub async fn list(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let competitor = db
        .get_competitor(path.into_inner())
        .await
        .map_err(|e| ApiError::from_sqlx("competitor", e))?;
    let shots = db.list_onboarding(competitor.id).await?;
    ok(OnboardingGallery {
        competitor_id: competitor.id,
        competitor_name: competitor.name,
        total_steps: shots.len(),
        onboarding_screenshots: shots,
    })
}

pub async fn stats(db: web::Data<Db>) -> HandlerResult {
    ok(OnboardingStats::from(db.onboarding_counts().await?))
}

/// Multipart form: `screenshot` (file) plus optional `stepNumber`,
/// `stepDescription` and `displayOrder`. The file is also recorded as an
/// onboarding screenshot in the main gallery.
pub async fn upload(
    db: web::Data<Db>,
    storage: web::Data<UploadStorage>,
    path: web::Path<Uuid>,
    payload: Multipart,
) -> HandlerResult {
    let competitor_id = path.into_inner();
    let mut form = read_form(payload, "screenshot", FileKind::Image).await?;
    let meta = OnboardingUpdateRequest {
        step_number: form.parsed("stepNumber")?,
        step_description: form.field("stepDescription").map(str::to_string),
        display_order: form.parsed("displayOrder")?,
    };
    meta.validate()?;
    let file = form
        .file
        .take()
        .ok_or_else(|| ApiError::BadRequest("no file uploaded in field 'screenshot'".into()))?;

    let competitor = db
        .get_competitor(competitor_id)
        .await
        .map_err(|e| ApiError::from_sqlx("competitor", e))?;
    let stored = storage
        .store(&competitor.name, UploadFolder::Onboarding, file)
        .await?;

    let step = db
        .insert_onboarding(&NewOnboardingScreenshot {
            competitor_id,
            screenshot_path: stored.file_path.clone(),
            cdn_url: stored.cdn_url.clone(),
            step_number: meta.step_number,
            step_description: meta.step_description,
            display_order: meta.display_order,
        })
        .await
        .map_err(|e| ApiError::from_sqlx("onboarding screenshot", e))?;

    if let Err(err) = db
        .insert_screenshot(&NewScreenshot {
            competitor_id,
            feature_id: None,
            file_path: stored.file_path,
            file_name: stored.file_name,
            file_size: stored.file_size,
            mime_type: stored.mime_type,
            cdn_url: stored.cdn_url,
            is_onboarding: true,
            upload_source: UploadSource::Manual,
        })
        .await
    {
        tracing::warn!(id = %step.id, error = %err, "onboarding step saved but gallery row failed");
    }
    created(step)
}

pub async fn reorder(
    db: web::Data<Db>,
    path: web::Path<Uuid>,
    body: web::Json<ReorderRequest>,
) -> HandlerResult {
    let competitor_id = path.into_inner();
    let body = body.into_inner();
    body.validate()?;
    db.get_competitor(competitor_id)
        .await
        .map_err(|e| ApiError::from_sqlx("competitor", e))?;
    let order: Vec<(Uuid, i32)> = body
        .screenshots
        .iter()
        .map(|item| (item.id, item.display_order))
        .collect();
    ok(db.reorder_onboarding(competitor_id, &order).await?)
}

pub async fn update(
    db: web::Data<Db>,
    path: web::Path<Uuid>,
    body: web::Json<OnboardingUpdateRequest>,
) -> HandlerResult {
    let body = body.into_inner();
    body.validate()?;
    let step = db
        .update_onboarding(path.into_inner(), &OnboardingChanges::from(body))
        .await
        .map_err(|e| ApiError::from_sqlx("onboarding screenshot", e))?;
    ok(step)
}

pub async fn delete(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let step = db
        .delete_onboarding(path.into_inner())
        .await
        .map_err(|e| ApiError::from_sqlx("onboarding screenshot", e))?;
    ok(step)
}
