use actix_web::web;
use std::collections::HashSet;

use super::{load_catalog, ok, HandlerResult};
use crate::analytics::data_quality::{self, MatrixQuality, ScreenshotQuality};
use crate::analytics::Catalog;
use crate::api::error::ApiError;
use crate::api::uploads::UploadStorage;
use crate::database_ops::screenshot_sync::check_local_files;
use crate::database_ops::Db;

/// Loads everything once and runs both validations. Files are checked in the
/// local uploads directory; rows with a CDN copy are not checked.
async fn validate(
    db: &Db,
    storage: &UploadStorage,
) -> Result<(ScreenshotQuality, MatrixQuality), ApiError> {
    let ((competitors, features, cells), screenshots, evidence) = futures::try_join!(
        load_catalog(db),
        async { db.all_screenshots().await.map_err(ApiError::from) },
        async { db.screenshot_counts_by_cell().await.map_err(ApiError::from) },
    )?;

    let files = check_local_files(storage.local(), &screenshots).await;
    if files.unknown > 0 {
        tracing::warn!(unknown = files.unknown, "some screenshot files could not be checked");
    }
    let missing: HashSet<_> = files.missing.into_iter().collect();

    let catalog = Catalog::new(&competitors, &features, &cells);
    Ok((
        data_quality::validate_screenshots(&screenshots, &missing),
        data_quality::validate_matrix(&catalog, &screenshots, &evidence),
    ))
}

pub async fn overview(db: web::Data<Db>, storage: web::Data<UploadStorage>) -> HandlerResult {
    let (screens, matrix) = validate(&db, &storage).await?;
    ok(data_quality::overview(screens, matrix))
}

pub async fn score(db: web::Data<Db>, storage: web::Data<UploadStorage>) -> HandlerResult {
    let (screens, matrix) = validate(&db, &storage).await?;
    ok(data_quality::quality_score(&screens, &matrix))
}

pub async fn screenshots(db: web::Data<Db>, storage: web::Data<UploadStorage>) -> HandlerResult {
    let (screens, _) = validate(&db, &storage).await?;
    ok(screens)
}

pub async fn matrix(db: web::Data<Db>, storage: web::Data<UploadStorage>) -> HandlerResult {
    let (_, matrix) = validate(&db, &storage).await?;
    ok(matrix)
}

pub async fn issues(db: web::Data<Db>, storage: web::Data<UploadStorage>) -> HandlerResult {
    let (screens, matrix) = validate(&db, &storage).await?;
    ok(data_quality::issues(&screens, &matrix))
}
