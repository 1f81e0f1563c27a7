use actix_web::http::header;
use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use super::{load_catalog, ok, HandlerResult};
use crate::analytics::{build_matrix, coverage, export_csv, Catalog};
use crate::api::error::ApiError;
use crate::api::models::{BulkUpdateRequest, MatrixResponse, UpdateCellRequest};
use crate::database_ops::Db;

/// Full grid with per-cell evidence counts and screenshot totals.
pub async fn get_matrix(db: web::Data<Db>) -> HandlerResult {
    let (competitors, features, cells) = load_catalog(&db).await?;
    let (counts, stats) =
        futures::try_join!(db.screenshot_counts_by_cell(), db.screenshot_stats())?;
    ok(MatrixResponse {
        view: build_matrix(competitors, features, &cells, &counts),
        screenshot_stats: stats,
    })
}

pub async fn heatmap(db: web::Data<Db>) -> HandlerResult {
    let (competitors, features, cells) = load_catalog(&db).await?;
    ok(coverage::heatmap(&Catalog::new(&competitors, &features, &cells)))
}

pub async fn export(db: web::Data<Db>) -> HandlerResult {
    let (competitors, features, cells) = load_catalog(&db).await?;
    let csv = export_csv(&Catalog::new(&competitors, &features, &cells))?;
    let file_name = format!(
        "competitor-matrix-{}.csv",
        chrono::Utc::now().format("%Y-%m-%d")
    );
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        ))
        .body(csv))
}

pub async fn update_cell(
    db: web::Data<Db>,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<UpdateCellRequest>,
) -> HandlerResult {
    let (competitor_id, feature_id) = path.into_inner();
    let body = body.into_inner();
    body.validate()?;
    let cell = db
        .upsert_cell(&body.into_upsert(competitor_id, feature_id))
        .await
        .map_err(|e| ApiError::from_sqlx("matrix cell", e))?;
    tracing::info!(%competitor_id, %feature_id, has_feature = cell.has_feature, "matrix cell updated");
    ok(cell)
}

/// Applies every update or none of them.
pub async fn bulk_update(db: web::Data<Db>, body: web::Json<BulkUpdateRequest>) -> HandlerResult {
    let body = body.into_inner();
    body.validate()?;
    let cells = db
        .upsert_cells(&body.into_upserts())
        .await
        .map_err(|e| ApiError::from_sqlx("matrix cell", e))?;
    tracing::info!(count = cells.len(), "matrix bulk update applied");
    ok(cells)
}
