use actix_web::web;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, HandlerResult};
use crate::api::error::ApiError;
use crate::api::models::{
    parse_region, CompetitorDetail, CompetitorFeatureDetail, CompetitorQuery,
    CreateCompetitorRequest, UpdateCompetitorRequest,
};
use crate::database_ops::catalog::CompetitorChanges;
use crate::database_ops::Db;

pub async fn list(db: web::Data<Db>, query: web::Query<CompetitorQuery>) -> HandlerResult {
    let region = parse_region(query.region.as_deref())?;
    ok(db.list_competitors(region).await?)
}

/// Competitor with every matrix cell it has, each joined to its feature.
pub async fn get(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let id = path.into_inner();
    let competitor = db
        .get_competitor(id)
        .await
        .map_err(|e| ApiError::from_sqlx("competitor", e))?;
    let (cells, features) = futures::try_join!(db.cells_for_competitor(id), db.list_features(None))?;
    let mut by_id: HashMap<Uuid, _> = features.into_iter().map(|f| (f.id, f)).collect();

    let features = cells
        .into_iter()
        .map(|cell| CompetitorFeatureDetail {
            feature: by_id.remove(&cell.feature_id),
            cell,
        })
        .collect();
    ok(CompetitorDetail {
        competitor,
        features,
    })
}

pub async fn create(db: web::Data<Db>, body: web::Json<CreateCompetitorRequest>) -> HandlerResult {
    let body = body.into_inner();
    body.validate()?;
    let competitor = db
        .create_competitor(&body.into_new())
        .await
        .map_err(|e| ApiError::from_sqlx("competitor", e))?;
    tracing::info!(id = %competitor.id, name = %competitor.name, "competitor created");
    created(competitor)
}

pub async fn update(
    db: web::Data<Db>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateCompetitorRequest>,
) -> HandlerResult {
    let body = body.into_inner();
    body.validate()?;
    let changes = CompetitorChanges::from(body);
    let competitor = db
        .update_competitor(path.into_inner(), &changes)
        .await
        .map_err(|e| ApiError::from_sqlx("competitor", e))?;
    ok(competitor)
}

pub async fn delete(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let id = path.into_inner();
    if !db.delete_competitor(id).await? {
        return Err(ApiError::NotFound("competitor".into()));
    }
    tracing::info!(%id, "competitor deleted");
    ok(serde_json::json!({ "id": id, "deleted": true }))
}
