use actix_web::web;
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, HandlerResult};
use crate::api::error::ApiError;
use crate::api::models::{CreateFeatureRequest, FeatureQuery, UpdateFeatureRequest};
use crate::database_ops::catalog::{FeatureChanges, NewFeature};
use crate::database_ops::Db;

pub async fn list(db: web::Data<Db>, query: web::Query<FeatureQuery>) -> HandlerResult {
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    ok(db.list_features(category).await?)
}

pub async fn get(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let feature = db
        .get_feature(path.into_inner())
        .await
        .map_err(|e| ApiError::from_sqlx("feature", e))?;
    ok(feature)
}

pub async fn create(db: web::Data<Db>, body: web::Json<CreateFeatureRequest>) -> HandlerResult {
    let body = body.into_inner();
    body.validate()?;
    let feature = db
        .create_feature(&NewFeature::from(body))
        .await
        .map_err(|e| ApiError::from_sqlx("feature", e))?;
    tracing::info!(id = %feature.id, name = %feature.name, "feature created");
    created(feature)
}

pub async fn update(
    db: web::Data<Db>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateFeatureRequest>,
) -> HandlerResult {
    let body = body.into_inner();
    body.validate()?;
    let feature = db
        .update_feature(path.into_inner(), &FeatureChanges::from(body))
        .await
        .map_err(|e| ApiError::from_sqlx("feature", e))?;
    ok(feature)
}

pub async fn delete(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let id = path.into_inner();
    if !db.delete_feature(id).await? {
        return Err(ApiError::NotFound("feature".into()));
    }
    tracing::info!(%id, "feature deleted");
    ok(serde_json::json!({ "id": id, "deleted": true }))
}

/// Competitors whose cell for this feature has `has_feature` set.
pub async fn competitors(db: web::Data<Db>, path: web::Path<Uuid>) -> HandlerResult {
    let id = path.into_inner();
    db.get_feature(id)
        .await
        .map_err(|e| ApiError::from_sqlx("feature", e))?;
    ok(db.competitors_with_feature(id).await?)
}
