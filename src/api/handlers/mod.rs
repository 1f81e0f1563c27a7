// HTTP request handlers for API endpoints

pub mod analytics;
pub mod competitors;
pub mod data_quality;
pub mod features;
pub mod health;
pub mod imports;
pub mod matrix;
pub mod onboarding;
pub mod screenshots;

use actix_web::HttpResponse;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::models::ApiResponse;
use crate::database_ops::entities::{Competitor, CompetitorFeature, Feature};
use crate::database_ops::Db;

pub type HandlerResult = Result<HttpResponse, ApiError>;

pub(crate) fn ok<T: Serialize>(data: T) -> HandlerResult {
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

pub(crate) fn created<T: Serialize>(data: T) -> HandlerResult {
    Ok(HttpResponse::Created().json(ApiResponse::success(data)))
}

/// Everything the coverage figures are computed from.
pub(crate) async fn load_catalog(
    db: &Db,
) -> Result<(Vec<Competitor>, Vec<Feature>, Vec<CompetitorFeature>), ApiError> {
    let (competitors, features, cells) = futures::try_join!(
        db.list_competitors(None),
        db.list_features(None),
        db.list_cells()
    )?;
    Ok((competitors, features, cells))
}
