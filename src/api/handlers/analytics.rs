use actix_web::web;

use super::{load_catalog, ok, HandlerResult};
use crate::analytics::{coverage, Catalog};
use crate::database_ops::Db;

pub async fn get_coverage(db: web::Data<Db>) -> HandlerResult {
    let (competitors, features, cells) = load_catalog(&db).await?;
    ok(coverage::coverage_report(&Catalog::new(&competitors, &features, &cells)))
}

pub async fn get_gap_analysis(db: web::Data<Db>) -> HandlerResult {
    let (competitors, features, cells) = load_catalog(&db).await?;
    ok(coverage::gap_analysis(&Catalog::new(&competitors, &features, &cells)))
}
