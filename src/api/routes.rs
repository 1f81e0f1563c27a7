// API route configuration

use crate::api::error::ApiError;
use crate::api::handlers::{
    analytics, competitors, data_quality, features, health, imports, matrix, onboarding, screenshots,
};
use actix_web::web;

const JSON_LIMIT_BYTES: usize = 2 * 1024 * 1024;

fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(JSON_LIMIT_BYTES)
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    );
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    extractor_configs(cfg);
    cfg
        // Health check (not rate limited)
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/competitors")
                        .route("", web::get().to(competitors::list))
                        .route("", web::post().to(competitors::create))
                        .route("/{id}", web::get().to(competitors::get))
                        .route("/{id}", web::put().to(competitors::update))
                        .route("/{id}", web::delete().to(competitors::delete))
                        .route("/{id}/onboarding", web::get().to(onboarding::list))
                        .route("/{id}/onboarding", web::post().to(onboarding::upload))
                        .route(
                            "/{id}/onboarding/reorder",
                            web::put().to(onboarding::reorder),
                        ),
                )
                .service(
                    web::scope("/features")
                        .route("", web::get().to(features::list))
                        .route("", web::post().to(features::create))
                        .route("/{id}", web::get().to(features::get))
                        .route("/{id}", web::put().to(features::update))
                        .route("/{id}", web::delete().to(features::delete))
                        .route("/{id}/competitors", web::get().to(features::competitors)),
                )
                .service(
                    web::scope("/matrix")
                        .route("", web::get().to(matrix::get_matrix))
                        .route("/heatmap", web::get().to(matrix::heatmap))
                        .route("/export", web::get().to(matrix::export))
                        .route("/bulk-update", web::post().to(matrix::bulk_update))
                        .route(
                            "/{competitor_id}/{feature_id}",
                            web::put().to(matrix::update_cell),
                        ),
                )
                .service(
                    web::scope("/screenshots")
                        .route("", web::get().to(screenshots::list))
                        .route("", web::post().to(screenshots::upload))
                        .route("/{id}", web::get().to(screenshots::get))
                        .route("/{id}", web::delete().to(screenshots::delete))
                        .route("/{id}/feature", web::put().to(screenshots::assign_feature)),
                )
                .service(
                    web::scope("/onboarding")
                        .route("/stats", web::get().to(onboarding::stats))
                        .route("/{id}", web::put().to(onboarding::update))
                        .route("/{id}", web::delete().to(onboarding::delete)),
                )
                .service(
                    web::scope("/uploads").route("/excel", web::post().to(imports::upload_matrix)),
                )
                .service(
                    web::scope("/data-quality")
                        .route("/overview", web::get().to(data_quality::overview))
                        .route("/score", web::get().to(data_quality::score))
                        .route("/screenshots", web::get().to(data_quality::screenshots))
                        .route("/matrix", web::get().to(data_quality::matrix))
                        .route("/issues", web::get().to(data_quality::issues)),
                )
                .service(
                    web::scope("/analytics")
                        .route("/coverage", web::get().to(analytics::get_coverage))
                        .route("/gap-analysis", web::get().to(analytics::get_gap_analysis)),
                ),
        );
}
