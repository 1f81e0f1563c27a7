use actix_web::{web, HttpResponse};
use std::sync::OnceLock;
use std::time::Instant;

use crate::api::models::{ApiResponse, HealthResponse};
use crate::database_ops::Db;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Pins the uptime origin; called once when the server starts.
pub fn mark_started() {
    STARTED.get_or_init(Instant::now);
}

/// Health check endpoint
pub async fn health_check(db: web::Data<Db>) -> HttpResponse {
    let connected = db.ping().await;
    let uptime = STARTED.get_or_init(Instant::now).elapsed().as_secs();

    let response = ApiResponse::success(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
        uptime_seconds: uptime,
    });
    HttpResponse::Ok().json(response)
}
