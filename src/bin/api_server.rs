// HTTP API server binary for competitor-lens

use anyhow::{Context, Result};
use competitor_lens::api::{build_upload_storage, ApiServer};
use competitor_lens::config::AppConfig;
use competitor_lens::database_ops::Db;
use competitor_lens::tracing::{init_tracing, LogStyle};
use competitor_lens::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing("info,sqlx=warn", LogStyle::Server)?;
    tracing::info!("initializing competitor-lens API server");

    let server = ApiServer::from_env()?;
    let config = AppConfig::from_env();

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL (or DB_URL) must be set")?;
    let db = Db::connect(&database_url, config.max_connections).await?;
    tracing::info!(database = %env_util::redact_db_url(&database_url), "database connected");

    let storage = build_upload_storage(&config).await?;
    server.run(db, storage).await
}
