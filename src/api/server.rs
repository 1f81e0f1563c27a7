// API server implementation using actix-web

use crate::api::handlers::health;
use crate::api::rate_limit::RateLimit;
use crate::api::uploads::UploadStorage;
use crate::api::{middleware, routes};
use crate::config::AppConfig;
use crate::database_ops::object_store::{LocalObjectStore, ObjectStore, S3ObjectStore};
use crate::database_ops::Db;
use crate::util::env::{env_opt, env_parse};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    pub api_rate_limit: RateLimit,
    pub public_rate_limit: RateLimit,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match env_opt("API_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid API_PORT '{raw}'"))?,
            None => 3001,
        };
        let allowed_origins = env_opt("ALLOWED_ORIGINS")
            .unwrap_or_else(|| middleware::DEFAULT_ALLOWED_ORIGINS.to_string());

        Ok(Self {
            host,
            port,
            allowed_origins,
            api_rate_limit: RateLimit::general_from_env(),
            public_rate_limit: RateLimit::public_from_env(),
        })
    }

    /// Start the HTTP server. The pool is closed once the server stops.
    pub async fn run(self, db: Db, storage: UploadStorage) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);
        health::mark_started();

        tracing::info!(
            host = %self.host,
            port = %self.port,
            remote_uploads = storage.has_remote(),
            "starting competitor-lens API server"
        );

        let db_data = web::Data::new(db.clone());
        let storage_data = web::Data::new(storage);
        let allowed_origins = self.allowed_origins.clone();
        let api_rate_limit = self.api_rate_limit.clone();
        let public_rate_limit = self.public_rate_limit.clone();
        let workers = env_parse("API_WORKERS", 0usize);

        let mut server = HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);

            App::new()
                .app_data(db_data.clone())
                .app_data(storage_data.clone())
                .wrap(public_rate_limit.clone())
                .wrap(api_rate_limit.clone())
                .wrap(cors)
                .wrap(compress)
                .wrap(logger)
                .configure(routes::configure_routes)
        });
        if workers > 0 {
            server = server.workers(workers);
        }

        let result = server
            .bind(&bind_addr)
            .with_context(|| format!("Failed to bind to {}", bind_addr))?
            .run()
            .await
            .context("HTTP server error");

        db.close().await;
        result
    }
}

/// Upload storage for the configured environment: always the local uploads
/// directory, plus S3 when `S3_BUCKET` is set.
pub async fn build_upload_storage(config: &AppConfig) -> Result<UploadStorage> {
    let local = LocalObjectStore::new(&config.uploads_dir, &config.uploads_public_base);
    let remote: Option<Arc<dyn ObjectStore>> = match &config.s3 {
        Some(settings) => {
            let store = S3ObjectStore::connect(settings.clone()).await?;
            tracing::info!(target = %store.describe(), "S3 uploads enabled");
            Some(Arc::new(store))
        }
        None => None,
    };
    Ok(UploadStorage::new(local, remote))
}
