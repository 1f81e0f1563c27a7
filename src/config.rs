//! Process configuration assembled from the environment (after `.env`).

use std::path::PathBuf;

use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_S3_REGION: &str = "eu-central-1";

/// Remote object storage. Present only when `S3_BUCKET` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint: Option<String>,
    pub cdn_url: Option<String>,
}

impl S3Settings {
    pub fn from_env() -> Option<Self> {
        let bucket = env_opt("S3_BUCKET")?;
        Some(Self {
            bucket,
            region: env_opt("AWS_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            access_key_id: env_opt("AWS_ACCESS_KEY_ID"),
            secret_access_key: env_opt("AWS_SECRET_ACCESS_KEY"),
            endpoint: env_opt("S3_ENDPOINT"),
            cdn_url: env_opt("CDN_URL"),
        })
    }

    /// Base that object keys are appended to when building public URLs.
    pub fn public_base(&self) -> String {
        match &self.cdn_url {
            Some(cdn) => cdn.trim_end_matches('/').to_string(),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base(), key.trim_start_matches('/'))
    }
}

/// Everything the server and the admin commands share.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Directory holding `screenshots/<Competitor>/...`.
    pub uploads_dir: PathBuf,
    /// URL prefix local uploads are served under.
    pub uploads_public_base: String,
    pub s3: Option<S3Settings>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: crate::util::env::db_url().ok(),
            max_connections: env_parse("DB_MAX_CONNS", 10u32),
            uploads_dir: PathBuf::from(env_opt("UPLOADS_DIR").unwrap_or_else(|| "uploads".into())),
            uploads_public_base: env_opt("UPLOADS_PUBLIC_BASE").unwrap_or_else(|| "/uploads".into()),
            s3: S3Settings::from_env(),
        }
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.uploads_dir.join("screenshots")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(cdn: Option<&str>) -> S3Settings {
        S3Settings {
            bucket: "lens-shots".into(),
            region: DEFAULT_S3_REGION.into(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
            cdn_url: cdn.map(str::to_string),
        }
    }

    #[test]
    fn public_url_defaults_to_bucket_host() {
        assert_eq!(
            settings(None).public_url("screenshots/OKX TR/a.png"),
            "https://lens-shots.s3.eu-central-1.amazonaws.com/screenshots/OKX TR/a.png"
        );
    }

    #[test]
    fn public_url_prefers_cdn_without_double_slash() {
        assert_eq!(
            settings(Some("https://cdn.example.com/")).public_url("/screenshots/a.png"),
            "https://cdn.example.com/screenshots/a.png"
        );
    }
}
