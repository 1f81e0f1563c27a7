//! Object storage behind screenshots: S3 (or anything S3-compatible) and a
//! local directory. The trait has no delete; cleanup only removes database rows.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    Client as S3Client,
};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::S3Settings;

/// Result of a single-object existence probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existence {
    Exists,
    NotFound,
    /// The store could not give a definitive answer (network, auth, throttling).
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: i64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location for logs, e.g. `s3://bucket`.
    fn describe(&self) -> String;
    fn public_url(&self, key: &str) -> String;
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>>;
    async fn head(&self, key: &str) -> Existence;
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

pub struct S3ObjectStore {
    client: S3Client,
    settings: S3Settings,
}

impl S3ObjectStore {
    pub async fn connect(settings: S3Settings) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let (Some(access_key), Some(secret)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            builder = builder.credentials_provider(Credentials::new(
                access_key.clone(),
                secret.clone(),
                None,
                None,
                "static",
            ));
        }
        if settings.endpoint.is_some() {
            // MinIO and friends do not serve virtual-hosted buckets.
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
            settings,
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn describe(&self) -> String {
        format!("s3://{}", self.settings.bucket)
    }

    fn public_url(&self, key: &str) -> String {
        self.settings.public_url(key)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.settings.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
                .with_context(|| format!("listing {}/{prefix}", self.describe()))?;

            for object in page.contents() {
                if let Some(key) = object.key() {
                    out.push(StoredObject {
                        key: key.to_string(),
                        size: object.size().unwrap_or_default(),
                    });
                }
            }
            debug!(listed = out.len(), "s3 list page");

            match page.next_continuation_token() {
                Some(next) if page.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string())
                }
                _ => break,
            }
        }
        Ok(out)
    }

    async fn head(&self, key: &str) -> Existence {
        match self
            .client
            .head_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Existence::Exists,
            Err(SdkError::ServiceError(ref svc)) if svc.err().is_not_found() => {
                Existence::NotFound
            }
            Err(err) => Existence::Unknown(DisplayErrorContext(&err).to_string()),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .content_type(content_type)
            .cache_control("public, max-age=31536000")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("uploading {key} to {}", self.describe()))?;
        Ok(())
    }
}

/// Objects as plain files under `root`; keys are `/`-separated relative paths.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key onto the filesystem, refusing anything that would escape `root`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("refusing object key outside the store: {key}");
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<StoredObject>> {
            let mut out = Vec::new();
            if !root.exists() {
                return Ok(out);
            }
            for entry in WalkDir::new(&root).follow_links(false) {
                let entry = entry.with_context(|| format!("walking {}", root.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.starts_with(&prefix) {
                    continue;
                }
                let size = entry.metadata().map(|m| m.len() as i64).unwrap_or_default();
                out.push(StoredObject { key, size });
            }
            out.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(out)
        })
        .await?
    }

    async fn head(&self, key: &str) -> Existence {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(err) => return Existence::Unknown(err.to_string()),
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Existence::Exists,
            Ok(_) => Existence::Unknown(format!("{} is not a regular file", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Existence::NotFound,
            Err(err) => Existence::Unknown(err.to_string()),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_puts_lists_and_heads() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "/uploads/");

        store
            .put("screenshots/OKX TR/Convert/a.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        store
            .put("other/readme.txt", b"hi".to_vec(), "text/plain")
            .await
            .unwrap();

        let listed = store.list("screenshots/").await.unwrap();
        assert_eq!(
            listed,
            vec![StoredObject {
                key: "screenshots/OKX TR/Convert/a.png".into(),
                size: 3
            }]
        );
        assert_eq!(
            store.head("screenshots/OKX TR/Convert/a.png").await,
            Existence::Exists
        );
        assert_eq!(store.head("screenshots/missing.png").await, Existence::NotFound);
        assert_eq!(
            store.public_url("screenshots/a.png"),
            "/uploads/screenshots/a.png"
        );
    }

    #[tokio::test]
    async fn local_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "/uploads");
        assert!(store.put("../escape.png", vec![0], "image/png").await.is_err());
        assert!(matches!(
            store.head("screenshots/../../etc/passwd").await,
            Existence::Unknown(_)
        ));
    }

    #[tokio::test]
    async fn listing_a_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().join("nope"), "/uploads");
        assert!(store.list("screenshots/").await.unwrap().is_empty());
    }
}
