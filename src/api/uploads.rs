// Multipart image uploads: form parsing, validation and storage.

use actix_multipart::Multipart;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::database_ops::file_scan::{extension_of, mime_for, SCREENSHOT_PREFIX};
use crate::database_ops::object_store::{LocalObjectStore, ObjectStore};
use crate::database_ops::spreadsheet::MATRIX_EXTENSIONS;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const UPLOAD_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;
/// Prefix of `file_path` for locally stored uploads, matching the sync layout.
const LOCAL_PATH_PREFIX: &str = "uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFolder {
    Features,
    Onboarding,
}

impl UploadFolder {
    fn dir(&self) -> &'static str {
        match self {
            UploadFolder::Features => "features",
            UploadFolder::Onboarding => "onboarding",
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            UploadFolder::Features => "feature",
            UploadFolder::Onboarding => "onboarding",
        }
    }
}

#[derive(Debug)]
pub struct UploadedFile {
    pub original_name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    /// Trimmed text field; blank counts as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn parsed<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.field(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid {name}: '{raw}'")))
            })
            .transpose()
    }
}

/// Checks name and declared content type against the image allow-list and
/// returns the normalized extension.
pub fn validate_image(file_name: &str, content_type: Option<&str>) -> Result<String, ApiError> {
    let reject = || ApiError::BadRequest("only png, jpg, jpeg and webp images are allowed".into());
    let ext = extension_of(file_name).ok_or_else(reject)?;
    if !UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
        return Err(reject());
    }
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if !matches!(
            ct.split(';').next().map(str::trim),
            Some("image/png" | "image/jpeg" | "image/jpg" | "image/webp")
        ) {
            return Err(reject());
        }
    }
    Ok(ext)
}

/// Matrix workbooks and CSV exports. Browsers disagree on spreadsheet MIME
/// types, so only the extension is checked.
pub fn validate_spreadsheet(file_name: &str) -> Result<String, ApiError> {
    match extension_of(file_name) {
        Some(ext) if MATRIX_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(ApiError::BadRequest(
            "only .xlsx, .xlsm, .xls, .ods and .csv files are accepted".into(),
        )),
    }
}

/// What the file part of a form must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Spreadsheet,
}

impl FileKind {
    fn validate(&self, file_name: &str, content_type: Option<&str>) -> Result<String, ApiError> {
        match self {
            FileKind::Image => validate_image(file_name, content_type),
            FileKind::Spreadsheet => validate_spreadsheet(file_name),
        }
    }
}

/// Reads every part of the form. The part named `file_field` is the file;
/// everything else is collected as text.
pub async fn read_form(
    mut payload: Multipart,
    file_field: &str,
    kind: FileKind,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?;
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            let original_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .unwrap_or_default()
                .to_string();
            let content_type = field.content_type().map(|m| m.to_string());
            let extension = kind.validate(&original_name, content_type.as_deref())?;

            let mut bytes = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("upload interrupted: {e}")))?;
                if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                    return Err(ApiError::BadRequest("file exceeds the 10 MiB limit".into()));
                }
                bytes.extend_from_slice(&chunk);
            }
            form.file = Some(UploadedFile {
                original_name,
                extension,
                bytes,
            });
            continue;
        }

        let mut text = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("malformed field {name}: {e}")))?;
            if text.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                return Err(ApiError::BadRequest(format!("field {name} is too large")));
            }
            text.extend_from_slice(&chunk);
        }
        let value = String::from_utf8(text)
            .map_err(|_| ApiError::BadRequest(format!("field {name} is not utf-8")))?;
        form.fields.insert(name, value);
    }
    Ok(form)
}

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    pub key: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub cdn_url: Option<String>,
}

/// Competitor names become directory names; separators and dot segments are neutralized.
fn folder_name(competitor_name: &str) -> String {
    let cleaned: String = competitor_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '-' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Local filesystem copy is always written; the remote store, when configured,
/// gets a second copy and supplies the CDN URL.
#[derive(Clone)]
pub struct UploadStorage {
    local: Arc<LocalObjectStore>,
    remote: Option<Arc<dyn ObjectStore>>,
}

impl UploadStorage {
    pub fn new(local: LocalObjectStore, remote: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            local: Arc::new(local),
            remote,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// The uploads directory, used to check whether local files still exist.
    pub fn local(&self) -> &LocalObjectStore {
        &self.local
    }

    pub async fn store(
        &self,
        competitor_name: &str,
        folder: UploadFolder,
        file: UploadedFile,
    ) -> anyhow::Result<StoredUpload> {
        let millis = chrono::Utc::now().timestamp_millis();
        let file_name = format!("{}_{millis}.{}", folder.file_prefix(), file.extension);
        let key = format!(
            "{SCREENSHOT_PREFIX}{}/{}/{file_name}",
            folder_name(competitor_name),
            folder.dir()
        );
        let mime_type = mime_for(&file_name).to_string();
        let file_size = file.bytes.len() as i64;

        let cdn_url = match &self.remote {
            Some(remote) => match remote.put(&key, file.bytes.clone(), &mime_type).await {
                Ok(()) => Some(remote.public_url(&key)),
                Err(err) => {
                    warn!(key = %key, error = ?err, "remote upload failed; keeping local copy only");
                    None
                }
            },
            None => None,
        };
        self.local.put(&key, file.bytes, &mime_type).await?;

        info!(key = %key, original = %file.original_name, bytes = file_size, remote = cdn_url.is_some(), "upload stored");
        Ok(StoredUpload {
            file_path: format!("{LOCAL_PATH_PREFIX}/{key}"),
            key,
            file_name,
            file_size,
            mime_type,
            cdn_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::object_store::{Existence, StoredObject};
    use async_trait::async_trait;

    struct BrokenRemote;

    #[async_trait]
    impl ObjectStore for BrokenRemote {
        fn describe(&self) -> String {
            "broken://".into()
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://cdn.test/{key}")
        }

        async fn list(&self, _prefix: &str) -> anyhow::Result<Vec<StoredObject>> {
            Ok(Vec::new())
        }

        async fn head(&self, _key: &str) -> Existence {
            Existence::Unknown("offline".into())
        }

        async fn put(&self, _key: &str, _body: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
            anyhow::bail!("access denied")
        }
    }

    fn png() -> UploadedFile {
        UploadedFile {
            original_name: "shot.PNG".into(),
            extension: "png".into(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    #[test]
    fn only_allow_listed_images_pass() {
        assert_eq!(validate_image("a.JPG", Some("image/jpeg")).unwrap(), "jpg");
        assert_eq!(validate_image("a.webp", None).unwrap(), "webp");
        assert!(validate_image("a.gif", Some("image/gif")).is_err());
        assert!(validate_image("a.png", Some("text/html")).is_err());
        assert!(validate_image("noext", None).is_err());
    }

    #[test]
    fn spreadsheets_are_checked_by_extension() {
        assert_eq!(validate_spreadsheet("Matrix.XLSX").unwrap(), "xlsx");
        assert_eq!(validate_spreadsheet("export.csv").unwrap(), "csv");
        assert!(validate_spreadsheet("matrix.pdf").is_err());
        assert!(FileKind::Spreadsheet.validate("m.ods", Some("application/octet-stream")).is_ok());
        assert!(FileKind::Image.validate("m.ods", None).is_err());
    }

    #[test]
    fn competitor_folders_cannot_escape() {
        assert_eq!(folder_name("OKX TR"), "OKX TR");
        assert_eq!(folder_name("../etc"), "-etc");
        assert_eq!(folder_name(".."), "unknown");
    }

    #[tokio::test]
    async fn local_upload_uses_the_scan_layout() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(LocalObjectStore::new(dir.path(), "/uploads"), None);
        let stored = storage
            .store("OKX TR", UploadFolder::Onboarding, png())
            .await
            .unwrap();

        assert!(stored.key.starts_with("screenshots/OKX TR/onboarding/onboarding_"));
        assert!(stored.file_path.starts_with("uploads/screenshots/OKX TR/onboarding/"));
        assert_eq!(stored.mime_type, "image/png");
        assert_eq!(stored.file_size, 4);
        assert_eq!(stored.cdn_url, None);
        assert!(dir.path().join(&stored.key).is_file());
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(
            LocalObjectStore::new(dir.path(), "/uploads"),
            Some(Arc::new(BrokenRemote)),
        );
        let stored = storage
            .store("BTCTurk", UploadFolder::Features, png())
            .await
            .unwrap();
        assert_eq!(stored.cdn_url, None);
        assert!(stored.file_name.starts_with("feature_"));
        assert!(dir.path().join(&stored.key).is_file());
    }
}
