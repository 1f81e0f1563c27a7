//! Discovery of screenshot files laid out as
//! `<root>/<Competitor>/[<Folder>/...]<file>` on disk or under the
//! `screenshots/` prefix of an object store.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use super::object_store::StoredObject;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];
pub const SCREENSHOT_PREFIX: &str = "screenshots/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub competitor_folder: String,
    /// Folders between the competitor folder and the file, outermost first.
    pub subfolders: Vec<String>,
    pub file_name: String,
    /// `Competitor/Folder/file.png`, case preserved.
    pub relative_path: String,
    pub size: i64,
    /// Object key when discovered through a remote listing.
    pub storage_key: Option<String>,
}

impl DiscoveredFile {
    pub fn is_onboarding(&self) -> bool {
        self.subfolders
            .iter()
            .any(|f| f.to_lowercase().contains("onboarding"))
    }

    pub fn mime_type(&self) -> &'static str {
        mime_for(&self.file_name)
    }

    fn from_parts(parts: &[&str], size: i64, storage_key: Option<String>) -> Option<Self> {
        // need at least competitor folder + file
        let (file_name, folders) = parts.split_last()?;
        let (competitor, subfolders) = folders.split_first()?;
        if competitor.is_empty() || !is_image_file(file_name) || is_hidden(file_name) {
            return None;
        }
        Some(Self {
            competitor_folder: (*competitor).to_string(),
            subfolders: subfolders.iter().map(|s| s.to_string()).collect(),
            file_name: (*file_name).to_string(),
            relative_path: parts.join("/"),
            size,
            storage_key,
        })
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_image_file(file_name: &str) -> bool {
    extension_of(file_name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn mime_for(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

/// Storage-relative path of a stored screenshot reference, case preserved:
/// backslashes become `/`, and everything up to and including the first
/// `screenshots/` segment (or a leading `./`, `/`, `uploads/`) is dropped.
/// Works for relative paths, absolute paths and CDN URLs alike.
pub fn storage_relative_path(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let lower = unified.to_ascii_lowercase();
    let rest = match lower.find(SCREENSHOT_PREFIX) {
        Some(idx) if idx == 0 || lower.as_bytes()[idx - 1] == b'/' => {
            &unified[idx + SCREENSHOT_PREFIX.len()..]
        }
        _ => unified
            .trim_start_matches("./")
            .trim_start_matches('/')
            .trim_start_matches("uploads/"),
    };
    rest.trim_start_matches('/').to_string()
}

/// Dedup key: [`storage_relative_path`] lowercased.
pub fn normalize_relative_path(raw: &str) -> String {
    storage_relative_path(raw).to_lowercase()
}

/// Walks `root` (the local `uploads/screenshots` directory). Unreadable
/// entries are logged and skipped; a missing root is an error.
pub fn scan_local(root: &Path) -> Result<Vec<DiscoveredFile>> {
    if !root.is_dir() {
        anyhow::bail!("screenshot root {} is not a directory", root.display());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} escaped {}", entry.path().display(), root.display()))?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        let size = entry.metadata().map(|m| m.len() as i64).unwrap_or_default();
        if let Some(file) = DiscoveredFile::from_parts(&parts, size, None) {
            found.push(file);
        }
    }
    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}

/// Interprets an object listing under `screenshots/`.
pub fn from_listing(objects: &[StoredObject]) -> Vec<DiscoveredFile> {
    let mut found: Vec<DiscoveredFile> = objects
        .iter()
        .filter_map(|obj| {
            let rel = obj.key.strip_prefix(SCREENSHOT_PREFIX)?;
            let parts: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
            DiscoveredFile::from_parts(&parts, obj.size, Some(obj.key.clone()))
        })
        .collect();
    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scans_competitor_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("OKX TR/TRY Nemalandırma")).unwrap();
        fs::create_dir_all(root.join("Paribu/Onboarding")).unwrap();
        fs::write(root.join("OKX TR/TRY Nemalandırma/shot1.png"), [0u8; 10]).unwrap();
        fs::write(root.join("OKX TR/home.JPG"), [0u8; 4]).unwrap();
        fs::write(root.join("OKX TR/notes.txt"), "x").unwrap();
        fs::write(root.join("OKX TR/.DS_Store.png"), "x").unwrap();
        fs::write(root.join("Paribu/Onboarding/step1.webp"), [0u8; 2]).unwrap();
        fs::write(root.join("stray.png"), "x").unwrap();

        let files = scan_local(root).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(
            rels,
            vec![
                "OKX TR/TRY Nemalandırma/shot1.png",
                "OKX TR/home.JPG",
                "Paribu/Onboarding/step1.webp"
            ]
        );

        let nested = &files[0];
        assert_eq!(nested.competitor_folder, "OKX TR");
        assert_eq!(nested.subfolders, vec!["TRY Nemalandırma".to_string()]);
        assert_eq!(nested.file_name, "shot1.png");
        assert_eq!(nested.size, 10);
        assert!(!nested.is_onboarding());
        assert!(files[2].is_onboarding());
        assert_eq!(files[1].mime_type(), "image/jpeg");
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_local(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn listing_keys_become_discovered_files() {
        let objects = vec![
            StoredObject {
                key: "screenshots/BTCTurk/Convert/c1.png".into(),
                size: 7,
            },
            StoredObject {
                key: "screenshots/BTCTurk/readme.md".into(),
                size: 1,
            },
            StoredObject {
                key: "screenshots/loose.png".into(),
                size: 1,
            },
            StoredObject {
                key: "avatars/BTCTurk/a.png".into(),
                size: 1,
            },
        ];
        let files = from_listing(&objects);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].competitor_folder, "BTCTurk");
        assert_eq!(
            files[0].storage_key.as_deref(),
            Some("screenshots/BTCTurk/Convert/c1.png")
        );
    }

    #[test]
    fn relative_paths_normalize_across_spellings() {
        let expected = "okx tr/convert/a.png";
        for raw in [
            "uploads/screenshots/OKX TR/Convert/a.png",
            "./uploads/screenshots/OKX TR/Convert/a.png",
            "/srv/app/uploads/screenshots/OKX TR/Convert/a.png",
            "uploads\\screenshots\\OKX TR\\Convert\\a.png",
            "screenshots/OKX TR/Convert/a.png",
            "https://cdn.example.com/screenshots/OKX TR/Convert/a.png",
            "OKX TR/Convert/a.png",
        ] {
            assert_eq!(normalize_relative_path(raw), expected, "{raw}");
        }
        assert_eq!(
            storage_relative_path("uploads/screenshots/OKX TR/Convert/a.png"),
            "OKX TR/Convert/a.png"
        );
    }
}
