//! Per-batch staging areas on local disk.
//!
//! Layout: `<root>/<device>/<YYYYMMDDHHMMSS>/content.txt` plus an `imgs/`
//! directory of uniquely named media files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

use crate::{DecodedMedia, PipelineError};

/// Name of the text record inside a staging area.
pub const CONTENT_FILE: &str = "content.txt";

/// Name of the media directory inside a staging area.
pub const MEDIA_DIR: &str = "imgs";

/// Manifest entry for one persisted media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMeta {
    pub original_name: String,
    /// Path relative to the upload root.
    pub saved_path: String,
    /// Lowercase hex SHA-256 of the file.
    pub sha256: String,
    pub size: u64,
}

/// The staging area for one (device, canonical folder) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
    device_name: String,
    folder: String,
}

impl StagingArea {
    pub fn new(
        root: impl Into<PathBuf>,
        device_name: impl Into<String>,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            device_name: device_name.into(),
            folder: folder.into(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Canonical folder name.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.device_name).join(&self.folder)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.dir().join(MEDIA_DIR)
    }

    pub fn content_path(&self) -> PathBuf {
        self.dir().join(CONTENT_FILE)
    }

    /// Delete the staging area if it exists. Returns whether anything was removed.
    pub async fn clear(&self) -> Result<bool, PipelineError> {
        let dir = self.dir();
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PipelineError::persistence("remove stale staging area", dir)(e)),
        }
    }

    /// Create the staging area and its media directory.
    pub async fn create(&self) -> Result<(), PipelineError> {
        let media_dir = self.media_dir();
        fs::create_dir_all(&media_dir)
            .await
            .map_err(PipelineError::persistence("create directory", media_dir))
    }

    /// Write the text record. Absent fields are written as empty strings.
    pub async fn write_content(
        &self,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<(), PipelineError> {
        let path = self.content_path();
        fs::write(&path, render_content(title, body))
            .await
            .map_err(PipelineError::persistence("write content record", path))
    }

    /// Write one media file under a fresh unique name.
    pub async fn write_media(&self, media: &DecodedMedia) -> Result<FileMeta, PipelineError> {
        let path = self.media_dir().join(unique_filename(&media.filename));
        fs::write(&path, &media.bytes)
            .await
            .map_err(PipelineError::persistence("write media file", path.clone()))?;

        let saved_path = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        Ok(FileMeta {
            original_name: media.filename.clone(),
            saved_path,
            sha256: sha256_hex(&media.bytes),
            size: media.bytes.len() as u64,
        })
    }

    /// Media files in the staging area, sorted by name.
    ///
    /// `None` if the media directory does not exist.
    pub async fn list_media(&self) -> std::io::Result<Option<Vec<PathBuf>>> {
        let mut entries = match fs::read_dir(self.media_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(Some(files))
    }
}

/// Render the text record.
pub fn render_content(title: Option<&str>, body: Option<&str>) -> String {
    format!(
        "Title: {}\nContent: {}",
        title.unwrap_or_default(),
        body.unwrap_or_default()
    )
}

/// `<uuid><original extension>`, e.g. `3f2a…9c.png`.
fn unique_filename(original: &str) -> String {
    let id = Uuid::new_v4().simple();
    match Path::new(original).extension() {
        Some(ext) => format!("{id}.{}", ext.to_string_lossy()),
        None => id.to_string(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn area(root: &Path) -> StagingArea {
        StagingArea::new(root, "deviceA", "20240101080000")
    }

    #[test]
    fn test_paths() {
        let staging = StagingArea::new("/srv/uploads", "deviceB", "20240101080000");
        assert_eq!(
            staging.content_path(),
            Path::new("/srv/uploads/deviceB/20240101080000/content.txt")
        );
        assert_eq!(
            staging.media_dir(),
            Path::new("/srv/uploads/deviceB/20240101080000/imgs")
        );
    }

    #[test]
    fn test_render_content() {
        assert_eq!(render_content(Some("T"), Some("B")), "Title: T\nContent: B");
        assert_eq!(render_content(None, None), "Title: \nContent: ");
    }

    #[test]
    fn test_unique_filename_keeps_extension() {
        let name = unique_filename("holiday photo.JPG");
        assert!(name.ends_with(".JPG"));
        assert_eq!(name.len(), 32 + 4);
        assert_ne!(unique_filename("a.png"), unique_filename("a.png"));
        assert_eq!(unique_filename("README").len(), 32);
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_persist_and_list() {
        let tmp = TempDir::new().unwrap();
        let staging = area(tmp.path());

        staging.create().await.unwrap();
        staging.write_content(Some("T"), None).await.unwrap();
        let meta = staging
            .write_media(&DecodedMedia {
                filename: "a.png".to_string(),
                bytes: b"abc".to_vec(),
            })
            .await
            .unwrap();

        let content = std::fs::read_to_string(staging.content_path()).unwrap();
        assert_eq!(content, "Title: T\nContent: ");

        assert_eq!(meta.original_name, "a.png");
        assert_eq!(meta.size, 3);
        assert!(meta.saved_path.starts_with("deviceA/20240101080000/imgs/"));
        assert!(meta.saved_path.ends_with(".png"));
        assert_eq!(
            meta.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let files = staging.list_media().await.unwrap().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0], tmp.path().join(&meta.saved_path));
    }

    #[tokio::test]
    async fn test_list_media_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(area(tmp.path()).list_media().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear() {
        let tmp = TempDir::new().unwrap();
        let staging = area(tmp.path());

        assert!(!staging.clear().await.unwrap());

        staging.create().await.unwrap();
        staging.write_content(None, None).await.unwrap();
        assert!(staging.clear().await.unwrap());
        assert!(!staging.dir().exists());
        assert!(tmp.path().join("deviceA").exists());
    }

    #[tokio::test]
    async fn test_write_into_missing_area_is_persistence_error() {
        let tmp = TempDir::new().unwrap();
        let err = area(tmp.path()).write_content(None, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence { .. }));
        assert!(!err.is_validation());
    }
}
