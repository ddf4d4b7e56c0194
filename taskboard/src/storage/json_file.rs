//! Whole-file JSON storage
//!
//! Every write goes to a sibling temp file first, is fsynced, then renamed
//! over the target, so a crash mid-write leaves the previous file intact.
//!
//! Example: "data.json" is staged as "data.json.tmp" before the rename.

use crate::error::{AppError, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// A JSON document stored at a fixed path
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the file, or `None` if it does not exist
    pub async fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the file contents atomically
    pub async fn write_atomic(&self, content: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!("Wrote {:?} ({} bytes)", self.path, content.len());

        Ok(())
    }

    /// Size on disk, or `None` if the file does not exist
    pub async fn size(&self) -> Result<Option<u64>> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy an unreadable file aside as "<name>.corrupt-<timestamp>" so a
    /// fresh document never overwrites the only copy.
    pub async fn preserve_as_corrupt(&self) -> Result<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Generic(format!("Invalid file path: {:?}", self.path)))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let target = self
            .path
            .with_file_name(format!("{}.corrupt-{}", file_name, stamp));

        fs::copy(&self.path, &target).await?;
        tracing::warn!("Preserved unreadable {:?} as {:?}", self.path, target);

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_file() -> (JsonFile, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let file = JsonFile::new(temp_dir.path().join("data.json"));
        (file, temp_dir)
    }

    #[tokio::test]
    async fn test_read_missing_returns_none() {
        let (file, _temp) = create_test_file();
        assert!(file.read().await.unwrap().is_none());
        assert!(file.size().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (file, _temp) = create_test_file();

        file.write_atomic(br#"{"Tabs":[]}"#).await.unwrap();
        file.write_atomic(br#"{"Tabs":[1]}"#).await.unwrap();

        assert_eq!(file.read().await.unwrap().unwrap(), r#"{"Tabs":[1]}"#);
        assert_eq!(file.size().await.unwrap(), Some(12));
        assert!(!file.temp_path().exists());
    }

    #[tokio::test]
    async fn test_write_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = JsonFile::new(temp_dir.path().join("nested").join("theme.json"));

        file.write_atomic(b"{}").await.unwrap();

        assert!(file.path().exists());
    }

    #[tokio::test]
    async fn test_preserve_as_corrupt() {
        let (file, temp) = create_test_file();
        file.write_atomic(b"not json {{{").await.unwrap();

        let copy = file.preserve_as_corrupt().await.unwrap();

        assert!(copy.starts_with(temp.path()));
        assert!(copy
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("data.json.corrupt-"));
        assert_eq!(std::fs::read_to_string(copy).unwrap(), "not json {{{");
    }
}
