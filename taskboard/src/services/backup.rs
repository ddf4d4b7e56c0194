//! Backup service
//!
//! Whole-document snapshots kept as pretty-printed JSON under `backups/`.
//! Cut and restore both snapshot the live document first, so neither can
//! lose data on its own.

use crate::config::{BACKUP_PREFIX, BACKUP_TIMESTAMP_FORMAT, PRE_RESTORE_BACKUP_PREFIX};
use crate::error::{AppError, Result};
use crate::models::{AppData, Tab};
use crate::services::data::DataService;
use crate::storage::JsonFile;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Length of a "%Y%m%d_%H%M%S" stamp
const TIMESTAMP_LEN: usize = 15;

/// A backup file found on disk
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub file_name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub size_bytes: u64,
    /// `None` when the file does not parse as a document
    pub tab_count: Option<usize>,
}

/// Result of a successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub restored_from: PathBuf,
    /// Snapshot of the document as it was before the restore
    pub safety_backup: PathBuf,
}

/// Backup service
#[derive(Clone)]
pub struct BackupService {
    backups_dir: PathBuf,
}

impl BackupService {
    pub fn new(backups_dir: PathBuf) -> Self {
        Self { backups_dir }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Write a snapshot of `data` as `backup_<timestamp>.json`
    pub async fn create_backup(&self, data: &AppData) -> Result<PathBuf> {
        self.write_backup(BACKUP_PREFIX, data).await
    }

    async fn write_backup(&self, prefix: &str, data: &AppData) -> Result<PathBuf> {
        fs::create_dir_all(&self.backups_dir).await?;

        let path = self.unique_path(prefix).await;
        let content = data.to_json_string(false)?;
        JsonFile::new(path.clone())
            .write_atomic(content.as_bytes())
            .await
            .map_err(|e| AppError::Backup(format!("Failed to write {:?}: {}", path, e)))?;

        tracing::info!(
            "Backup created: {:?} ({} tabs, {} bytes)",
            path,
            data.tabs.len(),
            content.len()
        );

        Ok(path)
    }

    /// Timestamped path, suffixed `_1`, `_2`... when taken within the same second
    async fn unique_path(&self, prefix: &str) -> PathBuf {
        let stamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let mut path = self.backups_dir.join(format!("{}{}.json", prefix, stamp));

        let mut suffix = 1;
        while fs::try_exists(&path).await.unwrap_or(false) {
            path = self
                .backups_dir
                .join(format!("{}{}_{}.json", prefix, stamp, suffix));
            suffix += 1;
        }

        path
    }

    /// All backups, newest first
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut entries = match fs::read_dir(&self.backups_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.starts_with(BACKUP_PREFIX) || !file_name.ends_with(".json") {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let created_at = match timestamp_from_file_name(&file_name) {
                Some(created_at) => created_at,
                None => metadata.modified().map(DateTime::<Local>::from)?,
            };

            let tab_count = match fs::read_to_string(entry.path()).await {
                Ok(content) => AppData::from_json_str(&content).ok().map(|d| d.tabs.len()),
                Err(_) => None,
            };

            backups.push(BackupInfo {
                file_name,
                path: entry.path(),
                created_at,
                size_bytes: metadata.len(),
                tab_count,
            });
        }

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });

        Ok(backups)
    }

    /// Back up the live document, then replace it with a single fresh tab.
    /// Returns the backup path.
    pub async fn cut(&self, data: &DataService, default_tab_name: &str) -> Result<PathBuf> {
        let shared = data.app_data();
        let mut document = shared.write().await;

        let backup_path = self.create_backup(&document).await?;

        let mut fresh = AppData::new();
        fresh.add_tab(Tab::with_task_column(default_tab_name));
        let previous = std::mem::replace(&mut *document, fresh);
        data.notify_changed(None)?;

        tracing::info!(
            "Cut {} tabs into {:?}",
            previous.tabs.len(),
            backup_path
        );

        Ok(backup_path)
    }

    /// Replace the live document with a backup, keeping a safety snapshot
    /// of the current one. An unreadable backup changes nothing.
    pub async fn restore(&self, data: &DataService, backup_path: &Path) -> Result<RestoreOutcome> {
        tracing::info!("Restoring from backup: {:?}", backup_path);

        let content = fs::read_to_string(backup_path).await.map_err(|e| {
            AppError::Restore(format!("Failed to read {:?}: {}", backup_path, e))
        })?;
        let restored = AppData::from_json_str(&content).map_err(|e| {
            AppError::Restore(format!("Invalid backup file {:?}: {}", backup_path, e))
        })?;

        let shared = data.app_data();
        let mut document = shared.write().await;

        let safety_backup = self
            .write_backup(PRE_RESTORE_BACKUP_PREFIX, &document)
            .await?;

        let tab_count = restored.tabs.len();
        *document = restored;
        data.notify_changed(None)?;

        tracing::info!(
            "Restore completed ({} tabs), previous document kept at {:?}",
            tab_count,
            safety_backup
        );

        Ok(RestoreOutcome {
            restored_from: backup_path.to_path_buf(),
            safety_backup,
        })
    }
}

/// Parse the stamp from "backup_<ts>[_n].json" or "backup_before_restore_<ts>[_n].json"
fn timestamp_from_file_name(file_name: &str) -> Option<DateTime<Local>> {
    let rest = file_name
        .strip_prefix(PRE_RESTORE_BACKUP_PREFIX)
        .or_else(|| file_name.strip_prefix(BACKUP_PREFIX))?;
    let stamp = rest.get(..TIMESTAMP_LEN)?;
    let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, ColumnType};
    use crate::services::data::DataServiceConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_service() -> (BackupService, DataService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = DataServiceConfig::new(temp_dir.path().to_path_buf())
            .with_save_delay(Duration::from_secs(10));
        let data = DataService::open(config).await.unwrap();
        let service = BackupService::new(temp_dir.path().join("backups"));
        (service, data, temp_dir)
    }

    fn sample_document() -> AppData {
        let mut data = AppData::new();
        let tab = data.add_tab(Tab::daily_plan());
        let task = tab.column_by_name("Task").unwrap().id.clone();
        let row = tab.add_row().id.clone();
        tab.set_cell(&row, &task, CellValue::Text("Write report".into()))
            .unwrap();
        data.add_tab(Tab::new("Ideas"));
        data
    }

    #[test]
    fn test_timestamp_from_file_name() {
        let ts = timestamp_from_file_name("backup_20240315_093000.json").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-15 09:30:00");

        let suffixed = timestamp_from_file_name("backup_20240315_093000_2.json").unwrap();
        assert_eq!(suffixed, ts);

        let pre_restore = timestamp_from_file_name("backup_before_restore_20240315_093000.json");
        assert_eq!(pre_restore, Some(ts));

        assert!(timestamp_from_file_name("backup_latest.json").is_none());
    }

    #[tokio::test]
    async fn test_create_backup_and_list() {
        let (service, _data, _temp) = create_test_service().await;
        assert!(service.list_backups().await.unwrap().is_empty());

        let path = service.create_backup(&sample_document()).await.unwrap();

        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n  "));

        let backups = service.list_backups().await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].path, path);
        assert_eq!(backups[0].tab_count, Some(2));
        assert_eq!(backups[0].size_bytes, content.len() as u64);
    }

    #[tokio::test]
    async fn test_same_second_backups_do_not_collide() {
        let (service, _data, _temp) = create_test_service().await;
        let document = sample_document();

        let first = service.create_backup(&document).await.unwrap();
        let second = service.create_backup(&document).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(service.list_backups().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_backups_newest_first() {
        let (service, _data, temp) = create_test_service().await;
        let dir = temp.path().join("backups");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("backup_20230101_080000.json"), r#"{"Tabs":[]}"#).unwrap();
        std::fs::write(dir.join("backup_20240601_080000.json"), "garbage").unwrap();
        std::fs::write(dir.join("backup_20231231_235959.json"), r#"{"Tabs":[{}]}"#).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let backups = service.list_backups().await.unwrap();

        let names: Vec<_> = backups.iter().map(|b| b.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "backup_20240601_080000.json",
                "backup_20231231_235959.json",
                "backup_20230101_080000.json",
            ]
        );
        assert_eq!(backups[0].tab_count, None);
        assert_eq!(backups[1].tab_count, Some(1));
    }

    #[tokio::test]
    async fn test_cut_leaves_single_default_tab() {
        let (service, data, _temp) = create_test_service().await;
        data.replace_document(sample_document()).await.unwrap();

        let backup = service.cut(&data, "Fresh Start").await.unwrap();

        let document = data.snapshot().await;
        assert_eq!(document.tabs.len(), 1);
        let tab = &document.tabs[0];
        assert_eq!(tab.name, "Fresh Start");
        assert_eq!(tab.columns.len(), 1);
        assert_eq!(tab.columns[0].name, "Task");
        assert_eq!(tab.columns[0].column_type, ColumnType::Text);
        assert!(tab.rows.is_empty());

        let saved = AppData::from_json_str(&std::fs::read_to_string(backup).unwrap()).unwrap();
        assert_eq!(saved.tabs.len(), 2);
    }

    #[tokio::test]
    async fn test_restore_replaces_document_and_keeps_safety_copy() {
        let (service, data, _temp) = create_test_service().await;
        let backup = service.create_backup(&sample_document()).await.unwrap();
        data.replace_document(AppData::with_default_tab()).await.unwrap();

        let outcome = service.restore(&data, &backup).await.unwrap();

        assert_eq!(outcome.restored_from, backup);
        let file_name = outcome.safety_backup.file_name().unwrap().to_string_lossy();
        assert!(file_name.starts_with("backup_before_restore_"));

        let document = data.snapshot().await;
        assert_eq!(document.tabs.len(), 2);
        assert_eq!(document.tabs[0].rows.len(), 1);

        let safety =
            AppData::from_json_str(&std::fs::read_to_string(&outcome.safety_backup).unwrap())
                .unwrap();
        assert_eq!(safety.tabs[0].name, "Daily Plan");
    }

    #[tokio::test]
    async fn test_restore_invalid_backup_changes_nothing() {
        let (service, data, temp) = create_test_service().await;
        data.replace_document(sample_document()).await.unwrap();
        let bad = temp.path().join("backups").join("backup_20240101_000000.json");
        std::fs::create_dir_all(bad.parent().unwrap()).unwrap();
        std::fs::write(&bad, "{ truncated").unwrap();

        let result = service.restore(&data, &bad).await;

        assert!(matches!(result, Err(AppError::Restore(_))));
        assert_eq!(data.snapshot().await.tabs.len(), 2);
        assert_eq!(service.list_backups().await.unwrap().len(), 1);
    }
}
