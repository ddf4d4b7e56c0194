//! Application state and initialization
//!
//! Wires every service to one data directory. All services are created
//! here and reached through [`AppState`].

use crate::config::{APP_DIR_NAME, BACKUPS_DIR_NAME, CUT_TAB_NAME, DATA_DIR_ENV};
use crate::error::{AppError, Result};
use crate::models::Tab;
use crate::services::{
    BackupService, CredentialService, DataService, DataServiceConfig, LoadOutcome,
    RestoreOutcome, SettingsService,
};
use std::path::{Path, PathBuf};

/// Per-user data directory, e.g. `%APPDATA%\BfTaskBoard` on Windows.
///
/// `TASKBOARD_DATA_DIR` overrides the platform location.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    directories::BaseDirs::new()
        .map(|dirs| dirs.data_dir().join(APP_DIR_NAME))
        .ok_or_else(|| AppError::Generic("Failed to resolve user data directory".to_string()))
}

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub data: DataService,
    pub settings: SettingsService,
    pub backups: BackupService,
    pub credentials: CredentialService,
}

impl AppState {
    /// Open the board stored in `data_dir`, keeping secrets in the OS keyring
    pub async fn open(data_dir: PathBuf) -> Result<Self> {
        Self::open_with(DataServiceConfig::new(data_dir), CredentialService::os()).await
    }

    pub async fn open_with(config: DataServiceConfig, credentials: CredentialService) -> Result<Self> {
        tracing::info!("Initializing application in {:?}", config.data_dir);

        let data_dir = config.data_dir.clone();
        let data = DataService::open(config).await?;
        let settings = SettingsService::new(data_dir.clone(), credentials.clone());
        let backups = BackupService::new(data_dir.join(BACKUPS_DIR_NAME));

        let state = Self {
            data_dir,
            data,
            settings,
            backups,
            credentials,
        };

        // Deleted tabs must not linger in the hidden set. A recovered board
        // is empty, so pruning would wipe entries for the preserved copy.
        if matches!(state.data.load_outcome(), LoadOutcome::Recovered { .. }) {
            tracing::info!("Board was recovered; keeping hidden tab entries");
        } else {
            let snapshot = state.data.snapshot().await;
            if let Err(e) = state.settings.prune_hidden_tabs(&snapshot).await {
                tracing::warn!("Failed to prune hidden tabs: {}", e);
            }
        }

        tracing::info!("Application initialized successfully");

        Ok(state)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Add the starter "Daily Plan" tab when the document has no tabs.
    /// Returns whether a tab was added.
    pub async fn ensure_default_tab(&self) -> Result<bool> {
        let shared = self.data.app_data();
        let mut doc = shared.write().await;
        if !doc.tabs.is_empty() {
            return Ok(false);
        }

        doc.add_tab(Tab::daily_plan());
        self.data.notify_changed(None)?;
        tracing::info!("Created default tab");
        Ok(true)
    }

    /// Back up and clear the board, leaving one empty task list
    pub async fn cut_and_backup(&self) -> Result<PathBuf> {
        let backup = self.backups.cut(&self.data, CUT_TAB_NAME).await?;
        self.settings.clear_hidden_tabs().await?;
        Ok(backup)
    }

    pub async fn restore_backup(&self, backup_path: &Path) -> Result<RestoreOutcome> {
        let outcome = self.backups.restore(&self.data, backup_path).await?;
        self.settings.clear_hidden_tabs().await?;
        Ok(outcome)
    }

    /// Flush pending changes and stop background work
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down");
        self.data.shutdown().await
    }
}
