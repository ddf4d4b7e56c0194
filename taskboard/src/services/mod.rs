//! Services module
//!
//! Long-lived services that own persistence for the board and its side files.

pub mod backup;
pub mod credentials;
pub mod data;
pub mod settings;

pub use backup::{BackupInfo, BackupService, RestoreOutcome};
pub use credentials::{CredentialService, InMemorySecretStore, OsSecretStore, SecretStore};
pub use data::{DataEvent, DataService, DataServiceConfig, LoadOutcome, SharedAppData};
pub use settings::{AiConfig, AiProvider, HiddenTabs, SettingsService, Theme};
