//! Credential service
//!
//! Keeps the AI provider API key out of plaintext side files by storing it
//! in the OS credential store (Windows Credential Manager) via `keyring`.

use crate::config::CREDENTIAL_SERVICE_NAME;
use crate::error::{AppError, Result};
use keyring::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const AI_API_KEY: &str = "ai_api_key";

/// Backend that holds named secrets
pub trait SecretStore: Send + Sync {
    fn set(&self, key: &str, secret: &str) -> Result<()>;
    /// `None` when no secret is stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Succeeds when the secret is already absent
    fn delete(&self, key: &str) -> Result<()>;
}

/// Secret store backed by the operating system keyring
#[derive(Debug, Clone)]
pub struct OsSecretStore {
    service: String,
}

impl OsSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key)
            .map_err(|e| AppError::Credential(format!("Failed to create keyring entry: {}", e)))
    }
}

impl Default for OsSecretStore {
    fn default() -> Self {
        Self::new(CREDENTIAL_SERVICE_NAME)
    }
}

impl SecretStore for OsSecretStore {
    fn set(&self, key: &str, secret: &str) -> Result<()> {
        self.entry(key)?
            .set_password(secret)
            .map_err(|e| AppError::Credential(format!("Failed to store secret: {}", e)))
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AppError::Credential(format!(
                "Failed to retrieve secret: {}",
                e
            ))),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AppError::Credential(format!(
                "Failed to delete secret: {}",
                e
            ))),
        }
    }
}

/// Process-local secret store, for tests and headless runs
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn secrets(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.secrets
            .lock()
            .map_err(|_| AppError::Credential("Secret store lock poisoned".to_string()))
    }
}

impl SecretStore for InMemorySecretStore {
    fn set(&self, key: &str, secret: &str) -> Result<()> {
        self.secrets()?.insert(key.to_string(), secret.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.secrets()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.secrets()?.remove(key);
        Ok(())
    }
}

/// API key storage for the AI assistant
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn SecretStore>,
}

impl CredentialService {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Service backed by the OS keyring
    pub fn os() -> Self {
        Self::new(Arc::new(OsSecretStore::default()))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySecretStore::new()))
    }

    pub fn store_api_key(&self, api_key: &str) -> Result<()> {
        self.store.set(AI_API_KEY, api_key)?;
        tracing::info!("API key stored in credential store");
        Ok(())
    }

    pub fn get_api_key(&self) -> Result<Option<String>> {
        self.store.get(AI_API_KEY)
    }

    pub fn delete_api_key(&self) -> Result<()> {
        self.store.delete(AI_API_KEY)?;
        tracing::info!("API key removed from credential store");
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        matches!(self.store.get(AI_API_KEY), Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_lifecycle() {
        let service = CredentialService::in_memory();
        assert!(!service.has_api_key());
        assert_eq!(service.get_api_key().unwrap(), None);

        service.store_api_key("sk-test").unwrap();
        assert!(service.has_api_key());
        assert_eq!(service.get_api_key().unwrap().as_deref(), Some("sk-test"));

        service.store_api_key("sk-rotated").unwrap();
        assert_eq!(service.get_api_key().unwrap().as_deref(), Some("sk-rotated"));

        service.delete_api_key().unwrap();
        assert!(!service.has_api_key());
    }

    #[test]
    fn test_delete_missing_key_is_ok() {
        let service = CredentialService::in_memory();
        service.delete_api_key().unwrap();
        service.delete_api_key().unwrap();
    }

    #[test]
    fn test_clones_share_store() {
        let service = CredentialService::in_memory();
        let clone = service.clone();

        service.store_api_key("shared").unwrap();

        assert_eq!(clone.get_api_key().unwrap().as_deref(), Some("shared"));
    }
}
