//! Settings service
//!
//! Small preference files kept next to `data.json`. Preferences are not
//! data: a missing or unreadable file falls back to its default instead
//! of failing, while save failures are reported to the caller.

use crate::config::{
    AI_CONFIG_FILE_NAME, FALLBACK_LANGUAGE, HIDDEN_TABS_FILE_NAME, LANGUAGE_FILE_NAME,
    SUPPORTED_LANGUAGES, THEME_FILE_NAME,
};
use crate::error::{AppError, Result};
use crate::models::AppData;
use crate::services::credentials::CredentialService;
use crate::storage::JsonFile;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Tab id → hidden flag
pub type HiddenTabs = BTreeMap<String, bool>;

/// UI colour scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    const ALL: [(Theme, &'static str); 2] = [(Theme::Dark, "Dark"), (Theme::Light, "Light")];
}

/// Remote model used by the AI assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AiProvider {
    #[default]
    OpenAI,
    DeepSeek,
    Claude,
}

impl AiProvider {
    const ALL: [(AiProvider, &'static str); 3] = [
        (AiProvider::OpenAI, "OpenAI"),
        (AiProvider::DeepSeek, "DeepSeek"),
        (AiProvider::Claude, "Claude"),
    ];
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Enums were written as their index by older builds
#[derive(Deserialize)]
#[serde(untagged)]
enum NameOrIndex {
    Name(String),
    Index(u64),
}

fn name_or_index<'de, D, T>(deserializer: D, variants: &[(T, &str)]) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Copy,
{
    let found = match NameOrIndex::deserialize(deserializer)? {
        NameOrIndex::Name(name) => variants
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(&name))
            .map(|(v, _)| *v),
        NameOrIndex::Index(index) => usize::try_from(index)
            .ok()
            .and_then(|i| variants.get(i))
            .map(|(v, _)| *v),
    };
    found.ok_or_else(|| serde::de::Error::custom("unknown variant"))
}

impl<'de> Deserialize<'de> for Theme {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        name_or_index(deserializer, &Theme::ALL)
    }
}

impl<'de> Deserialize<'de> for AiProvider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        name_or_index(deserializer, &AiProvider::ALL)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguageSettings {
    #[serde(rename = "Language")]
    language: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ThemeSettings {
    #[serde(rename = "Theme", default)]
    theme: Theme,
}

/// AI assistant configuration. The API key is kept in the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub provider: AiProvider,
}

/// On-disk shape, including the plaintext key written by older builds
#[derive(Debug, Deserialize)]
struct StoredAiConfig {
    #[serde(default)]
    provider: AiProvider,
    #[serde(default, rename = "apiKey")]
    api_key: Option<String>,
}

/// Map a locale such as "zh_CN.UTF-8" to a supported UI language
pub fn language_from_locale(locale: &str) -> &'static str {
    if locale.to_ascii_lowercase().starts_with("zh") {
        "zh-CN"
    } else {
        FALLBACK_LANGUAGE
    }
}

/// UI language derived from the process locale
pub fn system_language() -> &'static str {
    let locale = ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_default();
    language_from_locale(&locale)
}

fn normalize_language(language: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|supported| supported.eq_ignore_ascii_case(language.trim()))
        .copied()
}

/// Service for the preference side files
#[derive(Clone)]
pub struct SettingsService {
    data_dir: PathBuf,
    credentials: CredentialService,
}

impl SettingsService {
    pub fn new(app_data_dir: PathBuf, credentials: CredentialService) -> Self {
        Self {
            data_dir: app_data_dir,
            credentials,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn file(&self, name: &str) -> JsonFile {
        JsonFile::new(self.data_dir.join(name))
    }

    /// Read and parse a side file. `None` when missing or unreadable.
    async fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let file = self.file(name);
        let content = match file.read().await {
            Ok(content) => content?,
            Err(e) => {
                tracing::warn!("Failed to read {:?}, using defaults: {}", file.path(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Failed to parse {:?}, using defaults: {}", file.path(), e);
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        self.file(name).write_atomic(content.as_bytes()).await?;
        tracing::debug!("Saved {}", name);
        Ok(())
    }

    /// Write a default for a missing file; failure only costs a warning
    async fn write_default<T: Serialize>(&self, name: &str, value: &T) {
        if let Err(e) = self.write(name, value).await {
            tracing::warn!("Failed to create default {}: {}", name, e);
        }
    }

    // ===== Hidden tabs =====

    pub async fn load_hidden_tabs(&self) -> HiddenTabs {
        self.read(HIDDEN_TABS_FILE_NAME).await.unwrap_or_default()
    }

    pub async fn save_hidden_tabs(&self, hidden: &HiddenTabs) -> Result<()> {
        self.write(HIDDEN_TABS_FILE_NAME, hidden).await
    }

    pub async fn is_tab_hidden(&self, tab_id: &str) -> bool {
        self.load_hidden_tabs()
            .await
            .get(tab_id)
            .copied()
            .unwrap_or(false)
    }

    pub async fn set_tab_hidden(&self, tab_id: &str, hidden: bool) -> Result<()> {
        let mut tabs = self.load_hidden_tabs().await;
        if hidden {
            tabs.insert(tab_id.to_string(), true);
        } else {
            tabs.remove(tab_id);
        }
        self.save_hidden_tabs(&tabs).await
    }

    pub async fn clear_hidden_tabs(&self) -> Result<()> {
        self.save_hidden_tabs(&HiddenTabs::new()).await?;
        tracing::info!("Hidden tabs cleared");
        Ok(())
    }

    /// Drop entries for tabs that no longer exist. Returns how many went.
    pub async fn prune_hidden_tabs(&self, data: &AppData) -> Result<usize> {
        let mut tabs = self.load_hidden_tabs().await;
        let before = tabs.len();
        tabs.retain(|id, _| data.tab(id).is_some());

        let removed = before - tabs.len();
        if removed > 0 {
            self.save_hidden_tabs(&tabs).await?;
            tracing::debug!("Pruned {} stale hidden tab entries", removed);
        }
        Ok(removed)
    }

    // ===== Language =====

    /// Current UI language; creates the file from the system locale if missing
    pub async fn load_language(&self) -> String {
        let Some(settings) = self.read::<LanguageSettings>(LANGUAGE_FILE_NAME).await else {
            let language = system_language();
            if !self.file(LANGUAGE_FILE_NAME).path().exists() {
                self.write_default(
                    LANGUAGE_FILE_NAME,
                    &LanguageSettings {
                        language: language.to_string(),
                    },
                )
                .await;
            }
            return language.to_string();
        };

        match normalize_language(&settings.language) {
            Some(language) => language.to_string(),
            None => {
                tracing::warn!(
                    "Unsupported language {:?}, falling back to {}",
                    settings.language,
                    FALLBACK_LANGUAGE
                );
                FALLBACK_LANGUAGE.to_string()
            }
        }
    }

    pub async fn set_language(&self, language: &str) -> Result<()> {
        let language = normalize_language(language)
            .ok_or_else(|| AppError::Generic(format!("Unsupported language: {}", language)))?;

        self.write(
            LANGUAGE_FILE_NAME,
            &LanguageSettings {
                language: language.to_string(),
            },
        )
        .await?;
        tracing::info!("Language set to {}", language);
        Ok(())
    }

    // ===== Theme =====

    pub async fn load_theme(&self) -> Theme {
        match self.read::<ThemeSettings>(THEME_FILE_NAME).await {
            Some(settings) => settings.theme,
            None => {
                if !self.file(THEME_FILE_NAME).path().exists() {
                    self.write_default(THEME_FILE_NAME, &ThemeSettings { theme: Theme::Dark })
                        .await;
                }
                Theme::Dark
            }
        }
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.write(THEME_FILE_NAME, &ThemeSettings { theme }).await?;
        tracing::info!("Theme set to {:?}", theme);
        Ok(())
    }

    // ===== AI assistant =====

    /// Load the AI configuration, moving any plaintext API key into the
    /// credential store and rewriting the file without it.
    pub async fn load_ai_config(&self) -> AiConfig {
        let Some(stored) = self.read::<StoredAiConfig>(AI_CONFIG_FILE_NAME).await else {
            return AiConfig::default();
        };
        let config = AiConfig {
            provider: stored.provider,
        };

        if let Some(api_key) = stored.api_key.filter(|key| !key.is_empty()) {
            match self.credentials.store_api_key(&api_key) {
                Ok(()) => match self.write(AI_CONFIG_FILE_NAME, &config).await {
                    Ok(()) => tracing::info!("Migrated plaintext API key to credential store"),
                    Err(e) => tracing::warn!("Failed to rewrite AI config after migration: {}", e),
                },
                // Leave the file alone so the key is not lost
                Err(e) => tracing::warn!("Failed to migrate plaintext API key: {}", e),
            }
        }

        config
    }

    /// Save the provider and, when given, the API key
    pub async fn save_ai_config(&self, config: AiConfig, api_key: Option<&str>) -> Result<()> {
        match api_key {
            Some(key) if !key.is_empty() => self.credentials.store_api_key(key)?,
            Some(_) => self.credentials.delete_api_key()?,
            None => {}
        }

        self.write(AI_CONFIG_FILE_NAME, &config).await?;
        tracing::info!("AI provider set to {}", config.provider);
        Ok(())
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tab;
    use tempfile::TempDir;

    fn create_test_service() -> (SettingsService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service =
            SettingsService::new(temp_dir.path().to_path_buf(), CredentialService::in_memory());
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_hidden_tabs_set_and_clear() {
        let (service, _temp) = create_test_service();
        assert!(service.load_hidden_tabs().await.is_empty());

        service.set_tab_hidden("a", true).await.unwrap();
        service.set_tab_hidden("b", true).await.unwrap();
        service.set_tab_hidden("b", false).await.unwrap();

        assert!(service.is_tab_hidden("a").await);
        assert!(!service.is_tab_hidden("b").await);

        service.clear_hidden_tabs().await.unwrap();
        assert!(service.load_hidden_tabs().await.is_empty());
    }

    #[tokio::test]
    async fn test_prune_hidden_tabs() {
        let (service, _temp) = create_test_service();
        let mut data = AppData::new();
        let kept = data.add_tab(Tab::new("Kept")).id.clone();

        service.set_tab_hidden(&kept, true).await.unwrap();
        service.set_tab_hidden("deleted-tab", true).await.unwrap();

        let removed = service.prune_hidden_tabs(&data).await.unwrap();

        assert_eq!(removed, 1);
        let hidden = service.load_hidden_tabs().await;
        assert_eq!(hidden.len(), 1);
        assert!(hidden.contains_key(&kept));
    }

    #[tokio::test]
    async fn test_unreadable_hidden_tabs_fall_back_to_empty() {
        let (service, temp) = create_test_service();
        std::fs::write(temp.path().join("hidden_tabs.json"), "[oops").unwrap();

        assert!(service.load_hidden_tabs().await.is_empty());
    }

    #[test]
    fn test_language_from_locale() {
        assert_eq!(language_from_locale("zh_CN.UTF-8"), "zh-CN");
        assert_eq!(language_from_locale("zh-TW"), "zh-CN");
        assert_eq!(language_from_locale("en_GB.UTF-8"), "en-US");
        assert_eq!(language_from_locale("de_DE"), "en-US");
        assert_eq!(language_from_locale(""), "en-US");
    }

    #[tokio::test]
    async fn test_missing_language_file_is_created() {
        let (service, temp) = create_test_service();

        let language = service.load_language().await;

        assert!(SUPPORTED_LANGUAGES.contains(&language.as_str()));
        let content = std::fs::read_to_string(temp.path().join("language.json")).unwrap();
        assert!(content.contains("\"Language\""));
    }

    #[tokio::test]
    async fn test_unknown_language_falls_back() {
        let (service, temp) = create_test_service();
        std::fs::write(temp.path().join("language.json"), r#"{"Language":"fr-FR"}"#).unwrap();

        assert_eq!(service.load_language().await, "en-US");
    }

    #[tokio::test]
    async fn test_set_language() {
        let (service, _temp) = create_test_service();

        service.set_language("zh-cn").await.unwrap();
        assert_eq!(service.load_language().await, "zh-CN");

        assert!(service.set_language("fr-FR").await.is_err());
        assert_eq!(service.load_language().await, "zh-CN");
    }

    #[tokio::test]
    async fn test_theme_default_and_update() {
        let (service, temp) = create_test_service();

        assert_eq!(service.load_theme().await, Theme::Dark);
        assert!(temp.path().join("theme.json").exists());

        service.set_theme(Theme::Light).await.unwrap();
        assert_eq!(service.load_theme().await, Theme::Light);
    }

    #[tokio::test]
    async fn test_theme_accepts_legacy_index() {
        let (service, temp) = create_test_service();
        std::fs::write(temp.path().join("theme.json"), r#"{"Theme":1}"#).unwrap();

        assert_eq!(service.load_theme().await, Theme::Light);
    }

    #[tokio::test]
    async fn test_ai_key_migrates_out_of_plaintext() {
        let (service, temp) = create_test_service();
        let path = temp.path().join("ai_config.json");
        std::fs::write(&path, r#"{"provider":2,"apiKey":"sk-legacy"}"#).unwrap();

        let config = service.load_ai_config().await;

        assert_eq!(config.provider, AiProvider::Claude);
        assert_eq!(
            service.credentials().get_api_key().unwrap().as_deref(),
            Some("sk-legacy")
        );
        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(!rewritten.contains("sk-legacy"));
        assert!(rewritten.contains("Claude"));
    }

    #[tokio::test]
    async fn test_save_ai_config() {
        let (service, temp) = create_test_service();

        service
            .save_ai_config(
                AiConfig {
                    provider: AiProvider::DeepSeek,
                },
                Some("sk-new"),
            )
            .await
            .unwrap();

        assert_eq!(service.load_ai_config().await.provider, AiProvider::DeepSeek);
        assert!(service.credentials().has_api_key());
        let content = std::fs::read_to_string(temp.path().join("ai_config.json")).unwrap();
        assert!(!content.contains("sk-new"));

        service
            .save_ai_config(AiConfig::default(), Some(""))
            .await
            .unwrap();
        assert!(!service.credentials().has_api_key());
    }
}
