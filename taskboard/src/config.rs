//! Application configuration constants
//!
//! Central location for file layout, persistence timings, and the
//! thresholds used by the data service.

// ===== Data Directory Layout =====

/// Directory name under the per-user data directory
pub const APP_DIR_NAME: &str = "BfTaskBoard";

/// Environment variable that overrides the data directory
pub const DATA_DIR_ENV: &str = "TASKBOARD_DATA_DIR";

/// Main document file
pub const DATA_FILE_NAME: &str = "data.json";
/// Directory holding files referenced by Image cells
pub const IMAGES_DIR_NAME: &str = "images";
/// Directory holding whole-document snapshots
pub const BACKUPS_DIR_NAME: &str = "backups";

pub const HIDDEN_TABS_FILE_NAME: &str = "hidden_tabs.json";
pub const LANGUAGE_FILE_NAME: &str = "language.json";
pub const THEME_FILE_NAME: &str = "theme.json";
pub const AI_CONFIG_FILE_NAME: &str = "ai_config.json";

// ===== Persistence =====

/// Trailing-edge debounce applied to document saves
pub const DEFAULT_SAVE_DELAY_MS: u64 = 500;

/// Documents with more tabs than this are written compact
pub const COMPACT_TAB_THRESHOLD: usize = 10;

/// Documents with any tab holding more rows than this are written compact
pub const COMPACT_ROW_THRESHOLD: usize = 500;

/// On-disk size above which a performance advisory is raised (10 MB)
pub const SIZE_ADVISORY_BYTES: u64 = 10 * 1024 * 1024;

/// Minimum time between two size advisories (1 hour)
pub const SIZE_ADVISORY_INTERVAL_SECS: u64 = 60 * 60;

/// Capacity of the data event broadcast channel.
/// Slow subscribers skip events rather than stall the service.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// ===== Document Defaults =====

pub const DEFAULT_TAB_NAME: &str = "New Tab";
/// Name of the single tab left behind by a cut
pub const CUT_TAB_NAME: &str = "New Task List";
pub const DEFAULT_COLUMN_NAME: &str = "New Column";
pub const DEFAULT_DOT_COLOR: &str = "#757575";
pub const DEFAULT_OPTION_COLOR: &str = "#FFFFFF";

/// Number of sample non-numeric values reported by a column sum
pub const SUM_INVALID_SAMPLE_LIMIT: usize = 5;

// ===== Backups =====

/// Timestamp format embedded in backup file names
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const BACKUP_PREFIX: &str = "backup_";
pub const PRE_RESTORE_BACKUP_PREFIX: &str = "backup_before_restore_";

// ===== Preferences =====

/// Languages the UI ships translations for
pub const SUPPORTED_LANGUAGES: &[&str] = &["zh-CN", "en-US"];
pub const FALLBACK_LANGUAGE: &str = "en-US";

/// Keyring service name for stored secrets
pub const CREDENTIAL_SERVICE_NAME: &str = "BfTaskBoard";
