//! Configuration module for mailbox identities and bridge settings
//!
//! Configuration is read from a `key=value` properties file (`#` starts a
//! comment, blank lines are ignored). A missing file yields full defaults with
//! a warning; a malformed value is a hard error. The path is resolved from the
//! `--config` flag, then the `MAIL_BRIDGE_CONFIG` environment variable, then
//! `config.properties` in the working directory.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Environment variable consulted when no `--config` flag is given
const CONFIG_PATH_ENV: &str = "MAIL_BRIDGE_CONFIG";
/// Default properties file name
const DEFAULT_CONFIG_FILE: &str = "config.properties";

/// Bridge-wide configuration
///
/// Cloned into MCP tool handlers via `Arc` for thread-safe shared access.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Email address of the shared mailbox; empty means not configured
    pub shared_mailbox_email: String,
    /// Display name fallback for the shared mailbox
    pub shared_mailbox_name: String,
    /// Personal mailbox retention hint in months (informational only)
    pub personal_retention_months: u32,
    /// Shared mailbox retention hint in months (informational only)
    pub shared_retention_months: u32,
    /// Global cap on returned records across all mailboxes
    pub max_search_results: usize,
    /// Body truncation at format time; 0 means unlimited
    pub max_body_chars: usize,
    /// Include Sent Items and Drafts in the search cascade
    pub search_all_folders: bool,
    /// Body characters considered during manual-iteration matching
    pub max_search_body_chars: usize,
    /// Per-attempt mail store connection deadline in minutes
    pub connection_timeout_minutes: u64,
    /// Chunk size for bulk record extraction and manual-scan paging
    pub batch_processing_size: usize,
    /// Retry attempts for the attach-or-launch connect sequence
    pub max_connection_retries: u32,
    /// Recipient list truncation at format time
    pub max_recipients_display: usize,
    /// Use the alternate login path that reduces permission prompts
    pub use_extended_mapi_login: bool,
    /// Flatten HTML-looking bodies to plain text at format time
    pub clean_html_content: bool,
    /// Result cache time-to-live in minutes
    pub cache_ttl_minutes: u64,
    /// Result cache capacity (LRU eviction when exceeded)
    pub cache_max_entries: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            shared_mailbox_email: String::new(),
            shared_mailbox_name: "Shared Mailbox".to_owned(),
            personal_retention_months: 6,
            shared_retention_months: 12,
            max_search_results: 500,
            max_body_chars: 0,
            search_all_folders: false,
            max_search_body_chars: 10_000,
            connection_timeout_minutes: 10,
            batch_processing_size: 50,
            max_connection_retries: 3,
            max_recipients_display: 10,
            use_extended_mapi_login: true,
            clean_html_content: true,
            cache_ttl_minutes: 60,
            cache_max_entries: 100,
        }
    }
}

impl BridgeConfig {
    /// Resolve the config path and load settings
    ///
    /// Missing file is not an error: defaults are used and a warning is
    /// logged, matching the behavior expected when the bridge is run before
    /// the operator has written a properties file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the file exists but holds a malformed
    /// typed value.
    pub fn load(cli_path: Option<PathBuf>) -> AppResult<Self> {
        let path = cli_path
            .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Load configuration from a specific properties file
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the file cannot be read and `InvalidInput` if a
    /// recognized key has a malformed value.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Internal(format!("cannot read config file: {e}")))?;
        let map = parse_properties(&raw);
        let config = Self::from_map(&map)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Build configuration from parsed key-value pairs with defaults
    fn from_map(map: &HashMap<String, String>) -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            shared_mailbox_email: get_string(map, "shared_mailbox_email", ""),
            shared_mailbox_name: get_string(map, "shared_mailbox_name", &defaults.shared_mailbox_name),
            personal_retention_months: get_u32(
                map,
                "personal_retention_months",
                defaults.personal_retention_months,
            )?,
            shared_retention_months: get_u32(
                map,
                "shared_retention_months",
                defaults.shared_retention_months,
            )?,
            max_search_results: get_usize(map, "max_search_results", defaults.max_search_results)?,
            max_body_chars: get_usize(map, "max_body_chars", defaults.max_body_chars)?,
            search_all_folders: get_bool(map, "search_all_folders", defaults.search_all_folders)?,
            max_search_body_chars: get_usize(
                map,
                "max_search_body_chars",
                defaults.max_search_body_chars,
            )?,
            connection_timeout_minutes: get_u64(
                map,
                "connection_timeout_minutes",
                defaults.connection_timeout_minutes,
            )?,
            batch_processing_size: get_usize(
                map,
                "batch_processing_size",
                defaults.batch_processing_size,
            )?,
            max_connection_retries: get_u32(
                map,
                "max_connection_retries",
                defaults.max_connection_retries,
            )?,
            max_recipients_display: get_usize(
                map,
                "max_recipients_display",
                defaults.max_recipients_display,
            )?,
            use_extended_mapi_login: get_bool(
                map,
                "use_extended_mapi_login",
                defaults.use_extended_mapi_login,
            )?,
            clean_html_content: get_bool(map, "clean_html_content", defaults.clean_html_content)?,
            cache_ttl_minutes: get_u64(map, "cache_ttl_minutes", defaults.cache_ttl_minutes)?,
            cache_max_entries: get_usize(map, "cache_max_entries", defaults.cache_max_entries)?,
        })
    }

    /// Whether a shared mailbox identity has been configured
    pub fn shared_configured(&self) -> bool {
        !self.shared_mailbox_email.trim().is_empty()
    }

    /// Per-attempt connection deadline as a `Duration`
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_minutes * 60)
    }

    /// Result cache TTL as a `Duration`
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }
}

/// Parse properties file content into key-value pairs
///
/// Skips blank lines and `#` comments. Lines without `=` are logged and
/// skipped rather than failing the whole load.
fn parse_properties(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (line_num, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                map.insert(key.trim().to_owned(), value.trim().to_owned());
            }
            None => {
                tracing::warn!(line = line_num + 1, "skipping malformed config line");
            }
        }
    }
    map
}

/// Read a string value with default fallback
fn get_string(map: &HashMap<String, String>, key: &str, default: &str) -> String {
    map.get(key).cloned().unwrap_or_else(|| default.to_owned())
}

/// Parse a boolean value with flexible spellings
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the key is set to an unrecognized value.
fn get_bool(map: &HashMap<String, String>, key: &str, default: bool) -> AppResult<bool> {
    match map.get(key) {
        Some(v) => parse_bool_value(v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean config value {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u32` value with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the key is set but not a valid `u32`.
fn get_u32(map: &HashMap<String, String>, key: &str, default: u32) -> AppResult<u32> {
    match map.get(key) {
        Some(v) => v.parse::<u32>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u32 config value {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

/// Parse a `u64` value with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the key is set but not a valid `u64`.
fn get_u64(map: &HashMap<String, String>, key: &str, default: u64) -> AppResult<u64> {
    match map.get(key) {
        Some(v) => v.parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 config value {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

/// Parse a `usize` value with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the key is set but not a valid `usize`.
fn get_usize(map: &HashMap<String, String>, key: &str, default: usize) -> AppResult<usize> {
    match map.get(key) {
        Some(v) => v.parse::<usize>().map_err(|_| {
            AppError::InvalidInput(format!("invalid usize config value {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}
