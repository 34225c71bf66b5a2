//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MIDSEARCH_CONFIG` (environment variable)
//! 2. `~/.config/midsearch/config.toml` (Linux/macOS)
//!    `%APPDATA%\midsearch\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Provider entries (`[providers.<name>]`) are layered on top of the
//! built-in provider table, and an optional providers file on top of that.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::search::deep::DeepOptions;
use crate::search::SearchOptions;

/// Default IMAPS port.
pub const DEFAULT_PORT: u16 = 993;

/// Default socket timeout for the IMAP connection.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Server and account defaults.
    pub connection: ConnectionConfig,
    /// Search tuning.
    pub search: SearchConfig,
    /// Export defaults.
    pub export: ExportConfig,
    /// Provider overrides, layered on the built-in table.
    pub providers: BTreeMap<String, Provider>,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Server and account defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Provider name to take host and port from.
    pub provider: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    /// Socket read/write timeout in seconds; 0 disables it.
    pub timeout_secs: u64,
}

/// Search tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Run the deep search when the exact search finds nothing.
    pub deep: bool,
    /// Days on each side of the reference date.
    pub window_days: u32,
    /// Upper bound on deep-search candidates per mailbox.
    pub max_candidates: usize,
    /// Messages per header FETCH.
    pub fetch_batch_size: usize,
    /// Mailboxes searched when none are requested.
    pub default_mailboxes: Vec<String>,
    /// Stop at the first mailbox containing a target.
    pub first_match_only: bool,
    /// Write a row for targets found nowhere.
    pub include_missing: bool,
}

/// Export defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Default CSV output path.
    pub output: PathBuf,
    /// Prefix the CSV with a UTF-8 BOM (Excel).
    pub utf8_bom: bool,
}

/// One IMAP provider entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            provider: None,
            host: None,
            port: DEFAULT_PORT,
            user: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        let defaults = DeepOptions::default();
        Self {
            deep: true,
            window_days: defaults.window_days,
            max_candidates: defaults.max_candidates,
            fetch_batch_size: defaults.fetch_batch_size,
            default_mailboxes: [
                "INBOX",
                "Trash",
                "Junk",
                "Spam",
                "Sent",
                "Drafts",
                "Archive",
                "[Gmail]/All Mail",
                "[Gmail]/Trash",
                "[Gmail]/Spam",
                "[Gmail]/Sent Mail",
                "[Gmail]/Drafts",
            ]
            .map(String::from)
            .to_vec(),
            first_match_only: false,
            include_missing: false,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("imap_messageid_matches.csv"),
            utf8_bom: false,
        }
    }
}

impl SearchConfig {
    /// Search options as configured (CLI flags are applied on top).
    pub fn to_options(&self) -> SearchOptions {
        SearchOptions {
            deep: self.deep,
            deep_options: DeepOptions {
                window_days: self.window_days,
                max_candidates: self.max_candidates,
                fetch_batch_size: self.fetch_batch_size,
            },
            reference_date: None,
            first_match_only: self.first_match_only,
            include_missing: self.include_missing,
        }
    }
}

// ── Providers ───────────────────────────────────────────────────

/// The built-in provider table.
pub fn builtin_providers() -> BTreeMap<String, Provider> {
    [
        ("gmail", "imap.gmail.com"),
        ("outlook", "outlook.office365.com"),
        ("yahoo", "imap.mail.yahoo.com"),
        ("icloud", "imap.mail.me.com"),
    ]
    .into_iter()
    .map(|(name, server)| {
        (
            name.to_string(),
            Provider {
                server: server.to_string(),
                port: DEFAULT_PORT,
            },
        )
    })
    .collect()
}

/// Layer `overrides` onto `base` key by key (names compared case-insensitively).
pub fn merge_providers(
    base: &mut BTreeMap<String, Provider>,
    overrides: BTreeMap<String, Provider>,
) {
    for (name, provider) in overrides {
        let key = name.to_lowercase();
        base.retain(|existing, _| existing.to_lowercase() != key);
        base.insert(name, provider);
    }
}

/// Read a TOML providers file: a table of `name = { server, port }`.
pub fn load_providers_file(path: &Path) -> Result<BTreeMap<String, Provider>> {
    let contents = std::fs::read_to_string(path).map_err(|e| SearchError::io(path, e))?;
    toml::from_str(&contents)
        .map_err(|e| SearchError::Config(format!("{}: {e}", path.display())))
}

impl Config {
    /// Built-in providers, then config-file overrides, then `extra_file`.
    pub fn providers(&self, extra_file: Option<&Path>) -> Result<BTreeMap<String, Provider>> {
        let mut merged = builtin_providers();
        merge_providers(&mut merged, self.providers.clone());
        if let Some(path) = extra_file {
            merge_providers(&mut merged, load_providers_file(path)?);
            tracing::info!(path = %path.display(), "Loaded providers file");
        }
        Ok(merged)
    }
}

/// Look a provider up by name, ignoring case.
pub fn find_provider<'a>(
    providers: &'a BTreeMap<String, Provider>,
    name: &str,
) -> Option<&'a Provider> {
    providers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, p)| p)
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MIDSEARCH_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("midsearch").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("midsearch")
}
