//! Toolkit settings with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or `PFUND_KIT_CONFIG`), then applies `PFUND_KIT_LOG_DIR` and
//! `PFUND_KIT_LOG_LEVEL` env overrides.
//!
//! ```toml
//! [kit]
//! log_dir = "~/.pfund-kit/logs"
//! log_level = "info"
//! lazy_logging = true
//! logging_config = "logging.toml"   # relative to this file
//! case_sensitive_aliases = false
//!
//! [aliases]
//! YF = "YAHOO_FINANCE"
//!
//! [settings]
//! data_path = "~/data"
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::alias::{AliasOptions, AliasRegistry};
use crate::error::KitError;
use crate::logging::{LoggingConfig, parse_level};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Fully-resolved toolkit configuration.
#[derive(Debug)]
pub struct Config {
    /// File the config was read from.
    pub source: PathBuf,
    /// Directory for log files (already expanded, no `~`).
    pub log_dir: PathBuf,
    pub log_level: String,
    /// Defer creating per-logger log files until first write.
    pub lazy_logging: bool,
    /// Logging config path, resolved against the config file's directory.
    pub logging_config: Option<PathBuf>,
    pub aliases: AliasRegistry,
    /// Free-form `[settings]` table.
    pub settings: toml::Table,
}

impl Config {
    /// Parse the file named by `logging_config`, if one is set.
    pub fn logging(&self) -> Result<Option<LoggingConfig>, KitError> {
        self.logging_config.as_deref().map(LoggingConfig::load).transpose()
    }
}

/// Raw TOML shape before resolution.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    kit: RawKit,
    #[serde(default)]
    aliases: toml::Table,
    #[serde(default)]
    settings: toml::Table,
}

#[derive(Deserialize)]
struct RawKit {
    #[serde(default = "default_log_dir")]
    log_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_true")]
    lazy_logging: bool,
    #[serde(default)]
    logging_config: Option<String>,
    #[serde(default = "default_true")]
    case_sensitive_aliases: bool,
}

impl Default for RawKit {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            lazy_logging: true,
            logging_config: None,
            case_sensitive_aliases: true,
        }
    }
}

fn default_log_dir() -> String {
    "~/.pfund-kit/logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Path of the config file: `PFUND_KIT_CONFIG` or [`DEFAULT_CONFIG_PATH`].
pub fn config_path() -> PathBuf {
    env::var_os("PFUND_KIT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load config from [`config_path`], then apply env-var overrides.
pub fn load() -> Result<Config, KitError> {
    load_at(&config_path())
}

/// Load config from `path`, then apply env-var overrides.
pub fn load_at(path: &Path) -> Result<Config, KitError> {
    let log_dir_override = env::var("PFUND_KIT_LOG_DIR").ok();
    let log_level_override = env::var("PFUND_KIT_LOG_LEVEL").ok();
    load_from(path, log_dir_override.as_deref(), log_level_override.as_deref())
}

/// Loader with an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    log_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, KitError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| KitError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| KitError::Config(format!("parse error in {}: {e}", path.display())))?;

    let k = parsed.kit;

    let log_dir = expand_home(log_dir_override.unwrap_or(&k.log_dir));
    let log_level = log_level_override.unwrap_or(&k.log_level).to_string();
    parse_level(&log_level)?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let logging_config = k.logging_config.map(|p| {
        let p = expand_home(&p);
        if p.is_absolute() { p } else { base.join(p) }
    });

    let aliases = AliasRegistry::from_table(
        &parsed.aliases,
        AliasOptions { case_sensitive: k.case_sensitive_aliases, allow_conflicts: false },
    )?;

    Ok(Config {
        source: path.to_path_buf(),
        log_dir,
        log_level,
        lazy_logging: k.lazy_logging,
        logging_config,
        aliases,
        settings: parsed.settings,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
