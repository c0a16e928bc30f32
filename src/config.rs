//! Configuration for papertrail.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (PAPERTRAIL_HOME, PAPERTRAIL_API_URL,
//!    PAPERTRAIL_API_KEY, PAPERTRAIL_MODEL)
//! 2. Config file (.papertrail/config.yaml)
//! 3. Defaults (~/.papertrail)
//!
//! Config file discovery:
//! - Searches current directory and parents for .papertrail/config.yaml
//! - Paths in the config file are relative to the .papertrail/ directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::PipelineLimits;

pub const ENV_HOME: &str = "PAPERTRAIL_HOME";
pub const ENV_API_URL: &str = "PAPERTRAIL_API_URL";
pub const ENV_API_KEY: &str = "PAPERTRAIL_API_KEY";
pub const ENV_MODEL: &str = "PAPERTRAIL_MODEL";

const CONFIG_DIR: &str = ".papertrail";
const CONFIG_FILE: &str = "config.yaml";

pub const DEFAULT_API_URL: &str = "https://ark.cn-beijing.volces.com/api/v3/chat/completions";
pub const DEFAULT_MODEL: &str = "doubao-seed-1-6-250615";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub llm: Option<LlmSection>,
    #[serde(default)]
    pub retention: Option<RetentionSection>,
    /// Any subset of the pipeline limits; omitted fields keep their defaults
    #[serde(default)]
    pub pipeline: Option<PipelineLimits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data directory (relative to .papertrail/)
    pub home: Option<String>,
    /// Downloaded PDF cache (relative to .papertrail/)
    pub pdfs: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmSection {
    pub api_url: Option<String>,
    pub model: Option<String>,
    /// Per-tier model names keyed by `lite`, `pro`, `reader`
    #[serde(default)]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionSection {
    pub hours: Option<u64>,
    pub sweep_interval_hours: Option<u64>,
}

/// Chat-completions endpoint settings
#[derive(Clone, PartialEq)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub models: HashMap<String, String>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("models", &self.models)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            models: HashMap::new(),
        }
    }
}

/// How long projects live and how often the sweeper looks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionSettings {
    pub hours: u64,
    pub sweep_interval_hours: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            hours: 24,
            sweep_interval_hours: 24,
        }
    }
}

impl RetentionSettings {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.hours as i64)
    }

    /// Sweep interval, never shorter than an hour
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours.max(1) * 3600)
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Data directory; projects live under `home/projects`
    pub home: PathBuf,
    /// PDF download cache
    pub pdfs: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub llm: LlmConfig,
    pub retention: RetentionSettings,
    pub pipeline: PipelineLimits,
}

impl ResolvedConfig {
    pub fn projects_dir(&self) -> PathBuf {
        self.home.join("projects")
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.pdfs.clone()
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".papertrail");

    let config_file = find_config_file();
    let file = match &config_file {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };

    Ok(resolve(
        default_home,
        config_file,
        file,
        |key| std::env::var(key).ok().filter(|v| !v.is_empty()),
    ))
}

/// Layer environment over file over defaults
fn resolve(
    default_home: PathBuf,
    config_file: Option<PathBuf>,
    file: Option<ConfigFile>,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let file = file.unwrap_or_default();

    // Relative paths in the file resolve against .papertrail/
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let home = if let Some(env_home) = env(ENV_HOME) {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = file.paths.home {
        resolve_path(&config_dir, home_path)
    } else {
        default_home
    };

    let pdfs = match file.paths.pdfs {
        Some(ref pdf_path) => resolve_path(&config_dir, pdf_path),
        None => home.join("pdfs"),
    };

    let llm_section = file.llm.unwrap_or_default();
    let llm = LlmConfig {
        api_url: env(ENV_API_URL)
            .or(llm_section.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        api_key: env(ENV_API_KEY),
        model: env(ENV_MODEL)
            .or(llm_section.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        models: llm_section.models,
    };

    let defaults = RetentionSettings::default();
    let retention = file
        .retention
        .map(|r| RetentionSettings {
            hours: r.hours.unwrap_or(defaults.hours),
            sweep_interval_hours: r
                .sweep_interval_hours
                .unwrap_or(defaults.sweep_interval_hours),
        })
        .unwrap_or(defaults);

    ResolvedConfig {
        home,
        pdfs,
        config_file,
        llm,
        retention,
        pipeline: file.pipeline.unwrap_or_default(),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Re-read configuration from all sources, bypassing the cache
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the papertrail data directory
pub fn papertrail_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}
