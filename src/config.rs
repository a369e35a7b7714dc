//! Configuration for sw.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SW_FOLDER, SW_AUTOCOMMIT, SW_LOCK)
//! 2. Project config file (.sw/config.yaml)
//! 3. User config file (<config dir>/sourcewrangler/config.yaml)
//! 4. Defaults (current directory, autocommit and locking on)
//!
//! The `--folder` flag overrides all of these; the CLI applies it on top.
//!
//! Config file discovery:
//! - Searches current directory and parents for .sw/config.yaml
//! - Paths in a project config are relative to the directory holding .sw/

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::manifest::CatalogOptions;

pub const CONFIG_DIR: &str = ".sw";
pub const CONFIG_FILE: &str = "config.yaml";

pub const ENV_FOLDER: &str = "SW_FOLDER";
pub const ENV_AUTOCOMMIT: &str = "SW_AUTOCOMMIT";
pub const ENV_LOCK: &str = "SW_LOCK";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    pub autocommit: Option<bool>,
    pub lock: Option<bool>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    /// Source folder to operate on
    pub folder: PathBuf,
    /// How the manifest is opened
    pub catalog: CatalogOptions,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Replace the folder, as `--folder` does
    pub fn with_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = folder.into();
        self
    }
}

/// Find the project config by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

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

/// Per-user config file, if one exists
fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("sourcewrangler").join(CONFIG_FILE))
        .filter(|path| path.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's base directory
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

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("Invalid value for {}: '{}' (expected true or false)", key, other),
    }
}

/// Load configuration as seen from `cwd`
fn load_config_in(
    cwd: &Path,
    user_config: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let project_config = find_config_file(cwd);

    let (config_file, base_dir, default_folder) = match project_config {
        Some(path) => {
            // Base directory is the parent of .sw/ (i.e., grandparent of config.yaml)
            let base = path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(cwd)
                .to_path_buf();
            (Some(path), base.clone(), base)
        }
        None => {
            let base = user_config
                .as_deref()
                .and_then(Path::parent)
                .unwrap_or(cwd)
                .to_path_buf();
            (user_config, base, cwd.to_path_buf())
        }
    };

    let file = config_file.as_deref().map(load_config_file).transpose()?;

    let folder = if let Some(env_folder) = env(ENV_FOLDER) {
        resolve_path(cwd, &env_folder)
    } else if let Some(ref folder) = file.as_ref().and_then(|f| f.folder.clone()) {
        resolve_path(&base_dir, folder)
    } else {
        default_folder
    };

    let defaults = CatalogOptions::default();
    let from_file = file.map(|f| f.catalog).unwrap_or_default();

    let autocommit = match env(ENV_AUTOCOMMIT) {
        Some(raw) => parse_flag(ENV_AUTOCOMMIT, &raw)?,
        None => from_file.autocommit.unwrap_or(defaults.autocommit),
    };
    let lock = match env(ENV_LOCK) {
        Some(raw) => parse_flag(ENV_LOCK, &raw)?,
        None => from_file.lock.unwrap_or(defaults.lock),
    };

    Ok(ResolvedConfig {
        folder,
        catalog: CatalogOptions { autocommit, lock },
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_in(&cwd, user_config_file(), |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
