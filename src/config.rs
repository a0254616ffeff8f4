//! Configuration layering: CLI flags override a TOML config file, which overrides
//! built-in defaults. Mirrors the teacher's `load_file_config`/`default_db_path`
//! pattern (`main.rs` in the source this crate started from).

use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const TAU_SOFT_DEFAULT: i64 = 50_000;
pub const TAU_HARD_DEFAULT: i64 = 200_000;
pub const BLOCK_MIN_DEFAULT: usize = 5;
pub const BLOCK_MAX_DEFAULT: usize = 15;
pub const CONDENSATION_THRESHOLD_DEFAULT: usize = 5;

/// Resolved configuration for one run of the `lcm` binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub state_dir: PathBuf,
    pub tau_soft: i64,
    pub tau_hard: i64,
    pub block_min: usize,
    pub block_max: usize,
    pub condensation_threshold: usize,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key_env: String,
}

/// Deserialized shape of an optional `~/.config/lcm/config.toml`.
#[derive(Deserialize, Default)]
pub struct FileConfig {
    pub db_path: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub tau_soft: Option<i64>,
    pub tau_hard: Option<i64>,
    pub block_min: Option<usize>,
    pub block_max: Option<usize>,
    pub condensation_threshold: Option<usize>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key_env: Option<String>,
}

/// `${HOME}/.lcm`, the default root for both the database and the state directory.
pub fn default_lcm_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".lcm"))
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("LCM_DB_PATH") {
        return Some(PathBuf::from(p));
    }
    default_lcm_dir().map(|d| d.join("lcm.db"))
}

pub fn default_state_dir() -> Option<PathBuf> {
    default_lcm_dir().map(|d| d.join("state"))
}

pub fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("lcm/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

/// Overrides carried on the command line; `None` means "use file config or default".
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
}

impl Config {
    pub fn resolve(overrides: ConfigOverrides, file_cfg: FileConfig) -> Result<Self> {
        let db_path = overrides
            .db_path
            .or(file_cfg.db_path)
            .or_else(default_db_path)
            .ok_or_else(|| eyre!("Could not determine database path; set LCM_DB_PATH or db_path in config.toml"))?;

        let state_dir = overrides
            .state_dir
            .or(file_cfg.state_dir)
            .or_else(default_state_dir)
            .ok_or_else(|| eyre!("Could not determine state directory"))?;

        Ok(Config {
            db_path,
            state_dir,
            tau_soft: file_cfg.tau_soft.unwrap_or(TAU_SOFT_DEFAULT),
            tau_hard: file_cfg.tau_hard.unwrap_or(TAU_HARD_DEFAULT),
            block_min: file_cfg.block_min.unwrap_or(BLOCK_MIN_DEFAULT),
            block_max: file_cfg.block_max.unwrap_or(BLOCK_MAX_DEFAULT),
            condensation_threshold: file_cfg
                .condensation_threshold
                .unwrap_or(CONDENSATION_THRESHOLD_DEFAULT),
            llm_base_url: file_cfg
                .llm_base_url
                .unwrap_or_else(|| "https://api.anthropic.com/v1".to_string()),
            llm_model: file_cfg
                .llm_model
                .unwrap_or_else(|| "claude-sonnet".to_string()),
            llm_api_key_env: file_cfg
                .llm_api_key_env
                .unwrap_or_else(|| "LCM_LLM_API_KEY".to_string()),
        })
    }
}
