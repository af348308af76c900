use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

/// Reads `KEY=value` lines from `config/local.env` into the process
/// environment. Variables that are already set win.
pub fn load_local_env_overrides() {
    let path = Path::new("config/local.env");
    if !path.exists() {
        return;
    }

    match stdfs::read_to_string(path) {
        Ok(contents) => {
            for (key, value) in parse_env_lines(&contents) {
                if env::var(&key).is_err() {
                    env::set_var(key, value);
                }
            }
        }
        Err(err) => {
            eprintln!("failed to read {}: {err}", path.display());
        }
    }
}

fn parse_env_lines(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), unquote(value)))
        .collect()
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
    } else {
        value.to_string()
    }
}

/// `RUST_LOG` overrides `level`; `debug` forces debug output.
pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// `None` when defaults were used.
    pub path: Option<PathBuf>,
}

pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config/cartwright.yaml")];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("cartwright");
        dir.push("config.yaml");
        paths.push(dir);
    }
    paths
}

/// Explicit path first, then `./config/cartwright.yaml`, then the user
/// config dir, then defaults. Environment overrides apply last.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let candidate = match config_path {
        Some(path) => Some(path.clone()),
        None => default_config_paths().into_iter().find(|path| path.exists()),
    };

    let mut loaded = match candidate {
        Some(path) => {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = AppConfig::from_yaml_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            info!("Loaded configuration from: {}", path.display());
            LoadedConfig {
                config,
                path: Some(path),
            }
        }
        None => {
            warn!("No config file found, using defaults");
            LoadedConfig {
                config: AppConfig::default(),
                path: None,
            }
        }
    };
    loaded.config.apply_env_overrides();
    Ok(loaded)
}
