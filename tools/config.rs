use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use library::DEFAULT_JPEG_QUALITY;
use serde::{Deserialize, Serialize};

const DEFAULT_WORKERS: usize = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub workers: usize,
    pub follow_links: bool,
    pub jpeg_quality: u8,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            follow_links: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl CatalogConfig {
    fn normalized(mut self) -> Self {
        if self.workers == 0 {
            self.workers = DEFAULT_WORKERS;
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            self.jpeg_quality = DEFAULT_JPEG_QUALITY;
        }
        self
    }

    fn with_workers_override(mut self, value: Option<&str>) -> Self {
        if let Some(workers) = value.and_then(|v| v.trim().parse::<usize>().ok()) {
            if workers > 0 {
                self.workers = workers;
            }
        }
        self
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("CATALOG_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Missing file means defaults; nothing is written back.
pub fn load_config(path: &Path) -> Result<(CatalogConfig, bool), ConfigError> {
    let (config, loaded) = if path.exists() {
        let contents = fs::read_to_string(path)?;
        let config: CatalogConfig = if contents.trim().is_empty() {
            CatalogConfig::default()
        } else {
            serde_yaml::from_str(&contents)?
        };
        (config, true)
    } else {
        (CatalogConfig::default(), false)
    };
    let workers = env::var("CATALOG_WORKERS").ok();
    let config = config
        .normalized()
        .with_workers_override(workers.as_deref());
    Ok((config, loaded))
}
