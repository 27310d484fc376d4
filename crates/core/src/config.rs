use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TracelinkError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub http_addr: String,
    pub count_threshold: usize,
    pub timeout_interval: Duration,
    pub tick_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_root = env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home).join(".local/share"));

        Self {
            db_path: data_root.join("tracelink/tracelink.duckdb"),
            http_addr: "127.0.0.1:8080".to_string(),
            count_threshold: 3,
            timeout_interval: Duration::from_secs(10),
            tick_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.count_threshold == 0 {
            return Err(TracelinkError::Config(
                "count_threshold must be at least 1".to_string(),
            ));
        }
        if self.timeout_interval.is_zero() {
            return Err(TracelinkError::Config(
                "timeout_interval must be non-zero".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(TracelinkError::Config(
                "tick_interval must be non-zero".to_string(),
            ));
        }
        if self.shutdown_grace.is_zero() {
            return Err(TracelinkError::Config(
                "shutdown_grace must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    db_path: Option<PathBuf>,
    http_addr: Option<String>,
    count_threshold: Option<usize>,
    timeout_interval: Option<String>,
    tick_interval: Option<String>,
    shutdown_grace: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TRACELINK_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("tracelink/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| TracelinkError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| TracelinkError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let count_threshold = match env::var("TRACELINK_COUNT_THRESHOLD") {
        Ok(v) => Some(v.parse::<usize>().map_err(|e| {
            TracelinkError::Config(format!("bad TRACELINK_COUNT_THRESHOLD in environment: {e}"))
        })?),
        Err(_) => None,
    };

    Ok(ConfigOverrides {
        db_path: env::var("TRACELINK_DB_PATH").ok().map(PathBuf::from),
        http_addr: env::var("TRACELINK_HTTP_ADDR").ok(),
        count_threshold,
        timeout_interval: env::var("TRACELINK_TIMEOUT_INTERVAL").ok(),
        tick_interval: env::var("TRACELINK_TICK_INTERVAL").ok(),
        shutdown_grace: env::var("TRACELINK_SHUTDOWN_GRACE").ok(),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.http_addr {
        cfg.http_addr = v;
    }
    if let Some(v) = overrides.count_threshold {
        cfg.count_threshold = v;
    }
    if let Some(v) = overrides.timeout_interval {
        cfg.timeout_interval = humantime::parse_duration(&v).map_err(|e| {
            TracelinkError::Config(format!("bad timeout_interval in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.tick_interval {
        cfg.tick_interval = humantime::parse_duration(&v).map_err(|e| {
            TracelinkError::Config(format!("bad tick_interval in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.shutdown_grace {
        cfg.shutdown_grace = humantime::parse_duration(&v).map_err(|e| {
            TracelinkError::Config(format!("bad shutdown_grace in {source}: {e} (value={v})"))
        })?;
    }
    Ok(())
}
