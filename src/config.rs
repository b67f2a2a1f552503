use crate::constants;
use crate::discovery::BoundaryPolicy;
use crate::domain::Category;
use crate::error::{CurbsideError, Result};
use crate::geo::geohash;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub index: IndexConfig,
    pub discovery: DiscoveryConfig,
    pub lifecycle: LifecycleConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".to_string(), port: constants::DEFAULT_PORT }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Geohash characters per stored cell.
    pub precision: usize,
    /// Upper bound on cells scanned by one radius lookup.
    pub max_cover_cells: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            precision: constants::DEFAULT_INDEX_PRECISION,
            max_cover_cells: constants::DEFAULT_MAX_COVER_CELLS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub max_radius_m: f64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub boundary: BoundaryPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_radius_m: constants::MAX_RADIUS_M,
            default_page_size: constants::DEFAULT_PAGE_SIZE,
            max_page_size: constants::MAX_PAGE_SIZE,
            boundary: BoundaryPolicy::Inclusive,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub ttl_days: i64,
    /// Per-category TTL overrides keyed by category name (e.g. `outdoor = 3`).
    pub ttl_days_by_category: HashMap<String, i64>,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl_days: constants::DEFAULT_TTL_DAYS,
            ttl_days_by_category: HashMap::new(),
            sweep_interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_batch_size: constants::DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl LifecycleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Fraction of the search radius the user must move before re-querying.
    pub refresh_fraction: f64,
    pub query_timeout_secs: u64,
    pub query_retries: u32,
    pub base_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_fraction: constants::DEFAULT_REFRESH_FRACTION,
            query_timeout_secs: constants::DEFAULT_QUERY_TIMEOUT_SECS,
            query_retries: constants::DEFAULT_QUERY_RETRIES,
            base_url: format!("http://127.0.0.1:{}", constants::DEFAULT_PORT),
        }
    }
}

impl MonitorConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

fn env_override<T: FromStr>(key: &str, target: &mut T) -> Result<()> {
    if let Ok(raw) = std::env::var(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| CurbsideError::Config(format!("Invalid value for {key}: '{raw}'")))?;
    }
    Ok(())
}

impl Config {
    /// Load from `path` (or `curbside.toml` when present), then apply
    /// `CURBSIDE_*` environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Path::new(constants::DEFAULT_CONFIG_FILE);
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if default_path.exists() => Self::from_file(default_path)?,
            None => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CurbsideError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        env_override("CURBSIDE_BIND", &mut self.server.bind)?;
        env_override("CURBSIDE_PORT", &mut self.server.port)?;
        env_override("CURBSIDE_INDEX_PRECISION", &mut self.index.precision)?;
        env_override("CURBSIDE_MAX_RADIUS_M", &mut self.discovery.max_radius_m)?;
        env_override("CURBSIDE_TTL_DAYS", &mut self.lifecycle.ttl_days)?;
        env_override("CURBSIDE_SWEEP_INTERVAL_SECS", &mut self.lifecycle.sweep_interval_secs)?;
        env_override("CURBSIDE_MONITOR_BASE_URL", &mut self.monitor.base_url)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        geohash::validate_precision(self.index.precision)?;
        if self.index.max_cover_cells == 0 {
            return Err(CurbsideError::Config("index.max_cover_cells must be positive".into()));
        }
        if !(self.discovery.max_radius_m.is_finite() && self.discovery.max_radius_m > 0.0) {
            return Err(CurbsideError::Config("discovery.max_radius_m must be positive".into()));
        }
        if self.discovery.max_page_size == 0
            || self.discovery.default_page_size == 0
            || self.discovery.default_page_size > self.discovery.max_page_size
        {
            return Err(CurbsideError::Config(
                "discovery page sizes must satisfy 0 < default_page_size <= max_page_size".into(),
            ));
        }
        if !(1..=constants::MAX_TTL_DAYS).contains(&self.lifecycle.ttl_days) {
            return Err(CurbsideError::Config(format!(
                "lifecycle.ttl_days must be in 1..={}, got {}",
                constants::MAX_TTL_DAYS,
                self.lifecycle.ttl_days
            )));
        }
        for (name, days) in &self.lifecycle.ttl_days_by_category {
            name.parse::<Category>()
                .map_err(|_| CurbsideError::Config(format!("unknown category in ttl_days_by_category: {name}")))?;
            if !(1..=constants::MAX_TTL_DAYS).contains(days) {
                return Err(CurbsideError::Config(format!(
                    "lifecycle.ttl_days_by_category.{name} must be in 1..={}, got {days}",
                    constants::MAX_TTL_DAYS
                )));
            }
        }
        if self.lifecycle.sweep_interval_secs == 0 || self.lifecycle.sweep_batch_size == 0 {
            return Err(CurbsideError::Config(
                "lifecycle sweep interval and batch size must be positive".into(),
            ));
        }
        if !(self.monitor.refresh_fraction > 0.0 && self.monitor.refresh_fraction <= 1.0) {
            return Err(CurbsideError::Config("monitor.refresh_fraction must be in (0, 1]".into()));
        }
        if self.monitor.query_timeout_secs == 0 {
            return Err(CurbsideError::Config("monitor.query_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}
