use crate::error::{DealflowError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub store: StoreConfig,
    pub timing: TimingConfig,
    pub deals: DealsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Daily-rotated log files go here when set.
    pub dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix of every key written to the store.
    pub namespace: String,
    /// RocksDB directory; in-memory when unset.
    pub db_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: "dealflow".to_string(),
            db_path: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub reply_ttl_secs: u64,
    pub acceptance_ttl_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            reply_ttl_secs: 300,
            acceptance_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DealsConfig {
    /// A plain message starting with this opens a deal.
    pub trigger_text: String,
    pub methods: Vec<String>,
    /// User ids allowed to accept deals.
    pub traders: Vec<i64>,
}

impl Default for DealsConfig {
    fn default() -> Self {
        Self {
            trigger_text: "Top up".to_string(),
            methods: vec!["Card".to_string(), "Bank transfer".to_string()],
            traders: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timing.tick_interval_ms == 0 {
            return Err(DealflowError::Validation(
                "timing.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
