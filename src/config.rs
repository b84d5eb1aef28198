use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Pipeline configuration, loaded from `claimsight.toml` when present.
/// Every section has working defaults so a bare checkout can run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub dq: DqConfig,
    pub explainer: ExplainerConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Source claims CSV consumed by the ingestion boundary.
    pub claims_csv: String,
    /// Directory the clean/anomaly partitions are published to.
    pub gold_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DqConfig {
    /// |z| cut for every outlier check.
    pub zscore_threshold: f64,
    /// How many of the worst anomalies get an explanation attached.
    pub explain_top_n: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplainerConfig {
    /// Chat-completions style endpoint for the external explainer.
    /// Leave empty to always use the deterministic template.
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            dq: DqConfig::default(),
            explainer: ExplainerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            claims_csv: "data/claims.csv".to_string(),
            gold_dir: "data/gold".to_string(),
        }
    }
}

impl Default for DqConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: 3.0,
            explain_top_n: 20,
        }
    }
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("claimsight.toml")
    }

    pub fn load_from(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
