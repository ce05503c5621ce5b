//! Config - TOML 設定の読み込みと検証
//!
//! 読み込み順:
//! 1. 引数で与えられたパス
//! 2. 環境変数 `TRICKLE_CONFIG`
//! 3. どちらも無ければ既定値

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::batch::BatchConfig;
use crate::coalescer::CoalescerConfig;
use crate::domain::{BindOptions, Placement};

pub const ENV_TRICKLE_CONFIG: &str = "TRICKLE_CONFIG";

const DEFAULT_CHUNK_SIZE: usize = 10;
const DEFAULT_INITIAL_DELAY_MS: u64 = 10;
const DEFAULT_CLASS_PREFIX: &str = "tooltip-";
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrickleConfig {
    #[serde(default)]
    pub coalescer: CoalescerSection,
    #[serde(default)]
    pub tooltip: TooltipSection,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub transport: TransportSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescerSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for CoalescerSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TooltipSection {
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub css_classes: Vec<String>,
    #[serde(default)]
    pub show_delay_ms: u64,
    #[serde(default = "default_class_prefix")]
    pub class_prefix: String,
}

impl Default for TooltipSection {
    fn default() -> Self {
        Self {
            placement: Placement::default(),
            css_classes: Vec::new(),
            show_delay_ms: 0,
            class_prefix: default_class_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_meta_data")]
    pub meta_data: serde_json::Value,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            meta_data: default_meta_data(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSection {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_transport_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_transport_timeout_secs(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}

fn default_class_prefix() -> String {
    DEFAULT_CLASS_PREFIX.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_meta_data() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_transport_timeout_secs() -> u64 {
    DEFAULT_TRANSPORT_TIMEOUT_SECS
}

impl TrickleConfig {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: TrickleConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Explicit path, then `TRICKLE_CONFIG`, then defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match std::env::var_os(ENV_TRICKLE_CONFIG) {
            Some(path) if !path.is_empty() => Self::load_from(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coalescer.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "coalescer.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch.batch_size must be at least 1".to_string(),
            ));
        }
        if self.tooltip.class_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "tooltip.class_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn coalescer_config(&self) -> CoalescerConfig {
        CoalescerConfig {
            chunk_size: self.coalescer.chunk_size,
            initial_delay: Duration::from_millis(self.coalescer.initial_delay_ms),
            class_prefix: self.tooltip.class_prefix.clone(),
        }
    }

    pub fn bind_defaults(&self) -> BindOptions {
        BindOptions {
            placement: self.tooltip.placement,
            css_classes: self.tooltip.css_classes.clone(),
            show_delay_ms: self.tooltip.show_delay_ms,
            text: None,
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch.batch_size,
            meta_data: self.batch.meta_data.clone(),
        }
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.timeout_secs)
    }
}
