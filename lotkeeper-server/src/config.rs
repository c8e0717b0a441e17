//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via --config or LOTKEEPER_CONFIG)
//! 3. Environment variables

use lotkeeper_core::billing::DEFAULT_HOURLY_RATE;
use lotkeeper_core::engine::DEFAULT_MAX_SPACES;
use lotkeeper_core::{Billing, MAX_SPACES_PER_LOT};
use lotkeeper_journal::JournalConfig;
use lotkeeper_storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Storage configuration.
    pub storage: StorageSettings,
    /// Tariff configuration.
    pub billing: BillingConfig,
    /// Lot limits.
    pub lots: LotsConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from `path` (or `LOTKEEPER_CONFIG` when `None`),
    /// then applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os("LOTKEEPER_CONFIG").map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, msg) => ConfigError::ParseError(path.to_path_buf(), msg),
            other => other,
        })
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.storage.apply_env_overrides();
        self.billing.apply_env_overrides();
        self.lots.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Checks values that defaults cannot make valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.billing.hourly_rate == 0 {
            return Err(ConfigError::ValidationError(
                "billing.hourly_rate must be positive".to_string(),
            ));
        }
        if self.lots.max_spaces == 0 || self.lots.max_spaces > MAX_SPACES_PER_LOT {
            return Err(ConfigError::ValidationError(format!(
                "lots.max_spaces must be between 1 and {}",
                MAX_SPACES_PER_LOT
            )));
        }
        if self.storage.segment_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "storage.segment_size_mb must be positive".to_string(),
            ));
        }
        if self.network.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "network.max_body_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Serializes the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }
}

fn env_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the HTTP API to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8081)),
            max_body_bytes: 64 * 1024,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("LOTKEEPER_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

/// Where lot state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process memory only; state is lost on exit.
    Memory,
    /// Journal on disk, replayed on start.
    #[default]
    Journal,
}

impl StorageBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(StorageBackend::Memory),
            "journal" => Some(StorageBackend::Journal),
            _ => None,
        }
    }
}

/// Fsync policy for journal writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncPolicy {
    /// Fsync after every write (safest, slowest).
    #[default]
    EveryWrite,
    /// Fsync after N writes.
    EveryN(u32),
    /// Never fsync, rely on OS (fastest, least safe).
    Never,
}

impl FsyncPolicy {
    /// Parses `every_write`, `never` or `every_n:<count>`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase();
        match s.as_str() {
            "every_write" | "everywrite" => Some(FsyncPolicy::EveryWrite),
            "never" => Some(FsyncPolicy::Never),
            _ => s
                .strip_prefix("every_n:")
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .map(FsyncPolicy::EveryN),
        }
    }
}

impl From<FsyncPolicy> for lotkeeper_journal::FsyncPolicy {
    fn from(policy: FsyncPolicy) -> Self {
        match policy {
            FsyncPolicy::EveryWrite => lotkeeper_journal::FsyncPolicy::EveryWrite,
            FsyncPolicy::EveryN(n) => lotkeeper_journal::FsyncPolicy::EveryN(n),
            FsyncPolicy::Never => lotkeeper_journal::FsyncPolicy::Never,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Storage backend.
    pub backend: StorageBackend,
    /// Data directory.
    pub data_dir: PathBuf,
    /// Journal segment size in megabytes.
    pub segment_size_mb: u64,
    /// Fsync policy.
    pub fsync_policy: FsyncPolicy,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: PathBuf::from("./data"),
            segment_size_mb: 16,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

impl StorageSettings {
    fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("LOTKEEPER_STORAGE_BACKEND") {
            match StorageBackend::parse(&backend) {
                Some(b) => self.backend = b,
                None => tracing::warn!("Ignoring unknown LOTKEEPER_STORAGE_BACKEND '{}'", backend),
            }
        }

        if let Ok(dir) = std::env::var("LOTKEEPER_DATA") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(size) = std::env::var("LOTKEEPER_SEGMENT_SIZE_MB") {
            if let Ok(mb) = size.parse() {
                self.segment_size_mb = mb;
            }
        }

        if let Ok(policy) = std::env::var("LOTKEEPER_FSYNC_POLICY") {
            match FsyncPolicy::parse(&policy) {
                Some(p) => self.fsync_policy = p,
                None => tracing::warn!("Ignoring unknown LOTKEEPER_FSYNC_POLICY '{}'", policy),
            }
        }
    }

    /// Returns the journal segment size in bytes.
    pub fn segment_size(&self) -> u64 {
        self.segment_size_mb * 1024 * 1024
    }

    /// Returns the journal directory path.
    pub fn journal_dir(&self) -> PathBuf {
        self.data_dir.join("journal")
    }

    /// Builds the storage configuration for the journal backend.
    pub fn storage_config(&self) -> StorageConfig {
        let mut config = StorageConfig::new(&self.data_dir);
        config.journal = JournalConfig::new(self.journal_dir())
            .with_segment_size(self.segment_size())
            .with_fsync_policy(self.fsync_policy.into());
        config
    }
}

/// Tariff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Charge per started hour.
    pub hourly_rate: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            hourly_rate: DEFAULT_HOURLY_RATE,
        }
    }
}

impl BillingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(rate) = std::env::var("LOTKEEPER_HOURLY_RATE") {
            if let Ok(r) = rate.parse() {
                self.hourly_rate = r;
            }
        }
    }

    pub fn billing(&self) -> Billing {
        Billing::new(self.hourly_rate)
    }
}

/// Lot limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LotsConfig {
    /// Largest number of spaces a new lot may have.
    pub max_spaces: u32,
}

impl Default for LotsConfig {
    fn default() -> Self {
        Self {
            max_spaces: DEFAULT_MAX_SPACES,
        }
    }
}

impl LotsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("LOTKEEPER_MAX_SPACES") {
            if let Ok(m) = max.parse() {
                self.max_spaces = m;
            }
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
        }
    }
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("LOTKEEPER_METRICS_ENABLED") {
            self.enabled = env_flag(&enabled);
        }
        if let Ok(addr) = std::env::var("LOTKEEPER_METRICS_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(addr)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
