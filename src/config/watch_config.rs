//! Watch Configuration - backend, polling cadence, queues and operator API
//!
//! Every tunable of the pollers lives in this module. Each struct implements
//! `Default` with the values from [`super::defaults`], so an absent or empty
//! config file behaves exactly like the built-in defaults.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "PARKING_WATCH_CONFIG";

/// Environment variable carrying the backend bearer token.
pub const API_TOKEN_ENV_VAR: &str = "PARKING_WATCH_API_TOKEN";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "parking_watch.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of one operator console deployment.
///
/// Load with `WatchConfig::load()` which searches:
/// 1. `$PARKING_WATCH_CONFIG` env var
/// 2. `./parking_watch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Parking REST API
    #[serde(default)]
    pub backend: BackendConfig,

    /// Poll cadence and adaptive tuning
    #[serde(default)]
    pub polling: PollingConfig,

    /// Which queues to watch, and for which gate
    #[serde(default)]
    pub queues: QueuesConfig,

    /// Local operator API
    #[serde(default)]
    pub server: ServerConfig,
}

impl WatchConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PARKING_WATCH_CONFIG` environment variable
    /// 2. `./parking_watch.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// A broken file on the search path is logged and skipped.
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), backend = %config.backend.base_url, "Loaded config from {}", CONFIG_ENV_VAR);
                        return config.with_env_overrides();
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./parking_watch.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(backend = %config.backend.base_url, "Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config.with_env_overrides();
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default().with_env_overrides()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys only warn; parse and validation failures are errors.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Fill the bearer token from `$PARKING_WATCH_API_TOKEN` when the file left it unset.
    pub fn with_env_overrides(mut self) -> Self {
        if self.backend.api_token.is_none() {
            if let Ok(token) = std::env::var(API_TOKEN_ENV_VAR) {
                if !token.trim().is_empty() {
                    self.backend.api_token = Some(token.trim().to_string());
                }
            }
        }
        self
    }

    /// Serialize the effective configuration back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate that all values are usable.
    ///
    /// Suspicious-but-legal values are logged as warnings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Backend
// ============================================================================

/// Parking REST API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API root, e.g. `http://10.0.0.5:8000/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent on every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    defaults::BACKEND_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    defaults::BACKEND_REQUEST_TIMEOUT_SECS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Half-open `[start, end)` range of local hours.
///
/// `start > end` wraps past midnight: `22..2` covers 22:00-01:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakWindow {
    pub start: u8,
    pub end: u8,
}

impl PeakWindow {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Whether `hour` (0-23) falls inside this window.
    pub fn contains(&self, hour: u32) -> bool {
        let (start, end) = (u32::from(self.start), u32::from(self.end));
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

fn default_peak_hours() -> Vec<PeakWindow> {
    defaults::PEAK_HOURS
        .iter()
        .map(|&(start, end)| PeakWindow::new(start, end))
        .collect()
}

/// Poll cadence for every queue poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Master switch; a disabled poller never touches the network
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Adaptive interval (fast/normal/slow) instead of the fixed fallback
    #[serde(default = "default_true")]
    pub use_adaptive: bool,

    /// Fixed tick when `use_adaptive = false`
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_fast_interval_ms")]
    pub fast_interval_ms: u64,

    #[serde(default = "default_normal_interval_ms")]
    pub normal_interval_ms: u64,

    #[serde(default = "default_slow_interval_ms")]
    pub slow_interval_ms: u64,

    /// How long activity keeps the fast interval
    #[serde(default = "default_activity_boost_ms")]
    pub activity_boost_ms: u64,

    /// Periodic re-evaluation of peak hours
    #[serde(default = "default_recheck_interval_secs")]
    pub recheck_interval_secs: u64,

    /// Delay of the follow-up fetch after a detection is cleared
    #[serde(default = "default_clear_refetch_delay_ms")]
    pub clear_refetch_delay_ms: u64,

    #[serde(default = "default_peak_hours")]
    pub peak_hours: Vec<PeakWindow>,
}

fn default_true() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    defaults::FALLBACK_POLL_INTERVAL_MS
}
fn default_fast_interval_ms() -> u64 {
    defaults::FAST_INTERVAL_MS
}
fn default_normal_interval_ms() -> u64 {
    defaults::NORMAL_INTERVAL_MS
}
fn default_slow_interval_ms() -> u64 {
    defaults::SLOW_INTERVAL_MS
}
fn default_activity_boost_ms() -> u64 {
    defaults::ACTIVITY_BOOST_MS
}
fn default_recheck_interval_secs() -> u64 {
    defaults::RECHECK_INTERVAL_SECS
}
fn default_clear_refetch_delay_ms() -> u64 {
    defaults::CLEAR_REFETCH_DELAY_MS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_adaptive: true,
            poll_interval_ms: default_poll_interval_ms(),
            fast_interval_ms: default_fast_interval_ms(),
            normal_interval_ms: default_normal_interval_ms(),
            slow_interval_ms: default_slow_interval_ms(),
            activity_boost_ms: default_activity_boost_ms(),
            recheck_interval_secs: default_recheck_interval_secs(),
            clear_refetch_delay_ms: default_clear_refetch_delay_ms(),
            peak_hours: default_peak_hours(),
        }
    }
}

// ============================================================================
// Queues
// ============================================================================

/// Which queues get a poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    #[serde(default = "default_true")]
    pub vehicle_type: bool,

    #[serde(default = "default_true")]
    pub exit: bool,

    /// Restrict both queues to one gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_id: Option<i64>,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            vehicle_type: true,
            exit: true,
            gate_id: None,
        }
    }
}

impl QueuesConfig {
    /// Whether a poller should be built for `kind`.
    pub fn watches(&self, kind: crate::types::QueueKind) -> bool {
        match kind {
            crate::types::QueueKind::VehicleType => self.vehicle_type,
            crate::types::QueueKind::Exit => self.exit,
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Local operator API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.addr.parse()
    }
}
