//! Configuration loading and validation.
//!
//! JSON5 format, camelCase keys.
//! Config location: `~/.tablegate/tablegate.json`

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::locale::Locale;
use crate::types::TierCategory;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Request shield configuration.
    #[serde(default)]
    pub shield: ShieldConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    ///
    /// Uses `TABLEGATE_CONFIG_PATH` if set.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("TABLEGATE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::state_dir().join("tablegate.json")
    }

    /// Get the tablegate state directory.
    ///
    /// Uses `TABLEGATE_STATE_DIR` env var if set, otherwise `~/.tablegate`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TABLEGATE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".tablegate")
        } else {
            PathBuf::from(".tablegate")
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }

        self.shield.validate()
    }

    /// Apply environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = std::env::var("TABLEGATE_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            self.gateway.port = port;
        }

        if std::env::var("TABLEGATE_SHIELD_DISABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            tracing::warn!("Request shield disabled via TABLEGATE_SHIELD_DISABLED");
            self.shield.enabled = false;
        }

        self
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address mode.
    #[serde(default)]
    pub mode: BindMode,

    /// Enable CORS.
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mode: BindMode::default(),
            cors: true,
        }
    }
}

impl GatewayConfig {
    /// Resolve the bind address for the configured mode.
    #[must_use]
    pub fn bind_address(&self) -> String {
        match &self.mode {
            BindMode::Local => "127.0.0.1".to_string(),
            BindMode::Public => "0.0.0.0".to_string(),
            BindMode::Custom(addr) => addr.clone(),
        }
    }
}

const fn default_port() -> u16 {
    8787
}

const fn default_true() -> bool {
    true
}

/// Gateway bind mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to localhost only.
    #[default]
    Local,
    /// Bind to all interfaces.
    Public,
    /// Custom bind address.
    Custom(String),
}

/// How the recent-request count for a tier is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CountingMode {
    /// Count all of the client's recent requests, whatever their category,
    /// against the limit of the current request's tier.
    #[default]
    Pooled,
    /// Count only recent requests of the same category.
    PerTier,
}

/// Request shield configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldConfig {
    /// Whether the shield is enforced at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Window counting mode.
    #[serde(default)]
    pub counting: CountingMode,

    /// Language of client-facing messages.
    #[serde(default)]
    pub locale: Locale,

    /// Headers consulted, in order, to resolve the client address.
    #[serde(default = "default_client_headers")]
    pub client_headers: Vec<String>,

    /// Interval between background sweeps of the client store.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Expose the operator endpoints under `/admin/shield`.
    #[serde(default = "default_true")]
    pub admin_api: bool,

    /// Per-category policies.
    #[serde(default)]
    pub tiers: TierCatalog,

    /// Global DDoS policy.
    #[serde(default)]
    pub ddos: DdosPolicy,
}

fn default_client_headers() -> Vec<String> {
    vec![
        "x-forwarded-for".to_string(),
        "x-real-ip".to_string(),
        "cf-connecting-ip".to_string(),
    ]
}

const fn default_sweep_interval() -> u64 {
    300
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            counting: CountingMode::default(),
            locale: Locale::default(),
            client_headers: default_client_headers(),
            sweep_interval_secs: default_sweep_interval(),
            admin_api: true,
            tiers: TierCatalog::default(),
            ddos: DdosPolicy::default(),
        }
    }
}

impl ShieldConfig {
    /// Validate tier and DDoS policies.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in TierCategory::ALL {
            let tier = self.tiers.get(category);
            if tier.max == 0 {
                return Err(ConfigError::Validation(format!(
                    "Tier '{category}' must allow at least one request"
                )));
            }
            if tier.window_ms == 0 {
                return Err(ConfigError::Validation(format!(
                    "Tier '{category}' has an empty window"
                )));
            }
        }

        let ddos = &self.ddos;
        if ddos.window_ms == 0 || ddos.block_duration_ms == 0 {
            return Err(ConfigError::Validation(
                "DDoS window and block duration must be positive".to_string(),
            ));
        }
        if ddos.suspicious_threshold == 0 || ddos.suspicious_threshold > ddos.block_threshold {
            return Err(ConfigError::Validation(format!(
                "DDoS thresholds must satisfy 0 < suspicious ({}) <= block ({})",
                ddos.suspicious_threshold, ddos.block_threshold
            )));
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Sweep interval cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Denial message for a tier: the configured override, else the locale default.
    #[must_use]
    pub fn tier_message(&self, category: TierCategory) -> Cow<'_, str> {
        match &self.tiers.get(category).message {
            Some(message) => Cow::Borrowed(message.as_str()),
            None => Cow::Borrowed(self.locale.tier_message(category)),
        }
    }

    /// How long request records must be kept: the widest configured window.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.tiers.max_window().max(self.ddos.window())
    }

    /// Sweep interval as Duration.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Rate-limit policy for one endpoint category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPolicy {
    /// Sliding window length in milliseconds.
    pub window_ms: u64,

    /// Requests allowed within the window.
    pub max: u32,

    /// Denial message. Falls back to the locale default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TierPolicy {
    /// A policy allowing `max` requests per minute.
    #[must_use]
    pub const fn per_minute(max: u32) -> Self {
        Self {
            window_ms: 60_000,
            max,
            message: None,
        }
    }

    /// Window as Duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// The tier catalog: one policy per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCatalog {
    /// Default tier.
    #[serde(default = "default_general")]
    pub general: TierPolicy,

    /// Availability and date checks.
    #[serde(default = "default_availability")]
    pub availability: TierPolicy,

    /// Booking submissions.
    #[serde(default = "default_booking")]
    pub booking: TierPolicy,

    /// Quote calculations.
    #[serde(default = "default_quote")]
    pub quote: TierPolicy,
}

const fn default_general() -> TierPolicy {
    TierPolicy::per_minute(100)
}

const fn default_availability() -> TierPolicy {
    TierPolicy::per_minute(500)
}

const fn default_booking() -> TierPolicy {
    TierPolicy::per_minute(50)
}

const fn default_quote() -> TierPolicy {
    TierPolicy::per_minute(200)
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self {
            general: default_general(),
            availability: default_availability(),
            booking: default_booking(),
            quote: default_quote(),
        }
    }
}

impl TierCatalog {
    /// Policy for a category.
    #[must_use]
    pub const fn get(&self, category: TierCategory) -> &TierPolicy {
        match category {
            TierCategory::General => &self.general,
            TierCategory::Availability => &self.availability,
            TierCategory::Booking => &self.booking,
            TierCategory::Quote => &self.quote,
        }
    }

    /// Mutable policy for a category.
    pub fn get_mut(&mut self, category: TierCategory) -> &mut TierPolicy {
        match category {
            TierCategory::General => &mut self.general,
            TierCategory::Availability => &mut self.availability,
            TierCategory::Booking => &mut self.booking,
            TierCategory::Quote => &mut self.quote,
        }
    }

    /// Longest window across all tiers.
    #[must_use]
    pub fn max_window(&self) -> Duration {
        TierCategory::ALL
            .into_iter()
            .map(|c| self.get(c).window())
            .max()
            .unwrap_or_default()
    }
}

/// Global DDoS heuristic policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdosPolicy {
    /// Observation window in milliseconds.
    #[serde(default = "default_ddos_window")]
    pub window_ms: u64,

    /// Request count that raises a suspicious-activity event.
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: u32,

    /// Request count that blocks the client.
    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,

    /// Block length in milliseconds.
    #[serde(default = "default_block_duration")]
    pub block_duration_ms: u64,
}

const fn default_ddos_window() -> u64 {
    5 * 60 * 1000
}

const fn default_suspicious_threshold() -> u32 {
    1000
}

const fn default_block_threshold() -> u32 {
    2000
}

const fn default_block_duration() -> u64 {
    15 * 60 * 1000
}

impl Default for DdosPolicy {
    fn default() -> Self {
        Self {
            window_ms: default_ddos_window(),
            suspicious_threshold: default_suspicious_threshold(),
            block_threshold: default_block_threshold(),
            block_duration_ms: default_block_duration(),
        }
    }
}

impl DdosPolicy {
    /// Observation window as Duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Block length as Duration.
    #[must_use]
    pub const fn block_duration(&self) -> Duration {
        Duration::from_millis(self.block_duration_ms)
    }
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}
