//! Settings for quirkmesh hosts.
//!
//! Layered configuration (built-in defaults, then a TOML file, then
//! `QUIRKMESH_` environment variables), translation into
//! `quirkmesh_core::HostConfig`, profile catalog loading, and tracing
//! subscriber setup.

mod catalog;
mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quirkmesh_core::{AccessConfig, EnrollmentConfig, HostConfig, PollingConfig};

pub use catalog::{load_catalog, load_catalogs};
pub use logging::init_tracing;

/// Environment variable prefix; nested keys are separated by `__`
/// (`QUIRKMESH_ACCESS__MAX_RETRIES=5`).
pub const ENV_PREFIX: &str = "QUIRKMESH_";

/// Zone id the IAS zone cluster reserves for "not enrolled".
const UNASSIGNED_ZONE_ID: u8 = 0xFF;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("catalog {path}: {reason}")]
    Catalog { path: PathBuf, reason: String },

    #[error("tracing setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for quirkmesh_core::CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub access: AccessSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub enrollment: EnrollmentSettings,
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Strategy cascade retry tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccessSettings {
    #[serde(with = "human_duration")]
    pub attempt_timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "human_duration")]
    pub base_backoff: Duration,
    #[serde(with = "human_duration")]
    pub max_backoff: Duration,
}

impl Default for AccessSettings {
    fn default() -> Self {
        let core = AccessConfig::default();
        Self {
            attempt_timeout: core.attempt_timeout,
            max_retries: core.max_retries,
            base_backoff: core.base_backoff,
            max_backoff: core.max_backoff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollingSettings {
    #[serde(with = "human_duration")]
    pub interval: Duration,
    #[serde(with = "human_duration")]
    pub jitter: Duration,
    #[serde(with = "human_duration")]
    pub min_interval: Duration,
    #[serde(with = "human_duration")]
    pub max_interval: Duration,
    /// Retry report configuration every N cycles; 0 never retries.
    pub reconfigure_every: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        let core = PollingConfig::default();
        Self {
            interval: core.interval,
            jitter: core.jitter,
            min_interval: core.min_interval,
            max_interval: core.max_interval,
            reconfigure_every: core.reconfigure_every,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnrollmentSettings {
    pub zone_id: u8,
    pub proactive_response: bool,
    /// This host's IEEE address as hex (`"0x00124b001cdd7e01"`).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ieee_address")]
    pub cie_address: Option<u64>,
    /// Clear zone alarms after this long; `"0s"` leaves them set.
    #[serde(default, with = "human_duration")]
    pub alarm_auto_reset: Duration,
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        let core = EnrollmentConfig::default();
        Self {
            zone_id: core.zone_id,
            proactive_response: core.proactive_response,
            cie_address: core.cie_address,
            alarm_auto_reset: core.alarm_auto_reset.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostSettings {
    pub queue_capacity: usize,
    pub diagnostics_capacity: usize,
}

impl Default for HostSettings {
    fn default() -> Self {
        let core = HostConfig::default();
        Self {
            queue_capacity: core.queue_capacity,
            diagnostics_capacity: core.diagnostics_capacity,
        }
    }
}

/// Profile catalog files (`.json` or `.toml`), loaded in order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct CatalogSettings {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

impl Settings {
    /// Validate and convert into the core runtime configuration.
    pub fn into_host_config(self) -> Result<HostConfig, ConfigError> {
        self.validate()?;
        let Self {
            access,
            polling,
            enrollment,
            host,
            ..
        } = self;

        Ok(HostConfig {
            access: AccessConfig {
                attempt_timeout: access.attempt_timeout,
                max_retries: access.max_retries,
                base_backoff: access.base_backoff,
                max_backoff: access.max_backoff,
            },
            polling: PollingConfig {
                interval: polling.interval,
                jitter: polling.jitter,
                min_interval: polling.min_interval,
                max_interval: polling.max_interval,
                reconfigure_every: polling.reconfigure_every,
            },
            enrollment: EnrollmentConfig {
                zone_id: enrollment.zone_id,
                proactive_response: enrollment.proactive_response,
                cie_address: enrollment.cie_address,
                alarm_auto_reset: Some(enrollment.alarm_auto_reset).filter(|d| !d.is_zero()),
            },
            queue_capacity: host.queue_capacity,
            diagnostics_capacity: host.diagnostics_capacity,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access.attempt_timeout.is_zero() {
            return Err(invalid("access.attempt_timeout", "must be greater than zero"));
        }
        if self.access.base_backoff > self.access.max_backoff {
            return Err(invalid(
                "access.base_backoff",
                format!(
                    "{} exceeds max_backoff {}",
                    humantime::format_duration(self.access.base_backoff),
                    humantime::format_duration(self.access.max_backoff)
                ),
            ));
        }
        if self.polling.min_interval.is_zero() {
            return Err(invalid("polling.min_interval", "must be greater than zero"));
        }
        if self.polling.min_interval > self.polling.max_interval {
            return Err(invalid(
                "polling.min_interval",
                "must not exceed polling.max_interval",
            ));
        }
        if self.enrollment.zone_id == UNASSIGNED_ZONE_ID {
            return Err(invalid("enrollment.zone_id", "0xFF means unassigned"));
        }
        if self.host.queue_capacity == 0 {
            return Err(invalid("host.queue_capacity", "must be at least 1"));
        }
        if self.host.diagnostics_capacity == 0 {
            return Err(invalid("host.diagnostics_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

// ── Human-readable durations ────────────────────────────────────────

mod human_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(D::Error::custom)
    }
}

mod ieee_address {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(address) => serializer.collect_str(&format_args!("{address:#018x}")),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let raw = raw.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        u64::from_str_radix(digits, 16)
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid IEEE address {raw:?}: {e}")))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the settings file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "quirkmesh", "quirkmesh").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("quirkmesh");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load settings from the default path and the environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&config_path())
}

/// Load settings from `path` (missing file is fine) and the environment.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    tracing::debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

/// Load settings, falling back to defaults if anything is wrong.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_default()
}

// ── Saving ──────────────────────────────────────────────────────────

/// Write settings to the default path.
pub fn save_settings(settings: &Settings) -> Result<(), ConfigError> {
    save_settings_to(&config_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
