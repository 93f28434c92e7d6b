use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::enums::PaymentMethod;

/// Application-level constants
pub const APP_NAME: &str = "CareConnect";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable pointing at a JSON engine config file.
pub const CONFIG_ENV: &str = "CARECONNECT_CONFIG";
/// Environment variable overriding the ledger database location.
pub const DATABASE_ENV: &str = "CARECONNECT_DB";

/// Get the application data directory
/// ~/CareConnect/ on all platforms, falling back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the ledger database.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("ledger").join("careconnect.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "careconnect_lib=info,warn"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Bounded retry knobs for transient store failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_pct")]
    pub jitter_pct: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_pct: default_jitter_pct(),
        }
    }
}

/// Engine tunables. Every field has a default so a partial JSON file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Appointments a doctor accepts per calendar day.
    #[serde(default = "default_daily_slot_capacity")]
    pub daily_slot_capacity: u32,
    /// Length of one appointment slot inside a schedule window.
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
    /// How long a writer waits on the store lock before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,
    /// Method recorded for the immediate settlement of an admission.
    #[serde(default = "default_admission_payment_method")]
    pub admission_payment_method: PaymentMethod,
    #[serde(default = "default_pending_tests_limit")]
    pub pending_tests_limit: u32,
    /// Rows returned by the appointment listing.
    #[serde(default = "default_appointments_limit")]
    pub appointments_limit: u32,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            daily_slot_capacity: default_daily_slot_capacity(),
            slot_minutes: default_slot_minutes(),
            busy_timeout_ms: default_busy_timeout_ms(),
            password_iterations: default_password_iterations(),
            admission_payment_method: default_admission_payment_method(),
            pending_tests_limit: default_pending_tests_limit(),
            appointments_limit: default_appointments_limit(),
            retry: RetrySettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then the file named by `CARECONNECT_CONFIG`, then
    /// `CARECONNECT_DB` for the database location.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(db) = std::env::var_os(DATABASE_ENV) {
            config.database_path = PathBuf::from(db);
        }
        Ok(config)
    }
}

fn default_daily_slot_capacity() -> u32 {
    5
}

fn default_slot_minutes() -> u32 {
    30
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_password_iterations() -> u32 {
    600_000
}

fn default_admission_payment_method() -> PaymentMethod {
    PaymentMethod::Online
}

fn default_pending_tests_limit() -> u32 {
    50
}

fn default_appointments_limit() -> u32 {
    50
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    1_000
}

fn default_jitter_pct() -> f64 {
    0.2
}
