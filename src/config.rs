//! Runtime configuration.
//!
//! Everything is read from environment variables; unset variables fall back to
//! the defaults documented on each field.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    InvalidValue {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// LLM provider settings for the document analyzer.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// `LLM_API_KEY` - analysis is disabled when unset
    pub api_key: Option<String>,
    /// `LLM_BASE_URL` (default: `https://api.openai.com/v1`)
    pub base_url: String,
    /// `LLM_MODEL` (default: `gpt-4o-mini`)
    pub model: String,
}

/// Timer settings for the lifecycle engine.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// `PROMOTION_INTERVAL_SECS` (default: 60)
    pub promotion_interval: Duration,
    /// `REMINDER_INTERVAL_SECS` (default: 3600)
    pub reminder_interval: Duration,
    /// `OVERDUE_INTERVAL_SECS` (default: 1800)
    pub overdue_interval: Duration,
    /// `STARTUP_REMINDER_DELAY_SECS` (default: 5)
    pub startup_reminder_delay: Duration,
    /// `REMINDER_CONCURRENCY` (default: 4)
    pub reminder_concurrency: usize,
    /// `NOTIFY_TIMEOUT_SECS` (default: 30)
    pub notify_timeout: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            promotion_interval: Duration::from_secs(60),
            reminder_interval: Duration::from_secs(60 * 60),
            overdue_interval: Duration::from_secs(30 * 60),
            startup_reminder_delay: Duration::from_secs(5),
            reminder_concurrency: 4,
            notify_timeout: Duration::from_secs(30),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `COMPLI_BIND` (default: `127.0.0.1:3030`)
    pub bind: SocketAddr,
    /// `COMPLI_DATA_DIR` (default: `./data`)
    pub data_dir: PathBuf,
    /// `COMPLI_UPLOAD_DIR` (default: `<data_dir>/uploads`)
    pub upload_dir: PathBuf,
    /// `ANALYZER_TIMEOUT_SECS` (default: 60)
    pub analyzer_timeout: Duration,
    pub llm: LlmSettings,
    pub schedule: ScheduleSettings,
    /// `COMPLI_ADMIN_EMAIL` - superadmin account created on startup when
    /// no user with this email exists
    pub admin_email: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("COMPLI_BIND").unwrap_or_else(|| "127.0.0.1:3030".to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                var: "COMPLI_BIND",
                expected: "a socket address",
                value: bind_raw.clone(),
            })?;

        let data_dir = lookup("COMPLI_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let upload_dir = lookup("COMPLI_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("uploads"));

        let defaults = ScheduleSettings::default();
        let schedule = ScheduleSettings {
            promotion_interval: secs(&lookup, "PROMOTION_INTERVAL_SECS", defaults.promotion_interval)?,
            reminder_interval: secs(&lookup, "REMINDER_INTERVAL_SECS", defaults.reminder_interval)?,
            overdue_interval: secs(&lookup, "OVERDUE_INTERVAL_SECS", defaults.overdue_interval)?,
            startup_reminder_delay: secs(
                &lookup,
                "STARTUP_REMINDER_DELAY_SECS",
                defaults.startup_reminder_delay,
            )?,
            reminder_concurrency: number(&lookup, "REMINDER_CONCURRENCY", defaults.reminder_concurrency as u64)?
                .max(1) as usize,
            notify_timeout: secs(&lookup, "NOTIFY_TIMEOUT_SECS", defaults.notify_timeout)?,
        };

        let llm = LlmSettings {
            api_key: lookup("LLM_API_KEY").filter(|k| !k.trim().is_empty()),
            base_url: lookup("LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: lookup("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
        };

        Ok(Self {
            bind,
            data_dir,
            upload_dir,
            analyzer_timeout: secs(&lookup, "ANALYZER_TIMEOUT_SECS", Duration::from_secs(60))?,
            llm,
            schedule,
            admin_email: lookup("COMPLI_ADMIN_EMAIL")
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
        })
    }

    /// Path of the JSON file backing the store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }
}

fn number<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            var,
            expected: "a non-negative integer",
            value: raw,
        }),
    }
}

fn secs<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    number(lookup, var, default.as_secs()).map(Duration::from_secs)
}
