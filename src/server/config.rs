use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::expiry::scanner::NotificationThresholds;

pub const ENV_PREFIX: &str = "LEASEWATCH_";
/// About a century.
const MAX_THRESHOLD_DAYS: i64 = 36_500;
/// One week.
const MAX_PENDING_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: String,
    /// Bearer credential for the expiry-check endpoint. Unset leaves it open.
    pub cron_secret: Option<String>,
    pub user_threshold_days: i64,
    pub admin_threshold_days: i64,
    pub max_attempts: i32,
    pub default_renewal_months: u32,
    pub dispatch_concurrency: usize,
    pub pending_timeout_minutes: i64,
    pub admin_emails: Vec<String>,
    pub mail_provider_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub app_url: String,
    pub log_dir: String,
    pub audit_sink: AuditSink,
}

/// Where audit events go.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditSink {
    #[default]
    Database,
    Log,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    cron_secret: Option<String>,
    user_threshold_days: Option<i64>,
    admin_threshold_days: Option<i64>,
    max_attempts: Option<i32>,
    default_renewal_months: Option<u32>,
    dispatch_concurrency: Option<usize>,
    pending_timeout_minutes: Option<i64>,
    admin_emails: Option<Vec<String>>,
    mail_provider_url: Option<String>,
    mail_api_key: Option<String>,
    mail_from: Option<String>,
    app_url: Option<String>,
    log_dir: Option<String>,
    audit_sink: Option<AuditSink>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_mail_from() -> String {
    "leasewatch@localhost.localdomain".to_string()
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl ServerConfig {
    /// Loads `.env`, the optional TOML file and `LEASEWATCH_*` variables.
    /// Environment overrides file, file overrides defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path) => read_file(Path::new(path))?,
            None => PartialServerConfig::default(),
        };
        let env_config: PartialServerConfig = envy::prefixed(ENV_PREFIX).from_env()?;

        Self::merge(env_config, file_config)
    }

    fn merge(env: PartialServerConfig, file: PartialServerConfig) -> Result<Self, ConfigError> {
        let config = ServerConfig {
            database_url: env
                .database_url
                .or(file.database_url)
                .ok_or(ConfigError::Missing("LEASEWATCH_DATABASE_URL"))?,
            listen_addr: env.listen_addr.or(file.listen_addr).unwrap_or_else(default_listen_addr),
            cron_secret: env.cron_secret.or(file.cron_secret).filter(|s| !s.is_empty()),
            user_threshold_days: env.user_threshold_days.or(file.user_threshold_days).unwrap_or(30),
            admin_threshold_days: env.admin_threshold_days.or(file.admin_threshold_days).unwrap_or(7),
            max_attempts: env.max_attempts.or(file.max_attempts).unwrap_or(3),
            default_renewal_months: env.default_renewal_months.or(file.default_renewal_months).unwrap_or(3),
            dispatch_concurrency: env.dispatch_concurrency.or(file.dispatch_concurrency).unwrap_or(8),
            pending_timeout_minutes: env.pending_timeout_minutes.or(file.pending_timeout_minutes).unwrap_or(60),
            admin_emails: env.admin_emails.or(file.admin_emails).unwrap_or_default(),
            mail_provider_url: env.mail_provider_url.or(file.mail_provider_url).filter(|s| !s.is_empty()),
            mail_api_key: env.mail_api_key.or(file.mail_api_key),
            mail_from: env.mail_from.or(file.mail_from).unwrap_or_else(default_mail_from),
            app_url: env.app_url.or(file.app_url).unwrap_or_else(default_app_url),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            audit_sink: env.audit_sink.or(file.audit_sink).unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.admin_threshold_days < 0 {
            return Err(ConfigError::Invalid("admin_threshold_days must not be negative".to_string()));
        }
        if self.user_threshold_days > MAX_THRESHOLD_DAYS {
            return Err(ConfigError::Invalid(format!(
                "user_threshold_days must not exceed {MAX_THRESHOLD_DAYS}"
            )));
        }
        if self.admin_threshold_days > self.user_threshold_days {
            return Err(ConfigError::Invalid(format!(
                "admin_threshold_days ({}) must not exceed user_threshold_days ({})",
                self.admin_threshold_days, self.user_threshold_days
            )));
        }
        if self.max_attempts < 1 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }
        if self.default_renewal_months < 1 {
            return Err(ConfigError::Invalid("default_renewal_months must be at least 1".to_string()));
        }
        if self.dispatch_concurrency < 1 {
            return Err(ConfigError::Invalid("dispatch_concurrency must be at least 1".to_string()));
        }
        if !(1..=MAX_PENDING_TIMEOUT_MINUTES).contains(&self.pending_timeout_minutes) {
            return Err(ConfigError::Invalid(format!(
                "pending_timeout_minutes must be between 1 and {MAX_PENDING_TIMEOUT_MINUTES}"
            )));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> NotificationThresholds {
        NotificationThresholds::new(self.user_threshold_days, self.admin_threshold_days)
    }
}

fn read_file(path: &Path) -> Result<PartialServerConfig, ConfigError> {
    if !path.exists() {
        return Ok(PartialServerConfig::default());
    }
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse { path: display, source })
}
