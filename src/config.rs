use std::time::Duration;

use config::{Config, ConfigError, Environment};
use regex::Regex;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CHECK_INTERVAL: u64 = 300;
pub const MIN_CHECK_INTERVAL: u64 = 60;
pub const MAX_CHECK_INTERVAL: u64 = 86_400;
pub const MIN_TERM_LENGTH: usize = 2;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// Settings exactly as they arrive from the environment, before validation.
#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
    monitor_url: String,
    search_strings: String,
    #[serde(default = "default_check_interval")]
    check_interval: u64,
    #[serde(default = "default_smtp_server")]
    smtp_server: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    sender_email: String,
    sender_password: String,
    recipient_email: String,
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub url: Url,
    pub terms: Vec<String>,
    pub check_interval: Duration,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub sender_email: String,
    pub sender_password: String,
    pub recipient_email: String,
}

impl MonitorConfig {
    /// Load and validate configuration from environment variables
    /// (MONITOR_URL, SEARCH_STRINGS, CHECK_INTERVAL, SMTP_SERVER, SMTP_PORT,
    /// SENDER_EMAIL, SENDER_PASSWORD, RECIPIENT_EMAIL).
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw: RawSettings = Config::builder()
            .add_source(Environment::default())
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let url = validate_url(&raw.monitor_url)?;
        let terms = validate_search_terms(&raw.search_strings)?;
        let check_interval = validate_interval(raw.check_interval)?;

        let smtp = SmtpConfig {
            server: raw.smtp_server,
            port: raw.smtp_port,
            sender_email: raw.sender_email,
            sender_password: raw.sender_password,
            recipient_email: raw.recipient_email,
        };
        smtp.validate()?;

        Ok(Self {
            url,
            terms,
            check_interval,
            smtp,
        })
    }
}

impl SmtpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::Message("SMTP_SERVER must not be empty".into()));
        }

        if self.port == 0 {
            return Err(ConfigError::Message(
                "SMTP_PORT must be between 1 and 65535".into(),
            ));
        }

        let pattern = Regex::new(EMAIL_PATTERN)
            .map_err(|e| ConfigError::Message(format!("invalid email pattern: {e}")))?;

        if !pattern.is_match(&self.sender_email) {
            return Err(ConfigError::Message(
                "SENDER_EMAIL is not a valid email address".into(),
            ));
        }

        if !pattern.is_match(&self.recipient_email) {
            return Err(ConfigError::Message(
                "RECIPIENT_EMAIL is not a valid email address".into(),
            ));
        }

        Ok(())
    }
}

fn validate_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| {
        ConfigError::Message("MONITOR_URL must be an absolute URL including http:// or https://".into())
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::Message(
            "MONITOR_URL must be an absolute URL including http:// or https://".into(),
        ));
    }

    Ok(url)
}

fn validate_search_terms(raw: &str) -> Result<Vec<String>, ConfigError> {
    let terms: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(String::from)
        .collect();

    if terms.is_empty() {
        return Err(ConfigError::Message(
            "SEARCH_STRINGS must contain at least one search term".into(),
        ));
    }

    if terms.iter().any(|term| term.chars().count() < MIN_TERM_LENGTH) {
        return Err(ConfigError::Message(
            "search terms must be at least 2 characters long".into(),
        ));
    }

    Ok(terms)
}

fn validate_interval(seconds: u64) -> Result<Duration, ConfigError> {
    if seconds < MIN_CHECK_INTERVAL {
        return Err(ConfigError::Message(
            "CHECK_INTERVAL must be at least 60 seconds".into(),
        ));
    }

    if seconds > MAX_CHECK_INTERVAL {
        return Err(ConfigError::Message(
            "CHECK_INTERVAL must not exceed 86400 seconds (24 hours)".into(),
        ));
    }

    Ok(Duration::from_secs(seconds))
}
