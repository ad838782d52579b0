//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use academy_core::content::ImageStrategy;
use academy_core::publisher::PublisherSettings;
use academy_core::schedule::{BUFFER_MINUTES_RANGE, PREFILL_HOURS_RANGE};
use chrono::FixedOffset;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
/// Every vendor credential is optional: a missing one disables that
/// integration instead of stopping the server.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub academy_data_path: PathBuf,

    pub groq_api_key: Option<String>,
    pub groq_api_base: String,
    pub text_model: String,
    pub image_provider: ImageStrategy,

    pub page_access_token: Option<String>,
    pub facebook_verify_token: String,
    pub graph_api_version: String,
    pub whatsapp_token: Option<String>,

    pub cron_secret: Option<String>,
    pub admin_token: Option<String>,

    pub google_sheet_id: Option<String>,
    pub google_sheet_worksheet: String,
    pub google_service_account_json: Option<String>,

    pub telegram_bot_token: Option<String>,
    pub telegram_admin_id: Option<i64>,
    pub telegram_webhook_secret: Option<String>,

    pub imgbb_api_key: Option<String>,

    pub buffer_minutes: i64,
    pub prefill_hours: i64,
    pub active_hours: Vec<u32>,
    pub local_offset: FixedOffset,
    pub rss_feeds: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        // --- Server, Database and Files ---
        let bind_address_str = match (var("BIND_ADDRESS"), var("PORT")) {
            (Some(addr), _) => addr,
            (None, Some(port)) => format!("0.0.0.0:{}", port),
            (None, None) => "0.0.0.0:5000".to_string(),
        };
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = or("DATABASE_URL", "sqlite:saas.db?mode=rwc");

        let log_level_str = or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let academy_data_path = PathBuf::from(or("ACADEMY_DATA_PATH", "./academy_data.json"));

        // --- Content Generation ---
        let image_provider_str = or("IMAGE_PROVIDER", "pollinations");
        let image_provider = ImageStrategy::parse(&image_provider_str).ok_or_else(|| {
            ConfigError::InvalidValue(
                "IMAGE_PROVIDER".to_string(),
                format!("'{}' is neither 'pollinations' nor 'fallback'", image_provider_str),
            )
        })?;

        // --- Google Service Account (inline JSON wins over the file) ---
        let google_service_account_json = match (
            var("GOOGLE_SERVICE_ACCOUNT_JSON"),
            var("GOOGLE_SERVICE_ACCOUNT_FILE"),
        ) {
            (Some(json), _) => Some(json),
            (None, Some(path)) => Some(std::fs::read_to_string(&path).map_err(|e| {
                ConfigError::InvalidValue("GOOGLE_SERVICE_ACCOUNT_FILE".to_string(), format!("{}: {}", path, e))
            })?),
            (None, None) => None,
        };

        let telegram_admin_id = var("TELEGRAM_ADMIN_ID")
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|e| ConfigError::InvalidValue("TELEGRAM_ADMIN_ID".to_string(), e.to_string()))
            })
            .transpose()?;

        // --- Scheduling ---
        let buffer_minutes = parse_in_range(var("BUFFER_MINUTES"), "BUFFER_MINUTES", 30, BUFFER_MINUTES_RANGE)?;
        let prefill_hours = parse_in_range(var("PREFILL_HOURS"), "PREFILL_HOURS", 6, PREFILL_HOURS_RANGE)?;
        let active_hours = parse_hours(var("ACTIVE_HOURS").as_deref().unwrap_or(""))?;
        let offset_hours: i32 = parse_number(var("ACTIVE_HOURS_UTC_OFFSET"), "ACTIVE_HOURS_UTC_OFFSET", 2)?;
        let local_offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            ConfigError::InvalidValue(
                "ACTIVE_HOURS_UTC_OFFSET".to_string(),
                format!("{} hours is not a valid UTC offset", offset_hours),
            )
        })?;
        let rss_feeds = parse_list(var("RSS_FEEDS").as_deref().unwrap_or(""));

        let page_access_token = var("PAGE_ACCESS_TOKEN");
        Ok(Self {
            bind_address,
            database_url,
            log_level,
            academy_data_path,
            groq_api_key: var("GROQ_API_KEY_4"),
            groq_api_base: or("GROQ_API_BASE", "https://api.groq.com/openai/v1"),
            text_model: or("TEXT_MODEL", "llama-3.3-70b-versatile"),
            image_provider,
            whatsapp_token: var("WHATSAPP_TOKEN").or_else(|| page_access_token.clone()),
            page_access_token,
            facebook_verify_token: or("FACEBOOK_VERIFY_TOKEN", "academy_webhook_2026"),
            graph_api_version: or("GRAPH_API_VERSION", "v18.0"),
            cron_secret: var("CRON_SECRET"),
            admin_token: var("ADMIN_TOKEN"),
            google_sheet_id: var("GOOGLE_SHEET_ID"),
            google_sheet_worksheet: or("GOOGLE_SHEET_WORKSHEET", "Buffer"),
            google_service_account_json,
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
            telegram_admin_id,
            telegram_webhook_secret: var("TELEGRAM_WEBHOOK_SECRET"),
            imgbb_api_key: var("IMGBB_API_KEY"),
            buffer_minutes,
            prefill_hours,
            active_hours,
            local_offset,
            rss_feeds,
        })
    }

    pub fn publisher_settings(&self) -> PublisherSettings {
        PublisherSettings {
            buffer_minutes: self.buffer_minutes,
            prefill_hours: self.prefill_hours,
            local_offset: self.local_offset,
        }
    }
}

//=========================================================================================
// Publisher Loop Configuration
//=========================================================================================

/// Settings for the `publisher` binary, which only needs to know where the
/// server lives and how to authenticate the tick.
#[derive(Clone, Debug)]
pub struct PublisherLoopConfig {
    pub backend_url: String,
    pub cron_secret: Option<String>,
    pub interval: Duration,
    pub log_level: Level,
}

impl PublisherLoopConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let var = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend_url = var("BACKEND_URL").ok_or_else(|| ConfigError::MissingVar("BACKEND_URL".to_string()))?;
        let seconds: u64 = parse_number(var("PUBLISHER_INTERVAL_SECONDS"), "PUBLISHER_INTERVAL_SECONDS", 60)?;
        if seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "PUBLISHER_INTERVAL_SECONDS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            cron_secret: var("CRON_SECRET"),
            interval: Duration::from_secs(seconds),
            log_level,
        })
    }
}

//=========================================================================================
// Value Parsers
//=========================================================================================

fn parse_number<T>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("'{}': {}", v, e))),
    }
}

fn parse_in_range(
    value: Option<String>,
    key: &str,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64, ConfigError> {
    let n = parse_number(value, key, default)?;
    if !range.contains(&n) {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("{} is outside {}..={}", n, range.start(), range.end()),
        ));
    }
    Ok(n)
}

/// `"9, 13,20"` → `[9, 13, 20]`, sorted and deduplicated.
pub fn parse_hours(value: &str) -> Result<Vec<u32>, ConfigError> {
    let mut hours = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let hour = part
            .parse::<u32>()
            .ok()
            .filter(|h| *h <= 23)
            .ok_or_else(|| {
                ConfigError::InvalidValue("ACTIVE_HOURS".to_string(), format!("'{}' is not an hour 0-23", part))
            })?;
        hours.push(hour);
    }
    hours.sort_unstable();
    hours.dedup();
    Ok(hours)
}

pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_address, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(cfg.database_url, "sqlite:saas.db?mode=rwc");
        assert_eq!(cfg.buffer_minutes, 30);
        assert_eq!(cfg.prefill_hours, 6);
        assert!(cfg.active_hours.is_empty());
        assert_eq!(cfg.local_offset.local_minus_utc(), 2 * 3600);
        assert_eq!(cfg.facebook_verify_token, "academy_webhook_2026");
        assert_eq!(cfg.image_provider, ImageStrategy::Pollinations);
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn port_is_used_without_bind_address() {
        let cfg = load(&[("PORT", "8080")]).unwrap();
        assert_eq!(cfg.bind_address.port(), 8080);
    }

    #[test]
    fn active_hours_are_validated() {
        let cfg = load(&[("ACTIVE_HOURS", "20, 9,9")]).unwrap();
        assert_eq!(cfg.active_hours, vec![9, 20]);
        assert!(matches!(
            load(&[("ACTIVE_HOURS", "9,24")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "ACTIVE_HOURS"
        ));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(matches!(
            load(&[("BUFFER_MINUTES", "soon")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "BUFFER_MINUTES"
        ));
        assert!(load(&[("ACTIVE_HOURS_UTC_OFFSET", "30")]).is_err());
    }

    #[test]
    fn scheduling_knobs_are_range_checked() {
        for (key, value) in [
            ("PREFILL_HOURS", "0"),
            ("PREFILL_HOURS", "-3"),
            ("PREFILL_HOURS", "169"),
            ("PREFILL_HOURS", "2000000000000"),
            ("BUFFER_MINUTES", "-1"),
            ("BUFFER_MINUTES", "1441"),
        ] {
            assert!(
                matches!(load(&[(key, value)]), Err(ConfigError::InvalidValue(k, _)) if k == key),
                "{key}={value} should be rejected"
            );
        }
        let cfg = load(&[("PREFILL_HOURS", "168"), ("BUFFER_MINUTES", "0")]).unwrap();
        assert_eq!((cfg.prefill_hours, cfg.buffer_minutes), (168, 0));
    }

    #[test]
    fn blank_secrets_count_as_unset() {
        let cfg = load(&[("ADMIN_TOKEN", "  "), ("PAGE_ACCESS_TOKEN", "page")]).unwrap();
        assert!(cfg.admin_token.is_none());
        assert_eq!(cfg.whatsapp_token.as_deref(), Some("page"));
    }

    #[test]
    fn feeds_are_split_on_commas() {
        assert_eq!(parse_list(" https://a/rss ,,https://b/rss"), vec!["https://a/rss", "https://b/rss"]);
    }
}
