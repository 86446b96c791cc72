//! Bot configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BOT_TOKEN` - Telegram Bot API token
//!
//! ## Optional
//! - `DATABASE_PATH` - SQLite file (default: campus_delivery.db)
//! - `PORT` - Health server port (default: 8000)
//! - `ADMIN_IDS` - Comma-separated Telegram ids allowed to run admin commands
//! - `CHANNEL_FEMALE_MAIN`, `CHANNEL_MALE_MAIN`, `CHANNEL_FEMALE_TECNO`,
//!   `CHANNEL_MALE_TECNO`, `CHANNEL_AGRI` - Chat id or `@username` per destination
//! - `CAFES` - Comma-separated vendor menu
//! - `SUPPORT_CONTACT` - Shown to unregistered users (default: @campusdeliveryy)
//! - `SESSION_IDLE_TIMEOUT_SECS` - Idle conversation expiry (default: 3600)
//! - `NOTIFY_MAX_ATTEMPTS` - Delivery attempts per order notice (default: 3)

use crate::commands::AccessPolicy;
use crate::routing::Destination;
use crate::runtime::{ChannelRef, RetryPolicy, ServiceSettings};
use crate::state_machine::{ConvSettings, UserId};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CAFES: &str = "Shewit,Fike,Askal,Mesi,E.L,Shash";
const DEFAULT_SUPPORT_CONTACT: &str = "@campusdeliveryy";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Bot configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_path: PathBuf,
    pub port: u16,
    pub admin_ids: HashSet<UserId>,
    pub channels: HashMap<Destination, ChannelRef>,
    pub cafes: Vec<String>,
    pub support_contact: String,
    pub session_idle_timeout: Duration,
    pub notify_max_attempts: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"[REDACTED]")
            .field("database_path", &self.database_path)
            .field("port", &self.port)
            .field("admin_ids", &self.admin_ids)
            .field("channels", &self.channels)
            .field("cafes", &self.cafes)
            .field("support_contact", &self.support_contact)
            .field("session_idle_timeout", &self.session_idle_timeout)
            .field("notify_max_attempts", &self.notify_max_attempts)
            .finish()
    }
}

fn channel_var(destination: Destination) -> &'static str {
    match destination {
        Destination::FemaleMain => "CHANNEL_FEMALE_MAIN",
        Destination::MaleMain => "CHANNEL_MALE_MAIN",
        Destination::FemaleTecno => "CHANNEL_FEMALE_TECNO",
        Destination::MaleTecno => "CHANNEL_MALE_TECNO",
        Destination::Agri => "CHANNEL_AGRI",
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token =
            get("BOT_TOKEN").ok_or_else(|| ConfigError::MissingEnvVar("BOT_TOKEN".into()))?;

        let database_path = PathBuf::from(
            get("DATABASE_PATH").unwrap_or_else(|| "campus_delivery.db".to_string()),
        );

        let port = parse_or("PORT", get("PORT"), 8000u16)?;

        let admin_ids = match get("ADMIN_IDS") {
            Some(raw) => parse_id_list("ADMIN_IDS", &raw)?,
            None => HashSet::new(),
        };

        let mut channels = HashMap::new();
        for destination in Destination::ALL {
            let key = channel_var(destination);
            if let Some(raw) = get(key) {
                let channel = ChannelRef::parse(&raw).ok_or_else(|| {
                    ConfigError::InvalidEnvVar(key.into(), format!("not a chat id or @username: {raw}"))
                })?;
                channels.insert(destination, channel);
            }
        }

        let cafes: Vec<String> = get("CAFES")
            .unwrap_or_else(|| DEFAULT_CAFES.to_string())
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
        if cafes.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "CAFES".into(),
                "at least one cafe is required".into(),
            ));
        }

        let support_contact =
            get("SUPPORT_CONTACT").unwrap_or_else(|| DEFAULT_SUPPORT_CONTACT.to_string());

        let idle_secs = parse_or(
            "SESSION_IDLE_TIMEOUT_SECS",
            get("SESSION_IDLE_TIMEOUT_SECS"),
            3600u64,
        )?;
        if idle_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SESSION_IDLE_TIMEOUT_SECS".into(),
                "must be positive".into(),
            ));
        }

        let notify_max_attempts =
            parse_or("NOTIFY_MAX_ATTEMPTS", get("NOTIFY_MAX_ATTEMPTS"), 3u32)?.max(1);

        Ok(Self {
            bot_token,
            database_path,
            port,
            admin_ids,
            channels,
            cafes,
            support_contact,
            session_idle_timeout: Duration::from_secs(idle_secs),
            notify_max_attempts,
        })
    }

    /// Settings for the conversation service
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            conversation: Arc::new(ConvSettings {
                cafes: self.cafes.clone(),
                support_contact: self.support_contact.clone(),
            }),
            access: AccessPolicy {
                admins: self.admin_ids.clone(),
                support_contact: self.support_contact.clone(),
            },
            channels: self.channels.clone(),
            notify_retry: RetryPolicy {
                max_attempts: self.notify_max_attempts,
                ..RetryPolicy::default()
            },
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.into(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_id_list(key: &str, raw: &str) -> Result<HashSet<UserId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<UserId>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.into(), format!("{id}: {e}")))
        })
        .collect()
}
