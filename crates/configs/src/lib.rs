//! # configs
//!
//! Layered settings for the PerdidosYa! binary: built-in defaults, then an
//! optional `perdidos.toml`, then `PY__`-prefixed environment variables
//! (`PY__FEED__PAGE_SIZE=24`). A `.env` file is loaded first when present.

use std::time::Duration;

use chrono::FixedOffset;
use config::{Config, Environment, File};
use py_feed::FeedSettings;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedSection {
    pub page_size: usize,
    pub remote_timeout_secs: u64,
    /// Campus offset from UTC, `±HH:MM`.
    pub utc_offset: String,
    pub public_base_url: String,
    pub max_image_bytes: usize,
    pub daily_post_limit: u64,
    pub comment_limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct SessionsSection {
    /// Visitors unseen for this long are dropped.
    pub idle_ttl_secs: u64,
    pub max_visitors: usize,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaSection {
    pub root: String,
    pub url_prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthSection {
    #[serde(deserialize_with = "secret")]
    pub session_salt: SecretString,
    pub allowed_email_suffix: String,
}

#[derive(Debug, Deserialize)]
pub struct ModerationSection {
    pub endpoint: String,
    #[serde(deserialize_with = "secret")]
    pub api_key: SecretString,
    pub text_model: String,
    pub image_model: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailSection {
    pub endpoint: String,
    pub service_id: String,
    pub template_id: String,
    #[serde(deserialize_with = "secret")]
    pub public_key: SecretString,
    pub reply_to: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSection,
    pub logging: LoggingSection,
    pub feed: FeedSection,
    pub sessions: SessionsSection,
    pub database: DatabaseSection,
    pub media: MediaSection,
    pub auth: AuthSection,
    pub moderation: ModerationSection,
    pub email: EmailSection,
}

const DEFAULTS: &[(&str, &str)] = &[
    ("server.host", "127.0.0.1"),
    ("server.port", "8080"),
    ("logging.json", "false"),
    ("logging.filter", "perdidos_ya=info,py_feed=info,py_api=info,actix_web=info"),
    ("feed.page_size", "12"),
    ("feed.remote_timeout_secs", "15"),
    ("feed.utc_offset", "-04:00"),
    ("feed.public_base_url", "http://localhost:8080"),
    ("feed.max_image_bytes", "5242880"),
    ("feed.daily_post_limit", "3"),
    ("feed.comment_limit", "3"),
    ("sessions.idle_ttl_secs", "1800"),
    ("sessions.max_visitors", "10000"),
    ("database.url", "sqlite:perdidos_ya.db"),
    ("media.root", "./data/media"),
    ("media.url_prefix", "/media"),
    ("auth.session_salt", "dev-salt-change-me"),
    ("auth.allowed_email_suffix", ".edu"),
    ("moderation.endpoint", "https://api.mistral.ai/v1/chat/completions"),
    ("moderation.api_key", ""),
    ("moderation.text_model", "mistral-large-latest"),
    ("moderation.image_model", "pixtral-large-latest"),
    ("email.endpoint", "https://api.emailjs.com/api/v1.0/email/send"),
    ("email.service_id", ""),
    ("email.template_id", ""),
    ("email.public_key", ""),
    ("email.reply_to", "notificaciones@perdidosya.web.app"),
];

impl Settings {
    /// Loads `.env`, then the layered sources.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), ".env loaded"),
            Err(_) => debug!("no .env file"),
        }
        Self::from_sources(Some("perdidos"), Environment::with_prefix("PY").prefix_separator("__").separator("__"))
    }

    fn from_sources(file: Option<&str>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        for (key, value) in DEFAULTS {
            builder = builder.set_default(*key, *value)?;
        }
        if let Some(name) = file {
            builder = builder.add_source(File::with_name(name).required(false));
        }
        let settings: Settings = builder.add_source(env.try_parsing(true)).build()?.try_deserialize()?;
        settings.feed.offset()?;
        Ok(settings)
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }

    pub fn feed_settings(&self) -> Result<FeedSettings, ConfigError> {
        let feed = &self.feed;
        if feed.page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "feed.page_size",
                message: "must be positive".to_string(),
            });
        }
        Ok(FeedSettings {
            page_size: feed.page_size,
            remote_timeout: Duration::from_secs(feed.remote_timeout_secs),
            utc_offset: feed.offset()?,
            public_base_url: feed.public_base_url.trim_end_matches('/').to_string(),
            max_image_bytes: feed.max_image_bytes,
            daily_post_limit: feed.daily_post_limit,
            comment_limit: feed.comment_limit,
        })
    }
}

impl SessionsSection {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

impl FeedSection {
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| ConfigError::Invalid {
            key: "feed.utc_offset",
            message: format!("expected ±HH:MM, got {:?}", self.utc_offset),
        })
    }
}

/// Parses `±HH:MM` (or `Z`).
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = if let Some(rest) = raw.strip_prefix('+') {
        (1, rest)
    } else {
        (-1, raw.strip_prefix('-')?)
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
