//! Server settings, loaded from a JSON file.
//!
//! Every section is optional; anything left out takes its default. A
//! minimal file only needs credentials:
//!
//! ```json
//! { "credentials": { "username": "percy", "password": "123" } }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use feedhub_session::{SessionConfig, TokenConfig};
use feedhub_ticker::{FeedConfig, default_feeds};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything the server reads from its settings file.
///
/// Every field has a default, so `Settings::default()` is a working
/// configuration apart from credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP listener binds to.
    pub bind: SocketAddr,
    /// Login credentials. With none configured every login is refused.
    pub credentials: Option<Credentials>,
    pub keepalive: KeepaliveSettings,
    pub tokens: TokenSettings,
    /// Per-session outbound queue capacity.
    pub outbound_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Browser origins allowed to upgrade. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    pub feeds: Vec<FeedSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            credentials: None,
            keepalive: KeepaliveSettings::default(),
            tokens: TokenSettings::default(),
            outbound_capacity: session.outbound_capacity,
            max_message_size: 512,
            allowed_origins: vec!["http://localhost:8080".to_owned()],
            feeds: default_feeds().iter().map(FeedSettings::from).collect(),
        }
    }
}

impl Settings {
    /// Reads and validates settings from `path`.
    ///
    /// # Errors
    /// [`ConfigError::Read`] if the file cannot be read, otherwise see
    /// [`Settings::from_json`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let settings = Self::from_json(&text)?;
        tracing::info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Parses and validates settings from JSON text.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed JSON, [`ConfigError::Invalid`]
    /// if [`Settings::validate`] rejects the result.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects zero durations and sizes, duplicate feed names and feeds
    /// that cannot tick.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("keepalive.pong_wait_ms", self.keepalive.pong_wait_ms),
            ("keepalive.ack_window_ms", self.keepalive.ack_window_ms),
            ("tokens.retention_ms", self.tokens.retention_ms),
            ("tokens.sweep_interval_ms", self.tokens.sweep_interval_ms),
            ("outbound_capacity", self.outbound_capacity as u64),
            ("max_message_size", self.max_message_size as u64),
        ];
        if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
        }
        // ping interval is 9/10 of pong wait and must not round to zero
        if self.session_config().ping_interval().is_zero() {
            return Err(ConfigError::Invalid("keepalive.pong_wait_ms is too small".into()));
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if !seen.insert(feed.name.as_str()) {
                return Err(ConfigError::Invalid(format!("feed {:?} is listed twice", feed.name)));
            }
            feed.to_config()
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Keepalive and queueing parameters for new sessions.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            pong_wait: Duration::from_millis(self.keepalive.pong_wait_ms),
            ack_window: Duration::from_millis(self.keepalive.ack_window_ms),
            outbound_capacity: self.outbound_capacity,
        }
    }

    /// Lifetime parameters for the one-time token store.
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            retention: Duration::from_millis(self.tokens.retention_ms),
            sweep_interval: Duration::from_millis(self.tokens.sweep_interval_ms),
        }
    }

    /// The configured feeds, in file order.
    pub fn feed_configs(&self) -> Vec<FeedConfig> {
        self.feeds.iter().map(FeedSettings::to_config).collect()
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// The single username/password pair accepted by `/login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Exact, case-sensitive comparison of both fields.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Keepalive and token sections
// ---------------------------------------------------------------------------

/// Timers that decide when an unresponsive client is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveSettings {
    /// Read deadline; each Pong extends it by this much.
    pub pong_wait_ms: u64,
    /// Window in which the client must send `acknowledge`.
    pub ack_window_ms: u64,
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            pong_wait_ms: session.pong_wait.as_millis() as u64,
            ack_window_ms: session.ack_window.as_millis() as u64,
        }
    }
}

/// How long a login token lives and how often stale ones are swept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    pub retention_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        let tokens = TokenConfig::default();
        Self {
            retention_ms: tokens.retention.as_millis() as u64,
            sweep_interval_ms: tokens.sweep_interval.as_millis() as u64,
        }
    }
}

// ---------------------------------------------------------------------------
// Feeds
// ---------------------------------------------------------------------------

/// One feed as written in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSettings {
    pub name: String,
    pub initial_value: i64,
    pub decimals: u8,
    pub delta_min: i64,
    pub delta_max: i64,
    pub interval_ms: u64,
}

impl FeedSettings {
    /// Converts to the ticker's config. Not validated here; see
    /// [`FeedConfig::validate`].
    pub fn to_config(&self) -> FeedConfig {
        FeedConfig {
            name: self.name.clone(),
            initial_value: self.initial_value,
            decimals: self.decimals,
            delta_min: self.delta_min,
            delta_max: self.delta_max,
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

impl From<&FeedConfig> for FeedSettings {
    fn from(config: &FeedConfig) -> Self {
        Self {
            name: config.name.clone(),
            initial_value: config.initial_value,
            decimals: config.decimals,
            delta_min: config.delta_min,
            delta_max: config.delta_max,
            interval_ms: config.interval.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();

        settings.validate().unwrap();
        assert_eq!(settings.max_message_size, 512);
        assert_eq!(settings.feeds.len(), 4);
        assert_eq!(settings.session_config().pong_wait, Duration::from_secs(10));
        assert_eq!(settings.token_config().retention, Duration::from_secs(5));
    }

    #[test]
    fn test_from_json_empty_object_uses_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_from_json_partial_sections_keep_other_defaults() {
        let settings = Settings::from_json(
            r#"{
                "bind": "0.0.0.0:9000",
                "credentials": {"username": "percy", "password": "123"},
                "keepalive": {"ack_window_ms": 1000}
            }"#,
        )
        .unwrap();

        assert_eq!(settings.bind.port(), 9000);
        assert!(settings.credentials.unwrap().matches("percy", "123"));
        assert_eq!(settings.keepalive.ack_window_ms, 1000);
        assert_eq!(settings.keepalive.pong_wait_ms, 10_000);
    }

    #[test]
    fn test_from_json_custom_feeds_replace_defaults() {
        let settings = Settings::from_json(
            r#"{"feeds": [{"name": "Solo", "initial_value": 100, "decimals": 2,
                           "delta_min": -20, "delta_max": 20, "interval_ms": 250}]}"#,
        )
        .unwrap();

        let feeds = settings.feed_configs();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].name, "Solo");
        assert_eq!(feeds[0].interval, Duration::from_millis(250));
    }

    #[test]
    fn test_from_json_malformed_is_parse_error() {
        assert!(matches!(
            Settings::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let settings = Settings {
            outbound_capacity: 0,
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("outbound_capacity"));
    }

    #[test]
    fn test_validate_rejects_duplicate_feed() {
        let mut settings = Settings::default();
        let first = settings.feeds[0].clone();
        settings.feeds.push(first);

        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_delta_range() {
        let mut settings = Settings::default();
        settings.feeds[0].delta_max = settings.feeds[0].delta_min;

        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = Settings::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            username: "percy".into(),
            password: "hunter2".into(),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("percy"));
        assert!(!shown.contains("hunter2"));
    }
}
