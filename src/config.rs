//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::time::Duration;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub views: ViewConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "market.example.edu")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://market.example.edu"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
}

/// Admin user configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Admin username (default: "admin")
    #[serde(default = "default_admin_username")]
    pub username: String,
}

fn default_admin_username() -> String {
    "admin".to_string()
}

/// Notification feed tuning
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Client poll interval (default: 20)
    pub poll_interval_seconds: u64,
    /// Maximum items kept in one aggregation pass (default: 100)
    pub max_items: usize,
    /// Per-source fetch timeout (default: 10)
    pub fetch_timeout_seconds: u64,
    /// Conversations acknowledged concurrently by "mark all read" (default: 20)
    pub bulk_chunk_size: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 20,
            max_items: 100,
            fetch_timeout_seconds: 10,
            bulk_chunk_size: 20,
        }
    }
}

impl NotificationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Per-conversation event channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Simultaneous listeners per conversation before warning (default: 100)
    pub max_subscribers: usize,
    /// Broadcast buffer per conversation (default: 64)
    pub channel_capacity: usize,
    /// Delay before an idle broker is dropped (default: 30)
    pub idle_grace_seconds: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_subscribers: 100,
            channel_capacity: 64,
            idle_grace_seconds: 30,
        }
    }
}

/// View deduplication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ViewConfig {
    /// Window in which repeat views are not counted (default: 1800)
    pub dedup_window_seconds: i64,
    /// Entry count above which a sweep runs (default: 10000)
    pub sweep_threshold: usize,
    /// Entries older than this are removed by a sweep (default: 3600)
    pub sweep_max_age_seconds: i64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            dedup_window_seconds: 30 * 60,
            sweep_threshold: 10_000,
            sweep_max_age_seconds: 60 * 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (CAMPUSMARKET_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/campusmarket.db")?
            .set_default("auth.session_max_age", 604800)?
            .set_default("admin.username", "admin")?
            .set_default("notifications.poll_interval_seconds", 20)?
            .set_default("notifications.max_items", 100)?
            .set_default("notifications.fetch_timeout_seconds", 10)?
            .set_default("notifications.bulk_chunk_size", 20)?
            .set_default("chat.max_subscribers", 100)?
            .set_default("chat.channel_capacity", 64)?
            .set_default("chat.idle_grace_seconds", 30)?
            .set_default("views.dedup_window_seconds", 1800)?
            .set_default("views.sweep_threshold", 10000)?
            .set_default("views.sweep_max_age_seconds", 3600)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (CAMPUSMARKET_*)
            .add_source(
                Environment::with_prefix("CAMPUSMARKET")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.notifications.poll_interval_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "notifications.poll_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.notifications.bulk_chunk_size == 0 {
            return Err(crate::error::AppError::Config(
                "notifications.bulk_chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.chat.channel_capacity == 0 {
            return Err(crate::error::AppError::Config(
                "chat.channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.views.dedup_window_seconds <= 0 || self.views.sweep_max_age_seconds <= 0 {
            return Err(crate::error::AppError::Config(
                "views windows must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/campusmarket-test.db"),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 604_800,
            },
            admin: AdminConfig {
                username: "admin".to_string(),
            },
            notifications: NotificationConfig::default(),
            chat: ChatConfig::default(),
            views: ViewConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "market.example.edu".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_zero_chunk_size() {
        let mut config = valid_config();
        config.notifications.bulk_chunk_size = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_match_feed_contract() {
        let notifications = NotificationConfig::default();
        assert_eq!(notifications.poll_interval(), Duration::from_secs(20));
        assert_eq!(notifications.max_items, 100);
        assert_eq!(notifications.bulk_chunk_size, 20);

        let views = ViewConfig::default();
        assert_eq!(views.dedup_window_seconds, 1800);
        assert_eq!(views.sweep_threshold, 10_000);
    }
}
