//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! `__` as the separator, e.g. `GITHUB__CLIENT_ID` or
//! `LINKING__GITHUB__ORG_ID`.
//!
//! See [`LinkingConfig`] for the auto-provisioning settings.

use keyward_platform_access::LinkingConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// GitHub OAuth application.
    #[serde(default)]
    pub github: GitHubOAuthConfig,

    /// Google OpenID Connect client.
    #[serde(default)]
    pub google: GoogleOAuthConfig,

    /// Linking and auto-provisioning settings.
    #[serde(default)]
    pub linking: LinkingConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session duration in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// How long a staged identity survives a failed auto-provision, in minutes.
    #[serde(default = "default_staged_identity_minutes")]
    pub staged_identity_minutes: i64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_session_duration_minutes() -> i64 {
    60 * 24
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_staged_identity_minutes() -> i64 {
    10
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            staged_identity_minutes: default_staged_identity_minutes(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

/// GitHub OAuth application settings.
///
/// GitHub sign-in is disabled unless the client id, secret and redirect URL
/// are all set.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Absolute URL of `/auth/github/callback`.
    pub redirect_url: Option<String>,

    /// Default: "https://github.com/login/oauth/authorize"
    #[serde(default = "default_github_auth_url")]
    pub auth_url: String,

    /// Default: "https://github.com/login/oauth/access_token"
    #[serde(default = "default_github_token_url")]
    pub token_url: String,

    /// Timeout for GitHub API requests, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_github_auth_url() -> String {
    "https://github.com/login/oauth/authorize".to_string()
}

fn default_github_token_url() -> String {
    "https://github.com/login/oauth/access_token".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    10
}

impl Default for GitHubOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_url: None,
            auth_url: default_github_auth_url(),
            token_url: default_github_token_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Google OpenID Connect settings.
///
/// Google sign-in is disabled unless the client id, secret and redirect URL
/// are all set.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Absolute URL of `/auth/google/callback`.
    pub redirect_url: Option<String>,

    /// Default: "https://accounts.google.com"
    #[serde(default = "default_google_issuer_url")]
    pub issuer_url: String,
}

fn default_google_issuer_url() -> String {
    "https://accounts.google.com".to_string()
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_url: None,
            issuer_url: default_google_issuer_url(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default())
    }

    fn from_source(environment: config::Environment) -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.session.validate()?;
        Ok(config)
    }
}

impl SessionConfig {
    /// Rejects durations the server cannot run with.
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.cleanup_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "session.cleanup_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.duration_minutes <= 0 {
            return Err(config::ConfigError::Message(
                "session.duration_minutes must be greater than zero".to_string(),
            ));
        }
        if self.staged_identity_minutes <= 0 {
            return Err(config::ConfigError::Message(
                "session.staged_identity_minutes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
