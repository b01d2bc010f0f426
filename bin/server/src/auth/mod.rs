//! Authentication module for the keyward server.
//!
//! This module provides:
//! - GitHub OAuth and Google OpenID Connect handshakes producing a
//!   [`ProviderIdentity`](keyward_platform_access::ProviderIdentity)
//! - The GitHub organization membership verifier
//! - PostgreSQL-backed account directory and sessions
//! - Cookie helpers for sessions, flash notices and the staged identity
//! - Authentication extractors for Axum routes
//!
//! Every provider callback runs the same pipeline: handshake, then
//! [`LinkingEngine::resolve`], then [`OutcomeApplier::apply`], and finally the
//! applied effects are written to cookies and a redirect.

pub mod cookies;
pub mod db;
pub mod github;
pub mod google;
pub mod middleware;
pub mod routes;
#[cfg(test)]
pub(crate) mod testing;

use keyward_platform_access::{
    AccountDirectory, LinkingConfig, LinkingEngine, OutcomeApplier, SessionStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::SessionConfig;

pub use db::{DomainSync, PgAccountDirectory, SessionRepository};
pub use github::{GitHubClient, GitHubOrgVerifier};
pub use google::GoogleClient;
pub use middleware::{OptionalAuth, RequireAuth};

/// Shared application state.
pub struct AppState {
    /// Account directory.
    pub directory: Arc<dyn AccountDirectory>,
    /// Session store.
    pub sessions: Arc<dyn SessionStore>,
    /// Decides provider callbacks.
    pub engine: LinkingEngine,
    /// Applies decided outcomes.
    pub applier: OutcomeApplier,
    /// GitHub OAuth client, if configured.
    pub github: Option<GitHubClient>,
    /// Google OpenID Connect client, if configured.
    pub google: Option<GoogleClient>,
    /// Linking settings, for provider titles.
    pub linking: LinkingConfig,
    /// Session configuration.
    pub session_config: SessionConfig,
}

/// Data needed to complete a provider callback, kept in a cookie between the
/// login redirect and the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthState {
    pub csrf_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}
