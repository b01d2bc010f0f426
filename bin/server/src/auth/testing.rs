//! Application state backed by in-memory stores, for tests.

use keyward_platform_access::{
    AccountDirectory, InMemoryAccountDirectory, InMemorySessionStore, LinkingConfig,
    LinkingEngine, MembershipVerifier, OutcomeApplier, SessionStore,
};
use std::sync::Arc;

use super::{AppState, GitHubClient, GitHubOrgVerifier};
use crate::config::{GitHubOAuthConfig, SessionConfig};

pub struct TestApp {
    pub directory: Arc<InMemoryAccountDirectory>,
    pub sessions: Arc<InMemorySessionStore>,
    pub state: Arc<AppState>,
}

pub fn github_oauth_config() -> GitHubOAuthConfig {
    GitHubOAuthConfig {
        client_id: Some("client-id".to_string()),
        client_secret: Some("client-secret".to_string()),
        redirect_url: Some("http://localhost:3000/auth/github/callback".to_string()),
        ..GitHubOAuthConfig::default()
    }
}

/// Builds state whose GitHub membership checks go to `github_api_url`.
pub fn test_app(
    linking: LinkingConfig,
    directory: InMemoryAccountDirectory,
    github_api_url: &str,
    with_github_client: bool,
) -> TestApp {
    let directory = Arc::new(directory);
    let sessions = Arc::new(InMemorySessionStore::new());
    let http = reqwest::Client::new();
    let verifier: Arc<dyn MembershipVerifier> =
        Arc::new(GitHubOrgVerifier::new(github_api_url, http.clone()));
    let github = with_github_client.then(|| {
        GitHubClient::new(&github_oauth_config(), github_api_url, http).expect("github client")
    });

    let account_directory: Arc<dyn AccountDirectory> = directory.clone();
    let session_store: Arc<dyn SessionStore> = sessions.clone();
    let state = Arc::new(AppState {
        directory: account_directory.clone(),
        sessions: session_store,
        engine: LinkingEngine::new(&linking, account_directory.clone(), verifier),
        applier: OutcomeApplier::new(account_directory, linking.clone()),
        github,
        google: None,
        linking,
        session_config: SessionConfig::default(),
    });

    TestApp {
        directory,
        sessions,
        state,
    }
}
