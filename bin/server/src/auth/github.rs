//! GitHub OAuth and REST API client.
//!
//! - `GitHubClient` runs the authorization-code handshake and reads the
//!   signed-in user's identity from the REST API
//! - `GitHubOrgVerifier` answers organization membership for
//!   auto-provisioning by listing the user's organizations
//!   (`GET /user/orgs`, paginated)

use async_trait::async_trait;
use keyward_platform_access::{MembershipError, MembershipVerifier, Provider, ProviderIdentity};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl, basic::BasicClient,
};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::AuthState;
use crate::config::GitHubOAuthConfig;

/// Scopes needed to read the user's emails and organizations.
const GITHUB_SCOPES: &[&str] = &["read:user", "user:email", "read:org"];

/// Page size for paginated GitHub API listings.
const PER_PAGE: usize = 100;

const GITHUB_API_ACCEPT: &str = "application/vnd.github+json";

/// GitHub API and OAuth errors.
#[derive(Debug)]
pub enum GitHubError {
    /// GitHub OAuth is not configured.
    NotConfigured,
    /// Configuration error.
    Configuration(String),
    /// Token exchange failed.
    TokenExchange(String),
    /// The REST API could not be reached or answered with an error.
    Api(String),
}

impl std::fmt::Display for GitHubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "GitHub OAuth is not configured"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::TokenExchange(msg) => write!(f, "token exchange error: {msg}"),
            Self::Api(msg) => write!(f, "GitHub API error: {msg}"),
        }
    }
}

impl std::error::Error for GitHubError {}

/// Builds the HTTP client used for GitHub requests.
///
/// Redirects are not followed, as required for OAuth token requests.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_API_ACCEPT));

    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .user_agent(concat!("keyward/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .build()
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubOrganization {
    id: u64,
}

/// GitHub OAuth client.
#[derive(Clone)]
pub struct GitHubClient {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    api_url: String,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Creates a GitHub OAuth client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` if the client id, secret or redirect URL is
    /// missing, and `Configuration` if a URL is invalid.
    pub fn new(
        config: &GitHubOAuthConfig,
        api_url: &str,
        http: reqwest::Client,
    ) -> Result<Self, GitHubError> {
        let client_id = config
            .client_id
            .as_ref()
            .ok_or(GitHubError::NotConfigured)?;
        let client_secret = config
            .client_secret
            .as_ref()
            .ok_or(GitHubError::NotConfigured)?;
        let redirect_url = config
            .redirect_url
            .as_ref()
            .ok_or(GitHubError::NotConfigured)?;

        Ok(Self {
            client_id: ClientId::new(client_id.clone()),
            client_secret: ClientSecret::new(client_secret.clone()),
            auth_url: AuthUrl::new(config.auth_url.clone())
                .map_err(|e| GitHubError::Configuration(format!("invalid auth URL: {e}")))?,
            token_url: TokenUrl::new(config.token_url.clone())
                .map_err(|e| GitHubError::Configuration(format!("invalid token URL: {e}")))?,
            redirect_url: RedirectUrl::new(redirect_url.clone())
                .map_err(|e| GitHubError::Configuration(format!("invalid redirect URL: {e}")))?,
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Generates the authorization URL for GitHub OAuth.
    ///
    /// Returns the URL to redirect the user to, along with auth state to store.
    pub fn authorization_url(&self) -> (String, AuthState) {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let mut auth_request = client.authorize_url(CsrfToken::new_random);
        for scope in GITHUB_SCOPES {
            auth_request = auth_request.add_scope(Scope::new((*scope).to_string()));
        }

        let (auth_url, csrf_token) = auth_request.url();

        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: None,
            nonce: None,
        };

        (auth_url.to_string(), state)
    }

    /// Exchanges the authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, GitHubError> {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let token_result = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| GitHubError::TokenExchange(e.to_string()))?;

        Ok(token_result.access_token().secret().clone())
    }

    /// Reads the identity of the user the access token belongs to.
    ///
    /// The email is the profile's public email, or else the primary verified
    /// address. It is left empty when the user has neither.
    #[instrument(skip_all)]
    pub async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity, GitHubError> {
        let user: GitHubUser = self.get_json("/user", access_token).await?;

        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                let emails: Vec<GitHubEmail> = self.get_json("/user/emails", access_token).await?;
                emails
                    .into_iter()
                    .find(|e| e.primary && e.verified)
                    .map(|e| e.email)
                    .unwrap_or_default()
            }
        };

        debug!(login = %user.login, "fetched GitHub identity");

        Ok(ProviderIdentity::new(
            Provider::GitHub,
            user.login,
            user.name.unwrap_or_default(),
            email,
            access_token,
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, GitHubError> {
        let response = self
            .http
            .get(format!("{}{path}", self.api_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GitHubError::Api(format!("GET {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GitHubError::Api(format!("GET {path} returned {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| GitHubError::Api(format!("GET {path}: invalid response: {e}")))
    }
}

/// Organization membership checks against the GitHub REST API.
pub struct GitHubOrgVerifier {
    api_url: String,
    http: reqwest::Client,
}

impl GitHubOrgVerifier {
    /// Creates a verifier for the API at `api_url`.
    pub fn new(api_url: &str, http: reqwest::Client) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn organizations_page(
        &self,
        access_token: &str,
        page: usize,
    ) -> Result<Vec<GitHubOrganization>, MembershipError> {
        let response = self
            .http
            .get(format!("{}/user/orgs", self.api_url))
            .query(&[("per_page", PER_PAGE), ("page", page)])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| MembershipError::Transport {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(MembershipError::Api {
                status: status.as_u16(),
                details,
            });
        }

        response
            .json()
            .await
            .map_err(|e| MembershipError::InvalidResponse {
                details: e.to_string(),
            })
    }
}

#[async_trait]
impl MembershipVerifier for GitHubOrgVerifier {
    #[instrument(skip(self, access_token))]
    async fn is_member(&self, access_token: &str, org_id: u64) -> Result<bool, MembershipError> {
        let mut page = 1;
        loop {
            let organizations = self.organizations_page(access_token, page).await?;
            if organizations.iter().any(|org| org.id == org_id) {
                return Ok(true);
            }
            if organizations.len() < PER_PAGE {
                debug!(pages = page, "organization not found");
                return Ok(false);
            }
            page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "gho_test_token";

    fn client() -> reqwest::Client {
        http_client(Duration::from_secs(5)).expect("http client")
    }

    fn orgs(ids: impl IntoIterator<Item = u64>) -> serde_json::Value {
        json!(
            ids.into_iter()
                .map(|id| json!({ "id": id, "login": format!("org-{id}") }))
                .collect::<Vec<_>>()
        )
    }

    async fn mount_orgs_page(server: &MockServer, page: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/user/orgs"))
            .and(query_param("page", page))
            .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn member_when_org_is_listed() {
        let server = MockServer::start().await;
        mount_orgs_page(&server, "1", orgs([1, 4242, 7])).await;

        let verifier = GitHubOrgVerifier::new(&server.uri(), client());

        assert!(verifier.is_member(TOKEN, 4242).await.expect("membership"));
    }

    #[tokio::test]
    async fn not_member_when_org_is_absent() {
        let server = MockServer::start().await;
        mount_orgs_page(&server, "1", orgs([1, 7])).await;

        let verifier = GitHubOrgVerifier::new(&server.uri(), client());

        assert!(!verifier.is_member(TOKEN, 4242).await.expect("membership"));
    }

    #[tokio::test]
    async fn follows_pagination() {
        let server = MockServer::start().await;
        mount_orgs_page(&server, "1", orgs(1..=100)).await;
        mount_orgs_page(&server, "2", orgs([4242])).await;

        let verifier = GitHubOrgVerifier::new(&format!("{}/", server.uri()), client());

        assert!(verifier.is_member(TOKEN, 4242).await.expect("membership"));
    }

    #[tokio::test]
    async fn unauthorized_token_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/orgs"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;

        let verifier = GitHubOrgVerifier::new(&server.uri(), client());
        let err = verifier.is_member(TOKEN, 4242).await.expect_err("401");

        assert_eq!(
            err,
            MembershipError::Api {
                status: 401,
                details: "Bad credentials".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_an_error_not_a_denial() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/orgs"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let verifier = GitHubOrgVerifier::new(&server.uri(), client());
        let err = verifier.is_member(TOKEN, 4242).await.expect_err("500");

        assert!(matches!(err, MembershipError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn malformed_listing_is_invalid_response() {
        let server = MockServer::start().await;
        mount_orgs_page(&server, "1", json!({ "message": "not a list" })).await;

        let verifier = GitHubOrgVerifier::new(&server.uri(), client());
        let err = verifier.is_member(TOKEN, 4242).await.expect_err("invalid body");

        assert!(matches!(err, MembershipError::InvalidResponse { .. }));
    }

    fn github_client(api_url: &str) -> GitHubClient {
        let config = GitHubOAuthConfig {
            client_id: Some("Iv1.client".to_string()),
            client_secret: Some("secret".to_string()),
            redirect_url: Some("http://localhost:3000/auth/github/callback".to_string()),
            ..GitHubOAuthConfig::default()
        };
        GitHubClient::new(&config, api_url, client()).expect("client")
    }

    #[tokio::test]
    async fn identity_uses_public_profile_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "octocat",
                "id": 1,
                "name": "The Octocat",
                "email": "octocat@github.com",
            })))
            .mount(&server)
            .await;

        let identity = github_client(&server.uri())
            .fetch_identity(TOKEN)
            .await
            .expect("identity");

        assert_eq!(identity.provider(), Provider::GitHub);
        assert_eq!(identity.external_id(), "octocat");
        assert_eq!(identity.display_name(), "The Octocat");
        assert_eq!(identity.email(), "octocat@github.com");
        assert_eq!(identity.access_token(), TOKEN);
    }

    #[tokio::test]
    async fn identity_falls_back_to_primary_verified_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "octocat",
                "id": 1,
                "name": null,
                "email": null,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "email": "old@example.com", "primary": false, "verified": true },
                { "email": "octocat@example.com", "primary": true, "verified": true },
            ])))
            .mount(&server)
            .await;

        let identity = github_client(&server.uri())
            .fetch_identity(TOKEN)
            .await
            .expect("identity");

        assert_eq!(identity.email(), "octocat@example.com");
        assert_eq!(identity.display_name(), "");
    }

    #[test]
    fn authorization_url_requests_org_scope() {
        let (url, state) = github_client("https://api.github.com").authorization_url();

        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("read%3Aorg"));
        assert!(url.contains(&format!("state={}", state.csrf_token)));
        assert!(state.pkce_verifier.is_none());
    }

    #[test]
    fn missing_client_secret_is_not_configured() {
        let config = GitHubOAuthConfig {
            client_id: Some("Iv1.client".to_string()),
            ..GitHubOAuthConfig::default()
        };
        let result = GitHubClient::new(&config, "https://api.github.com", client());

        assert!(matches!(result, Err(GitHubError::NotConfigured)));
    }
}
