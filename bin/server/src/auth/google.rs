//! Google sign-in using OpenID Connect discovery.

use keyward_platform_access::{Provider, ProviderIdentity};
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};

use super::AuthState;
use crate::config::GoogleOAuthConfig;

const GOOGLE_SCOPES: &[&str] = &["email", "profile"];

/// Google OpenID Connect client.
pub struct GoogleClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http: reqwest::Client,
}

impl GoogleClient {
    /// Creates a client by discovering the issuer's provider metadata.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` if the client id, secret or redirect URL is
    /// missing, and `Discovery` if the issuer could not be reached.
    pub async fn discover(config: &GoogleOAuthConfig) -> Result<Self, GoogleError> {
        let (Some(client_id), Some(client_secret), Some(redirect_url)) = (
            config.client_id.as_ref(),
            config.client_secret.as_ref(),
            config.redirect_url.as_ref(),
        ) else {
            return Err(GoogleError::NotConfigured);
        };

        let issuer_url = IssuerUrl::new(config.issuer_url.clone())
            .map_err(|e| GoogleError::Configuration(format!("invalid issuer URL: {e}")))?;
        let redirect_url = RedirectUrl::new(redirect_url.clone())
            .map_err(|e| GoogleError::Configuration(format!("invalid redirect URI: {e}")))?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                GoogleError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http)
            .await
            .map_err(|e| GoogleError::Discovery(format!("failed to discover provider: {e}")))?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(client_id.clone()),
            client_secret: ClientSecret::new(client_secret.clone()),
            redirect_url,
            http,
        })
    }

    fn client(
        &self,
    ) -> CoreClient<
        openidconnect::EndpointSet,
        openidconnect::EndpointNotSet,
        openidconnect::EndpointNotSet,
        openidconnect::EndpointNotSet,
        openidconnect::EndpointMaybeSet,
        openidconnect::EndpointMaybeSet,
    > {
        CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone())
    }

    /// Generates the authorization URL for redirecting the user.
    pub fn authorization_url(&self) -> (String, AuthState) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let client = self.client();
        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in GOOGLE_SCOPES {
            auth_request = auth_request.add_scope(Scope::new((*scope).to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: Some(pkce_verifier.secret().clone()),
            nonce: Some(nonce.secret().clone()),
        };

        (auth_url.to_string(), state)
    }

    /// Exchanges the authorization code and reads the identity from the
    /// verified ID token.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<ProviderIdentity, GoogleError> {
        let (Some(pkce_verifier), Some(nonce)) = (&state.pkce_verifier, &state.nonce) else {
            return Err(GoogleError::TokenExchange(
                "auth state has no PKCE verifier or nonce".to_string(),
            ));
        };

        let client = self.client();

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| GoogleError::TokenExchange(format!("token endpoint error: {e}")))?
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| GoogleError::TokenExchange(format!("token exchange failed: {e}")))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| GoogleError::TokenExchange("no ID token in response".to_string()))?;

        let claims = id_token
            .claims(&client.id_token_verifier(), &Nonce::new(nonce.clone()))
            .map_err(|e| GoogleError::TokenValidation(format!("ID token validation failed: {e}")))?;

        let email = verified_email(claims.email().map(|e| e.as_str()), claims.email_verified());
        let display_name = claims
            .name()
            .and_then(|n| n.get(None))
            .map(|n| n.as_str().to_string())
            .unwrap_or_default();

        Ok(ProviderIdentity::new(
            Provider::Google,
            claims.subject().as_str(),
            display_name,
            email,
            token_response.access_token().secret().as_str(),
        ))
    }
}

/// Returns the email only when Google has verified it.
///
/// An unverified address is not evidence of a domain, so it is dropped: the
/// identity then fails the domain policy and account validation.
fn verified_email(email: Option<&str>, email_verified: Option<bool>) -> String {
    match (email, email_verified) {
        (Some(email), Some(true)) => email.to_string(),
        (Some(email), _) => {
            tracing::warn!(email, "ignoring unverified Google email");
            String::new()
        }
        (None, _) => String::new(),
    }
}

/// Google sign-in errors.
#[derive(Debug)]
pub enum GoogleError {
    /// Google sign-in is not configured.
    NotConfigured,
    /// Configuration error (invalid URLs, etc.)
    Configuration(String),
    /// Failed to discover provider metadata.
    Discovery(String),
    /// Token exchange failed.
    TokenExchange(String),
    /// Token validation failed.
    TokenValidation(String),
}

impl std::fmt::Display for GoogleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "Google sign-in is not configured"),
            Self::Configuration(msg) => write!(f, "OIDC configuration error: {msg}"),
            Self::Discovery(msg) => write!(f, "OIDC discovery error: {msg}"),
            Self::TokenExchange(msg) => write!(f, "OIDC token exchange error: {msg}"),
            Self::TokenValidation(msg) => write!(f, "OIDC token validation error: {msg}"),
        }
    }
}

impl std::error::Error for GoogleError {}
