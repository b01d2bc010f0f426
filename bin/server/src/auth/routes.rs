//! Sign-in routes: provider login and callback, login form data, profile,
//! and logout.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::CookieJar;
use chrono::Duration;
use keyward_platform_access::{
    Account, AccountId, AppliedOutcome, Notice, Provider, ProviderIdentity, Session,
    SessionEffect, StagedEffect, StagedIdentity,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use super::{AppState, AuthState, OptionalAuth, RequireAuth, cookies};
use crate::config::SessionConfig;
use crate::error::CallbackError;

/// Query parameters for a provider callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Initiates GitHub sign-in by redirecting to GitHub.
pub async fn github_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, CallbackError> {
    let client = state.github.as_ref().ok_or(CallbackError::NotConfigured {
        provider: Provider::GitHub,
    })?;

    let (auth_url, auth_state) = client.authorization_url();
    let jar = cookies::set_auth_state(
        jar,
        Provider::GitHub,
        &auth_state,
        state.session_config.secure_cookies,
    );

    Ok((jar, Redirect::to(&auth_url)))
}

/// Handles the GitHub callback.
pub async fn github_callback(
    State(state): State<Arc<AppState>>,
    OptionalAuth(current): OptionalAuth,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, CallbackError> {
    let client = state.github.as_ref().ok_or(CallbackError::NotConfigured {
        provider: Provider::GitHub,
    })?;
    let (jar, code, _) = verify_callback(jar, Provider::GitHub, query)?;

    let access_token = client
        .exchange_code(&code)
        .await
        .map_err(|e| handshake_error(Provider::GitHub, e))?;
    let identity = client
        .fetch_identity(&access_token)
        .await
        .map_err(|e| handshake_error(Provider::GitHub, e))?;

    finish(&state, jar, current, identity).await
}

/// Initiates Google sign-in by redirecting to Google.
pub async fn google_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, CallbackError> {
    let client = state.google.as_ref().ok_or(CallbackError::NotConfigured {
        provider: Provider::Google,
    })?;

    let (auth_url, auth_state) = client.authorization_url();
    let jar = cookies::set_auth_state(
        jar,
        Provider::Google,
        &auth_state,
        state.session_config.secure_cookies,
    );

    Ok((jar, Redirect::to(&auth_url)))
}

/// Handles the Google callback.
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    OptionalAuth(current): OptionalAuth,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, CallbackError> {
    let client = state.google.as_ref().ok_or(CallbackError::NotConfigured {
        provider: Provider::Google,
    })?;
    let (jar, code, auth_state) = verify_callback(jar, Provider::Google, query)?;

    let identity = client
        .exchange_code(&code, &auth_state)
        .await
        .map_err(|e| handshake_error(Provider::Google, e))?;

    finish(&state, jar, current, identity).await
}

fn handshake_error(provider: Provider, error: impl std::fmt::Display) -> CallbackError {
    CallbackError::Handshake {
        provider,
        details: error.to_string(),
    }
}

/// Checks the callback against the auth state stored at login and returns
/// the authorization code.
fn verify_callback(
    jar: CookieJar,
    provider: Provider,
    query: CallbackQuery,
) -> Result<(CookieJar, String, AuthState), CallbackError> {
    let (jar, auth_state) = cookies::take_auth_state(jar, provider);

    if let Some(error) = query.error {
        return Err(CallbackError::Denied {
            provider,
            reason: query.error_description.unwrap_or(error),
        });
    }

    let auth_state = auth_state
        .ok_or(CallbackError::MissingAuthState)?
        .ok_or(CallbackError::InvalidAuthState)?;

    if query.state.as_deref() != Some(auth_state.csrf_token.as_str()) {
        return Err(CallbackError::CsrfMismatch);
    }

    let code = query.code.ok_or_else(|| CallbackError::Handshake {
        provider,
        details: "callback has no authorization code".to_string(),
    })?;

    Ok((jar, code, auth_state))
}

/// Resolves and applies the callback, then writes its effects.
async fn finish(
    state: &AppState,
    jar: CookieJar,
    current: Option<Account>,
    identity: ProviderIdentity,
) -> Result<(CookieJar, Redirect), CallbackError> {
    let provider = identity.provider();

    let outcome = state.engine.resolve(current.as_ref(), identity).await?;
    let applied = state.applier.apply(provider, outcome).await?;

    let session = match applied.session {
        SessionEffect::Establish(account_id) => {
            let session = Session::new(
                account_id,
                Duration::minutes(state.session_config.duration_minutes),
            );
            state
                .sessions
                .create(&session)
                .await
                .map_err(|e| CallbackError::Session {
                    details: e.to_string(),
                })?;
            tracing::info!(account_id = %account_id, "session established");
            Some(session)
        }
        SessionEffect::Unchanged => None,
    };

    let jar = write_effects(jar, &applied, session.as_ref(), &state.session_config);
    Ok((jar, Redirect::to(&applied.redirect.path())))
}

/// Writes the flash notice, the new session and the staged identity to the
/// cookie jar.
fn write_effects(
    jar: CookieJar,
    applied: &AppliedOutcome,
    session: Option<&Session>,
    config: &SessionConfig,
) -> CookieJar {
    let secure = config.secure_cookies;
    let mut jar = cookies::set_flash(jar, &applied.notice, secure);

    if let Some(session) = session {
        jar = cookies::set_session(
            jar,
            session.id(),
            secure,
            Duration::minutes(config.duration_minutes),
        );
    }

    match &applied.staged {
        StagedEffect::Keep => jar,
        StagedEffect::Stage(identity) => cookies::stage_identity(
            jar,
            identity,
            secure,
            Duration::minutes(config.staged_identity_minutes),
        ),
        StagedEffect::Discard => cookies::discard_staged_identity(jar),
    }
}

/// A sign-in link shown on the login form.
#[derive(Debug, Serialize)]
pub struct ProviderLink {
    pub provider: Provider,
    pub title: String,
    pub path: String,
}

/// Data for the login form.
#[derive(Debug, Serialize)]
pub struct LoginPage {
    pub notice: Option<Notice>,
    /// Identity kept from a failed auto-provision, to prefill the form.
    pub staged_identity: Option<StagedIdentity>,
    pub providers: Vec<ProviderLink>,
}

/// Returns the login form data, consuming the flash notice and the staged
/// identity.
pub async fn login_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<LoginPage>) {
    let (jar, notice) = cookies::take_flash(jar);
    let (jar, staged_identity) = cookies::take_staged_identity(
        jar,
        Duration::minutes(state.session_config.staged_identity_minutes),
    );

    let mut providers = Vec::new();
    if state.github.is_some() {
        providers.push(provider_link(&state, Provider::GitHub));
    }
    if state.google.is_some() {
        providers.push(provider_link(&state, Provider::Google));
    }

    (
        jar,
        Json(LoginPage {
            notice,
            staged_identity,
            providers,
        }),
    )
}

fn provider_link(state: &AppState, provider: Provider) -> ProviderLink {
    ProviderLink {
        provider,
        title: state.linking.site_title(provider).to_string(),
        path: format!("/auth/{}", provider.as_str()),
    }
}

/// An account page with the pending flash notice.
#[derive(Debug, Serialize)]
pub struct AccountPage {
    pub notice: Option<Notice>,
    pub account: Option<Account>,
}

/// Landing page after signing in.
pub async fn home(OptionalAuth(account): OptionalAuth, jar: CookieJar) -> impl IntoResponse {
    let (jar, notice) = cookies::take_flash(jar);
    (jar, Json(AccountPage { notice, account }))
}

/// Profile of the signed-in account.
pub async fn profile(
    RequireAuth(account): RequireAuth,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, StatusCode> {
    let id = AccountId::from_str(&id).map_err(|_| StatusCode::NOT_FOUND)?;
    if id != account.id() {
        return Err(StatusCode::FORBIDDEN);
    }

    let (jar, notice) = cookies::take_flash(jar);
    Ok((
        jar,
        Json(AccountPage {
            notice,
            account: Some(account),
        }),
    ))
}

/// Signs out by deleting the session.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(session_id) = cookies::session_id(&jar) {
        if let Err(e) = state.sessions.delete(session_id).await {
            tracing::warn!(error = %e, "failed to delete session on logout");
        }
    }

    (cookies::clear_session(jar), Redirect::to("/login"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::test_app;
    use axum::http::header;
    use keyward_platform_access::{
        GitHubLinkingConfig, GoogleLinkingConfig, InMemoryAccountDirectory, LinkingConfig,
        ProviderFields, RedirectTarget, SessionId,
    };
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn applied(session: SessionEffect, staged: StagedEffect) -> AppliedOutcome {
        AppliedOutcome {
            account: None,
            session,
            notice: Notice::success("Successfully authenticated from GitHub account."),
            redirect: RedirectTarget::AfterSignIn,
            staged,
        }
    }

    fn staged_identity() -> StagedIdentity {
        StagedIdentity::from_identity(&ProviderIdentity::new(
            Provider::GitHub,
            "octocat",
            "",
            "",
            "gho_secret",
        ))
    }

    fn query(code: Option<&str>, state: Option<&str>) -> CallbackQuery {
        CallbackQuery {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            error: None,
            error_description: None,
        }
    }

    fn jar_with_state(provider: Provider, csrf: &str) -> CookieJar {
        let state = AuthState {
            csrf_token: csrf.to_string(),
            pkce_verifier: None,
            nonce: None,
        };
        cookies::set_auth_state(CookieJar::new(), provider, &state, true)
    }

    #[test]
    fn sign_in_sets_session_and_flash_and_discards_staged() {
        let config = SessionConfig::default();
        let jar = cookies::stage_identity(
            CookieJar::new(),
            &staged_identity(),
            true,
            Duration::minutes(10),
        );
        let session = Session::new(AccountId::new(), Duration::hours(1));

        let jar = write_effects(
            jar,
            &applied(
                SessionEffect::Establish(session.account_id()),
                StagedEffect::Discard,
            ),
            Some(&session),
            &config,
        );

        assert_eq!(cookies::session_id(&jar), Some(session.id()));
        assert!(jar.get(cookies::STAGED_IDENTITY_COOKIE).is_none());
        let (_, notice) = cookies::take_flash(jar);
        assert_eq!(
            notice.map(|n| n.message),
            Some("Successfully authenticated from GitHub account.".to_string())
        );
    }

    #[test]
    fn failed_auto_provision_stages_identity_without_session() {
        let config = SessionConfig::default();

        let jar = write_effects(
            CookieJar::new(),
            &applied(
                SessionEffect::Unchanged,
                StagedEffect::Stage(staged_identity()),
            ),
            None,
            &config,
        );

        assert_eq!(cookies::session_id(&jar), None);
        let (_, staged) = cookies::take_staged_identity(jar, Duration::minutes(10));
        assert_eq!(staged.map(|s| s.external_id().to_string()), Some("octocat".to_string()));
    }

    #[test]
    fn unchanged_session_keeps_existing_cookie() {
        let config = SessionConfig::default();
        let existing = SessionId::new();
        let jar = cookies::set_session(CookieJar::new(), existing, true, Duration::hours(1));

        let jar = write_effects(
            jar,
            &applied(SessionEffect::Unchanged, StagedEffect::Keep),
            None,
            &config,
        );

        assert_eq!(cookies::session_id(&jar), Some(existing));
    }

    #[test]
    fn callback_with_matching_state_yields_code() {
        let jar = jar_with_state(Provider::GitHub, "csrf-1");

        let (jar, code, _) = verify_callback(
            jar,
            Provider::GitHub,
            query(Some("code-1"), Some("csrf-1")),
        )
        .expect("valid callback");

        assert_eq!(code, "code-1");
        assert!(jar.get(&cookies::auth_state_cookie(Provider::GitHub)).is_none());
    }

    #[test]
    fn callback_with_wrong_state_is_rejected() {
        let jar = jar_with_state(Provider::GitHub, "csrf-1");

        let result = verify_callback(jar, Provider::GitHub, query(Some("code-1"), Some("forged")));

        assert!(matches!(result, Err(CallbackError::CsrfMismatch)));
    }

    #[test]
    fn callback_without_state_cookie_is_rejected() {
        let result = verify_callback(
            CookieJar::new(),
            Provider::Google,
            query(Some("code-1"), Some("csrf-1")),
        );

        assert!(matches!(result, Err(CallbackError::MissingAuthState)));
    }

    #[test]
    fn state_cookie_of_other_provider_does_not_count() {
        let jar = jar_with_state(Provider::GitHub, "csrf-1");

        let result = verify_callback(jar, Provider::Google, query(Some("code-1"), Some("csrf-1")));

        assert!(matches!(result, Err(CallbackError::MissingAuthState)));
    }

    #[test]
    fn provider_error_is_reported_as_denied() {
        let jar = jar_with_state(Provider::GitHub, "csrf-1");
        let query = CallbackQuery {
            code: None,
            state: Some("csrf-1".to_string()),
            error: Some("access_denied".to_string()),
            error_description: Some("The user has denied your application access.".to_string()),
        };

        let result = verify_callback(jar, Provider::GitHub, query);

        assert!(matches!(
            result,
            Err(CallbackError::Denied {
                provider: Provider::GitHub,
                ..
            })
        ));
    }

    fn github_identity(login: &str) -> ProviderIdentity {
        ProviderIdentity::new(
            Provider::GitHub,
            login,
            "The Octocat",
            format!("{login}@example.com"),
            format!("gho_{login}"),
        )
    }

    fn location(redirect: Redirect) -> Option<String> {
        redirect
            .into_response()
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn sign_in_callback_establishes_session() {
        let directory = InMemoryAccountDirectory::new();
        let mut account = Account::new("octocat@example.com", "The Octocat");
        account.apply_provider_fields(&ProviderFields::GitHub {
            login: "octocat".to_string(),
            token: "gho_old".to_string(),
        });
        directory.insert(account.clone()).await;
        let app = test_app(LinkingConfig::default(), directory, "http://127.0.0.1:9", true);

        let (jar, redirect) = finish(
            &app.state,
            CookieJar::new(),
            None,
            github_identity("octocat"),
        )
        .await
        .expect("finish");

        let session_id = cookies::session_id(&jar).expect("session cookie");
        let session = app.sessions.get(session_id).await.expect("stored session");
        assert_eq!(session.account_id(), account.id());
        assert!(!session.is_expired());
        assert_eq!(location(redirect).as_deref(), Some("/"));
        let (_, notice) = cookies::take_flash(jar);
        assert_eq!(
            notice.map(|n| n.message),
            Some("Successfully authenticated from GitHub account.".to_string())
        );
    }

    #[tokio::test]
    async fn unauthorized_callback_creates_no_session() {
        let app = test_app(
            LinkingConfig::default(),
            InMemoryAccountDirectory::new(),
            "http://127.0.0.1:9",
            true,
        );

        let (jar, redirect) = finish(
            &app.state,
            CookieJar::new(),
            None,
            github_identity("octocat"),
        )
        .await
        .expect("finish");

        assert_eq!(cookies::session_id(&jar), None);
        assert!(app.sessions.is_empty().await);
        assert_eq!(location(redirect).as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn membership_api_failure_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/orgs"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let linking = LinkingConfig::new(
            GitHubLinkingConfig::default().with_org_id(Some(4242)),
            GoogleLinkingConfig::default(),
        );
        let app = test_app(linking, InMemoryAccountDirectory::new(), &server.uri(), true);

        let err = finish(&app.state, CookieJar::new(), None, github_identity("octocat"))
            .await
            .expect_err("verifier failure");

        assert!(matches!(err, CallbackError::Linking(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
        assert!(app.directory.is_empty().await);
        assert!(app.sessions.is_empty().await);
    }
}
