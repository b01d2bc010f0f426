//! Authentication extractors for Axum.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use keyward_platform_access::Account;
use std::sync::Arc;

use super::{AppState, cookies};

/// Resolves the session cookie to the signed-in account.
///
/// Returns `Ok(None)` when there is no usable session: no cookie, an unknown
/// or expired session, or a session whose account is gone.
async fn current_account(
    app_state: &AppState,
    jar: &CookieJar,
) -> Result<Option<Account>, AuthRejection> {
    let Some(session_id) = cookies::session_id(jar) else {
        return Ok(None);
    };

    let Some(session) = app_state
        .sessions
        .find_by_id(session_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to load session");
            AuthRejection::InternalError
        })?
    else {
        return Ok(None);
    };

    if session.is_expired() {
        if let Err(e) = app_state.sessions.delete(session_id).await {
            tracing::warn!(error = %e, "failed to delete expired session");
        }
        return Ok(None);
    }

    app_state
        .directory
        .find_by_id(session.account_id())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to load session account");
            AuthRejection::InternalError
        })
}

/// Extractor for requiring a signed-in account.
///
/// If no account is signed in, the request is redirected to the login page.
pub struct RequireAuth(pub Account);

impl<S> FromRequestParts<S> for RequireAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let OptionalAuth(account) = OptionalAuth::from_request_parts(parts, state).await?;
        account
            .map(RequireAuth)
            .ok_or(AuthRejection::NotAuthenticated)
    }
}

/// Extractor for optionally getting the signed-in account.
///
/// A session store failure is a rejection rather than `None`, so a linking
/// request is never mistaken for an anonymous sign-in.
pub struct OptionalAuth(pub Option<Account>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthRejection::InternalError)?;

        Ok(OptionalAuth(current_account(&app_state, &jar).await?))
    }
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    InternalError,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotAuthenticated => Redirect::to("/login").into_response(),
            Self::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
