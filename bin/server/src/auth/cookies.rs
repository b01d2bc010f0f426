//! Cookies carried between requests.
//!
//! Values are JSON. The flash notice and the staged identity are consumed
//! when read: taking one removes it from the jar.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;
use keyward_platform_access::{Notice, Provider, SessionId, StagedIdentity};
use serde::{Serialize, de::DeserializeOwned};
use std::str::FromStr;
use time::Duration as TimeDuration;

use super::AuthState;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Flash notice cookie name.
pub const FLASH_COOKIE: &str = "flash";

/// Staged identity cookie name.
pub const STAGED_IDENTITY_COOKIE: &str = "staged_identity";

/// How long a login redirect may take before its auth state expires.
const AUTH_STATE_MINUTES: i64 = 10;

/// How long a flash notice survives if never read.
const FLASH_MINUTES: i64 = 5;

/// Returns the auth state cookie name for `provider`, e.g. "github_auth_state".
pub fn auth_state_cookie(provider: Provider) -> String {
    format!("{}_auth_state", provider.as_str())
}

fn build(
    name: impl Into<String>,
    value: String,
    secure: bool,
    max_age: TimeDuration,
) -> Cookie<'static> {
    Cookie::build((name.into(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn remove(jar: CookieJar, name: impl Into<String>) -> CookieJar {
    jar.remove(Cookie::build((name.into(), "")).path("/"))
}

fn add_json<T: Serialize>(
    jar: CookieJar,
    name: impl Into<String>,
    value: &T,
    secure: bool,
    max_age: TimeDuration,
) -> CookieJar {
    match serde_json::to_string(value) {
        Ok(json) => jar.add(build(name, json, secure, max_age)),
        Err(error) => {
            tracing::error!(%error, "failed to serialize cookie value");
            jar
        }
    }
}

fn read_json<T: DeserializeOwned>(jar: &CookieJar, name: &str) -> Option<T> {
    let cookie = jar.get(name)?;
    match serde_json::from_str(cookie.value()) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::debug!(cookie = name, %error, "ignoring undecodable cookie");
            None
        }
    }
}

fn to_time(duration: Duration) -> TimeDuration {
    TimeDuration::seconds(duration.num_seconds())
}

/// Sets the session cookie.
pub fn set_session(jar: CookieJar, id: SessionId, secure: bool, lifetime: Duration) -> CookieJar {
    jar.add(build(SESSION_COOKIE, id.to_string(), secure, to_time(lifetime)))
}

/// Returns the session id from the session cookie, if present and well formed.
pub fn session_id(jar: &CookieJar) -> Option<SessionId> {
    SessionId::from_str(jar.get(SESSION_COOKIE)?.value()).ok()
}

/// Removes the session cookie.
pub fn clear_session(jar: CookieJar) -> CookieJar {
    remove(jar, SESSION_COOKIE)
}

/// Stores the auth state for a provider's login redirect.
pub fn set_auth_state(
    jar: CookieJar,
    provider: Provider,
    state: &AuthState,
    secure: bool,
) -> CookieJar {
    add_json(
        jar,
        auth_state_cookie(provider),
        state,
        secure,
        TimeDuration::minutes(AUTH_STATE_MINUTES),
    )
}

/// Takes the auth state for a provider's callback.
///
/// The outer `Option` is `None` when no cookie is present; the inner one is
/// `None` when the cookie could not be decoded.
pub fn take_auth_state(
    jar: CookieJar,
    provider: Provider,
) -> (CookieJar, Option<Option<AuthState>>) {
    let name = auth_state_cookie(provider);
    if jar.get(&name).is_none() {
        return (jar, None);
    }
    let state = read_json(&jar, &name);
    (remove(jar, name), Some(state))
}

/// Sets the flash notice shown after the next redirect.
pub fn set_flash(jar: CookieJar, notice: &Notice, secure: bool) -> CookieJar {
    add_json(
        jar,
        FLASH_COOKIE,
        notice,
        secure,
        TimeDuration::minutes(FLASH_MINUTES),
    )
}

/// Takes the flash notice, if any.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Notice>) {
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, None);
    }
    let notice = read_json(&jar, FLASH_COOKIE);
    (remove(jar, FLASH_COOKIE), notice)
}

/// Stages an identity for one retry from the login form.
pub fn stage_identity(
    jar: CookieJar,
    identity: &StagedIdentity,
    secure: bool,
    max_age: Duration,
) -> CookieJar {
    add_json(jar, STAGED_IDENTITY_COOKIE, identity, secure, to_time(max_age))
}

/// Takes the staged identity, if one is present and younger than `max_age`.
pub fn take_staged_identity(
    jar: CookieJar,
    max_age: Duration,
) -> (CookieJar, Option<StagedIdentity>) {
    if jar.get(STAGED_IDENTITY_COOKIE).is_none() {
        return (jar, None);
    }
    let staged = read_json::<StagedIdentity>(&jar, STAGED_IDENTITY_COOKIE)
        .filter(|staged| !staged.is_expired(max_age));
    (remove(jar, STAGED_IDENTITY_COOKIE), staged)
}

/// Discards the staged identity.
pub fn discard_staged_identity(jar: CookieJar) -> CookieJar {
    if jar.get(STAGED_IDENTITY_COOKIE).is_none() {
        return jar;
    }
    remove(jar, STAGED_IDENTITY_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_platform_access::ProviderIdentity;

    fn jar_with(name: &str, value: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(name.to_string(), value.to_string()))
    }

    fn staged() -> StagedIdentity {
        StagedIdentity::from_identity(&ProviderIdentity::new(
            Provider::GitHub,
            "octocat",
            "The Octocat",
            "",
            "gho_secret",
        ))
    }

    #[test]
    fn flash_is_consumed_once() {
        let jar = set_flash(CookieJar::new(), &Notice::success("Welcome"), true);

        let (jar, notice) = take_flash(jar);
        assert_eq!(notice, Some(Notice::success("Welcome")));

        let (_, notice) = take_flash(jar);
        assert_eq!(notice, None);
    }

    #[test]
    fn staged_identity_is_consumed_once() {
        let jar = stage_identity(CookieJar::new(), &staged(), true, Duration::minutes(10));

        let (jar, first) = take_staged_identity(jar, Duration::minutes(10));
        assert_eq!(first.as_ref().map(StagedIdentity::external_id), Some("octocat"));

        let (_, second) = take_staged_identity(jar, Duration::minutes(10));
        assert_eq!(second, None);
    }

    #[test]
    fn expired_staged_identity_is_dropped() {
        let json = serde_json::to_string(&staged()).expect("serialize");
        let jar = jar_with(STAGED_IDENTITY_COOKIE, &json);

        let (jar, taken) = take_staged_identity(jar, Duration::seconds(-1));

        assert_eq!(taken, None);
        assert!(jar.get(STAGED_IDENTITY_COOKIE).is_none());
    }

    #[test]
    fn staged_cookie_never_holds_access_token() {
        let jar = stage_identity(CookieJar::new(), &staged(), true, Duration::minutes(10));
        let value = jar
            .get(STAGED_IDENTITY_COOKIE)
            .map(|c| c.value().to_string())
            .expect("cookie");

        assert!(!value.contains("gho_secret"));
    }

    #[test]
    fn auth_state_is_per_provider() {
        let state = AuthState {
            csrf_token: "csrf".to_string(),
            pkce_verifier: None,
            nonce: None,
        };
        let jar = set_auth_state(CookieJar::new(), Provider::GitHub, &state, false);

        let (jar, google) = take_auth_state(jar, Provider::Google);
        assert!(google.is_none());

        let (_, github) = take_auth_state(jar, Provider::GitHub);
        let github = github.flatten().expect("github auth state");
        assert_eq!(github.csrf_token, "csrf");
    }

    #[test]
    fn undecodable_auth_state_is_reported() {
        let jar = jar_with("google_auth_state", "not json");

        let (_, state) = take_auth_state(jar, Provider::Google);

        assert!(matches!(state, Some(None)));
    }

    #[test]
    fn session_cookie_round_trip() {
        let id = SessionId::new();
        let jar = set_session(CookieJar::new(), id, true, Duration::hours(1));

        assert_eq!(session_id(&jar), Some(id));
        assert_eq!(session_id(&clear_session(jar)), None);
    }

    #[test]
    fn malformed_session_cookie_is_ignored() {
        let jar = jar_with(SESSION_COOKIE, "not-a-session");
        assert_eq!(session_id(&jar), None);
    }
}
