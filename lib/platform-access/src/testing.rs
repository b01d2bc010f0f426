//! Test doubles shared by the engine and applier tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::MembershipError;
use crate::membership::MembershipVerifier;
use crate::provider::{Provider, ProviderIdentity};

/// A membership verifier with a canned answer that counts its calls.
pub struct StubVerifier {
    answer: Result<bool, MembershipError>,
    calls: AtomicUsize,
    tokens: Mutex<Vec<(String, u64)>>,
}

impl StubVerifier {
    pub fn member() -> Self {
        Self::answering(Ok(true))
    }

    pub fn not_member() -> Self {
        Self::answering(Ok(false))
    }

    pub fn failing() -> Self {
        Self::answering(Err(MembershipError::Transport {
            details: "connection reset".to_string(),
        }))
    }

    fn answering(answer: Result<bool, MembershipError>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, u64)> {
        self.tokens.lock().expect("lock").clone()
    }
}

#[async_trait]
impl MembershipVerifier for StubVerifier {
    async fn is_member(&self, access_token: &str, org_id: u64) -> Result<bool, MembershipError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .expect("lock")
            .push((access_token.to_string(), org_id));
        self.answer.clone()
    }
}

pub fn github_identity(login: &str) -> ProviderIdentity {
    ProviderIdentity::new(
        Provider::GitHub,
        login,
        "The Octocat",
        format!("{login}@example.com"),
        format!("gho_{login}"),
    )
}

pub fn google_identity(uid: &str, email: &str) -> ProviderIdentity {
    ProviderIdentity::new(Provider::Google, uid, "Alice", email, "ya29.token")
}
