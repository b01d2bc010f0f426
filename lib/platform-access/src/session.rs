//! Persisted sign-in sessions.
//!
//! A session is created when an outcome establishes a sign-in (an existing
//! account signing in, or a freshly provisioned one). The linking engine never
//! sees a `Session` directly: the server resolves it to the current
//! [`Account`](crate::Account) before a callback is decided.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use keyward_core::{AccountId, SessionId};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Represents an active authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session.
    id: SessionId,
    /// The signed-in account.
    account_id: AccountId,
    /// When the session was created.
    created_at: DateTime<Utc>,
    /// When the session expires.
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session for the given account, valid for `duration`.
    #[must_use]
    pub fn new(account_id: AccountId, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            account_id,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Reconstitutes a session from storage.
    #[must_use]
    pub fn with_all_fields(
        id: SessionId,
        account_id: AccountId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            created_at,
            expires_at,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the signed-in account's ID.
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the session is still valid (not expired).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }
}

/// Storage for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Finds a session by ID, expired or not.
    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, SessionError>;

    /// Persists a new session.
    async fn create(&self, session: &Session) -> Result<(), SessionError>;

    /// Deletes a session. Deleting an unknown session is not an error.
    async fn delete(&self, id: SessionId) -> Result<(), SessionError>;

    /// Deletes every expired session and returns how many were removed.
    async fn delete_expired(&self) -> Result<u64, SessionError>;
}
