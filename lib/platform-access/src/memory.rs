//! In-memory account directory and session store.
//!
//! Used by tests and for running the server without a database. Every
//! directory mutation happens under one write lock, so an update is a single
//! atomic read-check-write.

use async_trait::async_trait;
use keyward_core::{AccountId, SessionId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::account::{Account, NewAccount, ProviderFields};
use crate::directory::AccountDirectory;
use crate::error::{CreateAccountError, DirectoryError, SessionError, ValidationErrors};
use crate::provider::Provider;
use crate::session::{Session, SessionStore};

/// An [`AccountDirectory`] holding accounts in memory.
#[derive(Default)]
pub struct InMemoryAccountDirectory {
    accounts: RwLock<HashMap<AccountId, Account>>,
    allowed_domains: HashSet<String>,
    writes: AtomicUsize,
}

impl InMemoryAccountDirectory {
    /// Creates an empty directory with no authorized email domains.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the email domains allowed to auto-provision.
    #[must_use]
    pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_domains = domains
            .into_iter()
            .map(|d| d.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Stores an account as-is, bypassing validation. Not counted as a write.
    pub async fn insert(&self, account: Account) {
        self.accounts.write().await.insert(account.id(), account);
    }

    /// Returns a copy of the stored account.
    pub async fn get(&self, id: AccountId) -> Option<Account> {
        self.accounts.read().await.get(&id).cloned()
    }

    /// Returns the number of stored accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Returns true if no account is stored.
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    /// Returns the number of successful creates and updates.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn holder_of<'a>(
    accounts: &'a HashMap<AccountId, Account>,
    provider: Provider,
    external_id: &str,
) -> Option<&'a Account> {
    accounts
        .values()
        .find(|account| account.provider_key(provider) == Some(external_id))
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn find_by_provider_key(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<Account>, DirectoryError> {
        let accounts = self.accounts.read().await;
        Ok(holder_of(&accounts, provider, external_id).cloned())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, DirectoryError> {
        Ok(self.get(id).await)
    }

    async fn allows_email_domain(&self, domain: &str) -> Result<bool, DirectoryError> {
        Ok(self.allowed_domains.contains(&domain.to_ascii_lowercase()))
    }

    async fn create(&self, fields: NewAccount) -> Result<Account, CreateAccountError> {
        fields.validate()?;

        let mut accounts = self.accounts.write().await;
        let mut errors = ValidationErrors::new();
        if accounts
            .values()
            .any(|account| account.email().eq_ignore_ascii_case(&fields.email))
        {
            errors.add("email", "has already been taken");
        }
        let provider = fields.provider_fields.provider();
        if holder_of(&accounts, provider, fields.provider_fields.external_id()).is_some() {
            let field = match provider {
                Provider::GitHub => "github_login",
                Provider::Google => "google_uid",
            };
            errors.add(field, "has already been taken");
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let account = fields.into_account();
        accounts.insert(account.id(), account.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(account)
    }

    async fn update_provider_fields(
        &self,
        id: AccountId,
        fields: &ProviderFields,
    ) -> Result<Account, DirectoryError> {
        let mut accounts = self.accounts.write().await;

        let provider = fields.provider();
        if holder_of(&accounts, provider, fields.external_id())
            .is_some_and(|holder| holder.id() != id)
        {
            return Err(DirectoryError::ProviderKeyTaken {
                provider,
                external_id: fields.external_id().to_string(),
            });
        }

        let account = accounts
            .get_mut(&id)
            .ok_or(DirectoryError::AccountNotFound { account_id: id })?;
        account.apply_provider_fields(fields);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(account.clone())
    }
}

/// A [`SessionStore`] holding sessions in memory.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored session.
    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Returns the number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns true if no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, SessionError> {
        Ok(self.get(id).await)
    }

    async fn create(&self, session: &Session) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<(), SessionError> {
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, SessionError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}
