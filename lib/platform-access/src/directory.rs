//! The account directory: storage of accounts keyed by provider identity.

use async_trait::async_trait;
use keyward_core::AccountId;

use crate::account::{Account, NewAccount, ProviderFields};
use crate::error::{CreateAccountError, DirectoryError};
use crate::provider::Provider;

/// Storage for accounts.
///
/// Implementations enforce that at most one account holds a given
/// `(provider, external_id)` pair.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Finds the account holding `external_id` for `provider`.
    async fn find_by_provider_key(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<Account>, DirectoryError>;

    /// Finds an account by its ID.
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, DirectoryError>;

    /// Returns true if accounts with emails in `domain` may be auto-provisioned.
    async fn allows_email_domain(&self, domain: &str) -> Result<bool, DirectoryError>;

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// Returns `CreateAccountError::Invalid` when the account is rejected
    /// (e.g. the email is already taken); nothing is persisted in that case.
    async fn create(&self, fields: NewAccount) -> Result<Account, CreateAccountError>;

    /// Writes a provider slot onto an account in a single atomic write and
    /// returns the updated account.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::ProviderKeyTaken` if another account holds the
    /// key; the account is left unchanged.
    async fn update_provider_fields(
        &self,
        id: AccountId,
        fields: &ProviderFields,
    ) -> Result<Account, DirectoryError>;
}
