//! Provider strategies.
//!
//! The decision table is the same for every provider. What varies is how the
//! existing account is found, whether auto-provisioning is configured, and
//! how an unknown identity is verified before an account is created for it:
//! - GitHub asks the GitHub API whether the user belongs to the configured
//!   organization
//! - Google checks the email domain against the directory's domain policy

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::account::{Account, NewAccount};
use crate::config::{GitHubLinkingConfig, GoogleLinkingConfig};
use crate::directory::AccountDirectory;
use crate::error::{DirectoryError, LinkingError};
use crate::membership::MembershipVerifier;
use crate::provider::{Provider, ProviderIdentity};

/// Provider-specific capabilities used by the linking engine.
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    /// Returns the provider this strategy handles.
    fn provider(&self) -> Provider;

    /// Returns true if unknown identities may be auto-provisioned.
    fn auto_provision_configured(&self) -> bool;

    /// Finds the account already holding the identity.
    async fn lookup(
        &self,
        directory: &dyn AccountDirectory,
        identity: &ProviderIdentity,
    ) -> Result<Option<Account>, DirectoryError> {
        directory
            .find_by_provider_key(self.provider(), identity.external_id())
            .await
    }

    /// Returns true if the identity may be auto-provisioned.
    ///
    /// Only called for identities no account holds, and only when
    /// auto-provisioning is configured.
    async fn verify(&self, identity: &ProviderIdentity) -> Result<bool, LinkingError>;

    /// Returns the fields of the account to create for the identity.
    fn new_account(&self, identity: &ProviderIdentity) -> NewAccount {
        NewAccount::from_identity(identity)
    }
}

/// GitHub: organization membership gates auto-provisioning.
pub struct GitHubStrategy {
    config: GitHubLinkingConfig,
    verifier: Arc<dyn MembershipVerifier>,
}

impl GitHubStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(config: GitHubLinkingConfig, verifier: Arc<dyn MembershipVerifier>) -> Self {
        Self { config, verifier }
    }
}

#[async_trait]
impl ProviderStrategy for GitHubStrategy {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    fn auto_provision_configured(&self) -> bool {
        self.config.auto_provision()
    }

    async fn verify(&self, identity: &ProviderIdentity) -> Result<bool, LinkingError> {
        let Some(org_id) = self.config.org_id() else {
            return Ok(false);
        };

        debug!(login = identity.external_id(), org_id, "checking GitHub organization membership");

        self.verifier
            .is_member(identity.access_token(), org_id)
            .await
            .map_err(|source| LinkingError::ExternalService {
                provider: Provider::GitHub,
                source,
            })
    }
}

/// Google: the email domain policy gates auto-provisioning.
pub struct GoogleStrategy {
    config: GoogleLinkingConfig,
    directory: Arc<dyn AccountDirectory>,
}

impl GoogleStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(config: GoogleLinkingConfig, directory: Arc<dyn AccountDirectory>) -> Self {
        Self { config, directory }
    }
}

#[async_trait]
impl ProviderStrategy for GoogleStrategy {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn auto_provision_configured(&self) -> bool {
        self.config.auto_provision()
    }

    async fn verify(&self, identity: &ProviderIdentity) -> Result<bool, LinkingError> {
        let Some(domain) = identity.email_domain() else {
            return Ok(false);
        };

        debug!(domain = %domain, "checking Google email domain policy");

        Ok(self.directory.allows_email_domain(&domain).await?)
    }
}
