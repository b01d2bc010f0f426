//! Outcomes of a provider callback.

use crate::account::Account;
use crate::error::ValidationErrors;
use crate::provider::{Provider, ProviderIdentity};

/// Why an identity was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// No account holds the identity and auto-provisioning is not configured.
    NoAccount,
    /// The GitHub user is not a member of the configured organization.
    NotOrganizationMember,
    /// The Google email domain is not authorized to auto-provision.
    EmailDomainNotAllowed,
}

impl UnauthorizedReason {
    /// Returns the reason a provider's verification step reports when it
    /// denies an identity.
    #[must_use]
    pub fn verification_denied(provider: Provider) -> Self {
        match provider {
            Provider::GitHub => Self::NotOrganizationMember,
            Provider::Google => Self::EmailDomainNotAllowed,
        }
    }
}

/// The single result of deciding a provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An existing account holds the identity; sign it in.
    SignIn { account: Account },
    /// Link the identity to the signed-in account.
    LinkToCurrentSession {
        account: Account,
        identity: ProviderIdentity,
    },
    /// The identity is already linked to a different account than the
    /// signed-in one.
    ConflictAlreadyLinked { current: Account, login: String },
    /// A new account was created for the identity.
    AutoProvisionSucceeded { account: Account },
    /// The identity was eligible but the account could not be created.
    AutoProvisionFailed {
        errors: ValidationErrors,
        identity: ProviderIdentity,
    },
    /// The identity may not sign in.
    Unauthorized {
        login: String,
        reason: UnauthorizedReason,
    },
}

impl Outcome {
    /// Returns a short, stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignIn { .. } => "sign_in",
            Self::LinkToCurrentSession { .. } => "link",
            Self::ConflictAlreadyLinked { .. } => "conflict",
            Self::AutoProvisionSucceeded { .. } => "auto_provision_succeeded",
            Self::AutoProvisionFailed { .. } => "auto_provision_failed",
            Self::Unauthorized { .. } => "unauthorized",
        }
    }
}
