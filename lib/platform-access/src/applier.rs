//! Applying an outcome.
//!
//! The applier performs the single mutation an outcome calls for and
//! describes the user-facing effects: whether a session is established, the
//! flash notice, where to redirect, and what happens to the staged identity.
//! The server turns an [`AppliedOutcome`] into cookies and a redirect.

use keyward_core::AccountId;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::account::Account;
use crate::config::LinkingConfig;
use crate::directory::AccountDirectory;
use crate::error::{DirectoryError, LinkingError};
use crate::outcome::{Outcome, UnauthorizedReason};
use crate::provider::{Provider, ProviderIdentity};
use crate::staged::StagedIdentity;

/// Whether the callback signs an account in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    /// Start a session for the account.
    Establish(AccountId),
    /// Leave the current session, if any, as it is.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// A one-shot message shown after the redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Where the callback sends the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    /// The landing page after signing in.
    AfterSignIn,
    /// An account's profile page.
    Profile(AccountId),
    /// The login form.
    Login,
}

impl RedirectTarget {
    /// Returns the path to redirect to.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::AfterSignIn => "/".to_string(),
            Self::Profile(id) => format!("/users/{id}"),
            Self::Login => "/login".to_string(),
        }
    }
}

/// What happens to the staged-identity slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedEffect {
    /// Leave the slot as it is.
    Keep,
    /// Stage this identity for one retry.
    Stage(StagedIdentity),
    /// Clear the slot.
    Discard,
}

/// The effects of an applied outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOutcome {
    /// The account the outcome concerns, as it is after the mutation.
    pub account: Option<Account>,
    pub session: SessionEffect,
    pub notice: Notice,
    pub redirect: RedirectTarget,
    pub staged: StagedEffect,
}

/// Executes outcomes against the account directory.
pub struct OutcomeApplier {
    directory: Arc<dyn AccountDirectory>,
    config: LinkingConfig,
}

impl OutcomeApplier {
    /// Creates an applier.
    #[must_use]
    pub fn new(directory: Arc<dyn AccountDirectory>, config: LinkingConfig) -> Self {
        Self { directory, config }
    }

    /// Applies `outcome`, resolved for an identity asserted by `provider`.
    ///
    /// Only a link writes to the directory, and linking an identity the
    /// account already holds writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `LinkingError::Directory` if the link could not be written.
    #[instrument(skip_all, fields(provider = %provider, outcome = outcome.kind()))]
    pub async fn apply(
        &self,
        provider: Provider,
        outcome: Outcome,
    ) -> Result<AppliedOutcome, Report<LinkingError>> {
        let title = self.config.site_title(provider);

        let applied = match outcome {
            Outcome::SignIn { account } => {
                info!(account_id = %account.id(), "signed in");
                signed_in(account, title)
            }
            Outcome::AutoProvisionSucceeded { account } => {
                info!(account_id = %account.id(), "signed in auto-provisioned account");
                signed_in(account, title)
            }
            Outcome::LinkToCurrentSession { account, identity } => {
                self.link(account, &identity, title).await?
            }
            Outcome::ConflictAlreadyLinked { current, login } => {
                warn!(account_id = %current.id(), login = %login, "identity linked to another account");
                conflict(current, &login, title)
            }
            Outcome::AutoProvisionFailed { errors, identity } => {
                warn!(%errors, "staging identity after failed auto-provisioning");
                AppliedOutcome {
                    account: None,
                    session: SessionEffect::Unchanged,
                    notice: Notice::error(errors.to_string()),
                    redirect: RedirectTarget::Login,
                    staged: StagedEffect::Stage(StagedIdentity::from_identity(&identity)),
                }
            }
            Outcome::Unauthorized { login, reason } => {
                warn!(login = %login, ?reason, "unauthorized sign-in attempt");
                AppliedOutcome {
                    account: None,
                    session: SessionEffect::Unchanged,
                    notice: Notice::error(unauthorized_message(reason, title, &login)),
                    redirect: RedirectTarget::Login,
                    staged: StagedEffect::Keep,
                }
            }
        };

        Ok(applied)
    }

    async fn link(
        &self,
        account: Account,
        identity: &ProviderIdentity,
        title: &str,
    ) -> Result<AppliedOutcome, LinkingError> {
        let fields = identity.provider_fields();

        let linked = if account.holds(&fields) {
            debug!(account_id = %account.id(), "identity already linked");
            account
        } else {
            match self
                .directory
                .update_provider_fields(account.id(), &fields)
                .await
            {
                Ok(updated) => updated,
                // Another account took the key after the lookup.
                Err(DirectoryError::ProviderKeyTaken { .. }) => {
                    warn!(account_id = %account.id(), "identity linked concurrently to another account");
                    return Ok(conflict(account, identity.attempted_login(), title));
                }
                Err(error) => return Err(error.into()),
            }
        };

        info!(account_id = %linked.id(), "linked identity");
        Ok(AppliedOutcome {
            redirect: RedirectTarget::Profile(linked.id()),
            account: Some(linked),
            session: SessionEffect::Unchanged,
            notice: Notice::success(format!(
                "Successfully linked {} account!",
                linked_label(identity, title)
            )),
            staged: StagedEffect::Keep,
        })
    }
}

/// Names a linked identity: the Google address, or the provider title.
fn linked_label<'a>(identity: &'a ProviderIdentity, title: &'a str) -> &'a str {
    match identity.provider() {
        Provider::Google if !identity.email().is_empty() => identity.email(),
        _ => title,
    }
}

fn signed_in(account: Account, title: &str) -> AppliedOutcome {
    AppliedOutcome {
        session: SessionEffect::Establish(account.id()),
        account: Some(account),
        notice: Notice::success(format!("Successfully authenticated from {title} account.")),
        redirect: RedirectTarget::AfterSignIn,
        staged: StagedEffect::Discard,
    }
}

fn conflict(current: Account, login: &str, title: &str) -> AppliedOutcome {
    AppliedOutcome {
        redirect: RedirectTarget::Profile(current.id()),
        account: Some(current),
        session: SessionEffect::Unchanged,
        notice: Notice::error(format!(
            "User already registered with {title} login '{login}'!"
        )),
        staged: StagedEffect::Keep,
    }
}

fn unauthorized_message(reason: UnauthorizedReason, title: &str, login: &str) -> String {
    match reason {
        UnauthorizedReason::NoAccount | UnauthorizedReason::NotOrganizationMember => format!(
            "There are no authorized users with {title} login '{login}'. \
             Please ask an administrator to register your user account."
        ),
        UnauthorizedReason::EmailDomainNotAllowed => {
            format!("Your email domain is not authorized to sign in with {title}.")
        }
    }
}
