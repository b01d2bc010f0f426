//! The linking decision engine.
//!
//! [`decide`] is the pure decision table; [`LinkingEngine::resolve`] gathers
//! its inputs from the account directory and the provider's verification
//! step, and creates the account when the table says to auto-provision.
//!
//! The table, first match wins:
//!
//! | session | existing account | auto-provision | verified | decision |
//! |---|---|---|---|---|
//! | present | held by another account | - | - | conflict |
//! | present | none, or the session's own | - | - | link |
//! | absent | present | - | - | sign in |
//! | absent | absent | configured | yes | provision |
//! | absent | absent | otherwise | - | unauthorized |

use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::account::Account;
use crate::config::LinkingConfig;
use crate::directory::AccountDirectory;
use crate::error::{CreateAccountError, LinkingError};
use crate::membership::MembershipVerifier;
use crate::outcome::{Outcome, UnauthorizedReason};
use crate::provider::{Provider, ProviderIdentity};
use crate::strategy::{GitHubStrategy, GoogleStrategy, ProviderStrategy};

/// The result of the decision table, before any account is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Sign in the account holding the identity.
    SignIn(Account),
    /// Link the identity to the signed-in account.
    Link(Account),
    /// The identity belongs to an account other than the signed-in one.
    Conflict { current: Account, login: String },
    /// Create an account for the identity.
    Provision,
    /// Refuse the identity.
    Unauthorized {
        login: String,
        reason: UnauthorizedReason,
    },
}

/// Returns true if the provider's verification step must be consulted.
///
/// Verification only matters for an anonymous request whose identity no
/// account holds, when auto-provisioning is configured.
#[must_use]
pub fn needs_verification(
    session: Option<&Account>,
    existing: Option<&Account>,
    auto_provision: bool,
) -> bool {
    session.is_none() && existing.is_none() && auto_provision
}

/// Decides what a provider callback does.
///
/// `membership` is the verification result, `None` when it was not needed.
/// Accounts are compared by id, never by attributes.
#[must_use]
pub fn decide(
    session: Option<&Account>,
    identity: &ProviderIdentity,
    existing: Option<Account>,
    auto_provision: bool,
    membership: Option<bool>,
) -> Decision {
    let login = identity.attempted_login().to_string();

    if let Some(current) = session {
        return match existing {
            Some(holder) if holder.id() != current.id() => Decision::Conflict {
                current: current.clone(),
                login,
            },
            _ => Decision::Link(current.clone()),
        };
    }

    if let Some(account) = existing {
        return Decision::SignIn(account);
    }

    match (auto_provision, membership) {
        (true, Some(true)) => Decision::Provision,
        (true, Some(false)) => Decision::Unauthorized {
            login,
            reason: UnauthorizedReason::verification_denied(identity.provider()),
        },
        _ => Decision::Unauthorized {
            login,
            reason: UnauthorizedReason::NoAccount,
        },
    }
}

/// Resolves provider callbacks into outcomes.
pub struct LinkingEngine {
    directory: Arc<dyn AccountDirectory>,
    github: GitHubStrategy,
    google: GoogleStrategy,
}

impl LinkingEngine {
    /// Creates an engine for the configured providers.
    #[must_use]
    pub fn new(
        config: &LinkingConfig,
        directory: Arc<dyn AccountDirectory>,
        verifier: Arc<dyn MembershipVerifier>,
    ) -> Self {
        Self {
            github: GitHubStrategy::new(config.github().clone(), verifier),
            google: GoogleStrategy::new(config.google().clone(), directory.clone()),
            directory,
        }
    }

    fn strategy(&self, provider: Provider) -> &dyn ProviderStrategy {
        match provider {
            Provider::GitHub => &self.github,
            Provider::Google => &self.google,
        }
    }

    /// Resolves a callback for `identity`, with `session` the signed-in
    /// account if any.
    ///
    /// Auto-provisioned accounts are created here; every other mutation is
    /// left to the [`OutcomeApplier`](crate::OutcomeApplier).
    ///
    /// # Errors
    ///
    /// Returns `LinkingError::ExternalService` if the provider could not be
    /// consulted, and `LinkingError::Directory` if the directory failed.
    #[instrument(
        skip_all,
        fields(provider = %identity.provider(), login = identity.attempted_login())
    )]
    pub async fn resolve(
        &self,
        session: Option<&Account>,
        identity: ProviderIdentity,
    ) -> Result<Outcome, Report<LinkingError>> {
        let strategy = self.strategy(identity.provider());

        let existing = strategy
            .lookup(self.directory.as_ref(), &identity)
            .await
            .map_err(LinkingError::from)?;

        let auto_provision = strategy.auto_provision_configured();
        let membership = if needs_verification(session, existing.as_ref(), auto_provision) {
            Some(strategy.verify(&identity).await?)
        } else {
            None
        };

        let outcome = match decide(session, &identity, existing, auto_provision, membership) {
            Decision::SignIn(account) => Outcome::SignIn { account },
            Decision::Link(account) => Outcome::LinkToCurrentSession { account, identity },
            Decision::Conflict { current, login } => {
                Outcome::ConflictAlreadyLinked { current, login }
            }
            Decision::Provision => self.provision(strategy, identity).await?,
            Decision::Unauthorized { login, reason } => Outcome::Unauthorized { login, reason },
        };

        Ok(outcome)
    }

    async fn provision(
        &self,
        strategy: &dyn ProviderStrategy,
        identity: ProviderIdentity,
    ) -> Result<Outcome, LinkingError> {
        let fields = strategy.new_account(&identity);
        if let Err(errors) = fields.validate() {
            warn!(%errors, "auto-provisioned account failed validation");
            return Ok(Outcome::AutoProvisionFailed { errors, identity });
        }

        match self.directory.create(fields).await {
            Ok(account) => {
                info!(account_id = %account.id(), "auto-provisioned account");
                Ok(Outcome::AutoProvisionSucceeded { account })
            }
            Err(CreateAccountError::Invalid(errors)) => {
                warn!(%errors, "auto-provisioned account rejected by directory");
                Ok(Outcome::AutoProvisionFailed { errors, identity })
            }
            Err(CreateAccountError::Directory(error)) => Err(error.into()),
        }
    }
}
