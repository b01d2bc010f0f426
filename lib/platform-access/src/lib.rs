//! Third-party sign-in, account linking and auto-provisioning for keyward.
//!
//! This crate provides:
//! - Provider identity assertions (`ProviderIdentity`) and accounts (`Account`)
//! - The linking decision engine (`decide`, `LinkingEngine`)
//! - The outcome applier (`OutcomeApplier`)
//! - Collaborator traits (`AccountDirectory`, `MembershipVerifier`) and an
//!   in-memory directory
//! - Session records (`Session`) and their store (`SessionStore`)
//!
//! # Linking model
//!
//! A callback from a provider resolves to exactly one [`Outcome`]:
//! - a signed-in user links the identity to their account, unless another
//!   account already holds it
//! - an anonymous user signs in to the account holding the identity
//! - an unknown identity is auto-provisioned when the provider verifies it
//!   (GitHub organization membership, Google email domain), and refused
//!   otherwise
//!
//! # Example
//!
//! ```
//! use keyward_platform_access::{Decision, Provider, ProviderIdentity, decide};
//!
//! let identity = ProviderIdentity::new(
//!     Provider::GitHub,
//!     "octocat",
//!     "The Octocat",
//!     "octocat@example.com",
//!     "gho_token",
//! );
//!
//! // Anonymous, unknown identity, verified organization member.
//! let decision = decide(None, &identity, None, true, Some(true));
//! assert_eq!(decision, Decision::Provision);
//! ```

pub mod account;
pub mod applier;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod membership;
pub mod memory;
pub mod outcome;
pub mod provider;
pub mod session;
pub mod staged;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use account::{Account, NewAccount, ProviderFields};
pub use applier::{
    AppliedOutcome, Notice, NoticeKind, OutcomeApplier, RedirectTarget, SessionEffect,
    StagedEffect,
};
pub use config::{GitHubLinkingConfig, GoogleLinkingConfig, LinkingConfig};
pub use directory::AccountDirectory;
pub use engine::{Decision, LinkingEngine, decide, needs_verification};
pub use error::{
    CreateAccountError, DirectoryError, LinkingError, MembershipError, SessionError,
    ValidationError, ValidationErrors,
};
pub use keyward_core::{AccountId, SessionId};
pub use membership::MembershipVerifier;
pub use memory::{InMemoryAccountDirectory, InMemorySessionStore};
pub use outcome::{Outcome, UnauthorizedReason};
pub use provider::{Provider, ProviderIdentity};
pub use session::{Session, SessionStore};
pub use staged::StagedIdentity;
pub use strategy::{GitHubStrategy, GoogleStrategy, ProviderStrategy};
