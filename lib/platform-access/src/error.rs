//! Error types for the platform-access crate.
//!
//! Conflicts, unauthorized attempts and failed auto-provisioning are not
//! errors: they are [`Outcome`](crate::Outcome)s reported to the user. The
//! types here cover what must fail a callback visibly:
//! - `DirectoryError`: the account directory could not be read or written
//! - `MembershipError`: the provider's membership API could not be consulted
//! - `LinkingError`: what the engine and applier surface, wrapped in a
//!   rootcause `Report` at the crate boundary

use crate::provider::Provider;
use keyward_core::AccountId;
use std::fmt;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation (e.g. "email").
    pub field: String,
    /// Human readable message, without the field name.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error for `field`.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the message prefixed with a humanized field name,
    /// e.g. "Email has already been taken".
    #[must_use]
    pub fn full_message(&self) -> String {
        let mut label = self.field.replace('_', " ");
        if let Some(first) = label.get(..1) {
            let upper = first.to_uppercase();
            label.replace_range(..1, &upper);
        }
        format!("{label} {}", self.message)
    }
}

/// Validation failures collected while creating an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a failure for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError::new(field, message));
    }

    /// Returns true if no failure was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the recorded failures.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Returns every failure as a full message.
    #[must_use]
    pub fn full_messages(&self) -> Vec<String> {
        self.errors.iter().map(ValidationError::full_message).collect()
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join("\n"))
    }
}

impl std::error::Error for ValidationErrors {}

/// Errors from account directory operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The account to update does not exist.
    AccountNotFound { account_id: AccountId },
    /// The provider identity is already held by a different account.
    ProviderKeyTaken {
        provider: Provider,
        external_id: String,
    },
    /// The backing store failed.
    Storage { details: String },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountNotFound { account_id } => {
                write!(f, "account '{account_id}' not found")
            }
            Self::ProviderKeyTaken {
                provider,
                external_id,
            } => {
                write!(
                    f,
                    "{provider} identity '{external_id}' is already linked to another account"
                )
            }
            Self::Storage { details } => {
                write!(f, "account directory error: {details}")
            }
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Errors from session store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The backing store failed.
    Storage { details: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { details } => write!(f, "session store error: {details}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from creating an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateAccountError {
    /// The account was rejected; nothing was persisted.
    Invalid(ValidationErrors),
    /// The directory failed while persisting.
    Directory(DirectoryError),
}

impl fmt::Display for CreateAccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(errors) => write!(f, "invalid account: {errors}"),
            Self::Directory(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for CreateAccountError {}

impl From<ValidationErrors> for CreateAccountError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Invalid(errors)
    }
}

impl From<DirectoryError> for CreateAccountError {
    fn from(error: DirectoryError) -> Self {
        Self::Directory(error)
    }
}

/// Errors from consulting a provider's membership API.
///
/// A failure here is never a "not a member" answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    /// The request could not be sent or timed out.
    Transport { details: String },
    /// The provider answered with a non-success status.
    Api { status: u16, details: String },
    /// The provider's response could not be parsed.
    InvalidResponse { details: String },
}

impl fmt::Display for MembershipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { details } => {
                write!(f, "membership request failed: {details}")
            }
            Self::Api { status, details } => {
                write!(f, "membership API returned {status}: {details}")
            }
            Self::InvalidResponse { details } => {
                write!(f, "invalid membership response: {details}")
            }
        }
    }
}

impl std::error::Error for MembershipError {}

/// Errors surfaced by the linking engine and the outcome applier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkingError {
    /// An external provider service could not be consulted. Callers may
    /// retry the callback or show a transient error.
    ExternalService {
        provider: Provider,
        source: MembershipError,
    },
    /// The account directory failed.
    Directory(DirectoryError),
}

impl fmt::Display for LinkingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExternalService { provider, source } => {
                write!(f, "{provider} service unavailable: {source}")
            }
            Self::Directory(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for LinkingError {}

impl From<DirectoryError> for LinkingError {
    fn from(error: DirectoryError) -> Self {
        Self::Directory(error)
    }
}
