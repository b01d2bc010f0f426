//! The staged-identity retry slot.
//!
//! When auto-provisioning fails validation, the identity is kept so the login
//! form can prefill it for one retry. The access token is never staged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::{Provider, ProviderIdentity};

/// Identity data retained after a failed auto-provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedIdentity {
    provider: Provider,
    external_id: String,
    display_name: String,
    email: String,
    staged_at: DateTime<Utc>,
}

impl StagedIdentity {
    /// Stages an identity, dropping its access token.
    #[must_use]
    pub fn from_identity(identity: &ProviderIdentity) -> Self {
        Self {
            provider: identity.provider(),
            external_id: identity.external_id().to_string(),
            display_name: identity.display_name().to_string(),
            email: identity.email().to_string(),
            staged_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn staged_at(&self) -> DateTime<Utc> {
        self.staged_at
    }

    /// Returns true if the identity was staged more than `max_age` ago.
    #[must_use]
    pub fn is_expired(&self, max_age: Duration) -> bool {
        Utc::now() - self.staged_at > max_age
    }
}
