//! Identity providers and the identity assertion they produce.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::ProviderFields;

/// A supported third-party identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// GitHub OAuth, keyed by login.
    GitHub,
    /// Google OpenID Connect, keyed by subject uid.
    Google,
}

impl Provider {
    /// Returns the provider's stable identifier, as used in routes and storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::Google => write!(f, "Google"),
        }
    }
}

/// A verified identity asserted by a provider after a completed OAuth
/// handshake.
///
/// The identity is immutable and lives for a single callback. Its
/// `external_id` is the provider key the account directory is searched by:
/// the login for GitHub, the subject uid for Google.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    provider: Provider,
    external_id: String,
    display_name: String,
    email: String,
    access_token: String,
}

impl ProviderIdentity {
    /// Creates an identity assertion.
    #[must_use]
    pub fn new(
        provider: Provider,
        external_id: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            external_id: external_id.into(),
            display_name: display_name.into(),
            email: email.into(),
            access_token: access_token.into(),
        }
    }

    /// Returns the asserting provider.
    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Returns the provider-scoped identifier.
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Returns the display name, which may be empty.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the asserted email address, which may be empty.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the provider access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the login shown to users when reporting on this identity:
    /// the GitHub login, or the Google email.
    #[must_use]
    pub fn attempted_login(&self) -> &str {
        match self.provider {
            Provider::GitHub => &self.external_id,
            Provider::Google => &self.email,
        }
    }

    /// Returns the lowercased domain of the asserted email, if it has one.
    #[must_use]
    pub fn email_domain(&self) -> Option<String> {
        let (local, domain) = self.email.rsplit_once('@')?;
        if local.is_empty() || domain.is_empty() {
            return None;
        }
        Some(domain.to_ascii_lowercase())
    }

    /// Returns the provider slot this identity fills on an account.
    #[must_use]
    pub fn provider_fields(&self) -> ProviderFields {
        match self.provider {
            Provider::GitHub => ProviderFields::GitHub {
                login: self.external_id.clone(),
                token: self.access_token.clone(),
            },
            Provider::Google => ProviderFields::Google {
                uid: self.external_id.clone(),
            },
        }
    }
}

impl fmt::Debug for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderIdentity")
            .field("provider", &self.provider)
            .field("external_id", &self.external_id)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github_identity() -> ProviderIdentity {
        ProviderIdentity::new(
            Provider::GitHub,
            "octocat",
            "The Octocat",
            "octocat@github.com",
            "gho_secret",
        )
    }

    #[test]
    fn provider_serialization_format() {
        let json = serde_json::to_string(&Provider::GitHub).expect("serialize");
        assert_eq!(json, "\"github\"");
        assert_eq!(Provider::Google.as_str(), "google");
        assert_eq!(Provider::Google.to_string(), "Google");
    }

    #[test]
    fn attempted_login_is_login_for_github() {
        assert_eq!(github_identity().attempted_login(), "octocat");
    }

    #[test]
    fn attempted_login_is_email_for_google() {
        let identity = ProviderIdentity::new(
            Provider::Google,
            "1098765",
            "Alice",
            "alice@example.com",
            "ya29.token",
        );
        assert_eq!(identity.attempted_login(), "alice@example.com");
    }

    #[test]
    fn email_domain_is_lowercased() {
        let identity =
            ProviderIdentity::new(Provider::Google, "1", "Bob", "bob@Example.COM", "t");
        assert_eq!(identity.email_domain().as_deref(), Some("example.com"));
    }

    #[test]
    fn email_domain_missing_when_malformed() {
        for email in ["", "bob", "@example.com", "bob@"] {
            let identity = ProviderIdentity::new(Provider::Google, "1", "Bob", email, "t");
            assert_eq!(identity.email_domain(), None, "email {email:?}");
        }
    }

    #[test]
    fn github_fields_carry_login_and_token() {
        assert_eq!(
            github_identity().provider_fields(),
            ProviderFields::GitHub {
                login: "octocat".to_string(),
                token: "gho_secret".to_string(),
            }
        );
    }

    #[test]
    fn access_token_is_not_in_debug_output() {
        let debug = format!("{:?}", github_identity());
        assert!(!debug.contains("gho_secret"));
        assert!(debug.contains("octocat"));
    }
}
