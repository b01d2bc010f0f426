//! Linking and auto-provisioning configuration.
//!
//! The configuration is read once at startup and handed to the
//! [`LinkingEngine`](crate::LinkingEngine) and
//! [`OutcomeApplier`](crate::OutcomeApplier) explicitly. Fields with defaults
//! can be omitted when loading from environment variables.

use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// Per-provider linking configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkingConfig {
    /// GitHub settings.
    #[serde(default)]
    github: GitHubLinkingConfig,
    /// Google settings.
    #[serde(default)]
    google: GoogleLinkingConfig,
}

impl LinkingConfig {
    /// Creates a configuration from per-provider settings.
    #[must_use]
    pub fn new(github: GitHubLinkingConfig, google: GoogleLinkingConfig) -> Self {
        Self { github, google }
    }

    /// Returns the GitHub settings.
    #[must_use]
    pub fn github(&self) -> &GitHubLinkingConfig {
        &self.github
    }

    /// Returns the Google settings.
    #[must_use]
    pub fn google(&self) -> &GoogleLinkingConfig {
        &self.google
    }

    /// Returns the display title for `provider`.
    #[must_use]
    pub fn site_title(&self, provider: Provider) -> &str {
        match provider {
            Provider::GitHub => self.github.site_title(),
            Provider::Google => self.google.site_title(),
        }
    }
}

/// GitHub linking configuration.
///
/// Auto-provisioning is enabled by configuring an organization: members of
/// that organization get an account on their first sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubLinkingConfig {
    /// Title shown to users, e.g. "GitHub" or "GitHub Enterprise".
    /// Default: "GitHub"
    #[serde(default = "default_github_site_title")]
    site_title: String,
    /// Base URL of the GitHub REST API used for membership checks.
    /// Default: "https://api.github.com"
    #[serde(default = "default_github_api_url")]
    api_url: String,
    /// Numeric id of the organization whose members are auto-provisioned.
    #[serde(default)]
    org_id: Option<u64>,
}

fn default_github_site_title() -> String {
    "GitHub".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

impl Default for GitHubLinkingConfig {
    fn default() -> Self {
        Self {
            site_title: default_github_site_title(),
            api_url: default_github_api_url(),
            org_id: None,
        }
    }
}

impl GitHubLinkingConfig {
    /// Sets the display title.
    #[must_use]
    pub fn with_site_title(mut self, title: impl Into<String>) -> Self {
        self.site_title = title.into();
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sets the auto-provisioning organization.
    #[must_use]
    pub fn with_org_id(mut self, org_id: Option<u64>) -> Self {
        self.org_id = org_id;
        self
    }

    /// Returns the display title.
    #[must_use]
    pub fn site_title(&self) -> &str {
        &self.site_title
    }

    /// Returns the API base URL without a trailing slash.
    #[must_use]
    pub fn api_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Returns the auto-provisioning organization id, if configured.
    #[must_use]
    pub fn org_id(&self) -> Option<u64> {
        self.org_id
    }

    /// Returns true if GitHub sign-ins may auto-provision accounts.
    #[must_use]
    pub fn auto_provision(&self) -> bool {
        self.org_id.is_some()
    }
}

/// Google linking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleLinkingConfig {
    /// Title shown to users.
    /// Default: "Google"
    #[serde(default = "default_google_site_title")]
    site_title: String,
    /// Whether Google sign-ins from authorized domains auto-provision accounts.
    /// Default: false
    #[serde(default)]
    auto_provision: bool,
    /// Email domains allowed to auto-provision, as a comma-separated string.
    /// Seeded into the account directory's domain policy at startup.
    #[serde(default)]
    authorized_domains: String,
}

fn default_google_site_title() -> String {
    "Google".to_string()
}

impl Default for GoogleLinkingConfig {
    fn default() -> Self {
        Self {
            site_title: default_google_site_title(),
            auto_provision: false,
            authorized_domains: String::new(),
        }
    }
}

impl GoogleLinkingConfig {
    /// Sets the display title.
    #[must_use]
    pub fn with_site_title(mut self, title: impl Into<String>) -> Self {
        self.site_title = title.into();
        self
    }

    /// Enables or disables auto-provisioning.
    #[must_use]
    pub fn with_auto_provision(mut self, enabled: bool) -> Self {
        self.auto_provision = enabled;
        self
    }

    /// Sets the authorized email domains.
    #[must_use]
    pub fn with_authorized_domains(mut self, domains: &[&str]) -> Self {
        self.authorized_domains = domains.join(",");
        self
    }

    /// Returns the display title.
    #[must_use]
    pub fn site_title(&self) -> &str {
        &self.site_title
    }

    /// Returns true if Google sign-ins may auto-provision accounts.
    #[must_use]
    pub fn auto_provision(&self) -> bool {
        self.auto_provision
    }

    /// Returns the authorized domains, lowercased, without blanks.
    #[must_use]
    pub fn authorized_domains(&self) -> Vec<String> {
        self.authorized_domains
            .split(',')
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect()
    }
}
