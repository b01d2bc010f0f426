//! Account domain type and provider slots.
//!
//! An account holds at most one identity per provider: a GitHub login (with
//! the OAuth token granted at link time) and a Google uid. The account
//! directory guarantees that no two accounts hold the same provider key.

use chrono::{DateTime, Utc};
use keyward_core::AccountId;
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::provider::{Provider, ProviderIdentity};

/// The provider slot written onto an account when an identity is linked.
///
/// Slots are always written whole: a GitHub login is never stored without
/// its token.
#[derive(Clone, PartialEq, Eq)]
pub enum ProviderFields {
    /// GitHub login and OAuth token.
    GitHub { login: String, token: String },
    /// Google subject uid.
    Google { uid: String },
}

impl ProviderFields {
    /// Returns the provider this slot belongs to.
    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            Self::GitHub { .. } => Provider::GitHub,
            Self::Google { .. } => Provider::Google,
        }
    }

    /// Returns the provider key written by this slot.
    #[must_use]
    pub fn external_id(&self) -> &str {
        match self {
            Self::GitHub { login, .. } => login,
            Self::Google { uid } => uid,
        }
    }
}

impl std::fmt::Debug for ProviderFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitHub { login, .. } => f
                .debug_struct("GitHub")
                .field("login", login)
                .field("token", &"[REDACTED]")
                .finish(),
            Self::Google { uid } => f.debug_struct("Google").field("uid", uid).finish(),
        }
    }
}

/// A platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    email: String,
    name: String,
    github_login: Option<String>,
    #[serde(skip_serializing)]
    github_token: Option<String>,
    google_uid: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account with no linked providers.
    #[must_use]
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            email: email.into(),
            name: name.into(),
            github_login: None,
            github_token: None,
            google_uid: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an account with all fields specified.
    ///
    /// Use this when reconstituting an account from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: AccountId,
        email: String,
        name: String,
        github_login: Option<String>,
        github_token: Option<String>,
        google_uid: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            name,
            github_login,
            github_token,
            google_uid,
            created_at,
            updated_at,
        }
    }

    /// Returns the account ID.
    #[must_use]
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Returns the account email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the account's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the linked GitHub login, if any.
    #[must_use]
    pub fn github_login(&self) -> Option<&str> {
        self.github_login.as_deref()
    }

    /// Returns the GitHub OAuth token stored at link time, if any.
    #[must_use]
    pub fn github_token(&self) -> Option<&str> {
        self.github_token.as_deref()
    }

    /// Returns the linked Google uid, if any.
    #[must_use]
    pub fn google_uid(&self) -> Option<&str> {
        self.google_uid.as_deref()
    }

    /// Returns when the account was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the account was last updated.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the key this account holds for `provider`, if linked.
    #[must_use]
    pub fn provider_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::GitHub => self.github_login(),
            Provider::Google => self.google_uid(),
        }
    }

    /// Returns true if this account already holds exactly `fields`.
    #[must_use]
    pub fn holds(&self, fields: &ProviderFields) -> bool {
        match fields {
            ProviderFields::GitHub { login, token } => {
                self.github_login.as_deref() == Some(login.as_str())
                    && self.github_token.as_deref() == Some(token.as_str())
            }
            ProviderFields::Google { uid } => self.google_uid.as_deref() == Some(uid.as_str()),
        }
    }

    /// Writes a provider slot onto the account.
    ///
    /// Writing a slot the account already holds is a no-op, so linking the
    /// same identity twice leaves the account unchanged.
    pub fn apply_provider_fields(&mut self, fields: &ProviderFields) {
        if self.holds(fields) {
            return;
        }
        match fields {
            ProviderFields::GitHub { login, token } => {
                self.github_login = Some(login.clone());
                self.github_token = Some(token.clone());
            }
            ProviderFields::Google { uid } => {
                self.google_uid = Some(uid.clone());
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Fields for an account about to be created by auto-provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Account email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Provider slot filled at creation.
    pub provider_fields: ProviderFields,
}

impl NewAccount {
    /// Builds the account fields from an identity assertion.
    ///
    /// The name falls back to the attempted login when the provider sent no
    /// display name.
    #[must_use]
    pub fn from_identity(identity: &ProviderIdentity) -> Self {
        let name = match identity.display_name().trim() {
            "" => identity.attempted_login().to_string(),
            name => name.to_string(),
        };
        Self {
            email: identity.email().trim().to_string(),
            name,
            provider_fields: identity.provider_fields(),
        }
    }

    /// Checks the fields that do not need the directory to validate.
    ///
    /// # Errors
    ///
    /// Returns every failed check.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.email.is_empty() {
            errors.add("email", "can't be blank");
        } else if !self.email.contains('@') {
            errors.add("email", "is invalid");
        }
        if self.name.trim().is_empty() {
            errors.add("name", "can't be blank");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Materializes the account, as a directory does on successful create.
    #[must_use]
    pub fn into_account(self) -> Account {
        let mut account = Account::new(self.email, self.name);
        account.apply_provider_fields(&self.provider_fields);
        account.updated_at = account.created_at;
        account
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github_fields(login: &str, token: &str) -> ProviderFields {
        ProviderFields::GitHub {
            login: login.to_string(),
            token: token.to_string(),
        }
    }

    #[test]
    fn new_account_has_no_providers() {
        let account = Account::new("alice@example.com", "Alice");

        assert!(account.id().to_string().starts_with("acct_"));
        assert_eq!(account.github_login(), None);
        assert_eq!(account.github_token(), None);
        assert_eq!(account.google_uid(), None);
        assert_eq!(account.created_at(), account.updated_at());
    }

    #[test]
    fn apply_github_fields_sets_login_and_token_together() {
        let mut account = Account::new("alice@example.com", "Alice");
        account.apply_provider_fields(&github_fields("alice", "gho_1"));

        assert_eq!(account.github_login(), Some("alice"));
        assert_eq!(account.github_token(), Some("gho_1"));
        assert_eq!(account.provider_key(Provider::GitHub), Some("alice"));
        assert_eq!(account.provider_key(Provider::Google), None);
    }

    #[test]
    fn apply_google_fields_leaves_github_untouched() {
        let mut account = Account::new("alice@example.com", "Alice");
        account.apply_provider_fields(&github_fields("alice", "gho_1"));
        account.apply_provider_fields(&ProviderFields::Google {
            uid: "10987".to_string(),
        });

        assert_eq!(account.google_uid(), Some("10987"));
        assert_eq!(account.github_login(), Some("alice"));
    }

    #[test]
    fn applying_same_fields_twice_is_a_no_op() {
        let mut account = Account::new("alice@example.com", "Alice");
        let fields = github_fields("alice", "gho_1");

        account.apply_provider_fields(&fields);
        let once = account.clone();
        std::thread::sleep(std::time::Duration::from_millis(1));
        account.apply_provider_fields(&fields);

        assert_eq!(account, once);
    }

    #[test]
    fn new_token_replaces_old_one() {
        let mut account = Account::new("alice@example.com", "Alice");
        account.apply_provider_fields(&github_fields("alice", "gho_1"));
        account.apply_provider_fields(&github_fields("alice", "gho_2"));

        assert_eq!(account.github_token(), Some("gho_2"));
    }

    #[test]
    fn new_account_from_identity_falls_back_to_login() {
        let identity = ProviderIdentity::new(
            Provider::GitHub,
            "octocat",
            "  ",
            "octocat@github.com",
            "gho_1",
        );
        let fields = NewAccount::from_identity(&identity);

        assert_eq!(fields.name, "octocat");
        assert_eq!(fields.email, "octocat@github.com");
        assert!(fields.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_email() {
        let identity = ProviderIdentity::new(Provider::GitHub, "octocat", "Octo", "", "gho_1");
        let errors = NewAccount::from_identity(&identity)
            .validate()
            .expect_err("blank email");

        assert_eq!(errors.full_messages(), vec!["Email can't be blank"]);
    }

    #[test]
    fn validate_rejects_malformed_email() {
        let identity =
            ProviderIdentity::new(Provider::GitHub, "octocat", "Octo", "octocat", "gho_1");
        let errors = NewAccount::from_identity(&identity)
            .validate()
            .expect_err("malformed email");

        assert_eq!(errors.full_messages(), vec!["Email is invalid"]);
    }

    #[test]
    fn into_account_fills_provider_slot() {
        let identity =
            ProviderIdentity::new(Provider::Google, "uid-1", "Alice", "alice@example.com", "t");
        let account = NewAccount::from_identity(&identity).into_account();

        assert_eq!(account.google_uid(), Some("uid-1"));
        assert_eq!(account.name(), "Alice");
        assert_eq!(account.created_at(), account.updated_at());
    }

    #[test]
    fn github_token_is_not_serialized() {
        let mut account = Account::new("alice@example.com", "Alice");
        account.apply_provider_fields(&github_fields("alice", "gho_secret"));

        let json = serde_json::to_string(&account).expect("serialize");
        assert!(!json.contains("gho_secret"));
        assert!(json.contains("alice"));
    }
}
