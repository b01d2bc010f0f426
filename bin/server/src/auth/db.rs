//! PostgreSQL account directory and session repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_platform_access::{
    Account, AccountDirectory, AccountId, CreateAccountError, DirectoryError, NewAccount,
    Provider, ProviderFields, Session, SessionError, SessionId, SessionStore, ValidationErrors,
};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::instrument;

/// Row type for account queries.
#[derive(FromRow)]
struct AccountRow {
    id: String,
    email: String,
    name: String,
    github_login: Option<String>,
    github_token: Option<String>,
    google_uid: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn try_into_account(self) -> Result<Account, DirectoryError> {
        let id = AccountId::from_str(&self.id).map_err(|e| DirectoryError::Storage {
            details: format!("invalid account id '{}': {}", self.id, e),
        })?;
        Ok(Account::with_all_fields(
            id,
            self.email,
            self.name,
            self.github_login,
            self.github_token,
            self.google_uid,
            self.created_at,
            self.updated_at,
        ))
    }
}

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    account_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, SessionError> {
        let id = SessionId::from_str(&self.id).map_err(|e| decode_error(&self.id, e))?;
        let account_id =
            AccountId::from_str(&self.account_id).map_err(|e| decode_error(&self.account_id, e))?;
        Ok(Session::with_all_fields(
            id,
            account_id,
            self.created_at,
            self.expires_at,
        ))
    }
}

fn decode_error(value: &str, error: keyward_core::ParseIdError) -> SessionError {
    SessionError::Storage {
        details: format!("invalid id '{value}': {error}"),
    }
}

fn storage_error(error: sqlx::Error) -> DirectoryError {
    DirectoryError::Storage {
        details: error.to_string(),
    }
}

/// Returns the unique constraint a database error violated, if any.
fn violated_unique_constraint(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
        _ => None,
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, email, name, github_login, github_token, google_uid, created_at, updated_at";

/// Result of [`PgAccountDirectory::sync_email_domains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainSync {
    pub revoked: u64,
    pub added: u64,
}

/// Account directory backed by the `accounts` and `email_domain_policies`
/// tables.
///
/// Provider keys are unique per column, so the database enforces that at most
/// one account holds a given identity.
#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    /// Creates a new account directory.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replaces the auto-provisioning domain policy with `domains`.
    ///
    /// Runs in one transaction: domains missing from `domains` are revoked and
    /// new ones added. Returns the number of revoked and added domains.
    pub async fn sync_email_domains(
        &self,
        domains: &[String],
    ) -> Result<DomainSync, sqlx::Error> {
        let mut domains: Vec<String> = domains
            .iter()
            .map(|domain| domain.trim().to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();
        domains.sort();
        domains.dedup();

        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            DELETE FROM email_domain_policies
            WHERE domain <> ALL($1)
            "#,
        )
        .bind(&domains)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let added = sqlx::query(
            r#"
            INSERT INTO email_domain_policies (domain)
            SELECT * FROM UNNEST($1::text[])
            ON CONFLICT (domain) DO NOTHING
            "#,
        )
        .bind(&domains)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(DomainSync { revoked, added })
    }

    async fn fetch_one_by(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<Account>, DirectoryError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = $1");
        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(AccountRow::try_into_account).transpose()
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    #[instrument(skip(self))]
    async fn find_by_provider_key(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<Account>, DirectoryError> {
        let column = match provider {
            Provider::GitHub => "github_login",
            Provider::Google => "google_uid",
        };
        self.fetch_one_by(column, external_id).await
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, DirectoryError> {
        self.fetch_one_by("id", &id.to_string()).await
    }

    #[instrument(skip(self))]
    async fn allows_email_domain(&self, domain: &str) -> Result<bool, DirectoryError> {
        let (allowed,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM email_domain_policies WHERE domain = lower($1))
            "#,
        )
        .bind(domain)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(allowed)
    }

    #[instrument(skip_all, fields(provider = %fields.provider_fields.provider()))]
    async fn create(&self, fields: NewAccount) -> Result<Account, CreateAccountError> {
        fields.validate()?;

        let (github_login, github_token, google_uid) = match &fields.provider_fields {
            ProviderFields::GitHub { login, token } => (Some(login), Some(token), None),
            ProviderFields::Google { uid } => (None, None, Some(uid)),
        };
        let now = Utc::now();

        let result: Result<AccountRow, sqlx::Error> = sqlx::query_as(&format!(
            r#"
            INSERT INTO accounts ({ACCOUNT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(AccountId::new().to_string())
        .bind(&fields.email)
        .bind(&fields.name)
        .bind(github_login)
        .bind(github_token)
        .bind(google_uid)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.try_into_account()?),
            Err(error) => {
                let field = violated_unique_constraint(&error).and_then(|constraint| {
                    match constraint {
                        "accounts_email_key" => Some("email"),
                        "accounts_github_login_key" => Some("github_login"),
                        "accounts_google_uid_key" => Some("google_uid"),
                        _ => None,
                    }
                });
                let Some(field) = field else {
                    return Err(storage_error(error).into());
                };
                let mut errors = ValidationErrors::new();
                errors.add(field, "has already been taken");
                Err(errors.into())
            }
        }
    }

    #[instrument(skip_all, fields(account_id = %id, provider = %fields.provider()))]
    async fn update_provider_fields(
        &self,
        id: AccountId,
        fields: &ProviderFields,
    ) -> Result<Account, DirectoryError> {
        // A single UPDATE keeps the slot write atomic; updated_at only moves
        // when the slot actually changes.
        let query = match fields {
            ProviderFields::GitHub { .. } => format!(
                r#"
                UPDATE accounts
                SET github_login = $2,
                    github_token = $3,
                    updated_at = CASE
                        WHEN github_login IS NOT DISTINCT FROM $2
                         AND github_token IS NOT DISTINCT FROM $3 THEN updated_at
                        ELSE NOW()
                    END
                WHERE id = $1
                RETURNING {ACCOUNT_COLUMNS}
                "#
            ),
            ProviderFields::Google { .. } => format!(
                r#"
                UPDATE accounts
                SET google_uid = $2,
                    updated_at = CASE
                        WHEN google_uid IS NOT DISTINCT FROM $2 THEN updated_at
                        ELSE NOW()
                    END
                WHERE id = $1
                RETURNING {ACCOUNT_COLUMNS}
                "#
            ),
        };

        let mut statement = sqlx::query_as::<_, AccountRow>(&query)
            .bind(id.to_string())
            .bind(fields.external_id());
        if let ProviderFields::GitHub { token, .. } = fields {
            statement = statement.bind(token);
        }

        match statement.fetch_optional(&self.pool).await {
            Ok(Some(row)) => row.try_into_account(),
            Ok(None) => Err(DirectoryError::AccountNotFound { account_id: id }),
            Err(error) if violated_unique_constraint(&error).is_some() => {
                Err(DirectoryError::ProviderKeyTaken {
                    provider: fields.provider(),
                    external_id: fields.external_id().to_string(),
                })
            }
            Err(error) => Err(storage_error(error)),
        }
    }
}

/// Session store backed by the `sessions` table.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Creates a new session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn session_error(error: sqlx::Error) -> SessionError {
    SessionError::Storage {
        details: error.to_string(),
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, SessionError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, created_at, expires_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(session_error)?;

        row.map(SessionRow::try_into_session).transpose()
    }

    async fn create(&self, session: &Session) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, account_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session.id().to_string())
        .bind(session.account_id().to_string())
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(&self.pool)
        .await
        .map_err(session_error)?;

        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(session_error)?;

        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(session_error)?;

        Ok(result.rows_affected())
    }
}

// These run against a scratch database created by `sqlx::test` from
// `DATABASE_URL`, with the crate's migrations applied.
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

        fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| (*d).to_string()).collect()
    }

    #[sqlx::test]
    #[ignore = "Requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn removed_domain_is_revoked(pool: PgPool) {
        let directory = PgAccountDirectory::new(pool);

        let first = directory
            .sync_email_domains(&domains(&["example.com", "corp.com"]))
            .await
            .expect("first sync");
        assert_eq!(first, DomainSync { revoked: 0, added: 2 });

        let second = directory
            .sync_email_domains(&domains(&["example.com"]))
            .await
            .expect("second sync");
        assert_eq!(second, DomainSync { revoked: 1, added: 0 });

        assert!(!directory.allows_email_domain("corp.com").await.expect("policy"));
        assert!(directory.allows_email_domain("Example.com").await.expect("policy"));
    }

    #[sqlx::test]
    #[ignore = "Requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn empty_domain_list_revokes_everything(pool: PgPool) {
        let directory = PgAccountDirectory::new(pool);
        directory
            .sync_email_domains(&domains(&["example.com"]))
            .await
            .expect("seed");

        let sync = directory.sync_email_domains(&[]).await.expect("clear");

        assert_eq!(sync, DomainSync { revoked: 1, added: 0 });
        assert!(!directory.allows_email_domain("example.com").await.expect("policy"));
    }

    #[sqlx::test]
    #[ignore = "Requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn expired_sessions_are_swept(pool: PgPool) {
        let directory = PgAccountDirectory::new(pool.clone());
        let sessions = SessionRepository::new(pool);
        let account = directory
            .create(NewAccount {
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                provider_fields: ProviderFields::Google {
                    uid: "uid-1".to_string(),
                },
            })
            .await
            .expect("create account");

        let live = Session::new(account.id(), Duration::hours(1));
        let expired = Session::new(account.id(), Duration::seconds(-1));
        sessions.create(&live).await.expect("create live");
        sessions.create(&expired).await.expect("create expired");

        assert_eq!(sessions.delete_expired().await.expect("sweep"), 1);
        assert_eq!(sessions.find_by_id(live.id()).await.expect("find"), Some(live));
        assert_eq!(sessions.find_by_id(expired.id()).await.expect("find"), None);
    }
}
