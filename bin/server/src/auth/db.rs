//! Postgres-backed sessions, request tokens, bindings and local accounts.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::Report;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uitid_connect_core::AccountId;
use uitid_connect_identity::{
    AccountError, AccountSeed, IdentityBinding, LocalAccount, LocalAccountService, RequestToken,
    Session, SessionBindingStore, SessionId, SessionStore, StoreError, TokenStore,
};

/// Row type for account queries.
#[derive(FromRow)]
struct AccountRow {
    id: String,
    name: String,
    blocked: bool,
}

impl AccountRow {
    fn try_into_account(self) -> Result<LocalAccount, sqlx::Error> {
        let id = AccountId::from_str(&self.id).map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid account id '{}': {}", self.id, e),
            )))
        })?;
        Ok(LocalAccount::with_all_fields(id, self.name, self.blocked))
    }
}

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    account_id: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, sqlx::Error> {
        let account_id = self
            .account_id
            .map(|id| {
                AccountId::from_str(&id).map_err(|e| {
                    sqlx::Error::Decode(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("invalid account id '{id}': {e}"),
                    )))
                })
            })
            .transpose()?;
        Ok(Session::with_all_fields(
            SessionId::new(self.id),
            account_id,
            self.created_at,
            self.expires_at,
        ))
    }
}

#[derive(FromRow)]
struct RequestTokenRow {
    request_token: Option<String>,
    request_token_secret: Option<String>,
}

#[derive(FromRow)]
struct BindingRow {
    uitid_user_id: Option<String>,
    uitid_access_token: Option<String>,
    uitid_access_token_secret: Option<String>,
}

fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Decode(details) => StoreError::Corrupt {
            details: details.to_string(),
        },
        other => StoreError::Unavailable {
            details: other.to_string(),
        },
    }
}

fn account_error(e: sqlx::Error) -> AccountError {
    AccountError::Storage {
        details: e.to_string(),
    }
}

/// Store implementing every identity storage trait on one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_account_by_external_id(
        tx: &mut Transaction<'_, Postgres>,
        provider_key: &str,
        external_id: &str,
    ) -> Result<Option<LocalAccount>, sqlx::Error> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.name, a.blocked
            FROM accounts a
            JOIN external_auth_map m ON m.account_id = a.id
            WHERE m.provider = $1 AND m.external_id = $2
            "#,
        )
        .bind(provider_key)
        .bind(external_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(AccountRow::try_into_account).transpose()
    }

    async fn register_account(
        tx: &mut Transaction<'_, Postgres>,
        provider_key: &str,
        external_id: &str,
        name: &str,
    ) -> Result<LocalAccount, sqlx::Error> {
        let account = LocalAccount::new(name);
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, blocked)
            VALUES ($1, $2, FALSE)
            "#,
        )
        .bind(account.id().to_string())
        .bind(account.name())
        .execute(&mut **tx)
        .await?;

        let mapped = sqlx::query(
            r#"
            INSERT INTO external_auth_map (provider, external_id, account_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider, external_id) DO NOTHING
            "#,
        )
        .bind(provider_key)
        .bind(external_id)
        .bind(account.id().to_string())
        .execute(&mut **tx)
        .await?;

        if mapped.rows_affected() == 1 {
            debug!(account = %account.id(), external_id, "registered local account");
            return Ok(account);
        }

        // A concurrent login registered the identity first.
        sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(account.id().to_string())
            .execute(&mut **tx)
            .await?;
        Self::find_account_by_external_id(tx, provider_key, external_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create(&self, session: &Session) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, account_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session.id().as_str())
        .bind(session.account_id().map(|id| id.to_string()))
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn find(&self, id: &SessionId) -> Result<Option<Session>, Report<StoreError>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, created_at, expires_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row
            .map(SessionRow::try_into_session)
            .transpose()
            .map_err(store_error)?)
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn rotate(
        &self,
        old: &SessionId,
        new: &SessionId,
    ) -> Result<Option<Session>, Report<StoreError>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            UPDATE sessions
            SET id = $2, request_token = NULL, request_token_secret = NULL
            WHERE id = $1
            RETURNING id, account_id, created_at, expires_at
            "#,
        )
        .bind(old.as_str())
        .bind(new.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row
            .map(SessionRow::try_into_session)
            .transpose()
            .map_err(store_error)?)
    }

    async fn delete_expired(&self) -> Result<u64, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn request_token(
        &self,
        session: &SessionId,
    ) -> Result<Option<RequestToken>, Report<StoreError>> {
        let row: Option<RequestTokenRow> = sqlx::query_as(
            r#"
            SELECT request_token, request_token_secret
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.and_then(|r| match (r.request_token, r.request_token_secret) {
            (Some(token), Some(secret)) => Some(RequestToken::new(token, secret)),
            _ => None,
        }))
    }

    async fn store_request_token(
        &self,
        session: &SessionId,
        token: &RequestToken,
    ) -> Result<(), Report<StoreError>> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET request_token = $2, request_token_secret = $3
            WHERE id = $1
            "#,
        )
        .bind(session.as_str())
        .bind(token.token())
        .bind(token.secret())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingSession {
                session_id: session.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn clear_request_token(&self, session: &SessionId) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET request_token = NULL, request_token_secret = NULL
            WHERE id = $1
            "#,
        )
        .bind(session.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}

#[async_trait]
impl SessionBindingStore for PgStore {
    async fn binding(
        &self,
        session: &SessionId,
    ) -> Result<Option<IdentityBinding>, Report<StoreError>> {
        let row: Option<BindingRow> = sqlx::query_as(
            r#"
            SELECT uitid_user_id, uitid_access_token, uitid_access_token_secret
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.and_then(|r| {
            match (
                r.uitid_user_id,
                r.uitid_access_token,
                r.uitid_access_token_secret,
            ) {
                (Some(user_id), Some(token), Some(secret)) => {
                    Some(IdentityBinding::new(user_id, token, secret))
                }
                _ => None,
            }
        }))
    }

    async fn set_binding(
        &self,
        session: &SessionId,
        binding: &IdentityBinding,
    ) -> Result<(), Report<StoreError>> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET uitid_user_id = $2, uitid_access_token = $3, uitid_access_token_secret = $4
            WHERE id = $1
            "#,
        )
        .bind(session.as_str())
        .bind(binding.external_user_id())
        .bind(binding.access_token())
        .bind(binding.access_token_secret())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingSession {
                session_id: session.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl LocalAccountService for PgStore {
    async fn login_or_register(
        &self,
        session: &SessionId,
        external_id: &str,
        provider_key: &str,
        seed: &AccountSeed,
    ) -> Result<Option<LocalAccount>, Report<AccountError>> {
        let mut tx = self.pool.begin().await.map_err(account_error)?;

        let account = match Self::find_account_by_external_id(&mut tx, provider_key, external_id)
            .await
            .map_err(account_error)?
        {
            Some(account) => account,
            None => Self::register_account(
                &mut tx,
                provider_key,
                external_id,
                &seed.account_name(provider_key, external_id),
            )
            .await
            .map_err(account_error)?,
        };

        if account.is_blocked() {
            tx.commit().await.map_err(account_error)?;
            return Ok(None);
        }

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET account_id = $2
            WHERE id = $1
            "#,
        )
        .bind(session.as_str())
        .bind(account.id().to_string())
        .execute(&mut *tx)
        .await
        .map_err(account_error)?;

        if result.rows_affected() == 0 {
            return Err(AccountError::SessionNotFound {
                session_id: session.to_string(),
            }
            .into());
        }

        tx.commit().await.map_err(account_error)?;
        Ok(Some(account))
    }
}
