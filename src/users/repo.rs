use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User, UserPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent repository of user records.
///
/// Every conditional method performs its check and its write as one atomic
/// step, so callers never need their own locking.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] if the email is taken.
    async fn insert(&self, new: NewUser) -> StoreResult<User>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// All users, newest first.
    async fn list(&self) -> StoreResult<Vec<User>>;

    /// Applies `patch` and returns the updated record. Returns `None` when
    /// the user does not exist or a requested [`PasswordSwap`] no longer
    /// matches the stored hash.
    ///
    /// [`PasswordSwap`]: crate::users::repo_types::PasswordSwap
    async fn update(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>>;

    /// Records an outstanding reset request, replacing any earlier one.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<bool>;

    /// Read-only lookup of the user holding `token_hash`, expired or not.
    async fn find_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<User>>;

    /// Finds the user holding `token_hash` with an expiry after `now`, sets
    /// the new password hash and clears both reset fields. At most one
    /// caller can succeed for a given token.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        new_password_hash: &str,
    ) -> StoreResult<Option<User>>;

    /// Deletes the user. With `expected_hash`, only deletes if the stored
    /// password hash still matches.
    async fn delete(&self, id: Uuid, expected_hash: Option<&str>) -> StoreResult<Option<User>>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, avatar, \
     reset_token, reset_token_expiry, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_sqlx(e: sqlx::Error, op: &'static str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Other(anyhow::Error::new(e).context(op))
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, new: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "insert user"))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_sqlx(e, "find user by id"))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "find user by email"))
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "list users"))
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let (new_hash, expected_hash) = match patch.password {
            Some(swap) => (Some(swap.new_hash), Some(swap.expected_hash)),
            None => (None, None),
        };
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                avatar = CASE WHEN $5 THEN $6 ELSE avatar END,
                password_hash = COALESCE($7, password_hash),
                reset_token = CASE WHEN $7::text IS NULL THEN reset_token ELSE NULL END,
                reset_token_expiry = CASE WHEN $7::text IS NULL THEN reset_token_expiry ELSE NULL END,
                updated_at = now()
            WHERE id = $1 AND ($8::text IS NULL OR password_hash = $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.role)
        .bind(patch.avatar.is_some())
        .bind(patch.avatar.flatten())
        .bind(new_hash)
        .bind(expected_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "update user"))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_token_expiry = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "set reset token"))?;
        Ok(res.rows_affected() == 1)
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "find user by reset token"))
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        new_password_hash: &str,
    ) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $3, reset_token = NULL, reset_token_expiry = NULL, updated_at = now()
            WHERE reset_token = $1 AND reset_token_expiry > $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .bind(new_password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "consume reset token"))
    }

    async fn delete(&self, id: Uuid, expected_hash: Option<&str>) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            DELETE FROM users
            WHERE id = $1 AND ($2::text IS NULL OR password_hash = $2)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "delete user"))
    }
}
