//! Account storage: lookup, creation, password verification, and the
//! single-slot refresh token.
//!
//! Each account holds at most one valid refresh token at a time. Rotation is
//! a conditional UPDATE keyed on the previous value, so two concurrent
//! rotations with the same token resolve to exactly one winner without any
//! application-level locking.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct AccountStore {
    pool: SqlitePool,
}

/// A persisted account record. Never serialized outward; use
/// [`AccountView`] for anything that leaves the process.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar_url: String,
    pub cover_image_url: String,
    pub refresh_token: Option<String>,
    pub created_at: String,
}

/// Public projection of an account. Excludes the password hash and the
/// stored refresh token.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountView {
    pub uuid: String,
    pub username: String,
    pub email: String,
    #[serde(rename = "fullname")]
    pub full_name: String,
    pub avatar_url: String,
    pub cover_image_url: String,
    pub created_at: String,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            uuid: account.uuid,
            username: account.username,
            email: account.email,
            full_name: account.full_name,
            avatar_url: account.avatar_url,
            cover_image_url: account.cover_image_url,
            created_at: account.created_at,
        }
    }
}

/// Fields required to create an account. The password is hashed here;
/// the plaintext is never written anywhere.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar_url: String,
    pub cover_image_url: String,
}

/// Errors from account storage operations.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Username or email already taken (storage-level unique constraint).
    #[error("username or email already taken")]
    Conflict,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

const SELECT_COLUMNS: &str = "id, uuid, username, email, full_name, password_hash, \
     avatar_url, cover_image_url, refresh_token, created_at";

impl AccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new account. The unique constraints on username and email are
    /// the final authority: a duplicate that slips past the caller's
    /// pre-check still fails here with [`AccountError::Conflict`].
    pub async fn create(&self, fields: NewAccount) -> Result<Account, AccountError> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let password_hash = hash_password(&fields.password)?;

        let result = sqlx::query(
            "INSERT INTO accounts (uuid, username, email, full_name, password_hash, avatar_url, cover_image_url) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(&fields.username)
        .bind(&fields.email)
        .bind(&fields.full_name)
        .bind(&password_hash)
        .bind(&fields.avatar_url)
        .bind(&fields.cover_image_url)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AccountError::Conflict);
            }
            Err(e) => return Err(e.into()),
        }

        self.get_by_uuid(&uuid)
            .await?
            .ok_or(AccountError::Db(sqlx::Error::RowNotFound))
    }

    /// Find an account matching either identifier. Callers pass whichever
    /// identifiers they have; absent ones never match.
    pub async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<Account> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM accounts WHERE username = ? OR email = ?"
        ))
        .bind(username.unwrap_or(""))
        .bind(email.unwrap_or(""))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Check whether either identifier is already taken.
    pub async fn exists_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, sqlx::Error> {
        let count: (i32,) =
            sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE username = ? OR email = ?")
                .bind(username)
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    /// Get an account by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<Account> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM accounts WHERE uuid = ?"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Verify a plaintext password against the account's stored hash.
    pub fn verify_password(&self, account: &Account, plaintext: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(&account.password_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Overwrite the stored refresh token. `None` clears the slot so no
    /// future refresh token can match it. Idempotent.
    pub async fn set_refresh_token(
        &self,
        uuid: &str,
        token: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE accounts SET refresh_token = ? WHERE uuid = ?")
            .bind(token)
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically replace the stored refresh token, conditioned on the
    /// previous value. Returns false when the presented token no longer
    /// matches the stored one (superseded, cleared, or never set), which is
    /// the replay-prevention gate for refresh rotation.
    pub async fn rotate_refresh_token(
        &self,
        uuid: &str,
        presented: &str,
        replacement: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE accounts SET refresh_token = ? WHERE uuid = ? AND refresh_token = ?",
        )
        .bind(replacement)
        .bind(uuid)
        .bind(presented)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Hash a password into a PHC string with a random salt.
fn hash_password(password: &str) -> Result<String, AccountError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AccountError::Hash(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AccountError::Hash(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AccountError::Hash(e.to_string()))?
        .to_string();
    Ok(phc)
}
