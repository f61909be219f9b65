mod account;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use account::{Account, AccountError, AccountStore, AccountView, NewAccount};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Accounts table. Uniqueness of username and email is enforced
                // here, not only by the pre-create check.
                "CREATE TABLE accounts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    username TEXT UNIQUE NOT NULL,
                    email TEXT UNIQUE NOT NULL,
                    full_name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    avatar_url TEXT NOT NULL,
                    cover_image_url TEXT NOT NULL DEFAULT '',
                    refresh_token TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_accounts_uuid ON accounts(uuid)",
                "CREATE INDEX idx_accounts_username ON accounts(username)",
                "CREATE INDEX idx_accounts_email ON accounts(email)",
            ],
        )
        .await
    }

    /// Get the account store.
    pub fn accounts(&self) -> AccountStore {
        AccountStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            email: email.to_string(),
            full_name: "Test Account".to_string(),
            password: "s3cret!".to_string(),
            avatar_url: "https://blobs.test/avatar.png".to_string(),
            cover_image_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_account() {
        let db = Database::open(":memory:").await.unwrap();

        let created = db.accounts().create(new_account("alice", "alice@example.com")).await.unwrap();

        let account = db
            .accounts()
            .find_by_username_or_email(Some("alice"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.uuid, created.uuid);
        assert_eq!(account.username, "alice");
        assert_eq!(account.email, "alice@example.com");
        assert!(account.refresh_token.is_none());

        let account = db.accounts().get_by_uuid(&created.uuid).await.unwrap().unwrap();
        assert_eq!(account.username, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let db = Database::open(":memory:").await.unwrap();

        db.accounts().create(new_account("alice", "alice@example.com")).await.unwrap();
        let result = db.accounts().create(new_account("alice", "other@example.com")).await;

        assert!(matches!(result, Err(AccountError::Conflict)));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let db = Database::open(":memory:").await.unwrap();

        db.accounts().create(new_account("alice", "alice@example.com")).await.unwrap();
        let result = db.accounts().create(new_account("bob", "alice@example.com")).await;

        assert!(matches!(result, Err(AccountError::Conflict)));
    }

    #[tokio::test]
    async fn test_exists_by_username_or_email() {
        let db = Database::open(":memory:").await.unwrap();

        assert!(
            !db.accounts()
                .exists_by_username_or_email("alice", "alice@example.com")
                .await
                .unwrap()
        );

        db.accounts().create(new_account("alice", "alice@example.com")).await.unwrap();

        assert!(
            db.accounts()
                .exists_by_username_or_email("alice", "nobody@example.com")
                .await
                .unwrap()
        );
        assert!(
            db.accounts()
                .exists_by_username_or_email("nobody", "alice@example.com")
                .await
                .unwrap()
        );
    }
}
