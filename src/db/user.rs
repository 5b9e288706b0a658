//! User model and repository for Gator.

use chrono::{DateTime, Utc};

use super::{is_unique_violation, DbPool};
use crate::datetime::{format_timestamp, parse_timestamp};
use crate::{GatorError, Result};

/// Maximum length of a user name.
pub const MAX_USER_NAME_LENGTH: usize = 64;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Unique user name.
    pub name: String,
    /// When the user was registered.
    pub created_at: DateTime<Utc>,
    /// When the user was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Data for registering a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
}

impl NewUser {
    /// Create a new user request. The name is trimmed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GatorError::Validation("user name is empty".into()));
        }
        if self.name.chars().count() > MAX_USER_NAME_LENGTH {
            return Err(GatorError::Validation(format!(
                "user name is longer than {MAX_USER_NAME_LENGTH} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    created_at: String,
    updated_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            created_at: parse_timestamp(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Register a new user.
    ///
    /// Fails with a validation error when the name is empty or taken.
    pub async fn create(&self, user: &NewUser) -> Result<User> {
        user.validate()?;
        let now = format_timestamp(&Utc::now());

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&user.name)
        .bind(&now)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatorError::Validation(format!("user {:?} already exists", user.name))
            } else {
                GatorError::Database(e.to_string())
            }
        })?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| GatorError::NotFound("user".into()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(User::from))
    }

    /// Get a user by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = $1",
        )
        .bind(name.trim())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(User::from))
    }

    /// List all users ordered by name.
    pub async fn list_all(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name ASC",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Delete every user, returning how many were removed.
    ///
    /// Feeds, follows and posts go with them through `ON DELETE CASCADE`.
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM users")
            .execute(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let user = repo.create(&NewUser::new("kahya")).await.unwrap();
        assert_eq!(user.name, "kahya");
        assert!(user.id > 0);

        let by_id = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id, user);

        let by_name = repo.get_by_name("kahya").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        assert!(repo.get_by_id(42).await.unwrap().is_none());
        assert!(repo.get_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.create(&NewUser::new("holgith")).await.unwrap();
        let result = repo.create(&NewUser::new("  holgith ")).await;

        if let Err(GatorError::Validation(msg)) = result {
            assert!(msg.contains("already exists"));
        } else {
            panic!("Expected Validation error");
        }
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let result = repo.create(&NewUser::new("   ")).await;
        assert!(matches!(result, Err(GatorError::Validation(_))));

        let long_name = "x".repeat(MAX_USER_NAME_LENGTH + 1);
        let result = repo.create(&NewUser::new(long_name)).await;
        assert!(matches!(result, Err(GatorError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_all_sorted_by_name() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.create(&NewUser::new("zed")).await.unwrap();
        repo.create(&NewUser::new("alice")).await.unwrap();
        repo.create(&NewUser::new("mike")).await.unwrap();

        let names: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["alice", "mike", "zed"]);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        assert_eq!(repo.delete_all().await.unwrap(), 0);

        repo.create(&NewUser::new("alice")).await.unwrap();
        repo.create(&NewUser::new("bob")).await.unwrap();

        assert_eq!(repo.delete_all().await.unwrap(), 2);
        assert!(repo.list_all().await.unwrap().is_empty());
        assert!(repo.get_by_name("alice").await.unwrap().is_none());
    }
}
