use crate::{db::models::user_models::User, error::Error};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Registered users, read by alerting and written by the auth flows
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Every registered email, oldest registration first
    async fn list_recipient_emails(&self) -> Result<Vec<String>>;

    /// Every registered phone number, oldest registration first
    async fn list_recipient_phones(&self) -> Result<Vec<String>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_by_phone(&self, phone_number: &str) -> Result<Option<User>>;

    async fn create(&self, user: &User) -> Result<User>;

    async fn update(&self, user: &User) -> Result<User>;

    async fn update_last_login(&self, id: &Uuid) -> Result<()>;
}

/// A unique-constraint violation means another signup claimed the email or phone first
fn write_error(action: &str, err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let message = match db_err.constraint() {
                Some(constraint) if constraint.contains("phone") => {
                    "Phone number already registered."
                }
                _ => "Email already registered.",
            };
            return Error::AlreadyExists(message.to_string());
        }
    }

    Error::Database(format!("Failed to {}: {}", action, err))
}

const USER_COLUMNS: &str =
    "id, username, email, phone_number, dept_id, password_hash, created_at, updated_at, last_login";

/// Users repository backed by Postgres
#[derive(Clone)]
pub struct UsersRepository {
    pool: Arc<PgPool>,
}

impl UsersRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn get_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let result = sqlx::query_as::<_, User>(&query)
            .bind(value)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get user by {}: {}", column, e)))?;

        Ok(result)
    }

    async fn list_column(&self, column: &str) -> Result<Vec<String>> {
        let query = format!(
            "SELECT {} FROM users WHERE {} IS NOT NULL AND {} <> '' ORDER BY created_at",
            column, column, column
        );
        let result = sqlx::query_scalar::<_, String>(&query)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list {}: {}", column, e)))?;

        Ok(result)
    }
}

#[async_trait]
impl UserStore for UsersRepository {
    async fn list_recipient_emails(&self) -> Result<Vec<String>> {
        self.list_column("email").await
    }

    async fn list_recipient_phones(&self) -> Result<Vec<String>> {
        self.list_column("phone_number").await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.get_one("email", email).await
    }

    async fn get_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        self.get_one("phone_number", phone_number).await
    }

    async fn create(&self, user: &User) -> Result<User> {
        info!("Creating new user: {}", user.username);

        let query = format!(
            r#"
            INSERT INTO users (id, username, email, phone_number, dept_id, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, User>(&query)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.phone_number)
            .bind(&user.dept_id)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| write_error("create user", e))?;

        Ok(result)
    }

    async fn update(&self, user: &User) -> Result<User> {
        let query = format!(
            r#"
            UPDATE users
            SET username = $1, email = $2, phone_number = $3, dept_id = $4, password_hash = $5, updated_at = $6
            WHERE id = $7
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, User>(&query)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.phone_number)
            .bind(&user.dept_id)
            .bind(&user.password_hash)
            .bind(Utc::now())
            .bind(user.id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| write_error("update user", e))?
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", user.id)))?;

        Ok(result)
    }

    async fn update_last_login(&self, id: &Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET last_login = $1
            WHERE id = $2
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update last login: {}", e)))?;

        Ok(())
    }
}
