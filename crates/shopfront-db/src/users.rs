//! Database operations for the `users` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::{forms::UserForm, FormErrors};
use sqlx::PgPool;

use crate::{DbError, Page};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, username, email, is_active, is_admin, created_at, updated_at";

fn map_user_conflict(err: sqlx::Error) -> DbError {
    let err = DbError::from(err);
    if !err.is_unique_violation() {
        return err;
    }
    let field = match &err {
        DbError::Sqlx(sqlx::Error::Database(db))
            if db.constraint().is_some_and(|c| c.contains("email")) =>
        {
            "email"
        }
        _ => "username",
    };
    DbError::Form(FormErrors::single(field, "is already taken"))
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_users_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<UserRow>, DbError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2");
    let items = sqlx::query_as::<_, UserRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_user(pool: &PgPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Form`] when the username or email is taken, or
/// [`DbError::Sqlx`] on query failure.
pub async fn create_user(pool: &PgPool, form: &UserForm) -> Result<UserRow, DbError> {
    let sql = format!(
        "INSERT INTO users (username, email, is_active, is_admin) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(&form.username)
        .bind(&form.email)
        .bind(form.is_active)
        .bind(form.is_admin)
        .fetch_one(pool)
        .await
        .map_err(map_user_conflict)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the user does not exist,
/// [`DbError::Form`] when the username or email is taken, or
/// [`DbError::Sqlx`] on query failure.
pub async fn update_user(pool: &PgPool, id: i64, form: &UserForm) -> Result<UserRow, DbError> {
    let sql = format!(
        "UPDATE users SET username = $2, email = $3, is_active = $4, is_admin = $5, \
         updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .bind(&form.username)
        .bind(&form.email)
        .bind(form.is_active)
        .bind(form.is_admin)
        .fetch_optional(pool)
        .await
        .map_err(map_user_conflict)?
        .ok_or(DbError::NotFound)
}
