//! Shipping addresses. Public reads and writes are always scoped to the
//! owning user; another user's address behaves as if it did not exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::forms::AddressForm;
use sqlx::PgPool;

use crate::{DbError, Page};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AddressRow {
    pub id: i64,
    pub user_id: i64,
    pub contact_name: String,
    pub contact_phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ADDRESS_COLUMNS: &str = "id, user_id, contact_name, contact_phone, province, city, \
     district, address, created_at, updated_at";

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_user_addresses(pool: &PgPool, user_id: i64) -> Result<Vec<AddressRow>, DbError> {
    let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE user_id = $1 ORDER BY id");
    let rows = sqlx::query_as::<_, AddressRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Every user's addresses, newest first. Dashboard only.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_addresses_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<AddressRow>, DbError> {
    let sql =
        format!("SELECT {ADDRESS_COLUMNS} FROM addresses ORDER BY id DESC LIMIT $1 OFFSET $2");
    let items = sqlx::query_as::<_, AddressRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the address does not exist or belongs to
/// someone else, or [`DbError::Sqlx`] on query failure.
pub async fn get_user_address(pool: &PgPool, user_id: i64, id: i64) -> Result<AddressRow, DbError> {
    let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1 AND user_id = $2");
    sqlx::query_as::<_, AddressRow>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure, including a foreign key
/// violation when the user does not exist.
pub async fn create_address(
    pool: &PgPool,
    user_id: i64,
    form: &AddressForm,
) -> Result<AddressRow, DbError> {
    let sql = format!(
        "INSERT INTO addresses \
             (user_id, contact_name, contact_phone, province, city, district, address) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {ADDRESS_COLUMNS}"
    );
    let row = sqlx::query_as::<_, AddressRow>(&sql)
        .bind(user_id)
        .bind(&form.contact_name)
        .bind(&form.contact_phone)
        .bind(&form.province)
        .bind(&form.city)
        .bind(&form.district)
        .bind(&form.address)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the address does not exist or belongs to
/// someone else, or [`DbError::Sqlx`] on query failure.
pub async fn update_address(
    pool: &PgPool,
    user_id: i64,
    id: i64,
    form: &AddressForm,
) -> Result<AddressRow, DbError> {
    let sql = format!(
        "UPDATE addresses SET contact_name = $3, contact_phone = $4, province = $5, \
             city = $6, district = $7, address = $8, updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 \
         RETURNING {ADDRESS_COLUMNS}"
    );
    sqlx::query_as::<_, AddressRow>(&sql)
        .bind(id)
        .bind(user_id)
        .bind(&form.contact_name)
        .bind(&form.contact_phone)
        .bind(&form.province)
        .bind(&form.city)
        .bind(&form.district)
        .bind(&form.address)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Delete an address. Orders that shipped to it keep their snapshot totals
/// and lose the reference.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the address does not exist or belongs to
/// someone else, or [`DbError::Sqlx`] on query failure.
pub async fn delete_address(pool: &PgPool, user_id: i64, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM addresses WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
