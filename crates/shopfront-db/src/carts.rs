//! Database operations for `carts` and `cart_lines`.
//!
//! Each user has at most one cart. Lines are unique per (cart, variant), so
//! adding an already-present variant increments the existing line.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopfront_core::{check_line_quantity, resolve_price, CoreError, MAX_LINE_QUANTITY};
use sqlx::{PgConnection, PgPool};

use crate::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLineRow {
    pub id: i64,
    pub cart_id: i64,
    pub variant_id: i64,
    pub quantity: i32,
}

/// A cart line joined with its variant and product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLineDetailRow {
    pub line_id: i64,
    pub variant_id: i64,
    pub quantity: i32,
    pub sku: String,
    pub variant_title: Option<String>,
    pub price_override: Option<Decimal>,
    pub quantity_available: i32,
    pub product_id: i64,
    pub product_title: String,
    pub product_price: Decimal,
    pub first_img: Option<String>,
}

impl CartLineDetailRow {
    #[must_use]
    pub fn unit_price(&self) -> Decimal {
        resolve_price(self.price_override, self.product_price)
    }

    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price() * Decimal::from(self.quantity)
    }
}

/// Return the user's cart id, creating the cart on first use.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_or_create_cart(conn: &mut PgConnection, user_id: i64) -> Result<i64, DbError> {
    let id = sqlx::query_scalar(
        "INSERT INTO carts (user_id) VALUES ($1) \
         ON CONFLICT (user_id) DO UPDATE SET updated_at = NOW() \
         RETURNING id",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Add `quantity` of a variant to the user's cart.
///
/// The merge is a single upsert, so concurrent adds of the same variant sum
/// instead of creating duplicate lines. A serialization or unique-key race
/// is retried once; a second failure is reported as [`DbError::Conflict`].
///
/// # Errors
///
/// Returns [`DbError::Validation`] for a quantity below 1 or a line that
/// would pass [`MAX_LINE_QUANTITY`], [`DbError::NotFound`] for an unknown variant, [`DbError::Conflict`] after
/// a repeated race, or [`DbError::Sqlx`] on query failure.
pub async fn add_to_cart(
    pool: &PgPool,
    user_id: i64,
    variant_id: i64,
    quantity: i32,
) -> Result<CartLineRow, DbError> {
    check_line_quantity(quantity)?;

    match try_add_to_cart(pool, user_id, variant_id, quantity).await {
        Err(e) if e.is_retryable() => {
            tracing::debug!(user_id, variant_id, error = %e, "retrying cart upsert");
            match try_add_to_cart(pool, user_id, variant_id, quantity).await {
                Err(e) if e.is_retryable() => {
                    tracing::warn!(user_id, variant_id, error = %e, "cart upsert conflicted twice");
                    Err(DbError::Conflict)
                }
                other => other,
            }
        }
        other => other,
    }
}

async fn try_add_to_cart(
    pool: &PgPool,
    user_id: i64,
    variant_id: i64,
    quantity: i32,
) -> Result<CartLineRow, DbError> {
    let mut tx = pool.begin().await?;
    let cart_id = get_or_create_cart(&mut tx, user_id).await?;

    // The WHERE leaves an over-cap line untouched and returns no row.
    let row = sqlx::query_as::<_, CartLineRow>(
        "INSERT INTO cart_lines (cart_id, variant_id, quantity) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (cart_id, variant_id) \
         DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity, updated_at = NOW() \
         WHERE cart_lines.quantity + EXCLUDED.quantity <= $4 \
         RETURNING id, cart_id, variant_id, quantity",
    )
    .bind(cart_id)
    .bind(variant_id)
    .bind(quantity)
    .bind(MAX_LINE_QUANTITY)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        let err = DbError::from(e);
        if err.is_foreign_key_violation() {
            DbError::NotFound
        } else {
            err
        }
    })?;
    let Some(row) = row else {
        let held: i32 = sqlx::query_scalar(
            "SELECT quantity FROM cart_lines WHERE cart_id = $1 AND variant_id = $2",
        )
        .bind(cart_id)
        .bind(variant_id)
        .fetch_one(&mut *tx)
        .await?;
        return Err(DbError::Validation(CoreError::QuantityTooLarge {
            quantity: i64::from(held) + i64::from(quantity),
            max: MAX_LINE_QUANTITY,
        }));
    };

    tx.commit().await?;
    Ok(row)
}

/// Lines of the user's cart with prices, oldest first. An absent cart is empty.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_cart_lines(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<CartLineDetailRow>, DbError> {
    let mut conn = pool.acquire().await?;
    load_cart_lines(&mut conn, user_id, false).await
}

/// Cart lines for `user_id`; `for_update` locks them for checkout.
pub(crate) async fn load_cart_lines(
    conn: &mut PgConnection,
    user_id: i64,
    for_update: bool,
) -> Result<Vec<CartLineDetailRow>, DbError> {
    let mut sql = String::from(
        "SELECT l.id AS line_id, l.variant_id, l.quantity, \
                v.sku, v.title AS variant_title, v.price_override, \
                GREATEST(v.quantity - v.quantity_allocated, 0) AS quantity_available, \
                p.id AS product_id, p.title AS product_title, p.price AS product_price, \
                (SELECT i.image FROM product_images i WHERE i.product_id = p.id \
                 ORDER BY i.position, i.id LIMIT 1) AS first_img \
         FROM cart_lines l \
         JOIN carts c ON c.id = l.cart_id \
         JOIN product_variants v ON v.id = l.variant_id \
         JOIN products p ON p.id = v.product_id \
         WHERE c.user_id = $1 \
         ORDER BY l.id",
    );
    if for_update {
        sql.push_str(" FOR UPDATE OF l");
    }
    let rows = sqlx::query_as::<_, CartLineDetailRow>(&sql)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

/// Store a line's remaining quantity, or delete the line when `None`.
pub(crate) async fn release_cart_line(
    conn: &mut PgConnection,
    line_id: i64,
    remaining: Option<i32>,
) -> Result<(), DbError> {
    match remaining {
        Some(quantity) => {
            sqlx::query("UPDATE cart_lines SET quantity = $2, updated_at = NOW() WHERE id = $1")
                .bind(line_id)
                .bind(quantity)
                .execute(&mut *conn)
                .await?;
        }
        None => {
            sqlx::query("DELETE FROM cart_lines WHERE id = $1")
                .bind(line_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price_override: Option<Decimal>, quantity: i32) -> CartLineDetailRow {
        CartLineDetailRow {
            line_id: 1,
            variant_id: 1,
            quantity,
            sku: "1-1337".to_string(),
            variant_title: None,
            price_override,
            quantity_available: 10,
            product_id: 1,
            product_title: "Mug".to_string(),
            product_price: Decimal::new(100, 0),
            first_img: None,
        }
    }

    #[test]
    fn line_total_uses_resolved_price() {
        assert_eq!(line(None, 2).line_total(), Decimal::new(200, 0));
        assert_eq!(
            line(Some(Decimal::new(25, 0)), 3).line_total(),
            Decimal::new(75, 0)
        );
        assert_eq!(line(Some(Decimal::ZERO), 1).unit_price(), Decimal::new(100, 0));
    }
}
