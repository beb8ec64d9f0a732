//! Checkout and order lifecycle.
//!
//! `place_order` turns cart lines into an order in one transaction: stock is
//! allocated, the coupon is redeemed, the order is written, and the cart is
//! released. Any failure rolls all of it back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopfront_core::{orders::subtotal, Cart, CartLine, FormErrors, OrderStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::carts::{load_cart_lines, release_cart_line, CartLineDetailRow};
use crate::catalog::variants::{allocate_stock, consume_allocation, release_allocation};
use crate::discounts::{lock_coupon_by_code, redeem_discount};
use crate::{DbError, Page};

/// One requested checkout line. Omitting the item list checks out the
/// whole cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub variant_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub public_id: Uuid,
    pub user_id: Option<i64>,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub discount_id: Option<i64>,
    pub shipping_address_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    #[must_use]
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderLineRow {
    pub id: i64,
    pub order_id: i64,
    pub variant_id: Option<i64>,
    pub product_title: String,
    pub variant_sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DashboardSummary {
    pub orders_total: i64,
    pub orders_today: i64,
    pub users_total: i64,
    pub users_today: i64,
}

const ORDER_COLUMNS: &str = "id, public_id, user_id, status, subtotal, discount_amount, total, \
     discount_id, shipping_address_id, created_at, updated_at";
const ORDER_LINE_COLUMNS: &str =
    "id, order_id, variant_id, product_title, variant_sku, quantity, unit_price";

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// Pick which cart lines, and how many units of each, an order takes.
///
/// Returns `(index into lines, quantity)` pairs. Duplicate requested
/// variants are merged.
fn select_lines(
    lines: &[CartLineDetailRow],
    items: Option<&[CheckoutItem]>,
) -> Result<Vec<(usize, i32)>, DbError> {
    let Some(items) = items else {
        return Ok(lines.iter().enumerate().map(|(i, l)| (i, l.quantity)).collect());
    };

    let mut requested = Cart::new();
    for item in items {
        requested.add(item.variant_id, item.quantity)?;
    }

    requested
        .lines()
        .iter()
        .map(|wanted| {
            let index = lines
                .iter()
                .position(|l| l.variant_id == wanted.variant_id)
                .ok_or_else(|| {
                    DbError::Form(FormErrors::single(
                        "items",
                        format!("variant {} is not in the cart", wanted.variant_id),
                    ))
                })?;
            if wanted.quantity > lines[index].quantity {
                return Err(DbError::Form(FormErrors::single(
                    "items",
                    format!(
                        "variant {} has only {} in the cart",
                        wanted.variant_id, lines[index].quantity
                    ),
                )));
            }
            Ok((index, wanted.quantity))
        })
        .collect()
}

/// Place an order from the user's cart, optionally shipping to one of the
/// user's saved addresses.
///
/// # Errors
///
/// Returns [`DbError::EmptyCart`] when nothing would be ordered,
/// [`DbError::Form`] or [`DbError::Validation`] for a bad item list or an
/// address the user does not own,
/// [`DbError::InsufficientStock`] when a variant cannot cover its quantity,
/// [`DbError::NotFound`] for an unknown coupon code,
/// [`DbError::CouponRejected`] when the coupon cannot be applied, or
/// [`DbError::Sqlx`] on query failure.
pub async fn place_order(
    pool: &PgPool,
    user_id: i64,
    items: Option<&[CheckoutItem]>,
    coupon_code: Option<&str>,
    shipping_address_id: Option<i64>,
) -> Result<(OrderRow, Vec<OrderLineRow>), DbError> {
    let mut tx = pool.begin().await?;

    if let Some(address_id) = shipping_address_id {
        let owned: Option<i64> =
            sqlx::query_scalar("SELECT id FROM addresses WHERE id = $1 AND user_id = $2")
                .bind(address_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if owned.is_none() {
            return Err(DbError::Form(FormErrors::single(
                "address_id",
                "unknown address",
            )));
        }
    }

    let lines = load_cart_lines(&mut tx, user_id, true).await?;
    let selected = select_lines(&lines, items)?;
    if selected.is_empty() {
        return Err(DbError::EmptyCart);
    }

    for (index, quantity) in &selected {
        allocate_stock(&mut tx, lines[*index].variant_id, *quantity).await?;
    }

    let order_subtotal = subtotal(
        selected
            .iter()
            .map(|(index, quantity)| (lines[*index].unit_price(), *quantity)),
    );

    let (discount_id, discount_amount) = match coupon_code.map(str::trim).filter(|c| !c.is_empty())
    {
        None => (None, Decimal::ZERO),
        Some(code) => {
            let coupon = lock_coupon_by_code(&mut tx, code)
                .await?
                .ok_or(DbError::NotFound)?;
            let rule = coupon.to_rule()?;
            rule.check_available(Utc::now(), Some(order_subtotal))?;
            redeem_discount(&mut tx, coupon.id).await?;
            (Some(coupon.id), rule.discount_for(order_subtotal))
        }
    };
    let total = order_subtotal - discount_amount;

    let sql = format!(
        "INSERT INTO orders \
             (public_id, user_id, subtotal, discount_amount, total, discount_id, \
              shipping_address_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(order_subtotal)
        .bind(discount_amount)
        .bind(total)
        .bind(discount_id)
        .bind(shipping_address_id)
        .fetch_one(&mut *tx)
        .await?;

    let line_sql = format!(
        "INSERT INTO order_lines \
         (order_id, variant_id, product_title, variant_sku, quantity, unit_price) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {ORDER_LINE_COLUMNS}"
    );
    let mut cart = Cart::from_lines(
        lines
            .iter()
            .map(|l| CartLine {
                variant_id: l.variant_id,
                quantity: l.quantity,
            })
            .collect(),
    );
    let mut order_lines = Vec::with_capacity(selected.len());
    for (index, quantity) in &selected {
        let line = &lines[*index];
        let order_line = sqlx::query_as::<_, OrderLineRow>(&line_sql)
            .bind(order.id)
            .bind(line.variant_id)
            .bind(&line.product_title)
            .bind(&line.sku)
            .bind(*quantity)
            .bind(line.unit_price())
            .fetch_one(&mut *tx)
            .await?;
        order_lines.push(order_line);

        sqlx::query(
            "UPDATE products SET sold_count = sold_count + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(line.product_id)
        .bind(*quantity)
        .execute(&mut *tx)
        .await?;

        let remaining = cart
            .release(line.variant_id, *quantity)
            .filter(|left| *left > 0);
        release_cart_line(&mut tx, line.line_id, remaining).await?;
    }

    tx.commit().await?;
    tracing::info!(
        order_id = order.id,
        user_id,
        lines = order_lines.len(),
        total = %order.total,
        "placed order"
    );
    Ok((order, order_lines))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

async fn transition_order(pool: &PgPool, id: i64, to: OrderStatus) -> Result<OrderRow, DbError> {
    let mut tx = pool.begin().await?;

    let status: String = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;
    let from = OrderStatus::parse(&status).ok_or_else(|| {
        DbError::Sqlx(sqlx::Error::Decode(
            format!("unknown order status '{status}'").into(),
        ))
    })?;
    from.transition(to)?;

    let lines: Vec<(i64, i32)> = sqlx::query_as(
        "SELECT variant_id, quantity FROM order_lines \
         WHERE order_id = $1 AND variant_id IS NOT NULL",
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;
    for (variant_id, quantity) in lines {
        match to {
            OrderStatus::Fulfilled => consume_allocation(&mut tx, variant_id, quantity).await?,
            _ => release_allocation(&mut tx, variant_id, quantity).await?,
        }
    }

    let sql = format!(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .bind(to.as_str())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(order_id = id, from = %from, to = %to, "order status changed");
    Ok(order)
}

/// Mark an unfulfilled order as sent. Its allocated units leave stock.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the order does not exist,
/// [`DbError::InvalidOrderTransition`] unless it is unfulfilled, or
/// [`DbError::Sqlx`] on query failure.
pub async fn send_order(pool: &PgPool, id: i64) -> Result<OrderRow, DbError> {
    transition_order(pool, id, OrderStatus::Fulfilled).await
}

/// Cancel an unfulfilled order and return its allocation.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the order does not exist,
/// [`DbError::InvalidOrderTransition`] unless it is unfulfilled, or
/// [`DbError::Sqlx`] on query failure.
pub async fn cancel_order(pool: &PgPool, id: i64) -> Result<OrderRow, DbError> {
    transition_order(pool, id, OrderStatus::Cancelled).await
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_orders_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<OrderRow>, DbError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id DESC LIMIT $1 OFFSET $2");
    let items = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_user_orders(pool: &PgPool, user_id: i64) -> Result<Vec<OrderRow>, DbError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY id DESC");
    let rows = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_order(pool: &PgPool, id: i64) -> Result<Option<OrderRow>, DbError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_order_lines(pool: &PgPool, order_id: i64) -> Result<Vec<OrderLineRow>, DbError> {
    let sql = format!("SELECT {ORDER_LINE_COLUMNS} FROM order_lines WHERE order_id = $1 ORDER BY id");
    let rows = sqlx::query_as::<_, OrderLineRow>(&sql)
        .bind(order_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Order and user totals, plus how many of each were created today (UTC).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn dashboard_summary(pool: &PgPool) -> Result<DashboardSummary, DbError> {
    let summary = sqlx::query_as::<_, DashboardSummary>(
        "SELECT \
           (SELECT COUNT(*) FROM orders) AS orders_total, \
           (SELECT COUNT(*) FROM orders \
             WHERE created_at >= date_trunc('day', NOW() AT TIME ZONE 'UTC') AT TIME ZONE 'UTC') \
             AS orders_today, \
           (SELECT COUNT(*) FROM users) AS users_total, \
           (SELECT COUNT(*) FROM users \
             WHERE created_at >= date_trunc('day', NOW() AT TIME ZONE 'UTC') AT TIME ZONE 'UTC') \
             AS users_today",
    )
    .fetch_one(pool)
    .await?;
    Ok(summary)
}
