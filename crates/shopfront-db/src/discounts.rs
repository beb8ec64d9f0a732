//! Database operations for the `discounts` table.
//!
//! A discount with a code is a coupon, redeemed at checkout. A discount
//! without one is a sale, scoped to products and categories through
//! `discount_products` and `discount_categories`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopfront_core::{
    forms::{CouponForm, SaleForm},
    generate_code, CouponRejection, DiscountKind, DiscountRule, FormErrors,
};
use sqlx::{PgConnection, PgPool};

use crate::{DbError, Page};

/// Attempts at drawing an unused random code before giving up.
const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DiscountRow {
    pub id: i64,
    pub title: String,
    pub code: Option<String>,
    pub kind: String,
    pub value: Decimal,
    pub usage_limit: Option<i32>,
    pub used: i32,
    pub min_amount: Option<Decimal>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscountRow {
    /// The stored terms as a pure rule.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] with a decode error if `kind` is not a known
    /// discount kind.
    pub fn to_rule(&self) -> Result<DiscountRule, DbError> {
        let kind = DiscountKind::parse(&self.kind).ok_or_else(|| {
            DbError::Sqlx(sqlx::Error::Decode(
                format!("unknown discount kind '{}'", self.kind).into(),
            ))
        })?;
        Ok(DiscountRule {
            title: self.title.clone(),
            code: self.code.clone(),
            kind,
            value: self.value,
            usage_limit: self.usage_limit,
            used: self.used,
            min_amount: self.min_amount,
            not_before: self.not_before,
            not_after: self.not_after,
            enabled: self.enabled,
        })
    }
}

/// Products and categories a sale applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleScope {
    pub product_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

const DISCOUNT_COLUMNS: &str = "id, title, code, kind, value, usage_limit, used, min_amount, \
     not_before, not_after, enabled, created_at, updated_at";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

async fn list_discounts_page(
    pool: &PgPool,
    coupons: bool,
    limit: i64,
    offset: i64,
) -> Result<Page<DiscountRow>, DbError> {
    let filter = if coupons {
        "code IS NOT NULL"
    } else {
        "code IS NULL"
    };
    let sql = format!(
        "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE {filter} \
         ORDER BY id DESC LIMIT $1 OFFSET $2"
    );
    let items = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let count_sql = format!("SELECT COUNT(*) FROM discounts WHERE {filter}");
    let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(pool).await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_coupons_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<DiscountRow>, DbError> {
    list_discounts_page(pool, true, limit, offset).await
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_sales_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<DiscountRow>, DbError> {
    list_discounts_page(pool, false, limit, offset).await
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_discount(pool: &PgPool, id: i64) -> Result<Option<DiscountRow>, DbError> {
    let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = $1");
    let row = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Look up a coupon by code, ignoring case.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_coupon_by_code(pool: &PgPool, code: &str) -> Result<Option<DiscountRow>, DbError> {
    let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE code = UPPER($1)");
    let row = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(code.trim())
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_sale_scope(pool: &PgPool, id: i64) -> Result<SaleScope, DbError> {
    let product_ids = sqlx::query_scalar(
        "SELECT product_id FROM discount_products WHERE discount_id = $1 ORDER BY product_id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    let category_ids = sqlx::query_scalar(
        "SELECT category_id FROM discount_categories WHERE discount_id = $1 ORDER BY category_id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(SaleScope {
        product_ids,
        category_ids,
    })
}

// ---------------------------------------------------------------------------
// Coupons
// ---------------------------------------------------------------------------

async fn insert_coupon(
    pool: &PgPool,
    form: &CouponForm,
    code: &str,
) -> Result<DiscountRow, DbError> {
    let sql = format!(
        "INSERT INTO discounts \
         (title, code, kind, value, usage_limit, min_amount, not_before, not_after, enabled) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {DISCOUNT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(&form.title)
        .bind(code)
        .bind(form.kind.as_str())
        .bind(form.value)
        .bind(form.usage_limit)
        .bind(form.min_amount)
        .bind(form.not_before)
        .bind(form.not_after)
        .bind(form.enabled)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Create a coupon. Without a code, a random 16-letter code is drawn and
/// redrawn on collision.
///
/// # Errors
///
/// Returns [`DbError::Form`] when the given code is taken,
/// [`DbError::Conflict`] if no free random code was found, or
/// [`DbError::Sqlx`] on query failure.
pub async fn create_coupon(pool: &PgPool, form: &CouponForm) -> Result<DiscountRow, DbError> {
    if let Some(code) = form.code.as_deref() {
        return insert_coupon(pool, form, code).await.map_err(|e| {
            if e.is_unique_violation() {
                DbError::Form(FormErrors::single("code", "already exists"))
            } else {
                e
            }
        });
    }

    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code(&mut rand::rng());
        match insert_coupon(pool, form, &code).await {
            Err(e) if e.is_unique_violation() => {
                tracing::debug!(code = %code, "generated coupon code collided");
            }
            other => return other,
        }
    }
    Err(DbError::Conflict)
}

/// Update a coupon's terms. A missing code keeps the current one, and the
/// usage limit cannot drop below redemptions already made.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no coupon has this id,
/// [`DbError::Form`] for a taken code or a too-low limit, or
/// [`DbError::Sqlx`] on query failure.
pub async fn update_coupon(
    pool: &PgPool,
    id: i64,
    form: &CouponForm,
) -> Result<DiscountRow, DbError> {
    let mut tx = pool.begin().await?;

    let used: i32 = sqlx::query_scalar(
        "SELECT used FROM discounts WHERE id = $1 AND code IS NOT NULL FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if form.usage_limit.is_some_and(|limit| limit < used) {
        return Err(DbError::Form(FormErrors::single(
            "usage_limit",
            format!("must be at least the {used} redemptions already made"),
        )));
    }

    let sql = format!(
        "UPDATE discounts SET \
         title = $2, code = COALESCE($3, code), kind = $4, value = $5, usage_limit = $6, \
         min_amount = $7, not_before = $8, not_after = $9, enabled = $10, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {DISCOUNT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(id)
        .bind(&form.title)
        .bind(form.code.as_deref())
        .bind(form.kind.as_str())
        .bind(form.value)
        .bind(form.usage_limit)
        .bind(form.min_amount)
        .bind(form.not_before)
        .bind(form.not_after)
        .bind(form.enabled)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            let err = DbError::from(e);
            if err.is_unique_violation() {
                DbError::Form(FormErrors::single("code", "already exists"))
            } else {
                err
            }
        })?;

    tx.commit().await?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Form`] for unknown products or categories, or
/// [`DbError::Sqlx`] on query failure.
pub async fn create_sale(pool: &PgPool, form: &SaleForm) -> Result<DiscountRow, DbError> {
    let mut tx = pool.begin().await?;
    check_sale_scope(&mut tx, form).await?;

    let sql = format!(
        "INSERT INTO discounts (title, kind, value, not_before, not_after, enabled) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {DISCOUNT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(&form.title)
        .bind(form.kind.as_str())
        .bind(form.value)
        .bind(form.not_before)
        .bind(form.not_after)
        .bind(form.enabled)
        .fetch_one(&mut *tx)
        .await?;
    write_sale_scope(&mut tx, row.id, form).await?;

    tx.commit().await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no sale has this id, [`DbError::Form`]
/// for unknown products or categories, or [`DbError::Sqlx`] on query
/// failure.
pub async fn update_sale(pool: &PgPool, id: i64, form: &SaleForm) -> Result<DiscountRow, DbError> {
    let mut tx = pool.begin().await?;
    check_sale_scope(&mut tx, form).await?;

    let sql = format!(
        "UPDATE discounts SET \
         title = $2, kind = $3, value = $4, not_before = $5, not_after = $6, enabled = $7, \
         updated_at = NOW() \
         WHERE id = $1 AND code IS NULL \
         RETURNING {DISCOUNT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(id)
        .bind(&form.title)
        .bind(form.kind.as_str())
        .bind(form.value)
        .bind(form.not_before)
        .bind(form.not_after)
        .bind(form.enabled)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

    sqlx::query("DELETE FROM discount_products WHERE discount_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM discount_categories WHERE discount_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    write_sale_scope(&mut tx, id, form).await?;

    tx.commit().await?;
    Ok(row)
}

async fn check_sale_scope(conn: &mut PgConnection, form: &SaleForm) -> Result<(), DbError> {
    crate::catalog::ensure_ids_exist(conn, "products", &form.product_ids, "product_ids").await?;
    crate::catalog::ensure_ids_exist(conn, "categories", &form.category_ids, "category_ids")
        .await
}

async fn write_sale_scope(
    conn: &mut PgConnection,
    discount_id: i64,
    form: &SaleForm,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO discount_products (discount_id, product_id) \
         SELECT $1, UNNEST($2::bigint[])",
    )
    .bind(discount_id)
    .bind(&form.product_ids)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "INSERT INTO discount_categories (discount_id, category_id) \
         SELECT $1, UNNEST($2::bigint[])",
    )
    .bind(discount_id)
    .bind(&form.category_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Delete a coupon or sale. Orders keep their recorded discount amount.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the discount does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn delete_discount(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM discounts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Checkout helpers
// ---------------------------------------------------------------------------

/// Lock a coupon row for the rest of the transaction.
pub(crate) async fn lock_coupon_by_code(
    conn: &mut PgConnection,
    code: &str,
) -> Result<Option<DiscountRow>, DbError> {
    let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE code = UPPER($1) FOR UPDATE");
    let row = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(code.trim())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Count one redemption. The limit check and the increment are one
/// statement, so the counter never passes the limit.
pub(crate) async fn redeem_discount(conn: &mut PgConnection, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE discounts SET used = used + 1, updated_at = NOW() \
         WHERE id = $1 AND (usage_limit IS NULL OR used < usage_limit)",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::CouponRejected(CouponRejection::Exhausted));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str) -> DiscountRow {
        DiscountRow {
            id: 1,
            title: "Welcome".to_string(),
            code: Some("WELCOME".to_string()),
            kind: kind.to_string(),
            value: Decimal::new(10, 0),
            usage_limit: Some(10),
            used: 10,
            min_amount: None,
            not_before: None,
            not_after: None,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stored_row_converts_to_rule() {
        let rule = row("percent").to_rule().expect("known kind");
        assert_eq!(rule.kind, DiscountKind::Percent);
        assert_eq!(
            rule.check_available(Utc::now(), None),
            Err(CouponRejection::Exhausted)
        );
    }

    #[test]
    fn unknown_kind_is_a_decode_error() {
        let err = row("bogus").to_rule().unwrap_err();
        assert!(matches!(err, DbError::Sqlx(sqlx::Error::Decode(_))));
    }
}
