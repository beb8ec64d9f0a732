//! Shopper endpoints: add to cart, view cart, checkout. All require
//! [`CurrentUser`].

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopfront_db::{CacheKey, CartLineDetailRow, CartLineRow, CheckoutItem, OrderLineRow, OrderRow};

use crate::middleware::{CurrentUser, RequestId};

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct AddToCartRequest {
    pub variant_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct CheckoutRequest {
    /// Subset of the cart to order; the whole cart when absent.
    pub items: Option<Vec<CheckoutItem>>,
    pub coupon_code: Option<String>,
    /// One of the user's saved addresses.
    pub address_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct CartView {
    lines: Vec<CartLineItem>,
    quantity: i64,
    total: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct CartLineItem {
    line_id: i64,
    variant_id: i64,
    product_id: i64,
    product_title: String,
    variant_title: String,
    sku: String,
    first_img: Option<String>,
    quantity: i32,
    quantity_available: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderView {
    #[serde(flatten)]
    pub order: OrderRow,
    pub lines: Vec<OrderLineRow>,
}

impl From<CartLineDetailRow> for CartLineItem {
    fn from(row: CartLineDetailRow) -> Self {
        let unit_price = row.unit_price();
        let line_total = row.line_total();
        Self {
            line_id: row.line_id,
            variant_id: row.variant_id,
            product_id: row.product_id,
            product_title: row.product_title,
            variant_title: row.variant_title.unwrap_or_else(|| row.sku.clone()),
            sku: row.sku,
            first_img: row.first_img,
            quantity: row.quantity,
            quantity_available: row.quantity_available,
            unit_price,
            line_total,
        }
    }
}

fn cart_view(rows: Vec<CartLineDetailRow>) -> CartView {
    let lines: Vec<CartLineItem> = rows.into_iter().map(CartLineItem::from).collect();
    CartView {
        quantity: lines.iter().map(|l| i64::from(l.quantity)).sum(),
        total: lines.iter().map(|l| l.line_total).sum(),
        lines,
    }
}

/// 401 unless the header named an existing, active user.
pub(super) async fn ensure_user(state: &AppState, user: CurrentUser, rid: &str) -> Result<(), ApiError> {
    let found = shopfront_db::get_user(&state.pool, user.0)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?;
    match found {
        Some(u) if u.is_active => Ok(()),
        _ => Err(ApiError::new(rid, "unauthorized", "unknown or inactive user")),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/products/{id}: add a variant of the product to the cart.
pub(super) async fn add_product_to_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<i64>,
    Json(body): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartLineRow>>), ApiError> {
    let rid = &req_id.0;
    ensure_user(&state, user, rid).await?;

    let variant = shopfront_db::get_variant(&state.pool, body.variant_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .filter(|v| v.product_id == product_id)
        .ok_or_else(|| {
            ApiError::not_found(
                rid,
                &format!("variant {} of product {product_id}", body.variant_id),
            )
        })?;

    let line = shopfront_db::add_to_cart(&state.pool, user.0, variant.id, body.quantity)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(user_id = user.0, variant_id = variant.id, quantity = line.quantity, "cart updated");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: line,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET /api/v1/cart
pub(super) async fn get_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<CartView>>, ApiError> {
    ensure_user(&state, user, &req_id.0).await?;
    let rows = shopfront_db::list_cart_lines(&state.pool, user.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: cart_view(rows),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/cart/checkout: turn the cart (or part of it) into an order.
pub(super) async fn checkout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderView>>), ApiError> {
    let rid = &req_id.0;
    ensure_user(&state, user, rid).await?;

    // Products whose stock the order may change, for cache invalidation.
    let product_ids: HashSet<i64> = shopfront_db::list_cart_lines(&state.pool, user.0)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .into_iter()
        .map(|line| line.product_id)
        .collect();

    let coupon_code = body
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let (order, lines) = shopfront_db::place_order(
        &state.pool,
        user.0,
        body.items.as_deref(),
        coupon_code,
        body.address_id,
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    for product_id in product_ids {
        state.cache.invalidate(&CacheKey::product_variants(product_id));
    }
    tracing::info!(
        user_id = user.0,
        order_id = order.id,
        total = %order.total,
        "order placed"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: OrderView { order, lines },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(line_id: i64, quantity: i32, price: Decimal) -> CartLineDetailRow {
        CartLineDetailRow {
            line_id,
            variant_id: line_id,
            quantity,
            sku: format!("1-{}", 1336 + line_id),
            variant_title: None,
            price_override: None,
            quantity_available: 10,
            product_id: 1,
            product_title: "Mug".to_string(),
            product_price: price,
            first_img: None,
        }
    }

    #[test]
    fn cart_view_sums_quantities_and_totals() {
        let view = cart_view(vec![
            line(1, 2, Decimal::new(1000, 2)),
            line(2, 1, Decimal::new(550, 2)),
        ]);
        assert_eq!(view.quantity, 3);
        assert_eq!(view.total, Decimal::new(2550, 2));
        assert_eq!(view.lines[0].variant_title, "1-1337");
    }

    #[test]
    fn empty_cart_view_is_zero() {
        let view = cart_view(Vec::new());
        assert_eq!(view.quantity, 0);
        assert_eq!(view.total, Decimal::ZERO);
    }

    #[test]
    fn checkout_request_defaults_to_whole_cart() {
        let body: CheckoutRequest = serde_json::from_str("{}").expect("parse");
        assert!(body.items.is_none());
        assert!(body.coupon_code.is_none());
    }
}
