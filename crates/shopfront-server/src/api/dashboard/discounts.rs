//! Coupons and sales share the `discounts` table; a coupon is a discount with
//! a code, a sale is one without.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Serialize;
use shopfront_core::{
    forms::{CouponForm, SaleForm},
    listing::DASHBOARD_PAGE_SIZE,
};
use shopfront_db::{DiscountRow, SaleScope};

use crate::middleware::RequestId;

use super::super::{map_db_error, ApiError, ApiResponse, AppState, PageQuery, PagedResponse};
use super::{created, deleted, found, ok, validated, window, Created};

#[derive(Debug, Serialize)]
pub(super) struct SaleDetail {
    #[serde(flatten)]
    sale: DiscountRow,
    #[serde(flatten)]
    scope: SaleScope,
}

fn is_coupon(row: &DiscountRow) -> bool {
    row.code.is_some()
}

// ---------------------------------------------------------------------------
// Coupons
// ---------------------------------------------------------------------------

pub(super) async fn list_coupons(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<DiscountRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_coupons_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(PagedResponse::from_page(
        req_id.0,
        rows,
        page,
        DASHBOARD_PAGE_SIZE,
        |row| row,
    )))
}

pub(super) async fn get_coupon(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DiscountRow>>, ApiError> {
    let row = shopfront_db::get_discount(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .filter(is_coupon);
    let row = found(&req_id.0, "coupon", row)?;
    Ok(ok(req_id, row))
}

/// POST /api/v1/dashboard/coupons: a missing code is generated.
pub(super) async fn create_coupon(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CouponForm>,
) -> Result<Created<DiscountRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_coupon(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(coupon_id = row.id, code = ?row.code, "coupon created");
    Ok(created(req_id, row))
}

pub(super) async fn update_coupon(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<CouponForm>,
) -> Result<Json<ApiResponse<DiscountRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_coupon(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, row))
}

/// DELETE for both `/coupons/{id}` and `/sales/{id}`.
pub(super) async fn delete_discount(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    shopfront_db::delete_discount(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(deleted(req_id))
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

pub(super) async fn list_sales(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<DiscountRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_sales_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(PagedResponse::from_page(
        req_id.0,
        rows,
        page,
        DASHBOARD_PAGE_SIZE,
        |row| row,
    )))
}

pub(super) async fn get_sale(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SaleDetail>>, ApiError> {
    let rid = &req_id.0;
    let sale = shopfront_db::get_discount(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .filter(|row| !is_coupon(row));
    let sale = found(rid, "sale", sale)?;
    let scope = shopfront_db::list_sale_scope(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(req_id, SaleDetail { sale, scope }))
}

pub(super) async fn create_sale(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SaleForm>,
) -> Result<Created<DiscountRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_sale(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(created(req_id, row))
}

pub(super) async fn update_sale(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<SaleForm>,
) -> Result<Json<ApiResponse<DiscountRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_sale(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, row))
}
