//! Dashboard (admin) API, mounted under `/api/v1/dashboard` behind bearer auth.
//!
//! Every entity gets a paged list (10 per page), create, detail, and update;
//! most also get delete. Request bodies are the core form structs, validated
//! before they reach the database.

mod catalog;
mod discounts;
mod orders;
mod site;
mod users;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Serialize;
use shopfront_core::{listing::DASHBOARD_PAGE_SIZE, FormErrors};
use shopfront_db::DashboardSummary;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, PageQuery, ResponseMeta};

pub(super) type Created<T> = (StatusCode, Json<ApiResponse<T>>);

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/dashboard/summary", get(summary))
        // catalog
        .route(
            "/api/v1/dashboard/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route(
            "/api/v1/dashboard/products/{id}",
            get(catalog::get_product)
                .put(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route(
            "/api/v1/dashboard/products/{id}/variants",
            get(catalog::list_variants).post(catalog::create_variant),
        )
        .route(
            "/api/v1/dashboard/products/{id}/images",
            put(catalog::replace_images),
        )
        .route(
            "/api/v1/dashboard/variants/{id}",
            get(catalog::get_variant)
                .put(catalog::update_variant)
                .delete(catalog::delete_variant),
        )
        .route(
            "/api/v1/dashboard/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/api/v1/dashboard/categories/{id}",
            get(catalog::get_category)
                .put(catalog::update_category)
                .delete(catalog::delete_category),
        )
        .route(
            "/api/v1/dashboard/collections",
            get(catalog::list_collections).post(catalog::create_collection),
        )
        .route(
            "/api/v1/dashboard/collections/{id}",
            get(catalog::get_collection)
                .put(catalog::update_collection)
                .delete(catalog::delete_collection),
        )
        .route(
            "/api/v1/dashboard/product-types",
            get(catalog::list_product_types).post(catalog::create_product_type),
        )
        .route(
            "/api/v1/dashboard/product-types/{id}",
            get(catalog::get_product_type)
                .put(catalog::update_product_type)
                .delete(catalog::delete_product_type),
        )
        .route(
            "/api/v1/dashboard/attributes",
            get(catalog::list_attributes).post(catalog::create_attribute),
        )
        .route(
            "/api/v1/dashboard/attributes/{id}",
            get(catalog::get_attribute)
                .put(catalog::update_attribute)
                .delete(catalog::delete_attribute),
        )
        // discounts
        .route(
            "/api/v1/dashboard/coupons",
            get(discounts::list_coupons).post(discounts::create_coupon),
        )
        .route(
            "/api/v1/dashboard/coupons/{id}",
            get(discounts::get_coupon)
                .put(discounts::update_coupon)
                .delete(discounts::delete_discount),
        )
        .route(
            "/api/v1/dashboard/sales",
            get(discounts::list_sales).post(discounts::create_sale),
        )
        .route(
            "/api/v1/dashboard/sales/{id}",
            get(discounts::get_sale)
                .put(discounts::update_sale)
                .delete(discounts::delete_discount),
        )
        // people and orders
        .route(
            "/api/v1/dashboard/users",
            get(users::list_users).post(users::create_user),
        )
        .route(
            "/api/v1/dashboard/users/{id}",
            get(users::get_user).put(users::update_user),
        )
        .route("/api/v1/dashboard/addresses", get(users::list_addresses))
        .route("/api/v1/dashboard/orders", get(orders::list_orders))
        .route("/api/v1/dashboard/orders/{id}", get(orders::get_order))
        .route("/api/v1/dashboard/orders/{id}/send", post(orders::send_order))
        .route(
            "/api/v1/dashboard/orders/{id}/cancel",
            post(orders::cancel_order),
        )
        // site
        .route(
            "/api/v1/dashboard/menu-items",
            get(site::list_menu_items).post(site::create_menu_item),
        )
        .route(
            "/api/v1/dashboard/menu-items/{id}",
            get(site::get_menu_item)
                .put(site::update_menu_item)
                .delete(site::delete_menu_item),
        )
        .route(
            "/api/v1/dashboard/pages",
            get(site::list_pages).post(site::create_page),
        )
        .route(
            "/api/v1/dashboard/pages/{id}",
            get(site::get_page)
                .put(site::update_page)
                .delete(site::delete_page),
        )
        .route(
            "/api/v1/dashboard/site-settings",
            get(site::get_site_settings).put(site::update_site_settings),
        )
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Page number and row offset for a dashboard list.
pub(super) fn window(query: &PageQuery) -> (i64, i64) {
    let page = query.page();
    (page, (page - 1).saturating_mul(DASHBOARD_PAGE_SIZE))
}

pub(super) fn ok<T: Serialize>(req_id: RequestId, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    })
}

pub(super) fn created<T: Serialize>(req_id: RequestId, data: T) -> Created<T> {
    (StatusCode::CREATED, ok(req_id, data))
}

pub(super) fn deleted(req_id: RequestId) -> Json<ApiResponse<serde_json::Value>> {
    ok(req_id, serde_json::json!({ "deleted": true }))
}

/// Run a form's validation, turning field errors into a 400.
pub(super) fn validated<F>(request_id: &str, result: Result<F, FormErrors>) -> Result<F, ApiError> {
    result.map_err(|errors| ApiError::from_form(request_id, errors))
}

/// Turn a missing row into a 404 naming `what`.
pub(super) fn found<T>(request_id: &str, what: &str, row: Option<T>) -> Result<T, ApiError> {
    row.ok_or_else(|| ApiError::not_found(request_id, what))
}

/// GET /api/v1/dashboard/summary: order and user totals, plus today's counts.
async fn summary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<DashboardSummary>>, ApiError> {
    let data = shopfront_db::dashboard_summary(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, data))
}
