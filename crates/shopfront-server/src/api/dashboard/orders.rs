//! Order review and fulfilment. Sending consumes the order's stock
//! allocation; cancelling releases it.

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use shopfront_core::listing::DASHBOARD_PAGE_SIZE;
use shopfront_db::{CacheKey, OrderLineRow, OrderRow};

use crate::middleware::RequestId;

use super::super::cart::OrderView;
use super::super::{map_db_error, ApiError, ApiResponse, AppState, PageQuery, PagedResponse};
use super::{found, ok, window};

pub(super) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<OrderRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_orders_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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

pub(super) async fn get_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<OrderView>>, ApiError> {
    let rid = &req_id.0;
    let order = found(
        rid,
        "order",
        shopfront_db::get_order(&state.pool, id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?,
    )?;
    let lines = shopfront_db::list_order_lines(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(req_id, OrderView { order, lines }))
}

/// POST /api/v1/dashboard/orders/{id}/send: mark fulfilled.
pub(super) async fn send_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<OrderView>>, ApiError> {
    let rid = &req_id.0;
    let order = shopfront_db::send_order(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let lines = shopfront_db::list_order_lines(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    invalidate_stock(&state, &lines).await;
    tracing::info!(order_id = id, "order sent");
    Ok(ok(req_id, OrderView { order, lines }))
}

/// POST /api/v1/dashboard/orders/{id}/cancel
pub(super) async fn cancel_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<OrderView>>, ApiError> {
    let rid = &req_id.0;
    let order = shopfront_db::cancel_order(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let lines = shopfront_db::list_order_lines(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    invalidate_stock(&state, &lines).await;
    tracing::info!(order_id = id, "order cancelled");
    Ok(ok(req_id, OrderView { order, lines }))
}

/// Drop cached variant lists for every product the order touched.
async fn invalidate_stock(state: &AppState, lines: &[OrderLineRow]) {
    let mut product_ids = HashSet::new();
    for variant_id in lines.iter().filter_map(|l| l.variant_id) {
        match shopfront_db::get_variant(&state.pool, variant_id).await {
            Ok(Some(variant)) => {
                product_ids.insert(variant.product_id);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(variant_id, error = %e, "failed to resolve variant for cache invalidation");
            }
        }
    }
    for product_id in product_ids {
        state.cache.invalidate(&CacheKey::product_variants(product_id));
    }
}
