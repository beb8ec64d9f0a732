use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Serialize;
use shopfront_core::{forms::UserForm, listing::DASHBOARD_PAGE_SIZE};
use shopfront_db::{AddressRow, OrderRow, UserRow};

use crate::middleware::RequestId;

use super::super::{map_db_error, ApiError, ApiResponse, AppState, PageQuery, PagedResponse};
use super::{created, found, ok, validated, window, Created};

#[derive(Debug, Serialize)]
pub(super) struct UserDetail {
    #[serde(flatten)]
    user: UserRow,
    orders: Vec<OrderRow>,
    addresses: Vec<AddressRow>,
}

pub(super) async fn list_users(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<UserRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_users_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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

/// GET /api/v1/dashboard/users/{id}: the user, their orders (newest first)
/// and saved addresses.
pub(super) async fn get_user(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<UserDetail>>, ApiError> {
    let rid = &req_id.0;
    let user = found(
        rid,
        "user",
        shopfront_db::get_user(&state.pool, id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?,
    )?;
    let orders = shopfront_db::list_user_orders(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let addresses = shopfront_db::list_user_addresses(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(
        req_id,
        UserDetail {
            user,
            orders,
            addresses,
        },
    ))
}

pub(super) async fn create_user(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<UserForm>,
) -> Result<Created<UserRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_user(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(created(req_id, row))
}

pub(super) async fn update_user(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UserForm>,
) -> Result<Json<ApiResponse<UserRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_user(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, row))
}

/// GET /api/v1/dashboard/addresses: read-only; shoppers manage their own.
pub(super) async fn list_addresses(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<AddressRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_addresses_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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
