//! Shopper address book. Every route requires [`CurrentUser`] and only ever
//! sees that user's addresses.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use shopfront_core::forms::AddressForm;
use shopfront_db::AddressRow;

use crate::middleware::{CurrentUser, RequestId};

use super::cart::ensure_user;
use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

fn respond<T: serde::Serialize>(req_id: RequestId, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    })
}

/// GET /api/v1/addresses
pub(super) async fn list_addresses(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<AddressRow>>>, ApiError> {
    ensure_user(&state, user, &req_id.0).await?;
    let rows = shopfront_db::list_user_addresses(&state.pool, user.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, rows))
}

/// POST /api/v1/addresses
pub(super) async fn create_address(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<AddressForm>,
) -> Result<(StatusCode, Json<ApiResponse<AddressRow>>), ApiError> {
    let rid = &req_id.0;
    ensure_user(&state, user, rid).await?;
    let form = body
        .validate()
        .map_err(|errors| ApiError::from_form(rid, errors))?;
    let row = shopfront_db::create_address(&state.pool, user.0, &form)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(user_id = user.0, address_id = row.id, "address saved");
    Ok((StatusCode::CREATED, respond(req_id, row)))
}

/// GET /api/v1/addresses/{id}
pub(super) async fn get_address(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AddressRow>>, ApiError> {
    ensure_user(&state, user, &req_id.0).await?;
    let row = shopfront_db::get_user_address(&state.pool, user.0, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, row))
}

/// PUT /api/v1/addresses/{id}
pub(super) async fn update_address(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<AddressForm>,
) -> Result<Json<ApiResponse<AddressRow>>, ApiError> {
    let rid = &req_id.0;
    ensure_user(&state, user, rid).await?;
    let form = body
        .validate()
        .map_err(|errors| ApiError::from_form(rid, errors))?;
    let row = shopfront_db::update_address(&state.pool, user.0, id, &form)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(respond(req_id, row))
}

/// DELETE /api/v1/addresses/{id}
pub(super) async fn delete_address(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    ensure_user(&state, user, &req_id.0).await?;
    shopfront_db::delete_address(&state.pool, user.0, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, serde_json::json!({ "deleted": true })))
}
