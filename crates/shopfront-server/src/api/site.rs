use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use shopfront_core::{forms::MenuPlacement, TreeView};
use shopfront_db::{MenuItemRow, PageRow, SiteSettingsRow};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct MenuTree {
    placement: MenuPlacement,
    items: serde_json::Value,
}

/// GET /api/v1/menus/{top|bottom}: nested menu with resolved links.
pub(super) async fn get_menu(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(placement): Path<String>,
) -> Result<Json<ApiResponse<MenuTree>>, ApiError> {
    let rid = &req_id.0;
    let placement = MenuPlacement::parse(&placement)
        .ok_or_else(|| ApiError::not_found(rid, &format!("menu '{placement}'")))?;

    let menu = shopfront_db::list_menu(&state.pool, placement)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let tree: Vec<TreeView<'_, MenuItemRow>> = menu.tree();
    let items = serde_json::to_value(&tree).map_err(|e| {
        tracing::error!(error = %e, "failed to serialize menu tree");
        ApiError::new(rid, "internal_error", "failed to render menu")
    })?;

    Ok(Json(ApiResponse {
        data: MenuTree { placement, items },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/pages/{id}: a visible content page.
pub(super) async fn get_page(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PageRow>>, ApiError> {
    let page = shopfront_db::get_page(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .filter(|p| p.is_visible)
        .ok_or_else(|| ApiError::not_found(req_id.0.clone(), &format!("page {id}")))?;

    Ok(Json(ApiResponse {
        data: page,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/site: header text and description for the storefront chrome.
pub(super) async fn get_site_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<SiteSettingsRow>>, ApiError> {
    let settings = shopfront_db::get_site_settings(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse {
        data: settings,
        meta: ResponseMeta::new(req_id.0),
    }))
}
