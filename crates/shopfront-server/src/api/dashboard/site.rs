use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use shopfront_core::{
    forms::{MenuItemForm, PageForm, SiteSettingsForm},
    listing::DASHBOARD_PAGE_SIZE,
    FormErrors,
};
use shopfront_db::{MenuItemRow, PageRow, SiteSettingsRow};

use crate::middleware::RequestId;

use super::super::{map_db_error, ApiError, ApiResponse, AppState, PageQuery, PagedResponse};
use super::{created, deleted, found, ok, validated, window, Created};

/// Menu links are either site paths (`/about`) or absolute URLs.
fn check_menu_url(form: MenuItemForm) -> Result<MenuItemForm, FormErrors> {
    if let Some(url) = form.url.as_deref() {
        if !url.starts_with('/') && reqwest::Url::parse(url).is_err() {
            return Err(FormErrors::single(
                "url",
                format!("must be a path starting with '/' or an absolute URL, got '{url}'"),
            ));
        }
    }
    Ok(form)
}

// ---------------------------------------------------------------------------
// Menu items
// ---------------------------------------------------------------------------

pub(super) async fn list_menu_items(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<MenuItemRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_menu_items_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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

pub(super) async fn get_menu_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MenuItemRow>>, ApiError> {
    let row = shopfront_db::get_menu_item(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let row = found(&req_id.0, "menu item", row)?;
    Ok(ok(req_id, row))
}

pub(super) async fn create_menu_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<MenuItemForm>,
) -> Result<Created<MenuItemRow>, ApiError> {
    let form = validated(&req_id.0, body.validate().and_then(check_menu_url))?;
    let row = shopfront_db::create_menu_item(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(created(req_id, row))
}

/// PUT /api/v1/dashboard/menu-items/{id}: re-parenting under a descendant or
/// into another menu is rejected on `parent_id`.
pub(super) async fn update_menu_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<MenuItemForm>,
) -> Result<Json<ApiResponse<MenuItemRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate().and_then(check_menu_url))?;
    let row = shopfront_db::update_menu_item(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, row))
}

pub(super) async fn delete_menu_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    shopfront_db::delete_menu_item(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(deleted(req_id))
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

pub(super) async fn list_pages(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<PageRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_pages_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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

/// Unlike the public route, hidden pages are returned here.
pub(super) async fn get_page(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PageRow>>, ApiError> {
    let row = shopfront_db::get_page(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let row = found(&req_id.0, "page", row)?;
    Ok(ok(req_id, row))
}

pub(super) async fn create_page(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<PageForm>,
) -> Result<Created<PageRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_page(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(created(req_id, row))
}

pub(super) async fn update_page(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<PageForm>,
) -> Result<Json<ApiResponse<PageRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_page(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, row))
}

pub(super) async fn delete_page(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    shopfront_db::delete_page(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(deleted(req_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(url: Option<&str>) -> MenuItemForm {
        MenuItemForm {
            title: "About".to_string(),
            position: 0,
            menu: shopfront_core::forms::MenuPlacement::Top,
            parent_id: None,
            url: url.map(str::to_string),
            category_id: None,
            collection_id: None,
            page_id: None,
        }
    }

    #[test]
    fn site_paths_and_absolute_urls_are_accepted() {
        assert!(check_menu_url(form(Some("/about"))).is_ok());
        assert!(check_menu_url(form(Some("https://example.com/help"))).is_ok());
        assert!(check_menu_url(form(None)).is_ok());
    }

    #[test]
    fn relative_junk_is_rejected_on_url() {
        let errors = check_menu_url(form(Some("not a url"))).expect_err("invalid");
        assert_eq!(errors.fields[0].field, "url");
    }
}

// ---------------------------------------------------------------------------
// Site settings
// ---------------------------------------------------------------------------

pub(super) async fn get_site_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<SiteSettingsRow>>, ApiError> {
    let row = shopfront_db::get_site_settings(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, row))
}

pub(super) async fn update_site_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SiteSettingsForm>,
) -> Result<Json<ApiResponse<SiteSettingsRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_site_settings(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(header_text = %row.header_text, "site settings updated");
    Ok(ok(req_id, row))
}
