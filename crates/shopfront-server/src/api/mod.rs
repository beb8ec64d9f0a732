mod addresses;
mod cart;
mod catalog;
mod coupons;
mod dashboard;
mod site;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::{listing::parse_page, FieldError, FormErrors, Pagination};
use shopfront_db::{DbError, Page, ReadThroughCache};
use sqlx::PgPool;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, require_current_user, AuthState,
    RateLimitState, RequestId, USER_ID_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: ReadThroughCache,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: ReadThroughCache::in_memory(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

/// Envelope for paged listings.
#[derive(Debug, Serialize)]
pub struct PagedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: Pagination,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Machine-readable cause for `unprocessable` errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

/// `?page=` for paged listings. Kept as a string so junk falls back to page 1.
#[derive(Debug, Default, Deserialize)]
pub(super) struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub(super) fn page(&self) -> i64 {
        parse_page(self.page.as_deref())
    }
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> PagedResponse<T> {
    pub(super) fn from_page<R>(
        request_id: String,
        page: Page<R>,
        number: i64,
        per_page: i64,
        map: impl FnMut(R) -> T,
    ) -> Self {
        Self {
            data: page.items.into_iter().map(map).collect(),
            pagination: Pagination::new(number, per_page, page.total),
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                reason: None,
                fields: Vec::new(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    /// 422 for a domain rule the request broke.
    pub fn unprocessable(
        request_id: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(request_id, "unprocessable", message);
        error.error.reason = Some(reason.into());
        error
    }

    /// 400 listing each invalid form field.
    pub fn from_form(request_id: impl Into<String>, errors: FormErrors) -> Self {
        let mut error = Self::new(request_id, "validation_error", "invalid input");
        error.error.fields = errors.fields;
        error
    }

    pub fn not_found(request_id: impl Into<String>, what: &str) -> Self {
        Self::new(request_id, "not_found", format!("{what} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "unprocessable" => StatusCode::UNPROCESSABLE_ENTITY,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, 50)
}

pub(super) fn map_db_error(request_id: String, error: &DbError) -> ApiError {
    match error {
        DbError::NotFound => ApiError::new(request_id, "not_found", "resource not found"),
        DbError::Form(errors) => ApiError::from_form(request_id, errors.clone()),
        DbError::Validation(e) => ApiError::new(request_id, "validation_error", e.to_string()),
        DbError::InsufficientStock { .. } => {
            ApiError::unprocessable(request_id, "insufficient_stock", error.to_string())
        }
        DbError::CouponRejected(rejection) => {
            ApiError::unprocessable(request_id, rejection.code(), rejection.to_string())
        }
        DbError::EmptyCart => ApiError::unprocessable(request_id, "empty_cart", "cart is empty"),
        DbError::InvalidOrderTransition { .. } => {
            ApiError::unprocessable(request_id, "invalid_transition", error.to_string())
        }
        DbError::Conflict => ApiError::new(
            request_id,
            "conflict",
            "the resource was changed concurrently; try again",
        ),
        e if e.is_unique_violation() => {
            ApiError::new(request_id, "conflict", "a record with that value already exists")
        }
        e => {
            tracing::error!(error = %e, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static(USER_ID_HEADER),
        ])
}

fn storefront_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(catalog::list_products))
        .route(
            "/api/v1/products/featured",
            get(catalog::list_featured_products),
        )
        .route(
            "/api/v1/products/{id}",
            get(catalog::get_product).merge(
                post(cart::add_product_to_cart)
                    .layer(axum::middleware::from_fn(require_current_user)),
            ),
        )
        .route(
            "/api/v1/categories/{id}/products",
            get(catalog::list_category_products),
        )
        .route(
            "/api/v1/collections/{id}/products",
            get(catalog::list_collection_products),
        )
        .route("/api/v1/coupons/{code}", get(coupons::check_coupon))
        .route("/api/v1/menus/{placement}", get(site::get_menu))
        .route("/api/v1/pages/{id}", get(site::get_page))
        .route("/api/v1/site", get(site::get_site_settings))
}

fn shopper_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/cart", get(cart::get_cart))
        .route("/api/v1/cart/checkout", post(cart::checkout))
        .route(
            "/api/v1/addresses",
            get(addresses::list_addresses).post(addresses::create_address),
        )
        .route(
            "/api/v1/addresses/{id}",
            get(addresses::get_address)
                .put(addresses::update_address)
                .delete(addresses::delete_address),
        )
        .layer(axum::middleware::from_fn(require_current_user))
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    let api_routes = Router::new()
        .merge(storefront_router())
        .merge(shopper_router())
        .merge(
            dashboard::router().layer(axum::middleware::from_fn_with_state(
                auth,
                require_bearer_auth,
            )),
        )
        .layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match shopfront_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn rate_limit_state(max_requests: usize, window_secs: u64) -> RateLimitState {
    RateLimitState::new(max_requests, Duration::from_secs(window_secs))
}

#[cfg(test)]
pub fn default_rate_limit_state() -> RateLimitState {
    rate_limit_state(120, 60)
}

#[cfg(test)]
mod tests;
