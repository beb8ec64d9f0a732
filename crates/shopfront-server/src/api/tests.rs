use super::*;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use rust_decimal::Decimal;
use shopfront_core::{
    forms::{AttributeForm, CategoryForm, ProductForm, ProductTypeForm, UserForm},
    AttributeMap, CouponRejection, OrderStatus,
};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use crate::middleware::AuthState;

/// A pool that never connects; enough for routes rejected before any query.
fn lazy_state() -> AppState {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://shopfront@localhost:1/shopfront")
        .expect("lazy pool");
    AppState::new(pool)
}

fn open_auth() -> AuthState {
    AuthState::from_keys("", true, None).expect("auth")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&body).expect("json parse")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

// ---------------------------------------------------------------------------
// Error mapping (no DB)
// ---------------------------------------------------------------------------

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None, 8), 8);
    assert_eq!(normalize_limit(Some(0), 8), 1);
    assert_eq!(normalize_limit(Some(1_000), 8), 50);
    assert_eq!(normalize_limit(Some(25), 8), 25);
}

#[test]
fn api_error_validation_error_maps_to_bad_request() {
    let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn stock_and_coupon_failures_map_to_unprocessable() {
    let err = map_db_error(
        "req-1".to_string(),
        &DbError::InsufficientStock {
            variant_id: 3,
            requested: 5,
            available: 2,
        },
    );
    assert_eq!(err.error.reason.as_deref(), Some("insufficient_stock"));
    assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

    let err = map_db_error(
        "req-1".to_string(),
        &DbError::CouponRejected(CouponRejection::Exhausted),
    );
    assert_eq!(err.error.reason.as_deref(), Some("coupon_exhausted"));

    let err = map_db_error("req-1".to_string(), &DbError::EmptyCart);
    assert_eq!(err.error.reason.as_deref(), Some("empty_cart"));
}

#[test]
fn order_transition_errors_map_to_unprocessable() {
    let err = map_db_error(
        "req-1".to_string(),
        &DbError::InvalidOrderTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Fulfilled,
        },
    );
    assert_eq!(err.error.reason.as_deref(), Some("invalid_transition"));
    assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn form_errors_keep_their_fields() {
    let err = map_db_error(
        "req-1".to_string(),
        &DbError::Form(FormErrors::single("parent_id", "would form a cycle")),
    );
    assert_eq!(err.error.code, "validation_error");
    assert_eq!(err.error.fields[0].field, "parent_id");
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
}

#[test]
fn not_found_and_conflict_statuses() {
    let err = map_db_error("req-1".to_string(), &DbError::NotFound);
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    let err = map_db_error("req-1".to_string(), &DbError::Conflict);
    assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Routing and middleware (lazy pool, no queries issued)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cart_requires_user_header() {
    let app = build_app(lazy_state(), open_auth(), default_rate_limit_state());
    let response = app.oneshot(get("/api/v1/cart")).await.expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn add_to_cart_requires_user_header() {
    let app = build_app(lazy_state(), open_auth(), default_rate_limit_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/products/1")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"variant_id":1}"#))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dashboard_rejects_missing_bearer_when_keys_configured() {
    let auth = AuthState::from_keys("secret-key", false, Some("pepper")).expect("auth");
    let app = build_app(lazy_state(), auth, default_rate_limit_state());
    let response = app
        .oneshot(get("/api/v1/dashboard/summary"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn unknown_menu_placement_is_not_found() {
    let app = build_app(lazy_state(), open_auth(), default_rate_limit_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/menus/sideways")
                .header("x-request-id", "menu-req")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "not_found");
    assert_eq!(json["meta"]["request_id"], "menu-req");
}

#[tokio::test]
async fn bad_coupon_total_is_a_validation_error() {
    let app = build_app(lazy_state(), open_auth(), default_rate_limit_state());
    let response = app
        .oneshot(get("/api/v1/coupons/TENOFF?order_total=lots"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rate_limit_rejects_requests_over_the_window() {
    let app = build_app(lazy_state(), open_auth(), rate_limit_state(1, 60));

    let first = app
        .clone()
        .oneshot(get("/api/v1/menus/sideways"))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::NOT_FOUND);

    let second = app
        .oneshot(get("/api/v1/menus/sideways"))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

// ---------------------------------------------------------------------------
// Live routes (sqlx test database)
// ---------------------------------------------------------------------------

async fn seed_shirt(pool: &sqlx::PgPool) -> i64 {
    let size = shopfront_db::create_attribute(
        pool,
        &AttributeForm {
            title: "Size".to_string(),
            values: vec!["S".to_string(), "M".to_string()],
            product_type_ids: vec![],
        },
    )
    .await
    .expect("create attribute");
    let shirt = shopfront_db::create_product_type(
        pool,
        &ProductTypeForm {
            title: "Shirt".to_string(),
            has_variants: true,
            is_shipping_required: true,
            product_attributes: vec![],
            variant_attributes: vec![size.id],
        },
    )
    .await
    .expect("create product type");
    shopfront_db::create_product(
        pool,
        &ProductForm {
            title: "Linen Shirt".to_string(),
            description: String::new(),
            price: Decimal::new(40, 0),
            on_sale: true,
            is_featured: true,
            rating: Decimal::new(4, 0),
            sold_count: 0,
            review_count: 0,
            category_id: None,
            product_type_id: shirt.id,
            attributes: AttributeMap::new(),
        },
    )
    .await
    .expect("create product")
    .id
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_detail_lists_variants(pool: sqlx::PgPool) {
    let product_id = seed_shirt(&pool).await;
    let app = build_app(AppState::new(pool), open_auth(), default_rate_limit_state());

    let response = app
        .oneshot(get(&format!("/api/v1/products/{product_id}")))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let variants = json["data"]["variant"].as_array().expect("variant array");
    assert_eq!(variants.len(), 2);
    assert_eq!(json["data"]["is_in_stock"], false);
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_with_empty_cart_is_unprocessable(pool: sqlx::PgPool) {
    let user = shopfront_db::create_user(
        &pool,
        &UserForm {
            username: "shopper".to_string(),
            email: "shopper@example.com".to_string(),
            is_active: true,
            is_admin: false,
        },
    )
    .await
    .expect("create user");
    let app = build_app(AppState::new(pool), open_auth(), default_rate_limit_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/cart/checkout")
                .header("content-type", "application/json")
                .header("x-user-id", user.id.to_string())
                .body(Body::from("{}"))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["error"]["reason"], "empty_cart");
}

#[sqlx::test(migrations = "../../migrations")]
async fn dashboard_creates_category_with_open_auth(pool: sqlx::PgPool) {
    let app = build_app(AppState::new(pool), open_auth(), default_rate_limit_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/dashboard/categories")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"title":"Clothing"}"#))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["title"], "Clothing");
}

#[sqlx::test(migrations = "../../migrations")]
async fn category_listing_echoes_active_filters(pool: sqlx::PgPool) {
    let category = shopfront_db::create_category(
        &pool,
        &CategoryForm {
            title: "Clothing".to_string(),
            parent_id: None,
            background_img: None,
        },
    )
    .await
    .expect("create category");
    let app = build_app(AppState::new(pool), open_auth(), default_rate_limit_state());

    let response = app
        .oneshot(get(&format!(
            "/api/v1/categories/{}/products?price_from=10&sort_by=-price",
            category.id
        )))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["sort_by"], "-price");
    assert_eq!(json["descending"], true);
    assert_eq!(json["has_filters"], true);
    assert_eq!(json["price_from"], "10");
    assert!(json["price_to"].is_null());
    assert_eq!(json["selected"], serde_json::json!({}));
    assert_eq!(json["pagination"]["total"], 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cart_of_unknown_user_is_unauthorized(pool: sqlx::PgPool) {
    let app = build_app(AppState::new(pool), open_auth(), default_rate_limit_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/cart")
                .header("x-user-id", "4242")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

async fn create_shopper(pool: &sqlx::PgPool, username: &str) -> i64 {
    shopfront_db::create_user(
        pool,
        &UserForm {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            is_active: true,
            is_admin: false,
        },
    )
    .await
    .expect("create user")
    .id
}

fn as_user(method: &str, uri: &str, user_id: i64, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[sqlx::test(migrations = "../../migrations")]
async fn addresses_are_private_to_their_owner(pool: sqlx::PgPool) {
    let owner = create_shopper(&pool, "owner").await;
    let other = create_shopper(&pool, "other").await;
    let app = build_app(AppState::new(pool), open_auth(), default_rate_limit_state());

    let response = app
        .clone()
        .oneshot(as_user(
            "POST",
            "/api/v1/addresses",
            owner,
            r#"{"contact_name":"Ada","contact_phone":"555-0100","address":"1 Main St"}"#,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let address_id = body_json(response).await["data"]["id"]
        .as_i64()
        .expect("address id");
    let uri = format!("/api/v1/addresses/{address_id}");

    let response = app
        .clone()
        .oneshot(as_user("GET", &uri, other, ""))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(as_user("DELETE", &uri, other, ""))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(as_user("GET", "/api/v1/addresses", owner, ""))
        .await
        .expect("response");
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["data"][0]["contact_name"], "Ada");
}

#[sqlx::test(migrations = "../../migrations")]
async fn address_with_bad_phone_lists_the_field(pool: sqlx::PgPool) {
    let owner = create_shopper(&pool, "owner").await;
    let app = build_app(AppState::new(pool), open_auth(), default_rate_limit_state());

    let response = app
        .oneshot(as_user(
            "POST",
            "/api/v1/addresses",
            owner,
            r#"{"contact_name":"Ada","contact_phone":"n/a","address":"1 Main St"}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["fields"][0]["field"], "contact_phone");
}

#[sqlx::test(migrations = "../../migrations")]
async fn site_settings_update_shows_on_the_storefront(pool: sqlx::PgPool) {
    let app = build_app(AppState::new(pool), open_auth(), default_rate_limit_state());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/dashboard/site-settings")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"header_text":" Free shipping over $50 ","description":"Tees"}"#,
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/v1/site")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["header_text"], "Free shipping over $50");
    assert_eq!(json["data"]["description"], "Tees");
}
