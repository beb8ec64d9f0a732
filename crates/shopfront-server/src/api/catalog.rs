//! Public catalog endpoints: product index, featured products, product
//! detail, and category/collection listings.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopfront_core::{
    listing::{API_PAGE_SIZE, STOREFRONT_PAGE_SIZE},
    resolve_price, AttributeAxis, AttributeRole, FilterContext, ListingParams, Pagination, Sort,
};
use shopfront_db::{CacheKey, ListingScope, ProductImageRow, ProductSummaryRow, VariantRow};

use crate::middleware::RequestId;

use super::{
    map_db_error, normalize_limit, ApiError, ApiResponse, AppState, PagedResponse, ResponseMeta,
};

const FEATURED_DEFAULT: i64 = 8;

// ---------------------------------------------------------------------------
// Query and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProductIndexQuery {
    pub page: Option<String>,
    pub search: Option<String>,
    /// `price-asc`, `sold_count-desc`, ...
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct FeaturedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductDetail {
    id: i64,
    title: String,
    description: String,
    price: Decimal,
    rating: Decimal,
    sold_count: i32,
    review_count: i32,
    category_id: Option<i64>,
    images: Vec<String>,
    variant: Vec<VariantItem>,
    attributes: Vec<AttributeItem>,
    is_in_stock: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct VariantItem {
    id: i64,
    sku: String,
    title: String,
    price: Decimal,
    quantity_available: i32,
}

#[derive(Debug, Serialize)]
pub(super) struct AttributeItem {
    attribute: String,
    value: String,
}

/// Category or collection page: products, the filters on offer, and the
/// filters currently applied.
#[derive(Debug, Serialize)]
pub(super) struct ListingResponse {
    data: Vec<ProductSummaryRow>,
    filters: Vec<AttributeAxis>,
    #[serde(flatten)]
    context: FilterContext,
    pagination: Pagination,
    meta: ResponseMeta,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/products: searchable, sortable index of products on sale.
pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductIndexQuery>,
) -> Result<Json<PagedResponse<ProductSummaryRow>>, ApiError> {
    let page = shopfront_core::listing::parse_page(query.page.as_deref());
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let sort = query.order.as_deref().and_then(Sort::parse_order);

    let rows = shopfront_db::list_products_index(
        &state.pool,
        search,
        sort,
        API_PAGE_SIZE,
        (page - 1).saturating_mul(API_PAGE_SIZE),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(PagedResponse::from_page(
        req_id.0,
        rows,
        page,
        API_PAGE_SIZE,
        |row| row,
    )))
}

/// GET /api/v1/products/featured: featured products, cached per limit.
pub(super) async fn list_featured_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<FeaturedQuery>,
) -> Result<Json<ApiResponse<Vec<ProductSummaryRow>>>, ApiError> {
    let limit = normalize_limit(query.limit, FEATURED_DEFAULT);
    let pool = state.pool.clone();
    let data = state
        .cache
        .get_or_load(&CacheKey::featured(limit), || async move {
            shopfront_db::list_featured_products(&pool, limit).await
        })
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/products/{id}: product with images, variants, and attributes.
pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let rid = &req_id.0;
    let product = shopfront_db::get_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::not_found(rid, &format!("product {id}")))?;

    let images = cached_images(&state, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let variants = cached_variants(&state, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let values = shopfront_db::get_product_attributes(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let attributes = shopfront_db::get_product_type_schema(&state.pool, product.product_type_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .map(|schema| schema.describe(AttributeRole::Product, &values))
        .unwrap_or_default()
        .into_iter()
        .map(|(attribute, value)| AttributeItem { attribute, value })
        .collect();

    let is_in_stock = variants.iter().any(VariantRow::is_in_stock);
    let variant = variants
        .iter()
        .map(|v| VariantItem {
            id: v.id,
            sku: v.sku.clone(),
            title: v.display_title().to_string(),
            price: resolve_price(v.price_override, product.price),
            quantity_available: v.quantity_available(),
        })
        .collect();

    Ok(Json(ApiResponse {
        data: ProductDetail {
            id: product.id,
            title: product.title,
            description: product.description,
            price: product.price,
            rating: product.rating,
            sold_count: product.sold_count,
            review_count: product.review_count,
            category_id: product.category_id,
            images: images.into_iter().map(|i| i.image).collect(),
            variant,
            attributes,
            is_in_stock,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/categories/{id}/products: products of the category and its
/// descendants.
pub(super) async fn list_category_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ListingResponse>, ApiError> {
    let ids = shopfront_db::category_scope_ids(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    scoped_listing(&state, req_id, ListingScope::Categories(ids), &query).await
}

/// GET /api/v1/collections/{id}/products
pub(super) async fn list_collection_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ListingResponse>, ApiError> {
    shopfront_db::get_collection(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::not_found(req_id.0.clone(), &format!("collection {id}")))?;
    scoped_listing(&state, req_id, ListingScope::Collection(id), &query).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn scoped_listing(
    state: &AppState,
    req_id: RequestId,
    scope: ListingScope,
    query: &HashMap<String, String>,
) -> Result<Json<ListingResponse>, ApiError> {
    let filters = shopfront_db::list_filterable_attributes(&state.pool, &scope)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let params = ListingParams::from_query(query, &filters);

    let page =
        shopfront_db::list_scoped_products(&state.pool, &scope, &params, STOREFRONT_PAGE_SIZE)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let context = FilterContext::new(&params, &filters);
    Ok(Json(ListingResponse {
        data: page.items,
        filters,
        context,
        pagination: Pagination::new(params.page, STOREFRONT_PAGE_SIZE, page.total),
        meta: ResponseMeta::new(req_id.0),
    }))
}

async fn cached_images(
    state: &AppState,
    product_id: i64,
) -> Result<Vec<ProductImageRow>, shopfront_db::DbError> {
    let pool = state.pool.clone();
    state
        .cache
        .get_or_load(&CacheKey::product_images(product_id), || async move {
            shopfront_db::list_product_images(&pool, product_id).await
        })
        .await
}

pub(super) async fn cached_variants(
    state: &AppState,
    product_id: i64,
) -> Result<Vec<VariantRow>, shopfront_db::DbError> {
    let pool = state.pool.clone();
    state
        .cache
        .get_or_load(&CacheKey::product_variants(product_id), || async move {
            shopfront_db::list_variants(&pool, product_id).await
        })
        .await
}
