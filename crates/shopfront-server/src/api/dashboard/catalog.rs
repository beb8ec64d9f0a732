//! Dashboard CRUD for catalog entities: products, variants, images,
//! categories, collections, product types, and attributes.
//!
//! Writes drop the cache entries derived from what they touched.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use shopfront_core::{
    forms::{
        AttributeForm, CategoryForm, CollectionForm, ProductForm, ProductTypeForm, VariantForm,
    },
    listing::DASHBOARD_PAGE_SIZE,
    AttributeMap, FormErrors, ProductTypeSchema,
};
use shopfront_db::{
    AttributeRow, AttributeValueRow, CacheKey, CategoryRow, CollectionRow, ProductImageRow,
    ProductRow, ProductTypeRow, VariantRow,
};

use crate::middleware::RequestId;

use super::super::{map_db_error, ApiError, ApiResponse, AppState, PageQuery, PagedResponse};
use super::{created, deleted, found, ok, validated, window, Created};

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProductListQuery {
    pub page: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImagesRequest {
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductDetail {
    #[serde(flatten)]
    product: ProductRow,
    attributes: AttributeMap,
    images: Vec<ProductImageRow>,
    variants: Vec<VariantRow>,
}

#[derive(Debug, Serialize)]
pub(super) struct VariantDetail {
    #[serde(flatten)]
    variant: VariantRow,
    attributes: AttributeMap,
}

#[derive(Debug, Serialize)]
pub(super) struct CategoryDetail {
    #[serde(flatten)]
    category: CategoryRow,
    children: Vec<CategoryRow>,
}

#[derive(Debug, Serialize)]
pub(super) struct CollectionDetail {
    #[serde(flatten)]
    collection: CollectionRow,
    product_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductTypeDetail {
    #[serde(flatten)]
    product_type: ProductTypeRow,
    schema: Option<ProductTypeSchema>,
}

#[derive(Debug, Serialize)]
pub(super) struct AttributeDetail {
    #[serde(flatten)]
    attribute: AttributeRow,
    values: Vec<AttributeValueRow>,
}

/// Trim image paths and reject blanks.
fn clean_images(images: Vec<String>) -> Result<Vec<String>, FormErrors> {
    let images: Vec<String> = images.into_iter().map(|i| i.trim().to_string()).collect();
    if images.iter().any(String::is_empty) {
        return Err(FormErrors::single("images", "must not contain blank entries"));
    }
    Ok(images)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<PagedResponse<ProductRow>>, ApiError> {
    let paging = PageQuery { page: query.page };
    let (page, offset) = window(&paging);
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let rows =
        shopfront_db::list_products_page(&state.pool, search, DASHBOARD_PAGE_SIZE, offset)
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

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let rid = &req_id.0;
    let db_err = |e: shopfront_db::DbError| map_db_error(rid.clone(), &e);
    let product = found(
        rid,
        "product",
        shopfront_db::get_product(&state.pool, id).await.map_err(db_err)?,
    )?;
    let attributes = shopfront_db::get_product_attributes(&state.pool, id)
        .await
        .map_err(db_err)?;
    let images = shopfront_db::list_product_images(&state.pool, id)
        .await
        .map_err(db_err)?;
    let variants = shopfront_db::list_variants(&state.pool, id)
        .await
        .map_err(db_err)?;

    Ok(ok(
        req_id,
        ProductDetail {
            product,
            attributes,
            images,
            variants,
        },
    ))
}

/// POST /api/v1/dashboard/products: also creates the product's variants.
pub(super) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ProductForm>,
) -> Result<Created<ProductRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_product(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_product(row.id);
    Ok(created(req_id, row))
}

pub(super) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ProductForm>,
) -> Result<Json<ApiResponse<ProductRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_product(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_product(id);
    Ok(ok(req_id, row))
}

pub(super) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    shopfront_db::delete_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_product(id);
    Ok(deleted(req_id))
}

/// PUT /api/v1/dashboard/products/{id}/images: replace the image list.
pub(super) async fn replace_images(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ImagesRequest>,
) -> Result<Json<ApiResponse<Vec<ProductImageRow>>>, ApiError> {
    let images = validated(&req_id.0, clean_images(body.images))?;
    let rows = shopfront_db::replace_product_images(&state.pool, id, &images)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_product(id);
    Ok(ok(req_id, rows))
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

pub(super) async fn list_variants(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<VariantRow>>>, ApiError> {
    let rid = &req_id.0;
    found(
        rid,
        "product",
        shopfront_db::get_product(&state.pool, product_id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?,
    )?;
    let rows = shopfront_db::list_variants(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(req_id, rows))
}

pub(super) async fn get_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<VariantDetail>>, ApiError> {
    let rid = &req_id.0;
    let variant = found(
        rid,
        "variant",
        shopfront_db::get_variant(&state.pool, id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?,
    )?;
    let attributes = shopfront_db::get_variant_attributes(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(
        req_id,
        VariantDetail {
            variant,
            attributes,
        },
    ))
}

pub(super) async fn create_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
    Json(body): Json<VariantForm>,
) -> Result<Created<VariantRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_variant(&state.pool, product_id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_product(product_id);
    Ok(created(req_id, row))
}

pub(super) async fn update_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<VariantForm>,
) -> Result<Json<ApiResponse<VariantRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_variant(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_product(row.product_id);
    Ok(ok(req_id, row))
}

pub(super) async fn delete_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let product_id = shopfront_db::delete_variant(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_product(product_id);
    Ok(deleted(req_id))
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<CategoryRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_categories_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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

pub(super) async fn get_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CategoryDetail>>, ApiError> {
    let rid = &req_id.0;
    let category = found(
        rid,
        "category",
        shopfront_db::get_category(&state.pool, id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?,
    )?;
    let pool = state.pool.clone();
    let children = state
        .cache
        .get_or_load(&CacheKey::category_children(id), || async move {
            shopfront_db::list_category_children(&pool, id).await
        })
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(req_id, CategoryDetail { category, children }))
}

pub(super) async fn create_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CategoryForm>,
) -> Result<Created<CategoryRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_category(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_category(row.id, &[row.parent_id]);
    Ok(created(req_id, row))
}

/// PUT /api/v1/dashboard/categories/{id}: moving under a descendant is a
/// validation error on `parent_id`.
pub(super) async fn update_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<CategoryForm>,
) -> Result<Json<ApiResponse<CategoryRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let (row, previous_parent) = shopfront_db::update_category(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state
        .cache
        .invalidate_category(id, &[row.parent_id, previous_parent]);
    Ok(ok(req_id, row))
}

pub(super) async fn delete_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let row = shopfront_db::delete_category(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_category(id, &[row.parent_id]);
    Ok(deleted(req_id))
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

pub(super) async fn list_collections(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<CollectionRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_collections_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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

pub(super) async fn get_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CollectionDetail>>, ApiError> {
    let rid = &req_id.0;
    let collection = found(
        rid,
        "collection",
        shopfront_db::get_collection(&state.pool, id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?,
    )?;
    let product_ids = shopfront_db::list_collection_product_ids(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(
        req_id,
        CollectionDetail {
            collection,
            product_ids,
        },
    ))
}

pub(super) async fn create_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CollectionForm>,
) -> Result<Created<CollectionRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_collection(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(created(req_id, row))
}

pub(super) async fn update_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<CollectionForm>,
) -> Result<Json<ApiResponse<CollectionRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_collection(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, row))
}

pub(super) async fn delete_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    shopfront_db::delete_collection(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(deleted(req_id))
}

// ---------------------------------------------------------------------------
// Product types
// ---------------------------------------------------------------------------

pub(super) async fn list_product_types(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<ProductTypeRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_product_types_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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

pub(super) async fn get_product_type(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductTypeDetail>>, ApiError> {
    let rid = &req_id.0;
    let product_type = found(
        rid,
        "product type",
        shopfront_db::get_product_type(&state.pool, id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?,
    )?;
    let schema = shopfront_db::get_product_type_schema(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(
        req_id,
        ProductTypeDetail {
            product_type,
            schema,
        },
    ))
}

pub(super) async fn create_product_type(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ProductTypeForm>,
) -> Result<Created<ProductTypeRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_product_type(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(created(req_id, row))
}

pub(super) async fn update_product_type(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ProductTypeForm>,
) -> Result<Json<ApiResponse<ProductTypeRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_product_type(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ok(req_id, row))
}

/// DELETE /api/v1/dashboard/product-types/{id}: refused while products use it.
pub(super) async fn delete_product_type(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    shopfront_db::delete_product_type(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(deleted(req_id))
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

pub(super) async fn list_attributes(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<AttributeRow>>, ApiError> {
    let (page, offset) = window(&query);
    let rows = shopfront_db::list_attributes_page(&state.pool, DASHBOARD_PAGE_SIZE, offset)
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

pub(super) async fn get_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AttributeDetail>>, ApiError> {
    let rid = &req_id.0;
    let attribute = found(
        rid,
        "attribute",
        shopfront_db::get_attribute(&state.pool, id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?,
    )?;
    let pool = state.pool.clone();
    let values = state
        .cache
        .get_or_load(&CacheKey::attribute_values(id), || async move {
            shopfront_db::list_attribute_values(&pool, id).await
        })
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(ok(req_id, AttributeDetail { attribute, values }))
}

pub(super) async fn create_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<AttributeForm>,
) -> Result<Created<AttributeRow>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::create_attribute(&state.pool, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(created(req_id, row))
}

pub(super) async fn update_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<AttributeForm>,
) -> Result<Json<ApiResponse<AttributeRow>>, ApiError> {
    let form = validated(&req_id.0, body.validate())?;
    let row = shopfront_db::update_attribute(&state.pool, id, &form)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_attribute(id);
    Ok(ok(req_id, row))
}

pub(super) async fn delete_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    shopfront_db::delete_attribute(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    state.cache.invalidate_attribute(id);
    Ok(deleted(req_id))
}
