//! Category and collection listings: scope, price range, attribute filters,
//! sort, and paging compiled into one parameterized query.

use shopfront_core::{AttributeAxis, ListingParams};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::catalog::attributes::load_axes;
use crate::catalog::products::{ProductSummaryRow, SUMMARY_SELECT};
use crate::{DbError, Page};

/// Which products a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingScope {
    /// Products in any of these categories (a category plus its descendants).
    Categories(Vec<i64>),
    Collection(i64),
}

fn push_scope(query: &mut QueryBuilder<'_, Postgres>, scope: &ListingScope) {
    match scope {
        ListingScope::Categories(ids) => {
            query
                .push("p.category_id = ANY(")
                .push_bind(ids.clone())
                .push(")");
        }
        ListingScope::Collection(id) => {
            query
                .push(
                    "EXISTS (SELECT 1 FROM collection_products cp \
                     WHERE cp.product_id = p.id AND cp.collection_id = ",
                )
                .push_bind(*id)
                .push(")");
        }
    }
}

fn push_filters(
    query: &mut QueryBuilder<'_, Postgres>,
    scope: &ListingScope,
    params: &ListingParams,
) {
    query.push(" WHERE p.on_sale AND ");
    push_scope(query, scope);
    if let Some(from) = params.price_from {
        query.push(" AND p.price > ").push_bind(from);
    }
    if let Some(to) = params.price_to {
        query.push(" AND p.price < ").push_bind(to);
    }
    for (attribute_id, value_id) in params.attribute_filters.iter() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM product_attribute_values pav \
                 WHERE pav.product_id = p.id AND pav.attribute_id = ",
            )
            .push_bind(attribute_id.0)
            .push(" AND pav.value_id = ")
            .push_bind(value_id.0)
            .push(")");
    }
}

/// Page query for a listing. The sort column comes from a fixed allow-list,
/// never from request text.
#[must_use]
pub fn build_listing_query(
    scope: &ListingScope,
    params: &ListingParams,
    per_page: i64,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(SUMMARY_SELECT);
    push_filters(&mut query, scope, params);
    query.push(format!(
        " ORDER BY p.{} {}, p.id",
        params.sort.key.column(),
        params.sort.order.sql()
    ));
    query.push(" LIMIT ").push_bind(per_page);
    query.push(" OFFSET ").push_bind(params.offset(per_page));
    query
}

#[must_use]
pub fn build_count_query(
    scope: &ListingScope,
    params: &ListingParams,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("SELECT COUNT(*) FROM products p");
    push_filters(&mut query, scope, params);
    query
}

/// Run a listing and return the requested page with the filtered total.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_scoped_products(
    pool: &PgPool,
    scope: &ListingScope,
    params: &ListingParams,
    per_page: i64,
) -> Result<Page<ProductSummaryRow>, DbError> {
    let items = build_listing_query(scope, params, per_page)
        .build_query_as::<ProductSummaryRow>()
        .fetch_all(pool)
        .await?;
    let total: i64 = build_count_query(scope, params)
        .build_query_scalar()
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// Product attributes declared by the types of products in `scope`, with
/// their values. These are the filters a listing offers.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_filterable_attributes(
    pool: &PgPool,
    scope: &ListingScope,
) -> Result<Vec<AttributeAxis>, DbError> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT DISTINCT pta.attribute_id FROM product_type_attributes pta \
         JOIN products p ON p.product_type_id = pta.product_type_id \
         WHERE pta.role = 'product' AND ",
    );
    push_scope(&mut query, scope);
    query.push(" ORDER BY pta.attribute_id");
    let ids: Vec<i64> = query.build_query_scalar().fetch_all(pool).await?;

    let mut conn = pool.acquire().await?;
    load_axes(&mut conn, &ids).await
}
