use shopfront_core::{AppConfig, CoreError, CouponRejection, FormErrors, OrderStatus};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/shopfront-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("variant {variant_id} has not enough stock (requested {requested}, available {available})")]
    InsufficientStock {
        variant_id: i64,
        requested: i32,
        available: i32,
    },
    #[error(transparent)]
    CouponRejected(#[from] CouponRejection),
    #[error("concurrent update conflict, try again")]
    Conflict,
    #[error("cannot move order from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error(transparent)]
    Validation(CoreError),
    #[error(transparent)]
    Form(#[from] FormErrors),
    #[error("cart is empty")]
    EmptyCart,
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidOrderTransition { from, to } => {
                DbError::InvalidOrderTransition { from, to }
            }
            other => DbError::Validation(other),
        }
    }
}

impl DbError {
    /// Postgres SQLSTATE of the underlying database error, if any.
    #[must_use]
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }

    /// `23505`: a unique constraint rejected the write.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some("23505")
    }

    /// `23503`: a foreign key rejected the write (missing parent or restricted delete).
    #[must_use]
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some("23503")
    }

    /// Serialization failure, deadlock, or unique race: worth one retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.sqlstate().as_deref(),
            Some("40001" | "40P01" | "23505")
        )
    }
}

/// One page of rows plus the unpaged total.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist on a fresh database; treat
    // absence as zero applied.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[test]
    fn order_transition_errors_get_their_own_variant() {
        let err = DbError::from(CoreError::InvalidOrderTransition {
            from: OrderStatus::Fulfilled,
            to: OrderStatus::Cancelled,
        });
        assert!(matches!(err, DbError::InvalidOrderTransition { .. }));

        let err = DbError::from(CoreError::InvalidQuantity(0));
        assert!(matches!(err, DbError::Validation(CoreError::InvalidQuantity(0))));
    }

    #[test]
    fn non_database_errors_have_no_sqlstate() {
        assert_eq!(DbError::NotFound.sqlstate(), None);
        assert!(!DbError::Conflict.is_retryable());
    }
}

pub mod addresses;
pub mod cache;
pub mod carts;
pub mod catalog;
pub mod discounts;
pub mod listing;
pub mod orders;
pub mod seed;
pub mod site;
pub mod users;

pub use addresses::{
    create_address, delete_address, get_user_address, list_addresses_page, list_user_addresses,
    update_address, AddressRow,
};
pub use cache::{CacheKey, KvStore, MemoryStore, ReadThroughCache};
pub use carts::{add_to_cart, get_or_create_cart, list_cart_lines, CartLineDetailRow, CartLineRow};
pub use catalog::{
    attributes::{
        create_attribute, delete_attribute, get_attribute, list_attribute_values,
        list_attributes_page, update_attribute, AttributeRow, AttributeValueRow,
    },
    categories::{
        category_scope_ids, create_category, delete_category, get_category,
        list_categories, list_categories_page, list_category_children, load_category_tree,
        update_category, CategoryRow,
    },
    collections::{
        create_collection, delete_collection, get_collection, list_collection_product_ids,
        list_collections_page, update_collection, CollectionRow,
    },
    images::{list_product_images, replace_product_images, ProductImageRow},
    product_types::{
        create_product_type, delete_product_type, get_product_type, get_product_type_schema,
        list_product_types_page, load_product_type_schema, update_product_type, ProductTypeRow,
    },
    products::{
        create_product, delete_product, get_product, get_product_attributes,
        list_featured_products, list_products_index, list_products_page, update_product,
        ProductRow, ProductSummaryRow,
    },
    variants::{
        create_variant, delete_variant, get_variant, get_variant_attributes, list_variants,
        update_variant, VariantRow,
    },
};
pub use discounts::{
    create_coupon, create_sale, delete_discount, get_coupon_by_code, get_discount,
    list_coupons_page, list_sale_scope, list_sales_page, update_coupon, update_sale, DiscountRow,
    SaleScope,
};
pub use listing::{list_filterable_attributes, list_scoped_products, ListingScope};
pub use orders::{
    cancel_order, dashboard_summary, get_order, list_order_lines, list_orders_page,
    list_user_orders, place_order, send_order, CheckoutItem, DashboardSummary, OrderLineRow,
    OrderRow,
};
pub use seed::{seed_catalog, seed_coupons, SeedSummary};
pub use site::{
    create_menu_item, create_page, delete_menu_item, delete_page, get_menu_item, get_page,
    get_site_settings, list_menu, list_menu_items_page, list_pages_page, update_menu_item,
    update_page, update_site_settings, MenuItemRow, PageRow, SiteSettingsRow,
};
pub use users::{create_user, get_user, list_users_page, update_user, UserRow};
