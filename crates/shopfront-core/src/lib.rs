pub mod app_config;
pub mod cart;
pub mod catalog;
pub mod catalog_schema;
pub mod config;
pub mod coupons;
pub mod forms;
pub mod hierarchy;
pub mod listing;
pub mod orders;
pub mod variants;

pub use app_config::{AppConfig, Environment};
pub use cart::{check_line_quantity, Cart, CartLine, MAX_LINE_QUANTITY};
pub use catalog::{
    AttributeAxis, AttributeChoice, AttributeId, AttributeMap, AttributeRole, AttributeValueId,
    ProductTypeSchema,
};
pub use catalog_schema::{load_catalog_schema, CatalogSchema};
pub use config::{load_app_config, load_app_config_from_env};
pub use coupons::{generate_code, CouponRejection, DiscountKind, DiscountRule};
pub use forms::{FieldError, FormErrors};
pub use hierarchy::{Hierarchy, TreeNode, TreeView};
pub use listing::{FilterContext, ListingParams, Pagination, Sort, SortKey, SortOrder};
pub use orders::OrderStatus;
pub use variants::{
    check_enough_stock, plan_variants, quantity_available, resolve_price, variant_combinations,
    variant_title, NewVariant, SKU_BASE,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[from] serde_yaml::Error),
    #[error("catalog validation failed: {0}")]
    Validation(String),
}

/// Domain rule violations raised by pure catalog, cart, and order logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("attribute {attribute_id} is not declared on product type as a {role} attribute")]
    UndeclaredAttribute {
        attribute_id: AttributeId,
        role: AttributeRole,
    },
    #[error("value {value_id} does not belong to attribute {attribute_id}")]
    ForeignAttributeValue {
        attribute_id: AttributeId,
        value_id: AttributeValueId,
    },
    #[error("attribute {0} is declared as both a product and a variant attribute")]
    OverlappingAttribute(AttributeId),
    #[error("node {node_id} cannot be placed under {parent_id}: parent chain would form a cycle")]
    HierarchyCycle { node_id: i64, parent_id: i64 },
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),
    #[error("a cart line holds at most {max} units, got {quantity}")]
    QuantityTooLarge { quantity: i64, max: i32 },
    #[error("{title} has not enough stock (requested {requested}, available {available})")]
    InsufficientStock {
        title: String,
        requested: i32,
        available: i32,
    },
    #[error("cannot move order from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
}
