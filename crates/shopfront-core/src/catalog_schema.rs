//! YAML seed catalog: attributes, categories, collections, and product types
//! with their sample products.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::hierarchy::{Hierarchy, TreeNode};
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSeed {
    pub title: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySeed {
    pub title: String,
    pub parent: Option<String>,
    pub background_img: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSeed {
    pub title: String,
    pub background_img: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSeed {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub is_featured: bool,
    /// Informational attribute title to value title.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Collection titles this product belongs to.
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductTypeSeed {
    pub title: String,
    pub category: String,
    #[serde(default = "default_true")]
    pub has_variants: bool,
    #[serde(default = "default_true")]
    pub is_shipping_required: bool,
    #[serde(default)]
    pub product_attributes: Vec<String>,
    #[serde(default)]
    pub variant_attributes: Vec<String>,
    /// Price override per variant value title, e.g. a larger box size.
    #[serde(default)]
    pub variant_prices: HashMap<String, Decimal>,
    #[serde(default = "default_stock")]
    pub stock_per_variant: i32,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

fn default_true() -> bool {
    true
}

fn default_stock() -> i32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSchema {
    #[serde(default)]
    pub attributes: Vec<AttributeSeed>,
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub collections: Vec<CollectionSeed>,
    #[serde(default)]
    pub product_types: Vec<ProductTypeSeed>,
}

/// Load and validate the seed catalog from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog_schema(path: &Path) -> Result<CatalogSchema, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_catalog_schema(&content)
}

/// Parse and validate a seed catalog from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the text cannot be parsed or fails validation.
pub fn parse_catalog_schema(content: &str) -> Result<CatalogSchema, ConfigError> {
    let schema: CatalogSchema = serde_yaml::from_str(content)?;
    validate_catalog_schema(&schema)?;
    Ok(schema)
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation(message)
}

struct SeedNode {
    id: i64,
    parent: Option<i64>,
}

impl TreeNode for SeedNode {
    fn node_id(&self) -> i64 {
        self.id
    }
    fn parent_id(&self) -> Option<i64> {
        self.parent
    }
}

fn validate_catalog_schema(schema: &CatalogSchema) -> Result<(), ConfigError> {
    let mut attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
    for attribute in &schema.attributes {
        if attribute.title.trim().is_empty() {
            return Err(invalid("attribute title must be non-empty".to_string()));
        }
        let mut values = HashSet::new();
        for value in &attribute.values {
            if !values.insert(value.as_str()) {
                return Err(invalid(format!(
                    "attribute '{}' lists value '{value}' twice",
                    attribute.title
                )));
            }
        }
        if attributes.insert(attribute.title.as_str(), values).is_some() {
            return Err(invalid(format!(
                "duplicate attribute: '{}'",
                attribute.title
            )));
        }
    }

    validate_categories(&schema.categories)?;
    let categories: HashSet<&str> = schema.categories.iter().map(|c| c.title.as_str()).collect();
    let collections: HashSet<&str> = schema
        .collections
        .iter()
        .map(|c| c.title.as_str())
        .collect();

    let mut type_titles = HashSet::new();
    for product_type in &schema.product_types {
        if !type_titles.insert(product_type.title.as_str()) {
            return Err(invalid(format!(
                "duplicate product type: '{}'",
                product_type.title
            )));
        }
        if !categories.contains(product_type.category.as_str()) {
            return Err(invalid(format!(
                "product type '{}' references unknown category '{}'",
                product_type.title, product_type.category
            )));
        }
        for title in product_type
            .product_attributes
            .iter()
            .chain(&product_type.variant_attributes)
        {
            if !attributes.contains_key(title.as_str()) {
                return Err(invalid(format!(
                    "product type '{}' references unknown attribute '{title}'",
                    product_type.title
                )));
            }
        }
        if let Some(shared) = product_type
            .product_attributes
            .iter()
            .find(|t| product_type.variant_attributes.contains(t))
        {
            return Err(invalid(format!(
                "product type '{}' declares '{shared}' as both product and variant attribute",
                product_type.title
            )));
        }
        if !product_type.has_variants && !product_type.variant_attributes.is_empty() {
            return Err(invalid(format!(
                "product type '{}' has variant attributes but has_variants is false",
                product_type.title
            )));
        }
        if product_type.stock_per_variant < 0 {
            return Err(invalid(format!(
                "product type '{}' has negative stock_per_variant",
                product_type.title
            )));
        }

        let variant_values: HashSet<&str> = product_type
            .variant_attributes
            .iter()
            .filter_map(|t| attributes.get(t.as_str()))
            .flatten()
            .copied()
            .collect();
        for (value, price) in &product_type.variant_prices {
            if !variant_values.contains(value.as_str()) {
                return Err(invalid(format!(
                    "product type '{}' prices unknown variant value '{value}'",
                    product_type.title
                )));
            }
            if price.is_sign_negative() {
                return Err(invalid(format!(
                    "product type '{}' has a negative price for '{value}'",
                    product_type.title
                )));
            }
        }

        for product in &product_type.products {
            validate_product(product_type, product, &attributes, &collections)?;
        }
    }

    Ok(())
}

fn validate_categories(categories: &[CategorySeed]) -> Result<(), ConfigError> {
    let mut ids: HashMap<&str, i64> = HashMap::new();
    for (position, category) in categories.iter().enumerate() {
        if category.title.trim().is_empty() {
            return Err(invalid("category title must be non-empty".to_string()));
        }
        let id = i64::try_from(position).map_err(|e| invalid(e.to_string()))?;
        if ids.insert(category.title.as_str(), id).is_some() {
            return Err(invalid(format!("duplicate category: '{}'", category.title)));
        }
    }

    let mut nodes = Vec::with_capacity(categories.len());
    for category in categories {
        let parent = match &category.parent {
            Some(title) => Some(*ids.get(title.as_str()).ok_or_else(|| {
                invalid(format!(
                    "category '{}' references unknown parent '{title}'",
                    category.title
                ))
            })?),
            None => None,
        };
        nodes.push(SeedNode {
            id: ids[category.title.as_str()],
            parent,
        });
    }

    let tree = Hierarchy::new(nodes);
    for category in categories {
        let id = ids[category.title.as_str()];
        let parent = tree.get(id).and_then(TreeNode::parent_id);
        if let Some(parent) = parent {
            if tree.ancestors(parent).contains(&id) || parent == id {
                return Err(invalid(format!(
                    "category '{}' is part of a parent cycle",
                    category.title
                )));
            }
        }
    }
    Ok(())
}

fn validate_product(
    product_type: &ProductTypeSeed,
    product: &ProductSeed,
    attributes: &HashMap<&str, HashSet<&str>>,
    collections: &HashSet<&str>,
) -> Result<(), ConfigError> {
    if product.title.trim().is_empty() {
        return Err(invalid(format!(
            "product type '{}' has a product with an empty title",
            product_type.title
        )));
    }
    if product.price.is_sign_negative() {
        return Err(invalid(format!(
            "product '{}' has a negative price",
            product.title
        )));
    }
    for (attribute, value) in &product.attributes {
        if !product_type.product_attributes.contains(attribute) {
            return Err(invalid(format!(
                "product '{}' sets '{attribute}', which is not a product attribute of '{}'",
                product.title, product_type.title
            )));
        }
        let known = attributes
            .get(attribute.as_str())
            .is_some_and(|values| values.contains(value.as_str()));
        if !known {
            return Err(invalid(format!(
                "product '{}' uses unknown value '{value}' for '{attribute}'",
                product.title
            )));
        }
    }
    for collection in &product.collections {
        if !collections.contains(collection.as_str()) {
            return Err(invalid(format!(
                "product '{}' references unknown collection '{collection}'",
                product.title
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
attributes:
  - title: Color
    values: [Blue, White]
  - title: Size
    values: [S, M, L]
  - title: Box Size
    values: [100g, 500g]
categories:
  - title: Apparel
  - title: Groceries
  - title: Coffees
    parent: Groceries
collections:
  - title: Summer collection
product_types:
  - title: T-Shirt
    category: Apparel
    product_attributes: [Color]
    variant_attributes: [Size]
    products:
      - title: Plain Tee
        price: '19.99'
        attributes:
          Color: Blue
        collections: [Summer collection]
  - title: Coffee
    category: Coffees
    variant_attributes: [Box Size]
    variant_prices:
      500g: '24.00'
    products:
      - title: House Blend
        price: '9.50'
";

    #[test]
    fn sample_catalog_parses() {
        let schema = parse_catalog_schema(SAMPLE).expect("valid catalog");
        assert_eq!(schema.attributes.len(), 3);
        assert_eq!(schema.product_types.len(), 2);
        assert_eq!(schema.product_types[0].stock_per_variant, 20);
        assert!(schema.product_types[0].has_variants);
        assert_eq!(
            schema.product_types[1].variant_prices.get("500g"),
            Some(&Decimal::new(2400, 2))
        );
    }

    #[test]
    fn unknown_category_is_rejected() {
        let yaml = SAMPLE.replace("category: Coffees", "category: Teas");
        let err = parse_catalog_schema(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("unknown category")));
    }

    #[test]
    fn overlapping_attribute_roles_are_rejected() {
        let yaml = SAMPLE.replace("variant_attributes: [Size]", "variant_attributes: [Color]");
        let err = parse_catalog_schema(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("both product and variant")));
    }

    #[test]
    fn category_cycle_is_rejected() {
        let yaml = SAMPLE.replace(
            "  - title: Groceries\n",
            "  - title: Groceries\n    parent: Coffees\n",
        );
        let err = parse_catalog_schema(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("cycle")));
    }

    #[test]
    fn product_value_must_exist() {
        let yaml = SAMPLE.replace("Color: Blue", "Color: Green");
        let err = parse_catalog_schema(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("unknown value")));
    }

    #[test]
    fn variant_price_for_unknown_value_is_rejected() {
        let yaml = SAMPLE.replace("500g: '24.00'", "1kg: '40.00'");
        assert!(parse_catalog_schema(&yaml).is_err());
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = parse_catalog_schema("attributes: [").unwrap_err();
        assert!(matches!(err, ConfigError::CatalogFileParse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_catalog_schema(Path::new("/nonexistent/catalog.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::CatalogFileIo { .. }));
    }
}
