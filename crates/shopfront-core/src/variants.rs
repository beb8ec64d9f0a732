//! Variant generation, price resolution, and stock availability.

use rust_decimal::Decimal;

use crate::catalog::{AttributeAxis, AttributeMap, ProductTypeSchema};
use crate::CoreError;

/// SKU suffix for the first generated variant of a product.
pub const SKU_BASE: i64 = 1337;

/// Separator between value titles in a generated variant title.
const TITLE_SEPARATOR: &str = " / ";

/// A variant ready to be inserted for a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVariant {
    pub sku: String,
    pub title: Option<String>,
    pub attributes: AttributeMap,
}

/// Cartesian product of `axes` in declaration order, last axis varying fastest.
///
/// Returns an empty vector for zero axes or when any axis has no values.
#[must_use]
pub fn variant_combinations(axes: &[AttributeAxis]) -> Vec<AttributeMap> {
    if axes.is_empty() || axes.iter().any(|a| a.values.is_empty()) {
        return Vec::new();
    }

    let mut combos: Vec<AttributeMap> = vec![AttributeMap::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(combos.len() * axis.values.len());
        for combo in &combos {
            for choice in &axis.values {
                let mut extended = combo.clone();
                extended.insert(axis.id, choice.id);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

/// Plan the variants to create for a new product of `schema`.
///
/// SKUs are `"{product_id}-{SKU_BASE + index}"`. A type without variants, or
/// one whose axes produce no combination, gets exactly one default variant.
#[must_use]
pub fn plan_variants(product_id: i64, schema: &ProductTypeSchema) -> Vec<NewVariant> {
    let combos = if schema.has_variants {
        variant_combinations(&schema.variant_attributes)
    } else {
        Vec::new()
    };

    if combos.is_empty() {
        return vec![NewVariant {
            sku: sku_for(product_id, 0),
            title: None,
            attributes: AttributeMap::new(),
        }];
    }

    combos
        .into_iter()
        .enumerate()
        .map(|(index, attributes)| NewVariant {
            sku: sku_for(product_id, index),
            title: Some(variant_title(&schema.variant_attributes, &attributes)),
            attributes,
        })
        .collect()
}

fn sku_for(product_id: i64, index: usize) -> String {
    let offset = i64::try_from(index).unwrap_or(i64::MAX - SKU_BASE);
    format!("{product_id}-{}", SKU_BASE + offset)
}

/// Value titles of `attributes` joined in axis order, e.g. `"Red / XL"`.
#[must_use]
pub fn variant_title(axes: &[AttributeAxis], attributes: &AttributeMap) -> String {
    axes.iter()
        .filter_map(|axis| {
            attributes
                .get(axis.id)
                .and_then(|value_id| axis.value(value_id))
                .map(|choice| choice.title.as_str())
        })
        .collect::<Vec<_>>()
        .join(TITLE_SEPARATOR)
}

/// Effective unit price: a non-zero override wins, otherwise the product price.
#[must_use]
pub fn resolve_price(price_override: Option<Decimal>, product_price: Decimal) -> Decimal {
    match price_override {
        Some(price) if !price.is_zero() => price,
        _ => product_price,
    }
}

/// `max(quantity - allocated, 0)`.
#[must_use]
pub fn quantity_available(quantity: i32, quantity_allocated: i32) -> i32 {
    quantity.saturating_sub(quantity_allocated).max(0)
}

/// Check that `requested` units can be allocated.
///
/// # Errors
///
/// Returns [`CoreError::InvalidQuantity`] for a non-positive request and
/// [`CoreError::InsufficientStock`] when availability is short.
pub fn check_enough_stock(
    title: &str,
    quantity: i32,
    quantity_allocated: i32,
    requested: i32,
) -> Result<(), CoreError> {
    if requested < 1 {
        return Err(CoreError::InvalidQuantity(requested));
    }
    let available = quantity_available(quantity, quantity_allocated);
    if requested > available {
        return Err(CoreError::InsufficientStock {
            title: title.to_string(),
            requested,
            available,
        });
    }
    Ok(())
}
