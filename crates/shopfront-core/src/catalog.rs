//! Typed attribute identifiers and the product-type attribute schema.
//!
//! Products and variants carry an [`AttributeMap`] (attribute id to chosen
//! value id). Every write is validated against the owning
//! [`ProductTypeSchema`] so that keys are declared attributes of the right
//! role and values belong to their attribute.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeValueId(pub i64);

impl std::fmt::Display for AttributeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for AttributeValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an attribute is informational on the product or combinatorial on
/// its variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeRole {
    Product,
    Variant,
}

impl AttributeRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeRole::Product => "product",
            AttributeRole::Variant => "variant",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "product" => Some(AttributeRole::Product),
            "variant" => Some(AttributeRole::Variant),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One choice on an attribute axis, e.g. "Red" on "Color".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChoice {
    pub id: AttributeValueId,
    pub title: String,
}

/// A named attribute axis with its values in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeAxis {
    pub id: AttributeId,
    pub title: String,
    pub values: Vec<AttributeChoice>,
}

impl AttributeAxis {
    #[must_use]
    pub fn value(&self, value_id: AttributeValueId) -> Option<&AttributeChoice> {
        self.values.iter().find(|v| v.id == value_id)
    }
}

/// Attribute id to chosen value id.
///
/// Ordered by attribute id so that serialized output and equality are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<AttributeId, AttributeValueId>);

impl AttributeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        attribute_id: AttributeId,
        value_id: AttributeValueId,
    ) -> Option<AttributeValueId> {
        self.0.insert(attribute_id, value_id)
    }

    #[must_use]
    pub fn get(&self, attribute_id: AttributeId) -> Option<AttributeValueId> {
        self.0.get(&attribute_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeId, AttributeValueId)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(AttributeId, AttributeValueId)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (AttributeId, AttributeValueId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A product type together with its resolved attribute axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTypeSchema {
    pub id: i64,
    pub title: String,
    pub has_variants: bool,
    pub is_shipping_required: bool,
    pub product_attributes: Vec<AttributeAxis>,
    pub variant_attributes: Vec<AttributeAxis>,
}

impl ProductTypeSchema {
    /// Build a schema, rejecting an attribute that appears in both roles.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OverlappingAttribute`] when the product and
    /// variant attribute sets intersect.
    pub fn new(
        id: i64,
        title: impl Into<String>,
        has_variants: bool,
        is_shipping_required: bool,
        product_attributes: Vec<AttributeAxis>,
        variant_attributes: Vec<AttributeAxis>,
    ) -> Result<Self, CoreError> {
        ensure_disjoint(
            product_attributes.iter().map(|a| a.id),
            variant_attributes.iter().map(|a| a.id),
        )?;
        Ok(Self {
            id,
            title: title.into(),
            has_variants,
            is_shipping_required,
            product_attributes,
            variant_attributes,
        })
    }

    #[must_use]
    pub fn axes(&self, role: AttributeRole) -> &[AttributeAxis] {
        match role {
            AttributeRole::Product => &self.product_attributes,
            AttributeRole::Variant => &self.variant_attributes,
        }
    }

    /// Check that every entry of `map` names a declared attribute of `role`
    /// and a value belonging to that attribute.
    ///
    /// Missing attributes are allowed; a product may leave an informational
    /// attribute unset.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UndeclaredAttribute`] or
    /// [`CoreError::ForeignAttributeValue`] on the first offending entry.
    pub fn validate(&self, role: AttributeRole, map: &AttributeMap) -> Result<(), CoreError> {
        let axes = self.axes(role);
        for (attribute_id, value_id) in map.iter() {
            let axis = axes
                .iter()
                .find(|a| a.id == attribute_id)
                .ok_or(CoreError::UndeclaredAttribute { attribute_id, role })?;
            if axis.value(value_id).is_none() {
                return Err(CoreError::ForeignAttributeValue {
                    attribute_id,
                    value_id,
                });
            }
        }
        Ok(())
    }

    /// Resolve `map` into `(attribute title, value title)` pairs in axis
    /// declaration order. Entries that do not resolve are skipped.
    #[must_use]
    pub fn describe(&self, role: AttributeRole, map: &AttributeMap) -> Vec<(String, String)> {
        self.axes(role)
            .iter()
            .filter_map(|axis| {
                let value_id = map.get(axis.id)?;
                let choice = axis.value(value_id)?;
                Some((axis.title.clone(), choice.title.clone()))
            })
            .collect()
    }
}

/// Reject any attribute id present in both sets.
///
/// # Errors
///
/// Returns [`CoreError::OverlappingAttribute`] naming the first shared id.
pub fn ensure_disjoint(
    product_ids: impl IntoIterator<Item = AttributeId>,
    variant_ids: impl IntoIterator<Item = AttributeId>,
) -> Result<(), CoreError> {
    let product: HashSet<AttributeId> = product_ids.into_iter().collect();
    for id in variant_ids {
        if product.contains(&id) {
            return Err(CoreError::OverlappingAttribute(id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(id: i64, title: &str, values: &[(i64, &str)]) -> AttributeAxis {
        AttributeAxis {
            id: AttributeId(id),
            title: title.to_string(),
            values: values
                .iter()
                .map(|(vid, t)| AttributeChoice {
                    id: AttributeValueId(*vid),
                    title: (*t).to_string(),
                })
                .collect(),
        }
    }

    fn tshirt() -> ProductTypeSchema {
        ProductTypeSchema::new(
            1,
            "T-Shirt",
            true,
            true,
            vec![axis(1, "Color", &[(10, "Red"), (11, "Blue")])],
            vec![axis(2, "Size", &[(20, "S"), (21, "M")])],
        )
        .expect("disjoint schema")
    }

    #[test]
    fn overlapping_attribute_sets_are_rejected() {
        let shared = axis(3, "Brand", &[(30, "Acme")]);
        let err = ProductTypeSchema::new(1, "Mug", false, true, vec![shared.clone()], vec![shared])
            .unwrap_err();
        assert_eq!(err, CoreError::OverlappingAttribute(AttributeId(3)));
    }

    #[test]
    fn validate_accepts_declared_attribute_and_value() {
        let schema = tshirt();
        let map: AttributeMap = [(AttributeId(1), AttributeValueId(11))].into_iter().collect();
        assert!(schema.validate(AttributeRole::Product, &map).is_ok());
    }

    #[test]
    fn validate_rejects_variant_attribute_on_product() {
        let schema = tshirt();
        let map: AttributeMap = [(AttributeId(2), AttributeValueId(20))].into_iter().collect();
        assert_eq!(
            schema.validate(AttributeRole::Product, &map),
            Err(CoreError::UndeclaredAttribute {
                attribute_id: AttributeId(2),
                role: AttributeRole::Product,
            })
        );
    }

    #[test]
    fn validate_rejects_value_from_another_attribute() {
        let schema = tshirt();
        let map: AttributeMap = [(AttributeId(2), AttributeValueId(10))].into_iter().collect();
        assert_eq!(
            schema.validate(AttributeRole::Variant, &map),
            Err(CoreError::ForeignAttributeValue {
                attribute_id: AttributeId(2),
                value_id: AttributeValueId(10),
            })
        );
    }

    #[test]
    fn describe_follows_axis_order() {
        let schema = tshirt();
        let map: AttributeMap = [(AttributeId(2), AttributeValueId(21))].into_iter().collect();
        assert_eq!(
            schema.describe(AttributeRole::Variant, &map),
            vec![("Size".to_string(), "M".to_string())]
        );
    }

    #[test]
    fn attribute_map_serializes_as_json_object() {
        let map: AttributeMap = [(AttributeId(4), AttributeValueId(9))].into_iter().collect();
        let json = serde_json::to_string(&map).expect("serialize");
        assert_eq!(json, r#"{"4":9}"#);
    }
}
