//! Hand-written admin forms, one per dashboard entity.
//!
//! Each form deserializes from the request body and `validate` returns a
//! normalized copy (trimmed strings, deduplicated id lists) or every field
//! error found. Checks that need stored state, such as attribute maps against
//! a product type or hierarchy cycles, run in the persistence layer.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{ensure_disjoint, AttributeId, AttributeMap};
use crate::coupons::DiscountKind;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,64}$").expect("valid username regex"));
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
});
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug regex"));
static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{4,32}$").expect("valid coupon code regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 ()-]{4,31}$").expect("valid phone regex"));

const MAX_TITLE_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every field error found on one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("invalid form: {}", summary(.fields))]
pub struct FormErrors {
    pub fields: Vec<FieldError>,
}

fn summary(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl FormErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(value)` when no errors were recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` when any field failed.
    pub fn finish<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// Lowercase, hyphen-separated slug containing only `[a-z0-9-]`.
#[must_use]
pub fn slugify(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn check_title(errors: &mut FormErrors, field: &str, value: &str) {
    if value.is_empty() {
        errors.push(field, "is required");
    } else if value.chars().count() > MAX_TITLE_LEN {
        errors.push(field, format!("must be at most {MAX_TITLE_LEN} characters"));
    }
}

fn trim_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn dedup_ids(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn default_true() -> bool {
    true
}

fn default_rating() -> Decimal {
    Decimal::new(5, 0)
}

// ---------------------------------------------------------------------------
// Catalog forms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductForm {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default = "default_true")]
    pub on_sale: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_rating")]
    pub rating: Decimal,
    #[serde(default)]
    pub sold_count: i32,
    #[serde(default)]
    pub review_count: i32,
    pub category_id: Option<i64>,
    pub product_type_id: i64,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl ProductForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        check_title(&mut errors, "title", &self.title);
        if self.price.is_sign_negative() {
            errors.push("price", "must not be negative");
        }
        if self.rating < Decimal::ZERO || self.rating > Decimal::new(5, 0) {
            errors.push("rating", "must be between 0 and 5");
        }
        if self.sold_count < 0 {
            errors.push("sold_count", "must not be negative");
        }
        if self.review_count < 0 {
            errors.push("review_count", "must not be negative");
        }
        errors.finish(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariantForm {
    pub sku: String,
    pub title: Option<String>,
    pub price_override: Option<Decimal>,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl VariantForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.sku = self.sku.trim().to_string();
        self.title = trim_opt(self.title);
        if self.sku.is_empty() {
            errors.push("sku", "is required");
        } else if self.sku.len() > 64 {
            errors.push("sku", "must be at most 64 characters");
        }
        if self.price_override.is_some_and(|p| p.is_sign_negative()) {
            errors.push("price_override", "must not be negative");
        }
        if self.quantity < 0 {
            errors.push("quantity", "must not be negative");
        }
        errors.finish(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryForm {
    pub title: String,
    pub parent_id: Option<i64>,
    pub background_img: Option<String>,
}

impl CategoryForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        self.background_img = trim_opt(self.background_img);
        check_title(&mut errors, "title", &self.title);
        errors.finish(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionForm {
    pub title: String,
    pub background_img: Option<String>,
    #[serde(default)]
    pub product_ids: Vec<i64>,
}

impl CollectionForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        self.background_img = trim_opt(self.background_img);
        self.product_ids = dedup_ids(self.product_ids);
        check_title(&mut errors, "title", &self.title);
        errors.finish(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductTypeForm {
    pub title: String,
    #[serde(default = "default_true")]
    pub has_variants: bool,
    #[serde(default)]
    pub is_shipping_required: bool,
    #[serde(default)]
    pub product_attributes: Vec<i64>,
    #[serde(default)]
    pub variant_attributes: Vec<i64>,
}

impl ProductTypeForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        self.product_attributes = dedup_ids(self.product_attributes);
        self.variant_attributes = dedup_ids(self.variant_attributes);
        check_title(&mut errors, "title", &self.title);
        if let Err(e) = ensure_disjoint(
            self.product_attributes.iter().copied().map(AttributeId),
            self.variant_attributes.iter().copied().map(AttributeId),
        ) {
            errors.push("variant_attributes", e.to_string());
        }
        if !self.has_variants && !self.variant_attributes.is_empty() {
            errors.push(
                "variant_attributes",
                "must be empty when the type has no variants",
            );
        }
        errors.finish(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeForm {
    pub title: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub product_type_ids: Vec<i64>,
}

impl AttributeForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        self.product_type_ids = dedup_ids(self.product_type_ids);
        check_title(&mut errors, "title", &self.title);

        let mut seen = HashSet::new();
        let mut values = Vec::with_capacity(self.values.len());
        for raw in self.values {
            let value = raw.trim().to_string();
            if value.is_empty() {
                errors.push("values", "must not contain blank entries");
            } else if !seen.insert(value.to_lowercase()) {
                errors.push("values", format!("duplicate value '{value}'"));
            } else {
                values.push(value);
            }
        }
        self.values = values;
        errors.finish(self)
    }
}

// ---------------------------------------------------------------------------
// Discount forms
// ---------------------------------------------------------------------------

fn check_discount_terms(
    errors: &mut FormErrors,
    kind: DiscountKind,
    value: Decimal,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
) {
    if value <= Decimal::ZERO {
        errors.push("value", "must be greater than zero");
    } else if kind == DiscountKind::Percent && value > Decimal::ONE_HUNDRED {
        errors.push("value", "percent discounts must not exceed 100");
    }
    if let (Some(start), Some(end)) = (not_before, not_after) {
        if start > end {
            errors.push("not_after", "must not be earlier than not_before");
        }
    }
}

/// Coupon (voucher) redeemed by code at checkout. A missing code is
/// generated on create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CouponForm {
    pub title: String,
    pub code: Option<String>,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub usage_limit: Option<i32>,
    pub min_amount: Option<Decimal>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl CouponForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        self.code = trim_opt(self.code).map(|c| c.to_uppercase());
        check_title(&mut errors, "title", &self.title);
        if let Some(ref code) = self.code {
            if !CODE_RE.is_match(code) {
                errors.push("code", "must be 4-32 letters or digits");
            }
        }
        check_discount_terms(
            &mut errors,
            self.kind,
            self.value,
            self.not_before,
            self.not_after,
        );
        if self.usage_limit.is_some_and(|n| n < 1) {
            errors.push("usage_limit", "must be at least 1");
        }
        if self.min_amount.is_some_and(|m| m.is_sign_negative()) {
            errors.push("min_amount", "must not be negative");
        }
        errors.finish(self)
    }
}

/// Automatic discount scoped to products and categories, without a code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaleForm {
    pub title: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub product_ids: Vec<i64>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

impl SaleForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        self.product_ids = dedup_ids(self.product_ids);
        self.category_ids = dedup_ids(self.category_ids);
        check_title(&mut errors, "title", &self.title);
        check_discount_terms(
            &mut errors,
            self.kind,
            self.value,
            self.not_before,
            self.not_after,
        );
        errors.finish(self)
    }
}

// ---------------------------------------------------------------------------
// Site and account forms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserForm {
    pub username: String,
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        if !USERNAME_RE.is_match(&self.username) {
            errors.push(
                "username",
                "must be 3-64 characters of letters, digits, '_', '.', or '-'",
            );
        }
        if !EMAIL_RE.is_match(&self.email) {
            errors.push("email", "must be a valid email address");
        }
        errors.finish(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuPlacement {
    Top,
    Bottom,
}

impl MenuPlacement {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MenuPlacement::Top => "top",
            MenuPlacement::Bottom => "bottom",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "top" => Some(MenuPlacement::Top),
            "bottom" => Some(MenuPlacement::Bottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MenuItemForm {
    pub title: String,
    #[serde(default)]
    pub position: i32,
    pub menu: MenuPlacement,
    pub parent_id: Option<i64>,
    pub url: Option<String>,
    pub category_id: Option<i64>,
    pub collection_id: Option<i64>,
    pub page_id: Option<i64>,
}

impl MenuItemForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        self.url = trim_opt(self.url);
        check_title(&mut errors, "title", &self.title);
        let targets = [
            self.url.is_some(),
            self.category_id.is_some(),
            self.collection_id.is_some(),
            self.page_id.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();
        if targets > 1 {
            errors.push(
                "url",
                "link to at most one of url, category, collection, or page",
            );
        }
        if self.position < 0 {
            errors.push("position", "must not be negative");
        }
        errors.finish(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageForm {
    pub title: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_true")]
    pub is_visible: bool,
}

impl PageForm {
    /// Validates and fills `slug` from the title when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.title = self.title.trim().to_string();
        check_title(&mut errors, "title", &self.title);
        let slug = trim_opt(self.slug).unwrap_or_else(|| slugify(&self.title));
        if !SLUG_RE.is_match(&slug) {
            errors.push("slug", "must be lowercase letters, digits, and hyphens");
        }
        self.slug = Some(slug);
        errors.finish(self)
    }
}

// ---------------------------------------------------------------------------
// Addresses and site settings
// ---------------------------------------------------------------------------

/// A shipping address. The owning user comes from the request, not the body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressForm {
    pub contact_name: String,
    pub contact_phone: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub district: String,
    pub address: String,
}

impl AddressForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.contact_name = self.contact_name.trim().to_string();
        self.contact_phone = self.contact_phone.trim().to_string();
        self.province = self.province.trim().to_string();
        self.city = self.city.trim().to_string();
        self.district = self.district.trim().to_string();
        self.address = self.address.trim().to_string();

        check_title(&mut errors, "contact_name", &self.contact_name);
        if !PHONE_RE.is_match(&self.contact_phone) {
            errors.push("contact_phone", "must be 5-32 digits, spaces, '(', ')' or '-'");
        }
        if self.address.is_empty() {
            errors.push("address", "is required");
        }
        errors.finish(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteSettingsForm {
    pub header_text: String,
    #[serde(default)]
    pub description: String,
}

impl SiteSettingsForm {
    /// # Errors
    ///
    /// Returns [`FormErrors`] listing each invalid field.
    pub fn validate(mut self) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();
        self.header_text = self.header_text.trim().to_string();
        self.description = self.description.trim().to_string();
        check_title(&mut errors, "header_text", &self.header_text);
        errors.finish(self)
    }
}

#[cfg(test)]
#[path = "forms_test.rs"]
mod tests;
