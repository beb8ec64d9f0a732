//! Request parameters for catalog listings: paging, price range, sort, and
//! per-attribute equality filters.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::catalog::{AttributeAxis, AttributeMap, AttributeValueId};

/// Products per page on category and collection listings.
pub const STOREFRONT_PAGE_SIZE: i64 = 16;
/// Products per page on the public product index.
pub const API_PAGE_SIZE: i64 = 8;
/// Rows per page on dashboard lists.
pub const DASHBOARD_PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Title,
    Price,
    SoldCount,
    Rating,
}

impl SortKey {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "title" => Some(SortKey::Title),
            "price" => Some(SortKey::Price),
            "sold_count" => Some(SortKey::SoldCount),
            "rating" => Some(SortKey::Rating),
            _ => None,
        }
    }

    /// Column on `products` this key sorts by.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            SortKey::Title => "title",
            SortKey::Price => "price",
            SortKey::SoldCount => "sold_count",
            SortKey::Rating => "rating",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sort {
    pub key: SortKey,
    pub order: SortOrder,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            key: SortKey::Title,
            order: SortOrder::Asc,
        }
    }
}

impl Sort {
    /// Parse a listing `sort_by` value. A leading `-` means descending;
    /// unknown keys fall back to title ascending.
    #[must_use]
    pub fn parse_sort_by(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };
        let (name, order) = match raw.strip_prefix('-') {
            Some(rest) => (rest, SortOrder::Desc),
            None => (raw, SortOrder::Asc),
        };
        match SortKey::parse(name) {
            Some(key) => Self { key, order },
            None => Self::default(),
        }
    }

    /// Parse a product-index `order` value of the form `column-asc` or
    /// `column-desc`. Title is not offered on the index.
    #[must_use]
    pub fn parse_order(raw: &str) -> Option<Self> {
        let (name, direction) = raw.rsplit_once('-')?;
        let key = SortKey::parse(name).filter(|k| *k != SortKey::Title)?;
        let order = match direction {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            _ => return None,
        };
        Some(Self { key, order })
    }

    /// Render back into `sort_by` form.
    #[must_use]
    pub fn as_sort_by(self) -> String {
        match self.order {
            SortOrder::Asc => self.key.column().to_string(),
            SortOrder::Desc => format!("-{}", self.key.column()),
        }
    }
}

/// Parsed listing parameters for one category or collection page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingParams {
    pub page: i64,
    /// Exclusive lower bound.
    pub price_from: Option<Decimal>,
    /// Exclusive upper bound.
    pub price_to: Option<Decimal>,
    pub sort: Sort,
    pub attribute_filters: AttributeMap,
}

impl Default for ListingParams {
    fn default() -> Self {
        Self {
            page: 1,
            price_from: None,
            price_to: None,
            sort: Sort::default(),
            attribute_filters: AttributeMap::new(),
        }
    }
}

impl ListingParams {
    /// Read listing parameters from a raw query map.
    ///
    /// `filterable` lists the attributes offered for the current scope; a
    /// query key matching an attribute title becomes an equality filter when
    /// its value is a numeric value id. Anything unparseable is ignored.
    #[must_use]
    pub fn from_query(query: &HashMap<String, String>, filterable: &[AttributeAxis]) -> Self {
        let page = parse_page(query.get("page").map(String::as_str));
        let price_from = parse_price(query.get("price_from"));
        let price_to = parse_price(query.get("price_to"));
        let sort = Sort::parse_sort_by(query.get("sort_by").map(String::as_str));

        let attribute_filters = filterable
            .iter()
            .filter_map(|axis| {
                let raw = query.get(&axis.title)?;
                let value_id = raw.trim().parse::<i64>().ok()?;
                Some((axis.id, AttributeValueId(value_id)))
            })
            .collect();

        Self {
            page,
            price_from,
            price_to,
            sort,
            attribute_filters,
        }
    }

    #[must_use]
    pub fn offset(&self, per_page: i64) -> i64 {
        (self.page - 1).saturating_mul(per_page)
    }

    /// Whether any filter (not paging or sort) is active.
    #[must_use]
    pub fn has_filters(&self) -> bool {
        self.price_from.is_some() || self.price_to.is_some() || !self.attribute_filters.is_empty()
    }
}

/// What a listing page echoes back about its filters: the active
/// selections, the sort in effect, and whether anything narrows the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterContext {
    /// Attribute title to selected value id.
    pub selected: BTreeMap<String, i64>,
    pub price_from: Option<Decimal>,
    pub price_to: Option<Decimal>,
    pub sort_by: String,
    pub descending: bool,
    pub has_filters: bool,
}

impl FilterContext {
    #[must_use]
    pub fn new(params: &ListingParams, filterable: &[AttributeAxis]) -> Self {
        let selected = filterable
            .iter()
            .filter_map(|axis| {
                let value = params.attribute_filters.get(axis.id)?;
                Some((axis.title.clone(), value.0))
            })
            .collect();
        Self {
            selected,
            price_from: params.price_from,
            price_to: params.price_to,
            sort_by: params.sort.as_sort_by(),
            descending: params.sort.order == SortOrder::Desc,
            has_filters: params.has_filters(),
        }
    }
}

/// Parse a 1-based page number, clamping anything invalid to 1.
#[must_use]
pub fn parse_page(raw: Option<&str>) -> i64 {
    raw.and_then(|p| p.trim().parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

fn parse_price(raw: Option<&String>) -> Option<Decimal> {
    raw.and_then(|p| Decimal::from_str(p.trim()).ok())
}

/// Page metadata returned alongside listing results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    #[must_use]
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let per_page = per_page.max(1);
        let pages = (total.max(0) + per_page - 1) / per_page;
        Self {
            page,
            per_page,
            total,
            pages,
        }
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeChoice, AttributeId};

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn color_axis() -> AttributeAxis {
        AttributeAxis {
            id: AttributeId(3),
            title: "Color".to_string(),
            values: vec![AttributeChoice {
                id: AttributeValueId(30),
                title: "Red".to_string(),
            }],
        }
    }

    #[test]
    fn defaults_when_query_is_empty() {
        let params = ListingParams::from_query(&HashMap::new(), &[]);
        assert_eq!(params, ListingParams::default());
        assert!(!params.has_filters());
    }

    #[test]
    fn price_range_and_descending_sort() {
        let params = ListingParams::from_query(
            &query(&[("price_from", "10"), ("price_to", "50"), ("sort_by", "-price")]),
            &[],
        );
        assert_eq!(params.price_from, Some(Decimal::new(10, 0)));
        assert_eq!(params.price_to, Some(Decimal::new(50, 0)));
        assert_eq!(
            params.sort,
            Sort {
                key: SortKey::Price,
                order: SortOrder::Desc
            }
        );
        assert!(params.has_filters());
    }

    #[test]
    fn unknown_sort_key_falls_back_to_title_ascending() {
        assert_eq!(Sort::parse_sort_by(Some("-description")), Sort::default());
        assert_eq!(Sort::parse_sort_by(Some("id")), Sort::default());
        assert_eq!(Sort::parse_sort_by(None), Sort::default());
    }

    #[test]
    fn every_allowed_sort_key_parses() {
        for key in ["title", "price", "sold_count", "rating"] {
            let sort = Sort::parse_sort_by(Some(key));
            assert_eq!(sort.key.column(), key);
            assert_eq!(sort.as_sort_by(), key);
        }
    }

    #[test]
    fn attribute_filters_are_keyed_by_title() {
        let params = ListingParams::from_query(
            &query(&[("Color", "30"), ("Size", "40")]),
            &[color_axis()],
        );
        assert_eq!(
            params.attribute_filters.get(AttributeId(3)),
            Some(AttributeValueId(30))
        );
        assert_eq!(params.attribute_filters.len(), 1);
    }

    #[test]
    fn non_numeric_attribute_value_is_ignored() {
        let params = ListingParams::from_query(&query(&[("Color", "red")]), &[color_axis()]);
        assert!(params.attribute_filters.is_empty());
    }

    #[test]
    fn invalid_page_and_price_are_ignored() {
        let params =
            ListingParams::from_query(&query(&[("page", "-3"), ("price_from", "cheap")]), &[]);
        assert_eq!(params.page, 1);
        assert!(params.price_from.is_none());
        assert_eq!(parse_page(Some("3")), 3);
    }

    #[test]
    fn offset_uses_page_size() {
        let params = ListingParams {
            page: 3,
            ..ListingParams::default()
        };
        assert_eq!(params.offset(STOREFRONT_PAGE_SIZE), 32);
    }

    #[test]
    fn index_order_accepts_column_and_direction() {
        assert_eq!(
            Sort::parse_order("price-desc"),
            Some(Sort {
                key: SortKey::Price,
                order: SortOrder::Desc
            })
        );
        assert_eq!(
            Sort::parse_order("sold_count-asc"),
            Some(Sort {
                key: SortKey::SoldCount,
                order: SortOrder::Asc
            })
        );
        assert_eq!(Sort::parse_order("title-asc"), None);
        assert_eq!(Sort::parse_order("price-sideways"), None);
        assert_eq!(Sort::parse_order("price"), None);
    }

    #[test]
    fn filter_context_echoes_selections_and_sort() {
        let axes = [color_axis()];
        let params = ListingParams::from_query(
            &query(&[("Color", "30"), ("price_to", "50"), ("sort_by", "-rating")]),
            &axes,
        );
        let context = FilterContext::new(&params, &axes);
        assert_eq!(context.selected.get("Color"), Some(&30));
        assert_eq!(context.price_from, None);
        assert_eq!(context.price_to, Some(Decimal::new(50, 0)));
        assert_eq!(context.sort_by, "-rating");
        assert!(context.descending);
        assert!(context.has_filters);
    }

    #[test]
    fn filter_context_without_filters() {
        let context = FilterContext::new(&ListingParams::default(), &[color_axis()]);
        assert!(context.selected.is_empty());
        assert_eq!(context.sort_by, "title");
        assert!(!context.descending);
        assert!(!context.has_filters);
    }

    #[test]
    fn pagination_rounds_pages_up() {
        let p = Pagination::new(1, 8, 17);
        assert_eq!(p.pages, 3);
        assert!(p.has_next());
        assert_eq!(Pagination::new(1, 8, 0).pages, 0);
    }
}
