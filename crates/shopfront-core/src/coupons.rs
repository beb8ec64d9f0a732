//! Discount rules: coupon codes and automatic sales share one shape.
//!
//! A rule with a `code` is redeemed at checkout; a rule without one is a sale
//! scoped to products or categories.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of generated coupon codes.
pub const CODE_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Fixed,
    Percent,
}

impl DiscountKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DiscountKind::Fixed => "fixed",
            DiscountKind::Percent => "percent",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fixed" => Some(DiscountKind::Fixed),
            "percent" => Some(DiscountKind::Percent),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRule {
    pub title: String,
    pub code: Option<String>,
    pub kind: DiscountKind,
    pub value: Decimal,
    /// Maximum number of redemptions; `None` is unlimited.
    pub usage_limit: Option<i32>,
    pub used: i32,
    pub min_amount: Option<Decimal>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub enabled: bool,
}

/// Why a rule cannot be applied right now.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("coupon disabled")]
    Disabled,
    #[error("coupon exhausted")]
    Exhausted,
    #[error("coupon not yet valid")]
    NotYetValid,
    #[error("coupon expired")]
    Expired,
    #[error("order total too low; minimum is {minimum}")]
    OrderTotalTooLow { minimum: Decimal },
}

impl CouponRejection {
    /// Stable machine-readable reason.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::Disabled => "coupon_disabled",
            CouponRejection::Exhausted => "coupon_exhausted",
            CouponRejection::NotYetValid => "coupon_not_yet_valid",
            CouponRejection::Expired => "coupon_expired",
            CouponRejection::OrderTotalTooLow { .. } => "order_total_too_low",
        }
    }
}

impl DiscountRule {
    /// Redemptions left, or `None` when unlimited.
    #[must_use]
    pub fn remaining_uses(&self) -> Option<i32> {
        self.usage_limit.map(|total| total - self.used)
    }

    /// Check whether the rule can be applied at `now` to an order of
    /// `order_total`. Checks run in a fixed order and stop at the first
    /// failure. Pure: the used counter is not touched.
    ///
    /// # Errors
    ///
    /// Returns the first [`CouponRejection`] that applies.
    pub fn check_available(
        &self,
        now: DateTime<Utc>,
        order_total: Option<Decimal>,
    ) -> Result<(), CouponRejection> {
        if !self.enabled {
            return Err(CouponRejection::Disabled);
        }
        if self.remaining_uses().is_some_and(|left| left <= 0) {
            return Err(CouponRejection::Exhausted);
        }
        if self.not_before.is_some_and(|start| now < start) {
            return Err(CouponRejection::NotYetValid);
        }
        if self.not_after.is_some_and(|end| now > end) {
            return Err(CouponRejection::Expired);
        }
        if let (Some(total), Some(minimum)) = (order_total, self.min_amount) {
            if total < minimum {
                return Err(CouponRejection::OrderTotalTooLow { minimum });
            }
        }
        Ok(())
    }

    /// Amount taken off `order_total`, never more than the total itself.
    #[must_use]
    pub fn discount_for(&self, order_total: Decimal) -> Decimal {
        if order_total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let raw = match self.kind {
            DiscountKind::Fixed => self.value,
            DiscountKind::Percent => (order_total * self.value / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        };
        raw.max(Decimal::ZERO).min(order_total)
    }
}

/// Generate a random code of [`CODE_LENGTH`] uppercase ASCII letters.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn rule() -> DiscountRule {
        DiscountRule {
            title: "Spring".to_string(),
            code: Some("SPRINGSPRINGSPRI".to_string()),
            kind: DiscountKind::Fixed,
            value: Decimal::new(500, 2),
            usage_limit: Some(10),
            used: 0,
            min_amount: None,
            not_before: None,
            not_after: None,
            enabled: true,
        }
    }

    #[test]
    fn usable_coupon_passes() {
        assert_eq!(rule().check_available(Utc::now(), None), Ok(()));
    }

    #[test]
    fn disabled_is_checked_first() {
        let coupon = DiscountRule {
            enabled: false,
            used: 10,
            ..rule()
        };
        assert_eq!(
            coupon.check_available(Utc::now(), None),
            Err(CouponRejection::Disabled)
        );
    }

    #[test]
    fn fully_used_coupon_is_exhausted_regardless_of_other_fields() {
        let now = Utc::now();
        let coupon = DiscountRule {
            used: 10,
            not_before: Some(now + Duration::days(1)),
            not_after: Some(now - Duration::days(1)),
            min_amount: Some(Decimal::new(1_000_000, 2)),
            ..rule()
        };
        assert_eq!(
            coupon.check_available(now, Some(Decimal::ONE)),
            Err(CouponRejection::Exhausted)
        );
    }

    #[test]
    fn unlimited_coupon_is_never_exhausted() {
        let coupon = DiscountRule {
            usage_limit: None,
            used: 5_000,
            ..rule()
        };
        assert!(coupon.check_available(Utc::now(), None).is_ok());
        assert_eq!(coupon.remaining_uses(), None);
    }

    #[test]
    fn future_start_is_not_yet_valid() {
        let now = Utc::now();
        let coupon = DiscountRule {
            not_before: Some(now + Duration::hours(2)),
            ..rule()
        };
        assert_eq!(
            coupon.check_available(now, None),
            Err(CouponRejection::NotYetValid)
        );
    }

    #[test]
    fn past_end_is_expired() {
        let now = Utc::now();
        let coupon = DiscountRule {
            not_after: Some(now - Duration::seconds(1)),
            ..rule()
        };
        assert_eq!(
            coupon.check_available(now, None),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn order_total_below_minimum_is_rejected() {
        let coupon = DiscountRule {
            min_amount: Some(Decimal::new(5001, 2)),
            ..rule()
        };
        assert_eq!(
            coupon.check_available(Utc::now(), Some(Decimal::new(5000, 2))),
            Err(CouponRejection::OrderTotalTooLow {
                minimum: Decimal::new(5001, 2)
            })
        );
        assert!(coupon
            .check_available(Utc::now(), Some(Decimal::new(5001, 2)))
            .is_ok());
        assert!(coupon.check_available(Utc::now(), None).is_ok());
    }

    #[test]
    fn fixed_discount_is_capped_at_order_total() {
        let coupon = rule();
        assert_eq!(coupon.discount_for(Decimal::new(2000, 2)), Decimal::new(500, 2));
        assert_eq!(coupon.discount_for(Decimal::new(300, 2)), Decimal::new(300, 2));
    }

    #[test]
    fn percent_discount_rounds_to_cents() {
        let coupon = DiscountRule {
            kind: DiscountKind::Percent,
            value: Decimal::new(15, 0),
            ..rule()
        };
        assert_eq!(coupon.discount_for(Decimal::new(3333, 2)), Decimal::new(500, 2));
    }

    #[test]
    fn generated_codes_are_sixteen_uppercase_letters() {
        let mut rng = rand::rng();
        let code = generate_code(&mut rng);
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn rejection_codes_are_stable() {
        assert_eq!(CouponRejection::Exhausted.code(), "coupon_exhausted");
        assert_eq!(CouponRejection::Exhausted.to_string(), "coupon exhausted");
    }
}
