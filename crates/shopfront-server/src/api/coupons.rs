//! GET /api/v1/coupons/{code}: can this coupon be used right now?

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopfront_core::{DiscountKind, DiscountRule};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct CouponQuery {
    pub order_total: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CouponCheck {
    code: String,
    title: String,
    kind: DiscountKind,
    value: Decimal,
    available: bool,
    reason: Option<&'static str>,
    message: Option<String>,
    /// Amount the coupon would take off `order_total`, when one was given.
    discount: Option<Decimal>,
}

fn check(code: String, rule: &DiscountRule, order_total: Option<Decimal>) -> CouponCheck {
    let verdict = rule.check_available(Utc::now(), order_total);
    let discount = match (&verdict, order_total) {
        (Ok(()), Some(total)) => Some(rule.discount_for(total)),
        _ => None,
    };
    CouponCheck {
        code,
        title: rule.title.clone(),
        kind: rule.kind,
        value: rule.value,
        available: verdict.is_ok(),
        reason: verdict.as_ref().err().map(|r| r.code()),
        message: verdict.err().map(|r| r.to_string()),
        discount,
    }
}

pub(super) async fn check_coupon(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(code): Path<String>,
    Query(query): Query<CouponQuery>,
) -> Result<Json<ApiResponse<CouponCheck>>, ApiError> {
    let rid = &req_id.0;
    let order_total = match query.order_total.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(Decimal::from_str(raw).map_err(|_| {
            ApiError::new(
                rid,
                "validation_error",
                format!("order_total must be a decimal amount, got '{raw}'"),
            )
        })?),
    };

    let row = shopfront_db::get_coupon_by_code(&state.pool, &code)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::not_found(rid, "coupon"))?;
    let rule = row.to_rule().map_err(|e| map_db_error(rid.clone(), &e))?;
    let code = row.code.unwrap_or(code);

    Ok(Json(ApiResponse {
        data: check(code, &rule, order_total),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(usage_limit: Option<i32>, used: i32) -> DiscountRule {
        DiscountRule {
            title: "Ten off".to_string(),
            code: Some("TENOFF".to_string()),
            kind: DiscountKind::Fixed,
            value: Decimal::new(10, 0),
            usage_limit,
            used,
            min_amount: Some(Decimal::new(50, 0)),
            not_before: None,
            not_after: None,
            enabled: true,
        }
    }

    #[test]
    fn available_coupon_reports_discount() {
        let result = check("TENOFF".to_string(), &rule(None, 0), Some(Decimal::new(80, 0)));
        assert!(result.available);
        assert_eq!(result.reason, None);
        assert_eq!(result.discount, Some(Decimal::new(10, 0)));
    }

    #[test]
    fn exhausted_coupon_reports_reason() {
        let result = check("TENOFF".to_string(), &rule(Some(3), 3), Some(Decimal::new(80, 0)));
        assert!(!result.available);
        assert_eq!(result.reason, Some("coupon_exhausted"));
        assert_eq!(result.discount, None);
    }

    #[test]
    fn low_total_is_rejected() {
        let result = check("TENOFF".to_string(), &rule(None, 0), Some(Decimal::new(20, 0)));
        assert_eq!(result.reason, Some("order_total_too_low"));
    }
}
