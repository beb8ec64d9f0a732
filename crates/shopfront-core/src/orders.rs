use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Unfulfilled,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Unfulfilled => "unfulfilled",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unfulfilled" => Some(OrderStatus::Unfulfilled),
            "fulfilled" => Some(OrderStatus::Fulfilled),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Validate a status change. Only unfulfilled orders move, and only to a
    /// terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOrderTransition`] otherwise.
    pub fn transition(self, to: OrderStatus) -> Result<OrderStatus, CoreError> {
        match (self, to) {
            (OrderStatus::Unfulfilled, OrderStatus::Fulfilled | OrderStatus::Cancelled) => Ok(to),
            _ => Err(CoreError::InvalidOrderTransition { from: self, to }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sum of `unit_price * quantity` over `lines`.
#[must_use]
pub fn subtotal<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    lines
        .into_iter()
        .map(|(unit_price, quantity)| unit_price * Decimal::from(quantity))
        .sum()
}
