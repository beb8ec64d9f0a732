//! In-memory cart model with the same merge and release rules the
//! database upsert follows.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Upper bound on the units one cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub variant_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines {
            cart.merge(line.variant_id, line.quantity);
        }
        cart
    }

    /// Add `quantity` of `variant_id`, merging into an existing line.
    ///
    /// Returns the line's new quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuantity`] if `quantity < 1`, or
    /// [`CoreError::QuantityTooLarge`] if the line would pass
    /// [`MAX_LINE_QUANTITY`].
    pub fn add(&mut self, variant_id: i64, quantity: i32) -> Result<i32, CoreError> {
        check_line_quantity(quantity)?;
        let held = self.quantity_of(variant_id).unwrap_or(0);
        let merged = i64::from(held) + i64::from(quantity);
        if merged > i64::from(MAX_LINE_QUANTITY) {
            return Err(CoreError::QuantityTooLarge {
                quantity: merged,
                max: MAX_LINE_QUANTITY,
            });
        }
        Ok(self.merge(variant_id, quantity))
    }

    fn merge(&mut self, variant_id: i64, quantity: i32) -> i32 {
        if let Some(line) = self.lines.iter_mut().find(|l| l.variant_id == variant_id) {
            line.quantity = line.quantity.saturating_add(quantity);
            return line.quantity;
        }
        self.lines.push(CartLine {
            variant_id,
            quantity,
        });
        quantity
    }

    /// Decrement the line for `variant_id` by `amount`, removing it when the
    /// remainder is zero or below. Returns the remainder, or `None` if there
    /// was no such line.
    pub fn release(&mut self, variant_id: i64, amount: i32) -> Option<i32> {
        let pos = self.lines.iter().position(|l| l.variant_id == variant_id)?;
        let remaining = self.lines[pos].quantity.saturating_sub(amount);
        if remaining <= 0 {
            self.lines.remove(pos);
        } else {
            self.lines[pos].quantity = remaining;
        }
        Some(remaining)
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn quantity_of(&self, variant_id: i64) -> Option<i32> {
        self.lines
            .iter()
            .find(|l| l.variant_id == variant_id)
            .map(|l| l.quantity)
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity)).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Validate a single add request against the per-line bounds.
///
/// # Errors
///
/// Returns [`CoreError::InvalidQuantity`] below 1 and
/// [`CoreError::QuantityTooLarge`] above [`MAX_LINE_QUANTITY`].
pub fn check_line_quantity(quantity: i32) -> Result<(), CoreError> {
    if quantity < 1 {
        return Err(CoreError::InvalidQuantity(quantity));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            quantity: i64::from(quantity),
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}
