//! Catalog products as seen by checkout.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::value_objects::Money;

/// A catalog product. Read-only to checkout apart from its stock count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Money,
    /// Units available. Never negative.
    pub stock_quantity: u32,
    pub is_active: bool,
}

impl Product {
    /// Creates an active product.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        unit_price: Money,
        stock_quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit_price,
            stock_quantity,
            is_active: true,
        }
    }

    /// Returns the product marked inactive.
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Returns true if `quantity` units can be sold right now.
    pub fn can_fulfill(&self, quantity: u32) -> bool {
        self.is_active && quantity <= self.stock_quantity
    }
}
