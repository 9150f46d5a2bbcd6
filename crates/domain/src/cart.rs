//! Cart lines and the product-joined view checkout works from.

use chrono::{DateTime, Utc};
use common::{CartLineId, CustomerId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::product::Product;
use crate::value_objects::Money;

/// A line in a customer's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub customer_id: CustomerId,
    /// Weak reference: the product may be deactivated or deleted independently.
    pub product_id: ProductId,
    /// Always at least one.
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// Creates a new cart line stamped with the current time.
    pub fn new(
        customer_id: CustomerId,
        product_id: impl Into<ProductId>,
        quantity: u32,
    ) -> Result<Self, DomainError> {
        Self::new_at(customer_id, product_id, quantity, Utc::now())
    }

    /// Creates a new cart line stamped with `now`.
    pub fn new_at(
        customer_id: CustomerId,
        product_id: impl Into<ProductId>,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_quantity(quantity)?;
        Ok(Self {
            id: CartLineId::new(),
            customer_id,
            product_id: product_id.into(),
            quantity,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Rejects quantities below one.
pub fn validate_quantity(quantity: u32) -> Result<u32, DomainError> {
    if quantity == 0 {
        return Err(DomainError::InvalidQuantity { quantity });
    }
    Ok(quantity)
}

/// Product attributes copied at the moment a cart snapshot was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub unit_price: Money,
    pub stock_quantity: u32,
    pub is_active: bool,
}

impl From<&Product> for ProductSnapshot {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            unit_price: product.unit_price,
            stock_quantity: product.stock_quantity,
            is_active: product.is_active,
        }
    }
}

/// A cart line joined with its product, as observed at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineWithProduct {
    pub line: CartLine,
    /// `None` when the referenced product no longer exists.
    pub product: Option<ProductSnapshot>,
}

impl CartLineWithProduct {
    /// Returns true if the referenced product has been deleted.
    pub fn is_orphan(&self) -> bool {
        self.product.is_none()
    }

    /// Snapshot price times quantity, or `None` for orphans and on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.product
            .as_ref()
            .and_then(|p| p.unit_price.checked_multiply(self.line.quantity))
    }
}
