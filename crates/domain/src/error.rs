//! Domain error types.

use common::ProductId;
use thiserror::Error;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Nothing to order.
    #[error("Cart is empty")]
    EmptyCart,

    /// No delivery destination was supplied.
    #[error("Shipping address is required")]
    MissingShippingAddress,

    /// Cart line quantities must be at least one.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// A line or order total does not fit in the money representation.
    #[error("Amount overflow while pricing product {product_id}")]
    AmountOverflow { product_id: ProductId },
}
