//! Checkout and cart error types.

use std::time::Duration;

use common::{CartLineId, CustomerId, ProductId};
use domain::DomainError;
use serde::{Deserialize, Serialize};
use store::StoreError;
use thiserror::Error;

use crate::reservations::Reservation;

/// Why a checkout attempt ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    EmptyCart,
    MissingShippingAddress,
    StockChanged,
    InsufficientStock,
    ProductNotFound,
    PersistenceError,
    AlreadyInProgress,
    Timeout,
    StoreError,
    CompensationFailed,
    InvalidOrder,
}

impl FailureReason {
    /// Returns the reason as a stable snake_case code.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::EmptyCart => "empty_cart",
            FailureReason::MissingShippingAddress => "missing_shipping_address",
            FailureReason::StockChanged => "stock_changed",
            FailureReason::InsufficientStock => "insufficient_stock",
            FailureReason::ProductNotFound => "product_not_found",
            FailureReason::PersistenceError => "persistence_error",
            FailureReason::AlreadyInProgress => "already_in_progress",
            FailureReason::Timeout => "timeout",
            FailureReason::StoreError => "store_error",
            FailureReason::CompensationFailed => "compensation_failed",
            FailureReason::InvalidOrder => "invalid_order",
        }
    }

    /// Message suitable for showing to the customer.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureReason::EmptyCart => "Your cart is empty",
            FailureReason::MissingShippingAddress => {
                "Add a shipping address to your profile before placing the order"
            }
            FailureReason::StockChanged => {
                "Stock changed for an item in your cart, please review your cart"
            }
            FailureReason::InsufficientStock => "Not enough stock for an item in your cart",
            FailureReason::ProductNotFound => "An item in your cart is no longer available",
            FailureReason::AlreadyInProgress => "Your order is already being processed",
            FailureReason::Timeout => "Processing your order took too long, please try again",
            FailureReason::PersistenceError
            | FailureReason::StoreError
            | FailureReason::CompensationFailed
            | FailureReason::InvalidOrder => "Could not process your order",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by a checkout attempt.
///
/// Every variant except `CompensationFailed` guarantees that stock is back
/// where it was before the attempt and that no order rows exist.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No priced lines in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// No usable shipping address was supplied.
    #[error("Shipping address is required")]
    MissingShippingAddress,

    /// A product was deactivated or its stock dropped below the cart
    /// quantity since the cart was read.
    #[error("Stock changed for product {product_id}")]
    StockChanged { product_id: ProductId },

    /// The atomic reservation lost a race for the last units.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A product vanished between the snapshot and the stock read.
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: ProductId },

    /// The order insert failed and was rolled back.
    #[error("Order could not be persisted: {0}")]
    Persistence(#[source] StoreError),

    /// Another checkout for the same customer is running.
    #[error("A checkout is already in progress for customer {0}")]
    AlreadyInProgress(CustomerId),

    /// A store call did not finish within the configured bound.
    #[error("Step '{step}' timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    /// A store read or write outside the order insert failed.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    /// The order could not be assembled from the snapshot.
    #[error("Invalid order: {0}")]
    InvalidOrder(#[source] DomainError),

    /// Releasing reserved stock failed after `cause`; the listed units are
    /// still held and need manual reconciliation.
    #[error("Compensation failed after '{cause}': {} reservation(s) still held", .outstanding.len())]
    CompensationFailed {
        cause: Box<CheckoutError>,
        outstanding: Vec<Reservation>,
    },
}

impl CheckoutError {
    /// Maps the error onto the terminal failure reason.
    pub fn reason(&self) -> FailureReason {
        match self {
            CheckoutError::EmptyCart => FailureReason::EmptyCart,
            CheckoutError::MissingShippingAddress => FailureReason::MissingShippingAddress,
            CheckoutError::StockChanged { .. } => FailureReason::StockChanged,
            CheckoutError::InsufficientStock { .. } => FailureReason::InsufficientStock,
            CheckoutError::ProductNotFound { .. } => FailureReason::ProductNotFound,
            CheckoutError::Persistence(_) => FailureReason::PersistenceError,
            CheckoutError::AlreadyInProgress(_) => FailureReason::AlreadyInProgress,
            CheckoutError::Timeout { .. } => FailureReason::Timeout,
            CheckoutError::Store(_) => FailureReason::StoreError,
            CheckoutError::InvalidOrder(_) => FailureReason::InvalidOrder,
            CheckoutError::CompensationFailed { .. } => FailureReason::CompensationFailed,
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::ProductNotFound(product_id) => {
                CheckoutError::ProductNotFound { product_id }
            }
            other => CheckoutError::Store(other),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::EmptyCart => CheckoutError::EmptyCart,
            DomainError::MissingShippingAddress => CheckoutError::MissingShippingAddress,
            other => CheckoutError::InvalidOrder(other),
        }
    }
}

/// Non-fatal problems reported alongside a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutWarning {
    /// The order exists but some ordered lines are still in the cart.
    #[error("Order placed but the cart could not be cleared: {reason}")]
    CartClearFailed { reason: String },
}

/// Errors returned by cart mutations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantities must be at least one.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The requested quantity is more than is in stock.
    #[error("Quantity {requested} of product {product_id} exceeds available stock {available}")]
    ExceedsStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The product does not exist or is not for sale.
    #[error("Product not available: {0}")]
    ProductUnavailable(ProductId),

    /// The cart line does not exist.
    #[error("Cart line not found: {0}")]
    LineNotFound(CartLineId),

    /// A cart amount broke a domain rule, such as a total overflowing.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Record store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_checkout_errors() {
        let err: CheckoutError = StoreError::InsufficientStock {
            product_id: ProductId::new("X"),
            requested: 3,
            available: 1,
        }
        .into();
        assert_eq!(err.reason(), FailureReason::InsufficientStock);

        let err: CheckoutError = StoreError::ProductNotFound(ProductId::new("X")).into();
        assert_eq!(err.reason(), FailureReason::ProductNotFound);

        let err: CheckoutError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.reason(), FailureReason::StoreError);
    }

    #[test]
    fn test_domain_errors_map_to_checkout_errors() {
        let err: CheckoutError = DomainError::EmptyCart.into();
        assert_eq!(err.reason(), FailureReason::EmptyCart);

        let err: CheckoutError = DomainError::MissingShippingAddress.into();
        assert_eq!(err.reason(), FailureReason::MissingShippingAddress);

        let err: CheckoutError = DomainError::AmountOverflow {
            product_id: ProductId::new("X"),
        }
        .into();
        assert_eq!(err.reason(), FailureReason::InvalidOrder);
    }

    #[test]
    fn test_compensation_failed_message() {
        let err = CheckoutError::CompensationFailed {
            cause: Box::new(CheckoutError::EmptyCart),
            outstanding: vec![Reservation {
                id: common::ReservationId::new(),
                product_id: ProductId::new("X"),
                quantity: 2,
            }],
        };
        assert_eq!(
            err.to_string(),
            "Compensation failed after 'Cart is empty': 1 reservation(s) still held"
        );
    }

    #[test]
    fn test_failure_reason_codes() {
        assert_eq!(FailureReason::StockChanged.to_string(), "stock_changed");
        let json = serde_json::to_string(&FailureReason::AlreadyInProgress).unwrap();
        assert_eq!(json, "\"already_in_progress\"");
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = CheckoutWarning::CartClearFailed {
            reason: "down".to_string(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "cart_clear_failed");
        assert_eq!(json["reason"], "down");
    }
}
