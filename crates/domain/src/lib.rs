//! Domain layer for the checkout system.
//!
//! This crate holds the pure domain types and rules:
//! - Money and shipping address value objects
//! - Products and cart lines as read by checkout
//! - Order headers, order lines and the order assembler
//!
//! Nothing in here performs I/O.

pub mod cart;
pub mod error;
pub mod order;
pub mod product;
pub mod value_objects;

pub use cart::{CartLine, CartLineWithProduct, ProductSnapshot};
pub use common::{CartLineId, CustomerId, OrderId, OrderLineId, ProductId};
pub use error::DomainError;
pub use order::{AssembledOrder, OrderHeader, OrderLine, OrderStatus, assemble};
pub use product::Product;
pub use value_objects::{Money, ShippingAddress};
