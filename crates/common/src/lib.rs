//! Shared identifier types used across the checkout workspace.

pub mod types;

pub use types::{CartLineId, CustomerId, OrderId, OrderLineId, ProductId, ReservationId};
