//! Orders created by checkout.

mod assembler;
mod status;

pub use assembler::{AssembledOrder, assemble};
pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OrderLineId, ProductId};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Money, ShippingAddress};

/// Order header. Created exactly once per successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub id: OrderId,
    pub customer_id: CustomerId,
    /// Sum of all line totals.
    pub total_amount: Money,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// A single order line.
///
/// `unit_price` and `line_total` are captured when the order is created and
/// never follow later catalog price changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}
