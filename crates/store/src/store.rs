use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartLineId, CustomerId, OrderId, ProductId, ReservationId};
use domain::{AssembledOrder, CartLine, CartLineWithProduct, OrderHeader, OrderLine};

use crate::Result;

/// Stock count and availability of one product, freshly read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock_quantity: u32,
    pub is_active: bool,
}

/// An order header together with its lines, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrder {
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
}

impl From<AssembledOrder> for StoredOrder {
    fn from(order: AssembledOrder) -> Self {
        Self {
            header: order.header,
            lines: order.lines,
        }
    }
}

/// Access to mutable inventory counts.
///
/// This is the only seam through which stock changes. All implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reads current stock for the given products.
    ///
    /// Products that do not exist are absent from the result.
    async fn read_stock(&self, product_ids: &[ProductId]) -> Result<Vec<StockLevel>>;

    /// Atomically decrements stock by `quantity` and records the
    /// reservation under `reservation_id`.
    ///
    /// The check and the write happen in a single store operation, so two
    /// concurrent reservations can never both succeed past zero. Fails with
    /// `InsufficientStock` (stock untouched) or `ProductNotFound`. Fails
    /// without touching stock if `reservation_id` was already used or
    /// released.
    ///
    /// Returns the new stock count.
    async fn try_reserve(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32>;

    /// Undoes the reservation recorded under `reservation_id`.
    ///
    /// Idempotent, and safe to call when the outcome of `try_reserve` is
    /// unknown: stock goes back only if the reservation is still held.
    /// Releasing an id that was never reserved marks it released, so a
    /// late `try_reserve` with that id fails. A reservation already
    /// confirmed by an order is left alone.
    ///
    /// Returns the number of units put back (zero when nothing was held).
    async fn release(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32>;
}

/// Access to customers' cart lines.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Reads the customer's cart joined with product attributes in a single
    /// consistent read, most recently created line first.
    async fn cart_with_products(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CartLineWithProduct>>;

    /// Loads one cart line.
    async fn get_line(&self, line_id: CartLineId) -> Result<Option<CartLine>>;

    /// Finds the customer's line for a product, if any.
    async fn find_line(
        &self,
        customer_id: CustomerId,
        product_id: &ProductId,
    ) -> Result<Option<CartLine>>;

    /// Inserts a new cart line.
    async fn insert_line(&self, line: &CartLine) -> Result<()>;

    /// Sets a line's quantity. Returns false if the line does not exist.
    async fn update_quantity(
        &self,
        line_id: CartLineId,
        quantity: u32,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Deletes one line. Returns false if the line does not exist.
    async fn delete_line(&self, line_id: CartLineId) -> Result<bool>;

    /// Deletes the listed lines belonging to the customer.
    ///
    /// Lines not in the list survive, even if they belong to the same
    /// customer. Returns the number of lines deleted.
    async fn delete_lines(&self, customer_id: CustomerId, line_ids: &[CartLineId]) -> Result<u64>;

    /// Deletes every line in the customer's cart. Returns the number deleted.
    async fn delete_all(&self, customer_id: CustomerId) -> Result<u64>;
}

/// Access to persisted orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a header and all of its lines as one unit: either every row
    /// is written or none is.
    ///
    /// The listed stock reservations are confirmed in the same unit. If any
    /// of them is no longer held (it was released, or never made), nothing
    /// is written and the call fails with `ReservationNotHeld`. An order and
    /// the release of its stock can therefore never both take effect.
    async fn insert_order(
        &self,
        order: &StoredOrder,
        reservations: &[ReservationId],
    ) -> Result<()>;

    /// Loads an order with its lines.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<StoredOrder>>;

    /// Lists a customer's order headers, most recent first.
    async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<OrderHeader>>;
}
