use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartLineId, CustomerId, OrderId, ProductId, ReservationId};
use domain::{CartLine, CartLineWithProduct, Money, OrderHeader, Product, ProductSnapshot};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CartStore, OrderStore, StockLedger, StockLevel, StoredOrder},
};

/// Faults injected into the in-memory store.
///
/// `latency` and `order_insert_delay` are applied before any state is
/// touched, so a call that is cancelled during them has no effect. The
/// `*_ack_delay` faults are applied after the write, modelling a store
/// that committed but answered too late.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Delay applied to every call.
    pub latency: Duration,
    /// Extra delay applied to order inserts.
    pub order_insert_delay: Duration,
    /// Delay after a reservation has been applied.
    pub reserve_ack_delay: Duration,
    /// Delay after an order has been written.
    pub order_insert_ack_delay: Duration,
    /// Fail every order insert.
    pub fail_order_insert: bool,
    /// Fail `delete_lines` and `delete_all`.
    pub fail_cart_clear: bool,
    /// Fail every stock release.
    pub fail_release: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReservationState {
    Held,
    Released,
    Confirmed,
}

#[derive(Debug)]
struct JournalEntry {
    product_id: ProductId,
    quantity: u32,
    state: ReservationState,
}

#[derive(Debug, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    cart_lines: HashMap<CartLineId, CartLine>,
    orders: HashMap<OrderId, StoredOrder>,
    reservations: HashMap<ReservationId, JournalEntry>,
}

/// In-memory record store implementation for testing and local runs.
///
/// Every operation takes the state lock once, so each call is atomic with
/// respect to every other call, matching what the PostgreSQL implementation
/// guarantees per statement or transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<RwLock<Faults>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the injected faults.
    pub async fn set_faults(&self, faults: Faults) {
        *self.faults.write().await = faults;
    }

    /// Inserts or replaces a product.
    pub async fn insert_product(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    /// Deletes a product. Cart lines referencing it become orphans.
    pub async fn remove_product(&self, product_id: &ProductId) -> Option<Product> {
        self.state.write().await.products.remove(product_id)
    }

    /// Returns a copy of a product.
    pub async fn product(&self, product_id: &ProductId) -> Option<Product> {
        self.state.read().await.products.get(product_id).cloned()
    }

    /// Returns the current stock of a product.
    pub async fn stock_of(&self, product_id: &ProductId) -> Option<u32> {
        self.product(product_id).await.map(|p| p.stock_quantity)
    }

    /// Changes a product's catalog price.
    pub async fn set_price(&self, product_id: &ProductId, unit_price: Money) {
        if let Some(product) = self.state.write().await.products.get_mut(product_id) {
            product.unit_price = unit_price;
        }
    }

    /// Changes a product's stock count directly.
    pub async fn set_stock(&self, product_id: &ProductId, stock_quantity: u32) {
        if let Some(product) = self.state.write().await.products.get_mut(product_id) {
            product.stock_quantity = stock_quantity;
        }
    }

    /// Activates or deactivates a product.
    pub async fn set_active(&self, product_id: &ProductId, is_active: bool) {
        if let Some(product) = self.state.write().await.products.get_mut(product_id) {
            product.is_active = is_active;
        }
    }

    /// Returns the number of lines in a customer's cart.
    pub async fn cart_line_count(&self, customer_id: CustomerId) -> usize {
        self.state
            .read()
            .await
            .cart_lines
            .values()
            .filter(|l| l.customer_id == customer_id)
            .count()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns how many reservations are still held, neither released nor
    /// confirmed by an order.
    pub async fn held_reservations(&self) -> usize {
        self.state
            .read()
            .await
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Held)
            .count()
    }

    async fn ack_delay(&self, pick: impl Fn(&Faults) -> Duration) {
        let delay = pick(&*self.faults.read().await);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn delay(&self, extra: impl Fn(&Faults) -> Duration) {
        let total = {
            let faults = self.faults.read().await;
            faults.latency + extra(&faults)
        };
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }

    async fn current_faults(&self) -> Faults {
        self.delay(|_| Duration::ZERO).await;
        self.faults.read().await.clone()
    }
}

#[async_trait]
impl StockLedger for InMemoryStore {
    async fn read_stock(&self, product_ids: &[ProductId]) -> Result<Vec<StockLevel>> {
        self.delay(|_| Duration::ZERO).await;

        let state = self.state.read().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| state.products.get(id))
            .map(|p| StockLevel {
                product_id: p.id.clone(),
                stock_quantity: p.stock_quantity,
                is_active: p.is_active,
            })
            .collect())
    }

    async fn try_reserve(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32> {
        self.delay(|_| Duration::ZERO).await;

        let remaining = {
            let mut state = self.state.write().await;
            if state.reservations.contains_key(&reservation_id) {
                return Err(StoreError::DuplicateReservation(reservation_id));
            }

            let product = state
                .products
                .get_mut(product_id)
                .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

            if quantity > product.stock_quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available: product.stock_quantity,
                });
            }

            product.stock_quantity -= quantity;
            let remaining = product.stock_quantity;
            state.reservations.insert(
                reservation_id,
                JournalEntry {
                    product_id: product_id.clone(),
                    quantity,
                    state: ReservationState::Held,
                },
            );
            remaining
        };

        self.ack_delay(|f| f.reserve_ack_delay).await;
        Ok(remaining)
    }

    async fn release(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32> {
        if self.current_faults().await.fail_release {
            return Err(StoreError::Unavailable("release refused".to_string()));
        }

        let mut state = self.state.write().await;
        let MemoryState {
            products,
            reservations,
            ..
        } = &mut *state;

        let entry = reservations
            .entry(reservation_id)
            .or_insert_with(|| JournalEntry {
                product_id: product_id.clone(),
                quantity,
                state: ReservationState::Released,
            });
        if entry.state != ReservationState::Held {
            return Ok(0);
        }

        let product = products
            .get_mut(&entry.product_id)
            .ok_or_else(|| StoreError::ProductNotFound(entry.product_id.clone()))?;
        product.stock_quantity = product
            .stock_quantity
            .checked_add(entry.quantity)
            .ok_or_else(|| StoreError::Corrupt(format!("stock overflow for {}", entry.product_id)))?;
        entry.state = ReservationState::Released;
        Ok(entry.quantity)
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn cart_with_products(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CartLineWithProduct>> {
        self.delay(|_| Duration::ZERO).await;

        let state = self.state.read().await;
        let mut lines: Vec<_> = state
            .cart_lines
            .values()
            .filter(|l| l.customer_id == customer_id)
            .map(|line| CartLineWithProduct {
                product: state
                    .products
                    .get(&line.product_id)
                    .map(ProductSnapshot::from),
                line: line.clone(),
            })
            .collect();

        // Most recent first, ties broken by ID for a stable listing
        lines.sort_by(|a, b| {
            b.line
                .created_at
                .cmp(&a.line.created_at)
                .then(a.line.id.cmp(&b.line.id))
        });
        Ok(lines)
    }

    async fn get_line(&self, line_id: CartLineId) -> Result<Option<CartLine>> {
        self.delay(|_| Duration::ZERO).await;
        Ok(self.state.read().await.cart_lines.get(&line_id).cloned())
    }

    async fn find_line(
        &self,
        customer_id: CustomerId,
        product_id: &ProductId,
    ) -> Result<Option<CartLine>> {
        self.delay(|_| Duration::ZERO).await;
        Ok(self
            .state
            .read()
            .await
            .cart_lines
            .values()
            .find(|l| l.customer_id == customer_id && &l.product_id == product_id)
            .cloned())
    }

    async fn insert_line(&self, line: &CartLine) -> Result<()> {
        self.delay(|_| Duration::ZERO).await;
        self.state
            .write()
            .await
            .cart_lines
            .insert(line.id, line.clone());
        Ok(())
    }

    async fn update_quantity(
        &self,
        line_id: CartLineId,
        quantity: u32,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.delay(|_| Duration::ZERO).await;

        let mut state = self.state.write().await;
        match state.cart_lines.get_mut(&line_id) {
            Some(line) => {
                line.quantity = quantity;
                line.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_line(&self, line_id: CartLineId) -> Result<bool> {
        self.delay(|_| Duration::ZERO).await;
        Ok(self
            .state
            .write()
            .await
            .cart_lines
            .remove(&line_id)
            .is_some())
    }

    async fn delete_lines(&self, customer_id: CustomerId, line_ids: &[CartLineId]) -> Result<u64> {
        if self.current_faults().await.fail_cart_clear {
            return Err(StoreError::Unavailable("cart clearing refused".to_string()));
        }

        let mut state = self.state.write().await;
        let before = state.cart_lines.len();
        state
            .cart_lines
            .retain(|id, line| !(line.customer_id == customer_id && line_ids.contains(id)));
        Ok((before - state.cart_lines.len()) as u64)
    }

    async fn delete_all(&self, customer_id: CustomerId) -> Result<u64> {
        if self.current_faults().await.fail_cart_clear {
            return Err(StoreError::Unavailable("cart clearing refused".to_string()));
        }

        let mut state = self.state.write().await;
        let before = state.cart_lines.len();
        state
            .cart_lines
            .retain(|_, line| line.customer_id != customer_id);
        Ok((before - state.cart_lines.len()) as u64)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(
        &self,
        order: &StoredOrder,
        reservations: &[ReservationId],
    ) -> Result<()> {
        self.delay(|f| f.order_insert_delay).await;

        if self.faults.read().await.fail_order_insert {
            return Err(StoreError::Unavailable("order insert refused".to_string()));
        }

        {
            let mut state = self.state.write().await;
            for id in reservations {
                match state.reservations.get(id) {
                    Some(entry) if entry.state == ReservationState::Held => {}
                    _ => return Err(StoreError::ReservationNotHeld(*id)),
                }
            }
            for id in reservations {
                if let Some(entry) = state.reservations.get_mut(id) {
                    entry.state = ReservationState::Confirmed;
                }
            }
            state.orders.insert(order.header.id, order.clone());
        }

        self.ack_delay(|f| f.order_insert_ack_delay).await;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<StoredOrder>> {
        self.delay(|_| Duration::ZERO).await;
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<OrderHeader>> {
        self.delay(|_| Duration::ZERO).await;

        let state = self.state.read().await;
        let mut headers: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.header.customer_id == customer_id)
            .map(|o| o.header.clone())
            .collect();
        headers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(headers)
    }
}
