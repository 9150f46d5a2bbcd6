//! Checkout orchestrator.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{CartLineId, CustomerId, OrderId, ProductId};
use domain::{CartLineWithProduct, OrderHeader, OrderLine, ShippingAddress, assemble};
use serde::Serialize;
use store::{CartStore, OrderStore, StockLedger, StockLevel, StoredOrder};

use crate::cart::CartService;
use crate::checkout_steps::{
    STEP_CLEAR_CART, STEP_PERSIST_ORDER, STEP_RESERVE_STOCK, STEP_SNAPSHOT_CART,
    STEP_VALIDATE_STOCK,
};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutWarning};
use crate::in_flight::InFlightRegistry;
use crate::notifications::{Notification, NotificationSink};
use crate::reservations::{Reservation, StockReservations};
use crate::snapshot::CartSnapshotReader;
use crate::state::{CheckoutAttempt, CheckoutState};

/// The outcome of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order: OrderHeader,
    pub lines: Vec<OrderLine>,
    /// Non-fatal problems after the order was persisted.
    pub warnings: Vec<CheckoutWarning>,
    /// Every state the attempt passed through.
    pub trail: Vec<CheckoutState>,
}

impl CheckoutReceipt {
    /// The state the attempt finished in: `CartCleared`, or `OrderPersisted`
    /// when the cart could not be cleared.
    pub fn final_state(&self) -> CheckoutState {
        self.trail
            .last()
            .copied()
            .unwrap_or(CheckoutState::OrderPersisted)
    }
}

/// Turns carts into orders.
///
/// The orchestrator holds no lock across store calls. Correctness under
/// concurrent checkouts rests on the atomic conditional decrement in
/// [`StockLedger::try_reserve`], the fixed ascending reservation order, and
/// compensation on failure.
pub struct CheckoutOrchestrator<C, L, O>
where
    C: CartStore + Clone,
    L: StockLedger + Clone + 'static,
    O: OrderStore,
{
    reader: CartSnapshotReader<C>,
    cart: CartService<C, L>,
    ledger: L,
    orders: O,
    notifier: Arc<dyn NotificationSink>,
    in_flight: InFlightRegistry,
    config: CheckoutConfig,
}

impl<C, L, O> CheckoutOrchestrator<C, L, O>
where
    C: CartStore + Clone,
    L: StockLedger + Clone + 'static,
    O: OrderStore,
{
    /// Creates a new orchestrator.
    pub fn new(
        carts: C,
        ledger: L,
        orders: O,
        notifier: Arc<dyn NotificationSink>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            reader: CartSnapshotReader::new(carts.clone()),
            cart: CartService::new(carts, ledger.clone(), notifier.clone()),
            ledger,
            orders,
            notifier,
            in_flight: InFlightRegistry::new(),
            config,
        }
    }

    /// The cart operations sharing this orchestrator's stores.
    pub fn cart(&self) -> &CartService<C, L> {
        &self.cart
    }

    pub fn config(&self) -> CheckoutConfig {
        self.config
    }

    /// Returns true while a checkout for the customer is running.
    pub fn is_in_flight(&self, customer_id: CustomerId) -> bool {
        self.in_flight.is_in_flight(customer_id)
    }

    /// Checks out the customer's cart.
    ///
    /// On success exactly one order exists, stock for every ordered product
    /// has dropped by the ordered quantity, and the ordered lines are gone
    /// from the cart (unless the receipt carries a `CartClearFailed`
    /// warning). On failure, stock is back at its pre-attempt level and no
    /// order exists; the one exception is `CompensationFailed`, which lists
    /// the stock still held.
    ///
    /// Dropping the returned future before the order is persisted releases
    /// any stock reserved so far.
    #[tracing::instrument(skip(self, shipping_address))]
    pub async fn checkout(
        &self,
        customer_id: CustomerId,
        shipping_address: Option<&str>,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let result = match self.in_flight.try_acquire(customer_id) {
            Some(_guard) => self.run(customer_id, shipping_address).await,
            None => Err(CheckoutError::AlreadyInProgress(customer_id)),
        };

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("checkout_duration_seconds").record(duration);

        match &result {
            Ok(receipt) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %receipt.order.id,
                    total = %receipt.order.total_amount,
                    duration,
                    "checkout completed"
                );
                self.notifier.notify(Notification::success(
                    customer_id,
                    "Order placed successfully",
                ));
                for warning in &receipt.warnings {
                    self.notifier
                        .notify(Notification::warning(customer_id, warning.to_string()));
                }
            }
            Err(e) => {
                let reason = e.reason();
                metrics::counter!("checkout_failed_total", "reason" => reason.as_str())
                    .increment(1);
                tracing::warn!(%reason, error = %e, duration, "checkout failed");
                self.notifier
                    .notify(Notification::error(customer_id, reason.user_message()));
            }
        }

        result
    }

    async fn run(
        &self,
        customer_id: CustomerId,
        shipping_address: Option<&str>,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let mut attempt = CheckoutAttempt::new(customer_id);

        // 1. Snapshot the cart
        let snapshot = self
            .bounded(STEP_SNAPSHOT_CART, self.reader.snapshot(customer_id))
            .await
            .map_err(|e| fail(&mut attempt, e))?;

        let demand = demand_by_product(&snapshot);
        if demand.is_empty() {
            return Err(fail(&mut attempt, CheckoutError::EmptyCart));
        }
        attempt.advance(CheckoutState::Snapshotted);

        ShippingAddress::parse(shipping_address).map_err(|e| fail(&mut attempt, e.into()))?;

        // 2. Re-validate against a fresh stock read
        let product_ids: Vec<ProductId> = demand.keys().cloned().collect();
        let levels = self
            .bounded(STEP_VALIDATE_STOCK, self.ledger.read_stock(&product_ids))
            .await
            .map_err(|e| fail(&mut attempt, e))?;
        let levels: HashMap<_, _> = levels.iter().map(|l| (&l.product_id, l)).collect();

        for (product_id, wanted) in &demand {
            let violation = match levels.get(product_id) {
                None => Some(CheckoutError::ProductNotFound {
                    product_id: product_id.clone(),
                }),
                Some(level) => wanted.violation(level),
            };
            if let Some(e) = violation {
                return Err(fail(&mut attempt, e));
            }
        }
        attempt.advance(CheckoutState::Validated);

        // 3. Reserve in ascending product order
        let mut reservations = StockReservations::new(self.ledger.clone(), self.config);
        for (product_id, wanted) in &demand {
            let quantity = wanted.quantity;
            tracing::info!(step = STEP_RESERVE_STOCK, %product_id, quantity, "reserving stock");
            let reserved = self
                .bounded(STEP_RESERVE_STOCK, reservations.reserve(product_id, quantity))
                .await;
            if let Err(e) = reserved {
                return Err(self.abort(&mut attempt, reservations, e).await);
            }
        }
        attempt.advance(CheckoutState::StockReserved);

        // 4. Assemble from the snapshot and persist as one unit
        let order: StoredOrder =
            match assemble(customer_id, &snapshot, shipping_address, Utc::now()) {
                Ok(order) => order.into(),
                Err(e) => return Err(self.abort(&mut attempt, reservations, e.into()).await),
            };

        let reservation_ids = reservations.ids();
        let persisted = self
            .bounded(STEP_PERSIST_ORDER, async {
                self.orders
                    .insert_order(&order, &reservation_ids)
                    .await
                    .map_err(CheckoutError::Persistence)
            })
            .await;
        match persisted {
            Ok(()) => {
                reservations.commit();
            }
            Err(e) => {
                self.recover_persist(&mut attempt, reservations, order.header.id, e)
                    .await?;
            }
        }
        attempt.advance(CheckoutState::OrderPersisted);
        tracing::info!(order_id = %order.header.id, "order persisted");

        // 5. Best-effort clear of exactly the snapshotted lines
        let line_ids: Vec<CartLineId> = snapshot.iter().map(|l| l.line.id).collect();
        let mut warnings = Vec::new();
        let cleared = tokio::time::timeout(
            self.config.call_timeout,
            self.cart.clear_lines(customer_id, &line_ids),
        )
        .await;
        match cleared {
            Ok(Ok(deleted)) => {
                tracing::debug!(deleted, "cart cleared");
                attempt.advance(CheckoutState::CartCleared);
            }
            Ok(Err(e)) => {
                tracing::warn!(step = STEP_CLEAR_CART, error = %e, "cart clear failed");
                warnings.push(CheckoutWarning::CartClearFailed {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                tracing::warn!(step = STEP_CLEAR_CART, "cart clear timed out");
                warnings.push(CheckoutWarning::CartClearFailed {
                    reason: format!("timed out after {:?}", self.config.call_timeout),
                });
            }
        }

        let StoredOrder { header, lines } = order;
        Ok(CheckoutReceipt {
            order: header,
            lines,
            warnings,
            trail: attempt.into_trail(),
        })
    }

    /// Loads an order with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn order(&self, order_id: OrderId) -> Result<Option<StoredOrder>, CheckoutError> {
        self.bounded("get_order", self.orders.get_order(order_id))
            .await
    }

    /// Lists a customer's orders, most recent first.
    #[tracing::instrument(skip(self))]
    pub async fn orders_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderHeader>, CheckoutError> {
        self.bounded("list_orders", self.orders.orders_for_customer(customer_id))
            .await
    }

    /// Releases held stock and settles the failure that caused it.
    async fn abort(
        &self,
        attempt: &mut CheckoutAttempt,
        reservations: StockReservations<L>,
        cause: CheckoutError,
    ) -> CheckoutError {
        let held = reservations.held().len();
        let outstanding = reservations.compensate().await;
        settle(attempt, held, outstanding, cause)
    }

    /// Settles a failed order insert whose outcome may be unknown.
    ///
    /// The store never lets an order and the release of its reservations
    /// both take effect. Once compensation has run, the order either exists
    /// with its stock confirmed, and checkout carries on, or does not exist
    /// and its stock is back.
    async fn recover_persist(
        &self,
        attempt: &mut CheckoutAttempt,
        reservations: StockReservations<L>,
        order_id: OrderId,
        cause: CheckoutError,
    ) -> Result<(), CheckoutError> {
        let held = reservations.held().len();
        let outstanding = reservations.compensate().await;

        if outstanding.is_empty() {
            let lookup = self
                .bounded(STEP_PERSIST_ORDER, self.orders.get_order(order_id))
                .await;
            match lookup {
                Ok(Some(_)) => {
                    tracing::warn!(
                        %order_id,
                        error = %cause,
                        "order was written before the insert failed, keeping it"
                    );
                    return Ok(());
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        %order_id,
                        error = %e,
                        "could not confirm order after failed insert"
                    );
                }
            }
        }

        Err(settle(attempt, held, outstanding, cause))
    }

    /// Runs one store call under the configured timeout.
    async fn bounded<T, E>(
        &self,
        step: &'static str,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, CheckoutError>
    where
        CheckoutError: From<E>,
    {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result.map_err(CheckoutError::from),
            Err(_) => Err(CheckoutError::Timeout {
                step,
                after: self.config.call_timeout,
            }),
        }
    }
}

fn settle(
    attempt: &mut CheckoutAttempt,
    held: usize,
    outstanding: Vec<Reservation>,
    cause: CheckoutError,
) -> CheckoutError {
    let err = if outstanding.is_empty() {
        if held > 0 {
            tracing::info!(released = held, cause = %cause, "reservations compensated");
        }
        cause
    } else {
        tracing::error!(
            cause = %cause,
            ?outstanding,
            "compensation failed, stock still held"
        );
        CheckoutError::CompensationFailed {
            cause: Box::new(cause),
            outstanding,
        }
    };

    fail(attempt, err)
}

fn fail(attempt: &mut CheckoutAttempt, err: CheckoutError) -> CheckoutError {
    attempt.fail(err.reason());
    err
}

/// What one checkout wants of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Demand {
    /// Sum over every cart line for the product.
    quantity: u32,
    /// Stock as seen when the cart was read.
    snapshot_stock: u32,
}

impl Demand {
    /// Checks the demand against a fresh stock read.
    ///
    /// A cart that already asked for more than the snapshot showed is short
    /// of stock. One that fit at snapshot time but no longer does saw the
    /// stock change underneath it.
    fn violation(&self, level: &StockLevel) -> Option<CheckoutError> {
        let product_id = level.product_id.clone();
        if !level.is_active {
            return Some(CheckoutError::StockChanged { product_id });
        }
        if self.quantity <= level.stock_quantity {
            return None;
        }
        if self.quantity > self.snapshot_stock {
            Some(CheckoutError::InsufficientStock {
                product_id,
                requested: self.quantity,
                available: level.stock_quantity,
            })
        } else {
            Some(CheckoutError::StockChanged { product_id })
        }
    }
}

/// Total quantity wanted per product, in ascending product order.
///
/// Orphaned lines have no product to reserve and are left out.
fn demand_by_product(snapshot: &[CartLineWithProduct]) -> BTreeMap<ProductId, Demand> {
    let mut demand: BTreeMap<ProductId, Demand> = BTreeMap::new();
    for entry in snapshot {
        let Some(product) = &entry.product else {
            continue;
        };
        let wanted = demand
            .entry(entry.line.product_id.clone())
            .or_insert(Demand {
                quantity: 0,
                snapshot_stock: product.stock_quantity,
            });
        wanted.quantity = wanted.quantity.saturating_add(entry.line.quantity);
    }
    demand
}
