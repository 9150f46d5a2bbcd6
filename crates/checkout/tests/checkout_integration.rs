//! Integration tests for checkout against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkout::{
    CheckoutConfig, CheckoutError, CheckoutOrchestrator, CheckoutState, CheckoutWarning,
    FailureReason, NotificationLevel, RecordingNotifier,
};
use common::{CustomerId, ProductId, ReservationId};
use domain::{CartLine, Money, OrderStatus, Product};
use futures_util::future::join_all;
use store::{CartStore, Faults, InMemoryStore, OrderStore, StockLedger, StockLevel};

type Orchestrator = CheckoutOrchestrator<InMemoryStore, InMemoryStore, InMemoryStore>;

const ADDRESS: Option<&str> = Some("Rua das Flores, 123");

struct Harness {
    store: InMemoryStore,
    notifier: RecordingNotifier,
    orchestrator: Arc<Orchestrator>,
}

fn harness_with(config: CheckoutConfig) -> Harness {
    let store = InMemoryStore::new();
    let notifier = RecordingNotifier::new();
    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(notifier.clone()),
        config.with_compensation_backoff(Duration::ZERO),
    ));
    Harness {
        store,
        notifier,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(CheckoutConfig::default())
}

impl Harness {
    async fn product(&self, sku: &str, cents: i64, stock: u32) {
        self.store
            .insert_product(Product::new(sku, sku, Money::from_cents(cents), stock))
            .await;
    }

    async fn add(&self, customer_id: CustomerId, sku: &str, quantity: u32) -> CartLine {
        let line = CartLine::new(customer_id, sku, quantity).unwrap();
        self.store.insert_line(&line).await.unwrap();
        line
    }

    async fn stock(&self, sku: &str) -> u32 {
        self.store.stock_of(&ProductId::new(sku)).await.unwrap()
    }

    async fn faults(&self, faults: Faults) {
        self.store.set_faults(faults).await;
    }

    /// Scenario cart: X qty 3 @ 10.00 and Y qty 1 @ 25.00.
    async fn scenario_cart(&self, stock_x: u32, stock_y: u32) -> CustomerId {
        self.product("X", 1000, stock_x).await;
        self.product("Y", 2500, stock_y).await;
        let customer_id = CustomerId::new();
        self.add(customer_id, "X", 3).await;
        self.add(customer_id, "Y", 1).await;
        customer_id
    }

    async fn wait_for_stock(&self, sku: &str, expected: u32) {
        for _ in 0..200 {
            if self.stock(sku).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("stock of {sku} never reached {expected}");
    }
}

#[tokio::test]
async fn test_checkout_places_order_and_clears_cart() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;

    let receipt = h.orchestrator.checkout(customer_id, ADDRESS).await.unwrap();

    assert_eq!(receipt.order.total_amount, Money::from_cents(5500));
    assert_eq!(receipt.order.status, OrderStatus::Pending);
    assert_eq!(receipt.order.customer_id, customer_id);
    assert_eq!(receipt.order.shipping_address.as_str(), "Rua das Flores, 123");
    assert_eq!(receipt.lines.len(), 2);
    assert!(receipt.warnings.is_empty());
    assert_eq!(receipt.final_state(), CheckoutState::CartCleared);
    assert_eq!(
        receipt.trail,
        vec![
            CheckoutState::Started,
            CheckoutState::Snapshotted,
            CheckoutState::Validated,
            CheckoutState::StockReserved,
            CheckoutState::OrderPersisted,
            CheckoutState::CartCleared,
        ]
    );

    assert_eq!(h.stock("X").await, 2);
    assert_eq!(h.stock("Y").await, 1);
    assert_eq!(h.store.cart_line_count(customer_id).await, 0);

    let stored = h.store.get_order(receipt.order.id).await.unwrap().unwrap();
    assert_eq!(stored.header, receipt.order);
    assert_eq!(stored.lines, receipt.lines);
    let line_sum: Money = stored.lines.iter().map(|l| l.line_total).sum();
    assert_eq!(line_sum, stored.header.total_amount);

    let successes = h.notifier.with_level(NotificationLevel::Success);
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].message, "Order placed successfully");
}

#[tokio::test]
async fn test_insufficient_stock_leaves_everything_untouched() {
    let h = harness();
    let customer_id = h.scenario_cart(2, 2).await;

    let err = h
        .orchestrator
        .checkout(customer_id, ADDRESS)
        .await
        .unwrap_err();

    match err {
        CheckoutError::InsufficientStock {
            product_id,
            requested,
            available,
        } => {
            assert_eq!(product_id, ProductId::new("X"));
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(h.stock("X").await, 2);
    assert_eq!(h.stock("Y").await, 2);
    assert_eq!(h.store.cart_line_count(customer_id).await, 2);
    assert_eq!(h.store.order_count().await, 0);

    let errors = h.notifier.with_level(NotificationLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, FailureReason::InsufficientStock.user_message());
}

#[tokio::test]
async fn test_empty_cart_fails_without_side_effects() {
    let h = harness();
    h.product("X", 1000, 5).await;

    let err = h
        .orchestrator
        .checkout(CustomerId::new(), ADDRESS)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::EmptyCart));
    assert_eq!(h.stock("X").await, 5);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_missing_address_fails_before_any_reservation() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;

    for address in [None, Some(""), Some("   ")] {
        let err = h
            .orchestrator
            .checkout(customer_id, address)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::MissingShippingAddress));
    }

    assert_eq!(h.stock("X").await, 5);
    assert_eq!(h.stock("Y").await, 2);
    assert_eq!(h.store.cart_line_count(customer_id).await, 2);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_persistence_failure_releases_all_reservations() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        fail_order_insert: true,
        ..Faults::default()
    })
    .await;

    let err = h
        .orchestrator
        .checkout(customer_id, ADDRESS)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Persistence(_)));
    assert_eq!(err.reason(), FailureReason::PersistenceError);
    assert_eq!(h.stock("X").await, 5);
    assert_eq!(h.stock("Y").await, 2);
    assert_eq!(h.store.cart_line_count(customer_id).await, 2);
    assert_eq!(h.store.order_count().await, 0);
}

/// Ledger that lets a rival customer take the last units of one product
/// right before this checkout reserves it.
#[derive(Clone)]
struct RacingLedger {
    inner: InMemoryStore,
    contested: ProductId,
}

#[async_trait]
impl StockLedger for RacingLedger {
    async fn read_stock(&self, product_ids: &[ProductId]) -> store::Result<Vec<StockLevel>> {
        self.inner.read_stock(product_ids).await
    }

    async fn try_reserve(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> store::Result<u32> {
        if product_id == &self.contested {
            self.inner.set_stock(product_id, 0).await;
        }
        self.inner
            .try_reserve(reservation_id, product_id, quantity)
            .await
    }

    async fn release(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> store::Result<u32> {
        self.inner
            .release(reservation_id, product_id, quantity)
            .await
    }
}

#[tokio::test]
async fn test_losing_race_on_second_product_releases_first() {
    let store = InMemoryStore::new();
    for (sku, stock) in [("A", 5), ("B", 1)] {
        store
            .insert_product(Product::new(sku, sku, Money::from_cents(100), stock))
            .await;
    }
    let customer_id = CustomerId::new();
    for (sku, quantity) in [("B", 1), ("A", 2)] {
        store
            .insert_line(&CartLine::new(customer_id, sku, quantity).unwrap())
            .await
            .unwrap();
    }
    let ledger = RacingLedger {
        inner: store.clone(),
        contested: ProductId::new("B"),
    };
    let orchestrator = CheckoutOrchestrator::new(
        store.clone(),
        ledger,
        store.clone(),
        Arc::new(RecordingNotifier::new()),
        CheckoutConfig::default(),
    );

    let err = orchestrator.checkout(customer_id, ADDRESS).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::InsufficientStock { ref product_id, requested: 1, available: 0 }
            if product_id == &ProductId::new("B")
    ));
    assert_eq!(store.stock_of(&ProductId::new("A")).await, Some(5));
    assert_eq!(store.cart_line_count(customer_id).await, 2);
    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn test_inactive_product_reports_stock_changed() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;
    h.store.set_active(&ProductId::new("Y"), false).await;

    let err = h
        .orchestrator
        .checkout(customer_id, ADDRESS)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::StockChanged { ref product_id } if product_id == &ProductId::new("Y")
    ));
    assert_eq!(h.stock("X").await, 5);
}

#[tokio::test]
async fn test_orphan_lines_are_skipped_but_cleared() {
    let h = harness();
    h.product("X", 1000, 5).await;
    let customer_id = CustomerId::new();
    h.add(customer_id, "X", 1).await;
    h.add(customer_id, "DELETED", 4).await;

    let receipt = h.orchestrator.checkout(customer_id, ADDRESS).await.unwrap();

    assert_eq!(receipt.lines.len(), 1);
    assert_eq!(receipt.order.total_amount, Money::from_cents(1000));
    assert_eq!(h.store.cart_line_count(customer_id).await, 0);
}

#[tokio::test]
async fn test_cart_of_only_orphans_is_empty() {
    let h = harness();
    let customer_id = CustomerId::new();
    h.add(customer_id, "DELETED", 1).await;

    let err = h
        .orchestrator
        .checkout(customer_id, ADDRESS)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::EmptyCart));
    assert_eq!(h.store.cart_line_count(customer_id).await, 1);
}

#[tokio::test]
async fn test_duplicate_lines_reserve_their_sum() {
    let h = harness();
    h.product("X", 1000, 5).await;
    let customer_id = CustomerId::new();
    h.add(customer_id, "X", 2).await;
    h.add(customer_id, "X", 2).await;

    let receipt = h.orchestrator.checkout(customer_id, ADDRESS).await.unwrap();

    assert_eq!(receipt.lines.len(), 2);
    assert_eq!(receipt.order.total_amount, Money::from_cents(4000));
    assert_eq!(h.stock("X").await, 1);
}

#[tokio::test]
async fn test_cart_clear_failure_is_a_warning() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        fail_cart_clear: true,
        ..Faults::default()
    })
    .await;

    let receipt = h.orchestrator.checkout(customer_id, ADDRESS).await.unwrap();

    assert_eq!(receipt.final_state(), CheckoutState::OrderPersisted);
    assert!(matches!(
        receipt.warnings.as_slice(),
        [CheckoutWarning::CartClearFailed { .. }]
    ));
    assert_eq!(h.store.order_count().await, 1);
    assert_eq!(h.stock("X").await, 2);
    assert_eq!(h.store.cart_line_count(customer_id).await, 2);
    assert_eq!(h.notifier.with_level(NotificationLevel::Warning).len(), 1);
}

#[tokio::test]
async fn test_line_added_during_checkout_survives() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;
    h.product("Z", 700, 9).await;
    h.faults(Faults {
        order_insert_delay: Duration::from_millis(150),
        ..Faults::default()
    })
    .await;

    let orchestrator = h.orchestrator.clone();
    let running = tokio::spawn(async move { orchestrator.checkout(customer_id, ADDRESS).await });

    tokio::time::sleep(Duration::from_millis(40)).await;
    let late = h.add(customer_id, "Z", 1).await;

    let receipt = running.await.unwrap().unwrap();

    assert_eq!(receipt.lines.len(), 2);
    let remaining = h.store.cart_with_products(customer_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].line.id, late.id);
}

#[tokio::test]
async fn test_concurrent_checkout_for_same_customer_is_rejected() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        latency: Duration::from_millis(20),
        ..Faults::default()
    })
    .await;

    let (first, second) = tokio::join!(
        h.orchestrator.checkout(customer_id, ADDRESS),
        h.orchestrator.checkout(customer_id, ADDRESS),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(CheckoutError::AlreadyInProgress(id)) if id == customer_id));
    assert_eq!(h.store.order_count().await, 1);
    assert!(!h.orchestrator.is_in_flight(customer_id));
}

#[tokio::test]
async fn test_slow_order_insert_times_out_and_compensates() {
    let h = harness_with(CheckoutConfig::default().with_call_timeout(Duration::from_millis(50)));
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        order_insert_delay: Duration::from_millis(500),
        ..Faults::default()
    })
    .await;

    let err = h
        .orchestrator
        .checkout(customer_id, ADDRESS)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Timeout {
            step: "persist_order",
            ..
        }
    ));
    assert_eq!(h.stock("X").await, 5);
    assert_eq!(h.stock("Y").await, 2);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_dropped_checkout_releases_stock() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        order_insert_delay: Duration::from_secs(2),
        ..Faults::default()
    })
    .await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        h.orchestrator.checkout(customer_id, ADDRESS),
    )
    .await;
    assert!(abandoned.is_err());

    h.wait_for_stock("X", 5).await;
    h.wait_for_stock("Y", 2).await;
    assert_eq!(h.store.order_count().await, 0);
    assert!(!h.orchestrator.is_in_flight(customer_id));
}

#[tokio::test]
async fn test_checkout_cancelled_during_compensation_restores_stock() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        latency: Duration::from_millis(100),
        fail_order_insert: true,
        ..Faults::default()
    })
    .await;

    // Four reads and reservations plus the failed insert take ~500ms, so the
    // caller gives up while the first release is under way.
    let abandoned = tokio::time::timeout(
        Duration::from_millis(550),
        h.orchestrator.checkout(customer_id, ADDRESS),
    )
    .await;
    assert!(abandoned.is_err());
    h.faults(Faults::default()).await;

    h.wait_for_stock("X", 5).await;
    h.wait_for_stock("Y", 2).await;
    assert_eq!(h.store.held_reservations().await, 0);
    assert_eq!(h.store.order_count().await, 0);
    assert!(!h.orchestrator.is_in_flight(customer_id));
}

#[tokio::test]
async fn test_reservation_acknowledged_too_late_is_released() {
    let h = harness_with(CheckoutConfig::default().with_call_timeout(Duration::from_millis(50)));
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        reserve_ack_delay: Duration::from_millis(200),
        ..Faults::default()
    })
    .await;

    let err = h
        .orchestrator
        .checkout(customer_id, ADDRESS)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Timeout {
            step: "reserve_stock",
            ..
        }
    ));
    assert_eq!(h.stock("X").await, 5);
    assert_eq!(h.stock("Y").await, 2);
    assert_eq!(h.store.held_reservations().await, 0);
    assert_eq!(h.store.cart_line_count(customer_id).await, 2);
}

#[tokio::test]
async fn test_order_written_before_insert_timeout_is_kept() {
    let h = harness_with(CheckoutConfig::default().with_call_timeout(Duration::from_millis(50)));
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        order_insert_ack_delay: Duration::from_millis(200),
        ..Faults::default()
    })
    .await;

    let receipt = h.orchestrator.checkout(customer_id, ADDRESS).await.unwrap();

    assert_eq!(receipt.final_state(), CheckoutState::CartCleared);
    assert_eq!(receipt.order.total_amount, Money::from_cents(5500));
    assert_eq!(h.store.order_count().await, 1);
    assert_eq!(h.stock("X").await, 2);
    assert_eq!(h.stock("Y").await, 1);
    assert_eq!(h.store.held_reservations().await, 0);
    assert_eq!(h.store.cart_line_count(customer_id).await, 0);
}

#[tokio::test]
async fn test_failed_release_reports_held_stock() {
    let h = harness_with(CheckoutConfig::default().with_compensation_attempts(2));
    let customer_id = h.scenario_cart(5, 2).await;
    h.faults(Faults {
        fail_order_insert: true,
        fail_release: true,
        ..Faults::default()
    })
    .await;

    let err = h
        .orchestrator
        .checkout(customer_id, ADDRESS)
        .await
        .unwrap_err();

    assert_eq!(err.reason(), FailureReason::CompensationFailed);
    match err {
        CheckoutError::CompensationFailed { cause, outstanding } => {
            assert!(matches!(*cause, CheckoutError::Persistence(_)));
            assert_eq!(outstanding.len(), 2);
        }
        other => panic!("expected CompensationFailed, got {other:?}"),
    }
    assert_eq!(h.stock("X").await, 2);
    assert_eq!(h.stock("Y").await, 1);
}

#[tokio::test]
async fn test_order_keeps_price_after_catalog_change() {
    let h = harness();
    let customer_id = h.scenario_cart(5, 2).await;
    let receipt = h.orchestrator.checkout(customer_id, ADDRESS).await.unwrap();

    h.store
        .set_price(&ProductId::new("X"), Money::from_cents(9999))
        .await;

    let stored = h.orchestrator.order(receipt.order.id).await.unwrap().unwrap();
    assert_eq!(stored.header.total_amount, Money::from_cents(5500));
    let x_line = stored
        .lines
        .iter()
        .find(|l| l.product_id == ProductId::new("X"))
        .unwrap();
    assert_eq!(x_line.unit_price, Money::from_cents(1000));
    assert_eq!(x_line.line_total, Money::from_cents(3000));
}

#[tokio::test]
async fn test_orders_for_customer_lists_placed_orders() {
    let h = harness();
    let customer_id = h.scenario_cart(10, 10).await;
    let first = h.orchestrator.checkout(customer_id, ADDRESS).await.unwrap();
    h.add(customer_id, "Y", 1).await;
    let second = h.orchestrator.checkout(customer_id, ADDRESS).await.unwrap();

    let orders = h.orchestrator.orders_for_customer(customer_id).await.unwrap();
    let ids: Vec<_> = orders.iter().map(|o| o.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.order.id));
    assert!(ids.contains(&second.order.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_customers_never_oversell() {
    let h = harness();
    h.product("HOT", 500, 5).await;

    let mut customers = Vec::new();
    for _ in 0..12 {
        let customer_id = CustomerId::new();
        h.add(customer_id, "HOT", 1).await;
        customers.push(customer_id);
    }

    let attempts = customers.into_iter().map(|customer_id| {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.checkout(customer_id, ADDRESS).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 5);
    for failure in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            failure.reason(),
            FailureReason::InsufficientStock | FailureReason::StockChanged
        ));
    }
    assert_eq!(h.stock("HOT").await, 0);
    assert_eq!(h.store.order_count().await, 5);
}

#[tokio::test]
async fn test_clearing_empty_cart_is_a_noop() {
    let h = harness();
    let customer_id = CustomerId::new();

    assert_eq!(
        h.orchestrator.cart().clear_cart(customer_id).await.unwrap(),
        0
    );
    assert_eq!(
        h.orchestrator.cart().clear_cart(customer_id).await.unwrap(),
        0
    );
}
