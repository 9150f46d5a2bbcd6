//! Concurrency properties of stock reservation on the in-memory store.

use futures_util::future::join_all;
use store::{InMemoryStore, StockLedger, StoreError};

use domain::{Money, Product, ProductId};
use common::ReservationId;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_oversell() {
    let store = InMemoryStore::new();
    store
        .insert_product(Product::new("SKU-HOT", "Hot item", Money::from_cents(500), 10))
        .await;
    let id = ProductId::new("SKU-HOT");

    let attempts = (0..50).map(|_| {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move { store.try_reserve(ReservationId::new(), &id, 1).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::InsufficientStock { .. })))
        .count();

    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 40);
    assert_eq!(store.stock_of(&id).await, Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reserve_and_release_interleavings_balance_out() {
    let store = InMemoryStore::new();
    store
        .insert_product(Product::new("SKU-001", "Widget", Money::from_cents(1000), 20))
        .await;
    let id = ProductId::new("SKU-001");

    let tasks = (0..20).map(|_| {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let reservation = ReservationId::new();
            if store.try_reserve(reservation, &id, 3).await.is_ok() {
                assert_eq!(store.release(reservation, &id, 3).await.unwrap(), 3);
            }
        })
    });
    for joined in join_all(tasks).await {
        joined.unwrap();
    }

    assert_eq!(store.stock_of(&id).await, Some(20));
    assert_eq!(store.held_reservations().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_releases_of_one_reservation_restore_once() {
    let store = InMemoryStore::new();
    store
        .insert_product(Product::new("SKU-001", "Widget", Money::from_cents(1000), 8))
        .await;
    let id = ProductId::new("SKU-001");
    let reservation = ReservationId::new();
    store.try_reserve(reservation, &id, 5).await.unwrap();

    let releases = (0..10).map(|_| {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move { store.release(reservation, &id, 5).await })
    });
    let restored: u32 = join_all(releases)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .sum();

    assert_eq!(restored, 5);
    assert_eq!(store.stock_of(&id).await, Some(8));
}
