//! Stock held by an in-progress checkout.
//!
//! [`StockReservations`] records every reservation so it can be undone. It
//! is a drop guard: if a checkout future is dropped between reserving and
//! committing, or in the middle of compensating, whatever is still held is
//! released on a background task.
//!
//! Every reservation carries its own [`ReservationId`] and releases go by
//! that id, which makes them idempotent. A reservation whose outcome is
//! unknown (the call timed out or was cancelled) stays held and is released
//! like any other; the store puts stock back only if the reservation had
//! actually been applied.

use common::{ProductId, ReservationId};
use serde::{Deserialize, Serialize};
use store::{StockLedger, StoreError};

use crate::checkout_steps::STEP_RELEASE_STOCK;
use crate::config::CheckoutConfig;

/// Units of one product taken from stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Reservations made by one checkout attempt.
pub struct StockReservations<L>
where
    L: StockLedger + Clone + 'static,
{
    ledger: L,
    config: CheckoutConfig,
    held: Vec<Reservation>,
}

impl<L> StockReservations<L>
where
    L: StockLedger + Clone + 'static,
{
    pub fn new(ledger: L, config: CheckoutConfig) -> Self {
        Self {
            ledger,
            config,
            held: Vec::new(),
        }
    }

    /// Atomically takes `quantity` units of the product.
    ///
    /// The reservation is recorded before the store is called, so if this
    /// future is dropped mid-call it is still released later. It is
    /// forgotten only when the store definitively refused it. Returns the
    /// remaining stock.
    pub async fn reserve(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32, StoreError> {
        let id = ReservationId::new();
        self.held.push(Reservation {
            id,
            product_id: product_id.clone(),
            quantity,
        });

        match self.ledger.try_reserve(id, product_id, quantity).await {
            Ok(remaining) => {
                tracing::debug!(%product_id, quantity, remaining, "stock reserved");
                Ok(remaining)
            }
            Err(e) => {
                if matches!(
                    e,
                    StoreError::InsufficientStock { .. } | StoreError::ProductNotFound(_)
                ) {
                    self.held.pop();
                }
                Err(e)
            }
        }
    }

    /// Reservations currently held, in the order they were made.
    pub fn held(&self) -> &[Reservation] {
        &self.held
    }

    /// Ids of the held reservations, for the order that confirms them.
    pub fn ids(&self) -> Vec<ReservationId> {
        self.held.iter().map(|r| r.id).collect()
    }

    /// Keeps the reserved stock: the order now accounts for it.
    pub fn commit(mut self) -> Vec<Reservation> {
        std::mem::take(&mut self.held)
    }

    /// Releases every reservation, most recent first.
    ///
    /// A reservation leaves the guard only once its release has finished,
    /// so cancelling this future leaves the rest to the drop guard. Each
    /// release is retried up to `compensation_attempts` times. Returns the
    /// reservations that could not be released; empty means stock is back
    /// where it started.
    pub async fn compensate(mut self) -> Vec<Reservation> {
        let mut outstanding = Vec::new();
        while let Some(reservation) = self.held.last().cloned() {
            let released = release_one(&self.ledger, self.config, &reservation).await;
            self.held.pop();
            if !released {
                outstanding.push(reservation);
            }
        }
        outstanding
    }
}

impl<L> Drop for StockReservations<L>
where
    L: StockLedger + Clone + 'static,
{
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }

        let held = std::mem::take(&mut self.held);
        tracing::warn!(
            reservations = held.len(),
            "checkout dropped while holding stock, releasing in background"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let ledger = self.ledger.clone();
                let config = self.config;
                handle.spawn(async move {
                    let mut outstanding = Vec::new();
                    for reservation in held.into_iter().rev() {
                        if !release_one(&ledger, config, &reservation).await {
                            outstanding.push(reservation);
                        }
                    }
                    if !outstanding.is_empty() {
                        tracing::error!(
                            ?outstanding,
                            "background stock release failed, stock needs reconciliation"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    outstanding = ?held,
                    "no runtime to release stock on, stock needs reconciliation"
                );
            }
        }
    }
}

async fn release_one<L: StockLedger>(
    ledger: &L,
    config: CheckoutConfig,
    reservation: &Reservation,
) -> bool {
    let Reservation {
        id,
        product_id,
        quantity,
    } = reservation;
    let attempts = config.compensation_attempts.max(1);

    for attempt in 1..=attempts {
        let outcome = tokio::time::timeout(
            config.call_timeout,
            ledger.release(*id, product_id, *quantity),
        )
        .await;

        match outcome {
            Ok(Ok(restored)) => {
                metrics::counter!("stock_compensations_total").increment(1);
                tracing::info!(%product_id, reservation = %id, restored, "stock released");
                return true;
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    step = STEP_RELEASE_STOCK,
                    %product_id,
                    attempt,
                    error = %e,
                    "stock release failed"
                );
            }
            Err(_) => {
                tracing::warn!(
                    step = STEP_RELEASE_STOCK,
                    %product_id,
                    attempt,
                    "stock release timed out"
                );
            }
        }

        if attempt < attempts {
            tokio::time::sleep(config.compensation_backoff * attempt).await;
        }
    }

    metrics::counter!("stock_compensation_failures_total").increment(1);
    false
}
