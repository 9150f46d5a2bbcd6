//! Checkout orchestration for customer carts.
//!
//! A checkout turns a customer's cart into a persisted order:
//! 1. Snapshot the cart joined with product attributes
//! 2. Re-validate every line against a fresh stock read
//! 3. Reserve stock product by product, in ascending product ID order
//! 4. Assemble and persist the order as one unit
//! 5. Clear the cart lines that were part of the snapshot
//!
//! Steps 1 to 4 are all-or-nothing: any failure releases every reservation
//! made so far before the error is returned. Step 5 is best-effort and only
//! produces a warning.

pub mod cart;
pub mod checkout_steps;
pub mod config;
pub mod error;
pub mod in_flight;
pub mod notifications;
pub mod orchestrator;
pub mod reservations;
pub mod snapshot;
pub mod state;

pub use cart::{CartService, CartView};
pub use config::CheckoutConfig;
pub use error::{CartError, CheckoutError, CheckoutWarning, FailureReason};
pub use in_flight::{InFlightGuard, InFlightRegistry};
pub use notifications::{
    Notification, NotificationLevel, NotificationSink, RecordingNotifier, TracingNotifier,
};
pub use orchestrator::{CheckoutOrchestrator, CheckoutReceipt};
pub use reservations::{Reservation, StockReservations};
pub use snapshot::CartSnapshotReader;
pub use state::{CheckoutAttempt, CheckoutState};
