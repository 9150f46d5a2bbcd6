//! Checkout state machine.

use common::CustomerId;
use serde::{Deserialize, Serialize};

use crate::error::FailureReason;

/// The state of one checkout attempt.
///
/// State transitions:
/// ```text
/// Started ──► Snapshotted ──► Validated ──► StockReserved ──► OrderPersisted ──► CartCleared
///    │             │              │               │
///    └─────────────┴──────────────┴───────────────┴──► Failed(reason)
/// ```
///
/// Once the order is persisted the attempt can no longer fail: a cart that
/// cannot be cleared leaves it in `OrderPersisted` with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CheckoutState {
    /// Attempt accepted, nothing read yet.
    #[default]
    Started,

    /// Cart read and found non-empty.
    Snapshotted,

    /// Every product re-checked against a fresh stock read.
    Validated,

    /// Stock decremented for every product.
    StockReserved,

    /// Order header and lines written.
    OrderPersisted,

    /// Ordered lines removed from the cart (terminal state).
    CartCleared,

    /// Attempt aborted with every reservation released (terminal state).
    Failed(FailureReason),
}

impl CheckoutState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        matches!(
            (self, next),
            (Started, Snapshotted)
                | (Snapshotted, Validated)
                | (Validated, StockReserved)
                | (StockReserved, OrderPersisted)
                | (OrderPersisted, CartCleared)
        ) || (self.can_fail() && matches!(next, Failed(_)))
    }

    /// Returns true if the attempt may still abort from this state.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            CheckoutState::Started
                | CheckoutState::Snapshotted
                | CheckoutState::Validated
                | CheckoutState::StockReserved
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::CartCleared | CheckoutState::Failed(_))
    }

    /// Returns true once the order exists.
    pub fn order_placed(&self) -> bool {
        matches!(
            self,
            CheckoutState::OrderPersisted | CheckoutState::CartCleared
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Started => "Started",
            CheckoutState::Snapshotted => "Snapshotted",
            CheckoutState::Validated => "Validated",
            CheckoutState::StockReserved => "StockReserved",
            CheckoutState::OrderPersisted => "OrderPersisted",
            CheckoutState::CartCleared => "CartCleared",
            CheckoutState::Failed(_) => "Failed",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutState::Failed(reason) => write!(f, "Failed({reason})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// The running record of one checkout attempt: its current state and every
/// state it has passed through.
#[derive(Debug, Clone)]
pub struct CheckoutAttempt {
    customer_id: CustomerId,
    state: CheckoutState,
    trail: Vec<CheckoutState>,
}

impl CheckoutAttempt {
    /// Starts a new attempt in `Started`.
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            state: CheckoutState::Started,
            trail: vec![CheckoutState::Started],
        }
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    /// Every state visited, in order, starting with `Started`.
    pub fn trail(&self) -> &[CheckoutState] {
        &self.trail
    }

    /// Moves to `next`.
    ///
    /// The orchestrator only ever requests legal transitions; an illegal one
    /// is a bug and trips a debug assertion.
    pub fn advance(&mut self, next: CheckoutState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal checkout transition {} -> {}",
            self.state,
            next
        );
        tracing::info!(
            customer_id = %self.customer_id,
            from = %self.state,
            to = %next,
            "checkout state transition"
        );
        self.state = next;
        self.trail.push(next);
    }

    /// Moves to `Failed(reason)`.
    pub fn fail(&mut self, reason: FailureReason) {
        self.advance(CheckoutState::Failed(reason));
    }

    pub fn into_trail(self) -> Vec<CheckoutState> {
        self.trail
    }
}
