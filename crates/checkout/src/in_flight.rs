//! At most one checkout per customer at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use common::CustomerId;

/// Tracks customers with a checkout in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    customers: Arc<Mutex<HashSet<CustomerId>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the customer as checking out.
    ///
    /// Returns `None` if a checkout for the customer is already running.
    /// The mark is removed when the returned guard is dropped, including
    /// when the checkout future itself is dropped mid-flight.
    pub fn try_acquire(&self, customer_id: CustomerId) -> Option<InFlightGuard> {
        let inserted = self
            .customers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(customer_id);

        inserted.then(|| InFlightGuard {
            registry: self.clone(),
            customer_id,
        })
    }

    pub fn is_in_flight(&self, customer_id: CustomerId) -> bool {
        self.customers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&customer_id)
    }
}

/// Holds a customer's in-flight mark.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    customer_id: CustomerId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .customers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.customer_id);
    }
}
