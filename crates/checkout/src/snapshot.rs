//! Consistent reads of a customer's cart.

use common::CustomerId;
use domain::CartLineWithProduct;
use store::{CartStore, StoreError};

/// Reads a cart joined with the product attributes each line points at.
///
/// The read is a single store call, so every line in the result was observed
/// at the same moment. Lines whose product has been deleted come back with
/// no product attached; deciding what to do with them is up to the caller.
#[derive(Debug, Clone)]
pub struct CartSnapshotReader<C> {
    carts: C,
}

impl<C: CartStore> CartSnapshotReader<C> {
    pub fn new(carts: C) -> Self {
        Self { carts }
    }

    /// Returns the customer's cart, most recently added line first.
    #[tracing::instrument(skip(self))]
    pub async fn snapshot(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CartLineWithProduct>, StoreError> {
        let lines = self.carts.cart_with_products(customer_id).await?;
        let orphans = lines.iter().filter(|l| l.is_orphan()).count();
        if orphans > 0 {
            tracing::debug!(lines = lines.len(), orphans, "cart has lines for deleted products");
        }
        Ok(lines)
    }
}
