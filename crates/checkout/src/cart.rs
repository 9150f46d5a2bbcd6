//! Cart browsing and mutation.

use std::sync::Arc;

use chrono::Utc;
use common::{CartLineId, CustomerId, ProductId};
use domain::cart::validate_quantity;
use domain::{CartLine, CartLineWithProduct, DomainError, Money};
use serde::Serialize;
use store::{CartStore, StockLedger, StockLevel};

use crate::error::CartError;
use crate::notifications::{Notification, NotificationSink};

/// A customer's cart as shown to them: lines for existing products only,
/// most recent first, and the cart total at current prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineWithProduct>,
    pub total: Money,
}

/// Single-record cart operations.
///
/// Quantity bounds against live stock are a convenience for the customer.
/// Checkout re-validates stock on its own and never relies on them.
pub struct CartService<C, L> {
    carts: C,
    ledger: L,
    notifier: Arc<dyn NotificationSink>,
}

impl<C, L> CartService<C, L>
where
    C: CartStore,
    L: StockLedger,
{
    pub fn new(carts: C, ledger: L, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            carts,
            ledger,
            notifier,
        }
    }

    /// Returns the customer's cart with orphaned lines filtered out.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, customer_id: CustomerId) -> Result<CartView, CartError> {
        let lines: Vec<_> = self
            .carts
            .cart_with_products(customer_id)
            .await?
            .into_iter()
            .filter(|l| !l.is_orphan())
            .collect();

        let mut total = Money::zero();
        for entry in &lines {
            total = entry
                .line_total()
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or_else(|| DomainError::AmountOverflow {
                    product_id: entry.line.product_id.clone(),
                })?;
        }

        Ok(CartView { lines, total })
    }

    /// Adds `quantity` units of a product, merging into the customer's
    /// existing line for that product if there is one.
    ///
    /// Two concurrent adds for the same product may still produce two lines;
    /// checkout sums duplicate lines per product.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine, CartError> {
        validate_quantity(quantity).map_err(|_| CartError::InvalidQuantity { quantity })?;

        let available = self.available_stock(&product_id).await?;

        let line = match self.carts.find_line(customer_id, &product_id).await? {
            Some(mut existing) => {
                let requested = existing.quantity.saturating_add(quantity);
                check_stock(&product_id, requested, available)?;

                let now = Utc::now();
                if !self
                    .carts
                    .update_quantity(existing.id, requested, now)
                    .await?
                {
                    return Err(CartError::LineNotFound(existing.id));
                }
                existing.quantity = requested;
                existing.updated_at = now;
                existing
            }
            None => {
                check_stock(&product_id, quantity, available)?;
                let line = CartLine::new(customer_id, product_id, quantity)
                    .map_err(|_| CartError::InvalidQuantity { quantity })?;
                self.carts.insert_line(&line).await?;
                line
            }
        };

        metrics::counter!("cart_mutations_total", "op" => "add").increment(1);
        self.notifier
            .notify(Notification::success(customer_id, "Product added to cart"));
        Ok(line)
    }

    /// Sets a line's quantity.
    ///
    /// Quantities below one are rejected; use [`remove_line`](Self::remove_line)
    /// to delete a line.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(&self, line_id: CartLineId, quantity: u32) -> Result<(), CartError> {
        validate_quantity(quantity).map_err(|_| CartError::InvalidQuantity { quantity })?;

        let line = self
            .carts
            .get_line(line_id)
            .await?
            .ok_or(CartError::LineNotFound(line_id))?;

        let available = self.available_stock(&line.product_id).await;
        if let Err(e) =
            available.and_then(|available| check_stock(&line.product_id, quantity, available))
        {
            if let CartError::ExceedsStock { available, .. } = &e {
                self.notifier.notify(Notification::error(
                    line.customer_id,
                    format!("Only {available} left in stock"),
                ));
            }
            return Err(e);
        }

        if !self
            .carts
            .update_quantity(line_id, quantity, Utc::now())
            .await?
        {
            return Err(CartError::LineNotFound(line_id));
        }

        metrics::counter!("cart_mutations_total", "op" => "set_quantity").increment(1);
        Ok(())
    }

    /// Deletes one line.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line(&self, line_id: CartLineId) -> Result<(), CartError> {
        let line = self
            .carts
            .get_line(line_id)
            .await?
            .ok_or(CartError::LineNotFound(line_id))?;

        if !self.carts.delete_line(line_id).await? {
            return Err(CartError::LineNotFound(line_id));
        }

        metrics::counter!("cart_mutations_total", "op" => "remove").increment(1);
        self.notifier.notify(Notification::success(
            line.customer_id,
            "Product removed from cart",
        ));
        Ok(())
    }

    /// Deletes the listed lines of the customer's cart, leaving any other
    /// line untouched. Returns how many lines were deleted.
    #[tracing::instrument(skip(self, line_ids), fields(lines = line_ids.len()))]
    pub async fn clear_lines(
        &self,
        customer_id: CustomerId,
        line_ids: &[CartLineId],
    ) -> Result<u64, CartError> {
        if line_ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.carts.delete_lines(customer_id, line_ids).await?;
        metrics::counter!("cart_mutations_total", "op" => "clear_lines").increment(1);
        Ok(deleted)
    }

    /// Empties the customer's cart. Clearing an empty cart succeeds with 0.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, customer_id: CustomerId) -> Result<u64, CartError> {
        let deleted = self.carts.delete_all(customer_id).await?;
        metrics::counter!("cart_mutations_total", "op" => "clear").increment(1);
        Ok(deleted)
    }

    /// Live stock for a product that is for sale.
    async fn available_stock(&self, product_id: &ProductId) -> Result<u32, CartError> {
        let levels = self
            .ledger
            .read_stock(std::slice::from_ref(product_id))
            .await?;
        match levels.into_iter().next() {
            Some(StockLevel {
                stock_quantity,
                is_active: true,
                ..
            }) => Ok(stock_quantity),
            _ => Err(CartError::ProductUnavailable(product_id.clone())),
        }
    }
}

fn check_stock(product_id: &ProductId, requested: u32, available: u32) -> Result<(), CartError> {
    if requested > available {
        return Err(CartError::ExceedsStock {
            product_id: product_id.clone(),
            requested,
            available,
        });
    }
    Ok(())
}
