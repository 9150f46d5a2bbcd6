//! Builds an order header and its lines from a cart snapshot.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OrderLineId};

use crate::cart::CartLineWithProduct;
use crate::error::DomainError;
use crate::value_objects::{Money, ShippingAddress};

use super::{OrderHeader, OrderLine, OrderStatus};

/// An order graph ready to be persisted as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledOrder {
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
}

impl AssembledOrder {
    /// Returns the order ID shared by the header and every line.
    pub fn order_id(&self) -> OrderId {
        self.header.id
    }
}

/// Assembles an order from a cart snapshot.
///
/// Every line is priced with the snapshot's unit price, never a re-fetched
/// one. Orphan lines (deleted products) contribute nothing. Line order
/// follows the snapshot.
pub fn assemble(
    customer_id: CustomerId,
    snapshot: &[CartLineWithProduct],
    shipping_address: Option<&str>,
    created_at: DateTime<Utc>,
) -> Result<AssembledOrder, DomainError> {
    let priced: Vec<_> = snapshot
        .iter()
        .filter_map(|entry| entry.product.as_ref().map(|p| (&entry.line, p)))
        .collect();

    if priced.is_empty() {
        return Err(DomainError::EmptyCart);
    }

    let shipping_address = ShippingAddress::parse(shipping_address)?;
    let order_id = OrderId::new();

    let mut total_amount = Money::zero();
    let mut lines = Vec::with_capacity(priced.len());
    for (line, product) in priced {
        let overflow = || DomainError::AmountOverflow {
            product_id: line.product_id.clone(),
        };
        let line_total = product
            .unit_price
            .checked_multiply(line.quantity)
            .ok_or_else(overflow)?;
        total_amount = total_amount.checked_add(line_total).ok_or_else(overflow)?;

        lines.push(OrderLine {
            id: OrderLineId::new(),
            order_id,
            product_id: line.product_id.clone(),
            quantity: line.quantity,
            unit_price: product.unit_price,
            line_total,
        });
    }

    Ok(AssembledOrder {
        header: OrderHeader {
            id: order_id,
            customer_id,
            total_amount,
            shipping_address,
            status: OrderStatus::Pending,
            created_at,
        },
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{CartLine, ProductSnapshot};

    fn entry(customer_id: CustomerId, sku: &str, quantity: u32, cents: i64) -> CartLineWithProduct {
        CartLineWithProduct {
            line: CartLine::new(customer_id, sku, quantity).unwrap(),
            product: Some(ProductSnapshot {
                name: sku.to_string(),
                unit_price: Money::from_cents(cents),
                stock_quantity: 100,
                is_active: true,
            }),
        }
    }

    #[test]
    fn test_totals_follow_snapshot_prices() {
        let customer_id = CustomerId::new();
        let snapshot = vec![
            entry(customer_id, "X", 3, 1000),
            entry(customer_id, "Y", 1, 2500),
        ];

        let order = assemble(customer_id, &snapshot, Some("Rua A, 10"), Utc::now()).unwrap();

        assert_eq!(order.header.total_amount, Money::from_cents(5500));
        assert_eq!(order.header.status, OrderStatus::Pending);
        assert_eq!(order.header.customer_id, customer_id);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[0].product_id.as_str(), "X");
        assert_eq!(order.lines[0].line_total, Money::from_cents(3000));
        assert_eq!(order.lines[1].unit_price, Money::from_cents(2500));
        assert!(order.lines.iter().all(|l| l.order_id == order.order_id()));
    }

    #[test]
    fn test_empty_snapshot_is_rejected() {
        let result = assemble(CustomerId::new(), &[], Some("Rua A, 10"), Utc::now());
        assert_eq!(result, Err(DomainError::EmptyCart));
    }

    #[test]
    fn test_orphans_only_counts_as_empty() {
        let customer_id = CustomerId::new();
        let mut orphan = entry(customer_id, "GONE", 1, 100);
        orphan.product = None;

        let result = assemble(customer_id, &[orphan], Some("Rua A, 10"), Utc::now());
        assert_eq!(result, Err(DomainError::EmptyCart));
    }

    #[test]
    fn test_orphans_are_skipped() {
        let customer_id = CustomerId::new();
        let mut orphan = entry(customer_id, "GONE", 1, 100);
        orphan.product = None;
        let snapshot = vec![orphan, entry(customer_id, "X", 2, 150)];

        let order = assemble(customer_id, &snapshot, Some("Rua A, 10"), Utc::now()).unwrap();
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.header.total_amount, Money::from_cents(300));
    }

    #[test]
    fn test_missing_address_is_rejected() {
        let customer_id = CustomerId::new();
        let snapshot = vec![entry(customer_id, "X", 1, 1000)];

        assert_eq!(
            assemble(customer_id, &snapshot, None, Utc::now()),
            Err(DomainError::MissingShippingAddress)
        );
        assert_eq!(
            assemble(customer_id, &snapshot, Some(""), Utc::now()),
            Err(DomainError::MissingShippingAddress)
        );
    }

    #[test]
    fn test_overflow_is_reported() {
        let customer_id = CustomerId::new();
        let snapshot = vec![entry(customer_id, "X", 2, i64::MAX)];

        let result = assemble(customer_id, &snapshot, Some("Rua A, 10"), Utc::now());
        assert!(matches!(result, Err(DomainError::AmountOverflow { .. })));
    }
}
