//! Order lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use domain::{OrderHeader, OrderLine};
use serde::Serialize;

use super::{AppState, parse_id};
use crate::Backend;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub shipping_address: String,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineResponse>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct OrderSummaryResponse {
    pub id: String,
    pub status: String,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn new(header: &OrderHeader, lines: &[OrderLine]) -> Self {
        Self {
            id: header.id.to_string(),
            customer_id: header.customer_id.to_string(),
            status: header.status.as_str().to_string(),
            shipping_address: header.shipping_address.to_string(),
            total_cents: header.total_amount.cents(),
            created_at: header.created_at,
            lines: lines
                .iter()
                .map(|line| OrderLineResponse {
                    id: line.id.to_string(),
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                    line_total_cents: line.line_total.cents(),
                })
                .collect(),
        }
    }
}

impl From<&OrderHeader> for OrderSummaryResponse {
    fn from(header: &OrderHeader) -> Self {
        Self {
            id: header.id.to_string(),
            status: header.status.as_str().to_string(),
            total_cents: header.total_amount.cents(),
            created_at: header.created_at,
        }
    }
}

/// GET /orders/{order_id}: load an order with its lines.
#[tracing::instrument(skip(state))]
pub async fn get<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&order_id, "order_id")?;
    let order = state
        .checkout
        .order(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;

    Ok(Json(OrderResponse::new(&order.header, &order.lines)))
}

/// GET /customers/{customer_id}/orders: the customer's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<OrderSummaryResponse>>, ApiError> {
    let customer: CustomerId = parse_id(&customer_id, "customer_id")?;
    let orders = state.checkout.orders_for_customer(customer).await?;
    Ok(Json(orders.iter().map(OrderSummaryResponse::from).collect()))
}
