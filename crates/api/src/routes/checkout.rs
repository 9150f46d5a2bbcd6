//! Checkout endpoint.

use std::sync::Arc;

use ::checkout::{CheckoutReceipt, CheckoutWarning};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::CustomerId;
use serde::{Deserialize, Serialize};

use super::orders::OrderResponse;
use super::{AppState, parse_id};
use crate::Backend;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub state: String,
    pub warnings: Vec<CheckoutWarning>,
}

impl From<CheckoutReceipt> for CheckoutResponse {
    fn from(receipt: CheckoutReceipt) -> Self {
        let state = receipt.final_state().to_string();
        Self {
            order: OrderResponse::new(&receipt.order, &receipt.lines),
            state,
            warnings: receipt.warnings,
        }
    }
}

/// POST /customers/{customer_id}/checkout: turn the cart into an order.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let customer: CustomerId = parse_id(&customer_id, "customer_id")?;
    let receipt = state
        .checkout
        .checkout(customer, req.shipping_address.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(receipt.into())))
}
