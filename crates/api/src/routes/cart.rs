//! Cart browsing and mutation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CartLineId, CustomerId, ProductId};
use domain::{CartLine, CartLineWithProduct};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::Backend;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddToCartRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub customer_id: String,
    pub lines: Vec<CartLineResponse>,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub line_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub in_stock: u32,
}

impl CartLineResponse {
    fn from_entry(entry: &CartLineWithProduct) -> Option<Self> {
        let product = entry.product.as_ref()?;
        Some(Self {
            line_id: entry.line.id.to_string(),
            product_id: entry.line.product_id.to_string(),
            product_name: product.name.clone(),
            quantity: entry.line.quantity,
            unit_price_cents: product.unit_price.cents(),
            line_total_cents: entry.line_total()?.cents(),
            in_stock: product.stock_quantity,
        })
    }
}

#[derive(Serialize)]
pub struct LineResponse {
    pub line_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<CartLine> for LineResponse {
    fn from(line: CartLine) -> Self {
        Self {
            line_id: line.id.to_string(),
            product_id: line.product_id.to_string(),
            quantity: line.quantity,
            updated_at: line.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct ClearCartResponse {
    pub deleted: u64,
}

// -- Handlers --

/// GET /customers/{customer_id}/cart: the cart with current prices.
#[tracing::instrument(skip(state))]
pub async fn get<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let customer: CustomerId = parse_id(&customer_id, "customer_id")?;
    let view = state.checkout.cart().get_cart(customer).await?;

    Ok(Json(CartResponse {
        customer_id: customer.to_string(),
        lines: view
            .lines
            .iter()
            .filter_map(CartLineResponse::from_entry)
            .collect(),
        total_cents: view.total.cents(),
    }))
}

/// POST /customers/{customer_id}/cart: add a product, merging with an
/// existing line for it.
#[tracing::instrument(skip(state, req))]
pub async fn add<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
    Json(req): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<LineResponse>), ApiError> {
    let customer: CustomerId = parse_id(&customer_id, "customer_id")?;
    if req.product_id.trim().is_empty() {
        return Err(ApiError::BadRequest("product_id is required".to_string()));
    }

    let line = state
        .checkout
        .cart()
        .add_to_cart(customer, ProductId::new(req.product_id.trim()), req.quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(line.into())))
}

/// PATCH /cart/lines/{line_id}: set a line's quantity.
#[tracing::instrument(skip(state, req))]
pub async fn set_quantity<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(line_id): Path<String>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<StatusCode, ApiError> {
    let line_id: CartLineId = parse_id(&line_id, "line_id")?;
    state
        .checkout
        .cart()
        .set_quantity(line_id, req.quantity)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart/lines/{line_id}: remove one line.
#[tracing::instrument(skip(state))]
pub async fn remove_line<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(line_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let line_id: CartLineId = parse_id(&line_id, "line_id")?;
    state.checkout.cart().remove_line(line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /customers/{customer_id}/cart: empty the cart.
#[tracing::instrument(skip(state))]
pub async fn clear<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
) -> Result<Json<ClearCartResponse>, ApiError> {
    let customer: CustomerId = parse_id(&customer_id, "customer_id")?;
    let deleted = state.checkout.cart().clear_cart(customer).await?;
    Ok(Json(ClearCartResponse { deleted }))
}
