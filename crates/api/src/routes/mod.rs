//! HTTP route handlers.

pub mod cart;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;

use ::checkout::CheckoutOrchestrator;
use uuid::Uuid;

use crate::Backend;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Backend> {
    pub checkout: CheckoutOrchestrator<S, S, S>,
}

/// Parses a UUID path segment into one of the typed IDs.
pub(crate) fn parse_id<T: From<Uuid>>(raw: &str, what: &str) -> Result<T, ApiError> {
    Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}
