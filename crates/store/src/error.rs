use common::{ProductId, ReservationId};
use thiserror::Error;

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A reservation asked for more units than are in stock.
    /// Stock is left untouched.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// An order referenced a stock reservation that is not held any more.
    #[error("Stock reservation {0} is not held")]
    ReservationNotHeld(ReservationId),

    /// A reservation id was reused, or was released before it was made.
    #[error("Stock reservation {0} already exists")]
    DuplicateReservation(ReservationId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The backend refused the operation (used by the in-memory store's fault injection).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
