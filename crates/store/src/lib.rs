//! Durable record store seam for checkout.
//!
//! Checkout never touches storage directly. It goes through three traits:
//! - [`StockLedger`]: fresh stock reads, atomic reservation and release
//! - [`CartStore`]: cart lines joined with product attributes
//! - [`OrderStore`]: all-or-nothing order persistence
//!
//! Two backends implement all three: [`PostgresStore`] and [`InMemoryStore`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{Faults, InMemoryStore};
pub use postgres::PostgresStore;
pub use store::{CartStore, OrderStore, StockLedger, StockLevel, StoredOrder};
