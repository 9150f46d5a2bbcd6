//! Checkout step names, used in logs, timeouts and error messages.

/// Step name: Read the cart joined with product attributes.
pub const STEP_SNAPSHOT_CART: &str = "snapshot_cart";

/// Step name: Re-check activity and stock with a fresh read.
pub const STEP_VALIDATE_STOCK: &str = "validate_stock";

/// Step name: Atomically decrement stock per product.
pub const STEP_RESERVE_STOCK: &str = "reserve_stock";

/// Step name: Persist the order header and lines.
pub const STEP_PERSIST_ORDER: &str = "persist_order";

/// Step name: Delete the cart lines that were ordered.
pub const STEP_CLEAR_CART: &str = "clear_cart";

/// Step name: Return reserved stock after a failure.
pub const STEP_RELEASE_STOCK: &str = "release_stock";
