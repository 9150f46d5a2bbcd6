use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each identifier gets its own type so a cart line ID can never be
/// passed where an order ID is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Random (v4) identifier for a record about to be created.
            pub fn new() -> Self {
                Uuid::new_v4().into()
            }

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Authenticated customer, as supplied by the identity provider.
    CustomerId
);

uuid_id!(
    /// A single line in a customer's cart.
    CartLineId
);

uuid_id!(
    /// An order header created by a successful checkout.
    OrderId
);

uuid_id!(
    /// A line belonging to an order.
    OrderLineId
);

uuid_id!(
    /// One stock reservation. Releasing by this key is idempotent.
    ReservationId
);

/// Stock keeping unit identifying a catalog product.
///
/// Ordering is lexicographic. Checkout relies on it as the global order in
/// which stock is reserved across products.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(sku: impl Into<String>) -> Self {
        Self(sku.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProductId {
    fn from(sku: String) -> Self {
        Self(sku)
    }
}

impl From<&str> for ProductId {
    fn from(sku: &str) -> Self {
        Self(sku.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_unique() {
        assert_ne!(CustomerId::new(), CustomerId::new());
        assert_ne!(OrderId::new(), OrderId::new());
    }

    #[test]
    fn uuid_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = CartLineId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn uuid_id_serializes_transparently() {
        let id = OrderLineId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn product_ids_sort_lexicographically() {
        let mut ids = vec![
            ProductId::new("SKU-010"),
            ProductId::new("SKU-002"),
            ProductId::new("SKU-001"),
        ];
        ids.sort();
        let sorted: Vec<_> = ids.iter().map(ProductId::as_str).collect();
        assert_eq!(sorted, ["SKU-001", "SKU-002", "SKU-010"]);
    }

    #[test]
    fn product_id_string_conversion() {
        let id: ProductId = "SKU-002".into();
        assert_eq!(id.as_str(), "SKU-002");
        assert_eq!(id.to_string(), "SKU-002");
    }
}
