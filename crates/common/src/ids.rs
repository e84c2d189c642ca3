//! Identifier newtypes.
//!
//! Entities owned by this system (sessions, lists, items, users) use UUIDs.
//! Catalog entities (stores, flyers, offers, master products) come from the
//! flyer database and keep its integer keys.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
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

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from its raw database value.
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw database value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Handle of a wizard session.
    SessionId
);
uuid_id!(
    /// Identifier of a shopping list.
    ShoppingListId
);
uuid_id!(
    /// Identifier of a shopping-list entry.
    ItemId
);
uuid_id!(
    /// Identifier of the user owning a shopping list.
    UserId
);
uuid_id!(
    /// Identifier of an offer snapshot audit record.
    SnapshotId
);

int_id!(
    /// Identifier of a store (retail chain branch).
    StoreId
);
int_id!(
    /// Identifier of a published flyer.
    FlyerId
);
int_id!(
    /// Identifier of a single offer inside a flyer.
    FlyerProductId
);
int_id!(
    /// Identifier of a canonical product in the product master catalog.
    ProductMasterId
);

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
