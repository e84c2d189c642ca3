//! Persistent storage for shopping lists as seen by the migration wizard.
//!
//! The wizard reads lists, items, offer validity and store preferences, and
//! writes exactly once per confirm through [`ShoppingListStore::apply_migration`],
//! which applies every change in a single transaction.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{ListStoreError, Result};
pub use memory::InMemoryShoppingListStore;
pub use model::{
    ItemChange, ItemReplacement, ItemSource, MigrationBatch, MigrationReceipt, OfferSnapshot,
    OfferValidity, ShoppingList, ShoppingListItem, WIZARD_SNAPSHOT_REASON,
};
pub use postgres::PostgresShoppingListStore;
pub use store::ShoppingListStore;
