use common::{ItemId, SessionId, ShoppingListId};
use thiserror::Error;

/// Errors that can occur when reading or writing shopping lists.
#[derive(Debug, Error)]
pub enum ListStoreError {
    /// The shopping list does not exist.
    #[error("Shopping list not found: {0}")]
    ListNotFound(ShoppingListId),

    /// A list item targeted by a migration no longer exists.
    #[error("Shopping list item not found: {0}")]
    ItemNotFound(ItemId),

    /// The list lock is not held by the session that tried to use it.
    #[error("Lock on shopping list {list_id} is not held by session {session_id}")]
    LockNotHeld {
        list_id: ShoppingListId,
        session_id: SessionId,
    },

    /// A stored row could not be mapped to a model value.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// The store rejected the operation (used by test doubles).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for shopping list store operations.
pub type Result<T> = std::result::Result<T, ListStoreError>;
