//! Wizard error types.

use common::{FlyerProductId, ItemId, SessionId, ShoppingListId};
use domain::{DomainError, SessionStatus};
use list_store::ListStoreError;
use session_store::SessionStoreError;
use thiserror::Error;

/// Coarse classification of a [`WizardError`] for callers that map errors
/// onto a transport (status codes, retry policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is malformed.
    Validation,
    /// A list or session is missing, or the session has expired.
    NotFound,
    /// The request is well formed but conflicts with current state.
    Conflict,
    /// Cache, storage or search I/O failed.
    Internal,
}

/// Errors that can occur during wizard operations.
#[derive(Debug, Error)]
pub enum WizardError {
    /// The shopping list does not exist or belongs to another user.
    #[error("Shopping list not found: {0}")]
    ListNotFound(ShoppingListId),

    /// The list has no expired items.
    #[error("Shopping list {0} has no expired items to migrate")]
    NothingToMigrate(ShoppingListId),

    /// No live session exists with this id.
    #[error("Wizard session not found: {0}")]
    SessionNotFound(SessionId),

    /// The session passed its expiry while being confirmed.
    #[error("Wizard session expired: {0}")]
    SessionExpired(SessionId),

    /// The session is no longer active.
    #[error("Wizard session {session_id} is {status}, expected ACTIVE")]
    SessionNotActive {
        session_id: SessionId,
        status: SessionStatus,
    },

    /// One or more chosen offers were withdrawn or expired since the session started.
    #[error("Wizard session {session_id} has {} stale suggestions", .offers.len())]
    StaleSuggestions {
        session_id: SessionId,
        offers: Vec<FlyerProductId>,
    },

    /// Another live wizard session holds the list.
    #[error("Shopping list {0} is locked by another wizard session")]
    ListLocked(ShoppingListId),

    /// The session no longer holds its list lock, because its migration
    /// was already applied or the lock was taken over.
    #[error("Wizard session {0} no longer holds its shopping list")]
    LockLost(SessionId),

    /// A list item changed or disappeared under the session.
    #[error("Shopping list item {0} changed during the wizard")]
    ListChanged(ItemId),

    /// An idempotency key was replayed against a different session.
    #[error("Idempotency key '{key}' already completed session {session_id}")]
    IdempotencyKeyReused { key: String, session_id: SessionId },

    /// Search collaborator error.
    #[error("Search service error: {0}")]
    Search(String),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Session cache error.
    #[error("Session store error: {0}")]
    SessionStore(#[from] SessionStoreError),

    /// Shopping list storage error.
    #[error("List store error: {0}")]
    ListStore(#[from] ListStoreError),
}

impl WizardError {
    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WizardError::ListNotFound(_)
            | WizardError::SessionNotFound(_)
            | WizardError::SessionExpired(_) => ErrorKind::NotFound,
            WizardError::NothingToMigrate(_)
            | WizardError::SessionNotActive { .. }
            | WizardError::StaleSuggestions { .. }
            | WizardError::ListLocked(_)
            | WizardError::LockLost(_)
            | WizardError::ListChanged(_) => ErrorKind::Conflict,
            WizardError::IdempotencyKeyReused { .. } => ErrorKind::Validation,
            WizardError::Domain(DomainError::InvalidStateTransition { .. }) => ErrorKind::Conflict,
            WizardError::Domain(_) => ErrorKind::Validation,
            WizardError::ListStore(ListStoreError::ListNotFound(_)) => ErrorKind::NotFound,
            WizardError::ListStore(
                ListStoreError::ItemNotFound(_) | ListStoreError::LockNotHeld { .. },
            ) => ErrorKind::Conflict,
            WizardError::Search(_) | WizardError::SessionStore(_) | WizardError::ListStore(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Convenience type alias for wizard results.
pub type Result<T> = std::result::Result<T, WizardError>;
