//! Domain error types.

use common::{FlyerProductId, ItemId};
use thiserror::Error;

use crate::decision::DecisionAction;
use crate::session::SessionStatus;

/// Errors raised by the session aggregate and decision parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// The item is not one of the session's expired items.
    #[error("Item {0} is not part of this wizard session")]
    UnknownItem(ItemId),

    /// A REPLACE decision referenced an offer that was never suggested for the item.
    #[error("Suggestion {suggestion_id} is not a suggestion for item {item_id}")]
    UnknownSuggestion {
        item_id: ItemId,
        suggestion_id: FlyerProductId,
    },

    /// A REPLACE decision arrived without a suggestion id.
    #[error("REPLACE decisions require a suggestion id")]
    MissingSuggestionId,

    /// A SKIP or REMOVE decision carried a suggestion id.
    #[error("{0} decisions must not carry a suggestion id")]
    UnexpectedSuggestionId(DecisionAction),

    /// The session is not in a state that allows the requested operation.
    #[error("Cannot {action} a session in {status} state")]
    InvalidStateTransition {
        status: SessionStatus,
        action: &'static str,
    },
}
