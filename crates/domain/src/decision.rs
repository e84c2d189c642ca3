//! Per-item user decisions.

use common::{FlyerProductId, ItemId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The action a user picked for one expired item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    /// Swap the item for one of its suggestions.
    Replace,
    /// Keep the item as it is.
    Skip,
    /// Delete the item from the list.
    Remove,
}

impl DecisionAction {
    /// Returns the action name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Replace => "REPLACE",
            DecisionAction::Skip => "SKIP",
            DecisionAction::Remove => "REMOVE",
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated decision. Only `Replace` carries a suggestion reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Replace { suggestion_id: FlyerProductId },
    Skip,
    Remove,
}

impl Decision {
    /// Builds a decision from its flat request form.
    pub fn from_parts(
        action: DecisionAction,
        suggestion_id: Option<FlyerProductId>,
    ) -> Result<Self, DomainError> {
        match (action, suggestion_id) {
            (DecisionAction::Replace, Some(suggestion_id)) => Ok(Decision::Replace { suggestion_id }),
            (DecisionAction::Replace, None) => Err(DomainError::MissingSuggestionId),
            (DecisionAction::Skip, None) => Ok(Decision::Skip),
            (DecisionAction::Remove, None) => Ok(Decision::Remove),
            (action, Some(_)) => Err(DomainError::UnexpectedSuggestionId(action)),
        }
    }

    pub fn action(&self) -> DecisionAction {
        match self {
            Decision::Replace { .. } => DecisionAction::Replace,
            Decision::Skip => DecisionAction::Skip,
            Decision::Remove => DecisionAction::Remove,
        }
    }

    pub fn suggestion_id(&self) -> Option<FlyerProductId> {
        match self {
            Decision::Replace { suggestion_id } => Some(*suggestion_id),
            _ => None,
        }
    }
}

/// One entry of a bulk decision request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDecision {
    pub item_id: ItemId,
    pub action: DecisionAction,
    pub suggestion_id: Option<FlyerProductId>,
}

impl ItemDecision {
    pub fn replace(item_id: ItemId, suggestion_id: FlyerProductId) -> Self {
        Self {
            item_id,
            action: DecisionAction::Replace,
            suggestion_id: Some(suggestion_id),
        }
    }

    pub fn skip(item_id: ItemId) -> Self {
        Self {
            item_id,
            action: DecisionAction::Skip,
            suggestion_id: None,
        }
    }

    pub fn remove(item_id: ItemId) -> Self {
        Self {
            item_id,
            action: DecisionAction::Remove,
            suggestion_id: None,
        }
    }

    /// Validates the flat form into a [`Decision`].
    pub fn to_decision(&self) -> Result<Decision, DomainError> {
        Decision::from_parts(self.action, self.suggestion_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_requires_suggestion_id() {
        assert_eq!(
            Decision::from_parts(DecisionAction::Replace, None),
            Err(DomainError::MissingSuggestionId)
        );
        assert_eq!(
            Decision::from_parts(DecisionAction::Replace, Some(FlyerProductId::new(7))),
            Ok(Decision::Replace {
                suggestion_id: FlyerProductId::new(7)
            })
        );
    }

    #[test]
    fn skip_and_remove_reject_suggestion_id() {
        assert_eq!(
            Decision::from_parts(DecisionAction::Skip, Some(FlyerProductId::new(1))),
            Err(DomainError::UnexpectedSuggestionId(DecisionAction::Skip))
        );
        assert_eq!(
            Decision::from_parts(DecisionAction::Remove, None),
            Ok(Decision::Remove)
        );
    }

    #[test]
    fn decision_serializes_with_action_tag() {
        let json = serde_json::to_value(Decision::Replace {
            suggestion_id: FlyerProductId::new(12),
        })
        .unwrap();
        assert_eq!(json["action"], "REPLACE");
        assert_eq!(json["suggestion_id"], 12);

        let skip: Decision = serde_json::from_str(r#"{"action":"SKIP"}"#).unwrap();
        assert_eq!(skip, Decision::Skip);
    }

    #[test]
    fn action_accessors() {
        let d = Decision::Replace {
            suggestion_id: FlyerProductId::new(3),
        };
        assert_eq!(d.action(), DecisionAction::Replace);
        assert_eq!(d.suggestion_id(), Some(FlyerProductId::new(3)));
        assert_eq!(Decision::Remove.suggestion_id(), None);
        assert_eq!(DecisionAction::Remove.to_string(), "REMOVE");
    }
}
