//! The wizard session aggregate.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use common::{FlyerProductId, ItemId, Money, SessionId, ShoppingListId, SnapshotId, StoreId, UserId};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::error::DomainError;
use crate::item::{Suggestion, WizardItem};
use crate::optimizer::StoreCoverage;

/// Lifetime of a session, counted from its start.
pub const SESSION_TTL_SECS: i64 = 30 * 60;

/// Returns [`SESSION_TTL_SECS`] as a duration.
pub fn session_ttl() -> Duration {
    Duration::seconds(SESSION_TTL_SECS)
}

/// The state of a wizard session.
///
/// State transitions:
/// ```text
/// Active ──► Completed
/// ```
/// Cancellation deletes the session and expiry is detected from
/// `expires_at`; neither is a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One store proposed by the coverage optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSelection {
    pub store_id: StoreId,
    pub store_name: String,
    pub item_count: usize,
    pub total_price: Money,
    /// Sum of `original price - offer price` over the assigned items.
    pub savings: Money,
}

impl StoreSelection {
    /// Builds the per-store selections for a session from an optimizer run.
    pub fn from_coverage(
        coverage: &StoreCoverage,
        items: &[WizardItem],
    ) -> BTreeMap<StoreId, StoreSelection> {
        coverage
            .assignments
            .iter()
            .map(|assignment| {
                let savings = assignment
                    .items
                    .iter()
                    .filter_map(|item_id| items.iter().find(|i| i.item_id == *item_id))
                    .filter_map(|item| {
                        item.suggestions
                            .iter()
                            .find(|s| s.store_id == assignment.store_id)
                            .map(|s| item.original_price - s.price)
                    })
                    .sum();

                let selection = StoreSelection {
                    store_id: assignment.store_id,
                    store_name: assignment.store_name.clone(),
                    item_count: assignment.items.len(),
                    total_price: assignment.total_price,
                    savings,
                };
                (assignment.store_id, selection)
            })
            .collect()
    }
}

/// Result of a successful confirm, also replayed for idempotent retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub session_id: SessionId,
    pub items_updated: usize,
    pub items_deleted: usize,
    pub snapshot_ids: Vec<SnapshotId>,
    pub stores_involved: usize,
    pub total_estimated_price: Money,
}

/// The unit of work for one migration attempt.
///
/// Owns its items, suggestions and decisions as plain values; decisions
/// refer to items and suggestions by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardSession {
    id: SessionId,
    user_id: UserId,
    shopping_list_id: ShoppingListId,
    status: SessionStatus,
    dataset_version: i32,
    expired_items: Vec<WizardItem>,
    current_item_index: usize,
    selected_stores: BTreeMap<StoreId, StoreSelection>,
    decisions: BTreeMap<ItemId, Decision>,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
}

impl WizardSession {
    /// Creates a fresh active session expiring [`SESSION_TTL_SECS`] after `now`.
    pub fn new(
        user_id: UserId,
        shopping_list_id: ShoppingListId,
        dataset_version: i32,
        expired_items: Vec<WizardItem>,
        selected_stores: BTreeMap<StoreId, StoreSelection>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            shopping_list_id,
            status: SessionStatus::Active,
            dataset_version,
            expired_items,
            current_item_index: 0,
            selected_stores,
            decisions: BTreeMap::new(),
            started_at: now,
            expires_at: now + session_ttl(),
            last_updated_at: now,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn shopping_list_id(&self) -> ShoppingListId {
        self.shopping_list_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn dataset_version(&self) -> i32 {
        self.dataset_version
    }

    pub fn expired_items(&self) -> &[WizardItem] {
        &self.expired_items
    }

    pub fn current_item_index(&self) -> usize {
        self.current_item_index
    }

    pub fn selected_stores(&self) -> &BTreeMap<StoreId, StoreSelection> {
        &self.selected_stores
    }

    pub fn decisions(&self) -> &BTreeMap<ItemId, Decision> {
        &self.decisions
    }

    pub fn decision(&self, item_id: ItemId) -> Option<&Decision> {
        self.decisions.get(&item_id)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Returns true once `now` is past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left until `expires_at`, never negative.
    ///
    /// `expires_at` is fixed at start; activity does not move it.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// Returns the session item with the given id.
    pub fn item(&self, item_id: ItemId) -> Option<&WizardItem> {
        self.expired_items.iter().find(|i| i.item_id == item_id)
    }

    /// Returns the item at the guided-flow cursor, if any remain.
    pub fn current_item(&self) -> Option<&WizardItem> {
        self.expired_items.get(self.current_item_index)
    }

    /// Returns every REPLACE decision paired with its item and chosen suggestion.
    pub fn replacements(&self) -> impl Iterator<Item = (&WizardItem, &Suggestion)> + '_ {
        self.expired_items.iter().filter_map(|item| {
            let suggestion_id = self.decisions.get(&item.item_id)?.suggestion_id()?;
            item.suggestion(suggestion_id).map(|s| (item, s))
        })
    }

    /// Returns the ids of items the user chose to remove.
    pub fn removals(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.decisions
            .iter()
            .filter(|(_, d)| matches!(d, Decision::Remove))
            .map(|(id, _)| *id)
    }

    fn ensure_active(&self, action: &'static str) -> Result<(), DomainError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                status: self.status,
                action,
            })
        }
    }

    fn validate(&self, item_id: ItemId, decision: &Decision) -> Result<(), DomainError> {
        let item = self.item(item_id).ok_or(DomainError::UnknownItem(item_id))?;
        if let Some(suggestion_id) = decision.suggestion_id() {
            validate_suggestion(item, suggestion_id)?;
        }
        Ok(())
    }

    /// Records or overwrites the decision for one item.
    pub fn record_decision(
        &mut self,
        item_id: ItemId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.record_decisions(vec![(item_id, decision)], now)
    }

    /// Records several decisions at once.
    ///
    /// All entries are validated before any is applied. When the same item
    /// appears more than once the last entry wins.
    pub fn record_decisions(
        &mut self,
        decisions: Vec<(ItemId, Decision)>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_active("decide items of")?;
        for (item_id, decision) in &decisions {
            self.validate(*item_id, decision)?;
        }

        self.decisions.extend(decisions);
        self.current_item_index = self
            .expired_items
            .iter()
            .position(|i| !self.decisions.contains_key(&i.item_id))
            .unwrap_or(self.expired_items.len());
        self.last_updated_at = now;
        Ok(())
    }

    /// Marks the session completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_active("complete")?;
        self.status = SessionStatus::Completed;
        self.last_updated_at = now;
        Ok(())
    }
}

fn validate_suggestion(item: &WizardItem, suggestion_id: FlyerProductId) -> Result<(), DomainError> {
    item.suggestion(suggestion_id)
        .map(|_| ())
        .ok_or(DomainError::UnknownSuggestion {
            item_id: item.item_id,
            suggestion_id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::optimize_stores;

    fn item(name: &str, offers: &[(i64, i64, i64)]) -> WizardItem {
        WizardItem {
            item_id: ItemId::new(),
            product_name: name.to_string(),
            brand: None,
            original_price: Money::from_cents(300),
            quantity: 1,
            unit: None,
            expiry_date: Utc::now(),
            original_store: None,
            original_offer: None,
            suggestions: offers
                .iter()
                .map(|(id, store, cents)| {
                    Suggestion::new(
                        FlyerProductId::new(*id),
                        name,
                        StoreId::new(*store),
                        format!("Store {store}"),
                        Money::from_cents(*cents),
                    )
                })
                .collect(),
        }
    }

    fn session(now: DateTime<Utc>) -> WizardSession {
        WizardSession::new(
            UserId::new(),
            ShoppingListId::new(),
            1,
            vec![
                item("Milk", &[(1, 1, 250), (2, 2, 280)]),
                item("Bread", &[(3, 1, 200)]),
            ],
            BTreeMap::new(),
            now,
        )
    }

    #[test]
    fn test_new_session_is_active_with_thirty_minute_expiry() {
        let now = Utc::now();
        let s = session(now);

        assert_eq!(s.status(), SessionStatus::Active);
        assert_eq!(s.expires_at(), now + Duration::minutes(30));
        assert!(!s.is_expired(now + Duration::minutes(30)));
        assert!(s.is_expired(now + Duration::minutes(30) + Duration::seconds(1)));
    }

    #[test]
    fn test_record_decision_overwrites_and_advances_cursor() {
        let now = Utc::now();
        let mut s = session(now);
        let milk = s.expired_items()[0].item_id;

        s.record_decision(milk, Decision::Skip, now).unwrap();
        assert_eq!(s.current_item_index(), 1);

        let later = now + Duration::minutes(10);
        s.record_decision(
            milk,
            Decision::Replace {
                suggestion_id: FlyerProductId::new(2),
            },
            later,
        )
        .unwrap();

        assert_eq!(s.decisions().len(), 1);
        assert_eq!(s.decision(milk).unwrap().suggestion_id(), Some(FlyerProductId::new(2)));
        assert_eq!(s.expires_at(), now + session_ttl());
        assert_eq!(s.last_updated_at(), later);
    }

    #[test]
    fn test_activity_does_not_move_expiry() {
        let now = Utc::now();
        let mut s = session(now);
        let milk = s.expired_items()[0].item_id;

        s.record_decision(milk, Decision::Remove, now + Duration::minutes(29))
            .unwrap();

        assert_eq!(s.expires_at(), s.started_at() + session_ttl());
        assert!(s.is_expired(now + Duration::minutes(31)));
        assert_eq!(
            s.remaining_ttl(now + Duration::minutes(29)),
            Duration::minutes(1)
        );
        assert_eq!(s.remaining_ttl(now + Duration::minutes(45)), Duration::zero());
    }

    #[test]
    fn test_replace_must_reference_item_suggestion() {
        let now = Utc::now();
        let mut s = session(now);
        let bread = s.expired_items()[1].item_id;

        let err = s
            .record_decision(
                bread,
                Decision::Replace {
                    suggestion_id: FlyerProductId::new(1),
                },
                now,
            )
            .unwrap_err();

        assert!(matches!(err, DomainError::UnknownSuggestion { .. }));
        assert!(s.decisions().is_empty());
    }

    #[test]
    fn test_unknown_item_is_rejected() {
        let now = Utc::now();
        let mut s = session(now);
        let err = s.record_decision(ItemId::new(), Decision::Remove, now).unwrap_err();
        assert!(matches!(err, DomainError::UnknownItem(_)));
    }

    #[test]
    fn test_bulk_decisions_are_all_or_nothing() {
        let now = Utc::now();
        let mut s = session(now);
        let milk = s.expired_items()[0].item_id;

        let result = s.record_decisions(
            vec![(milk, Decision::Remove), (ItemId::new(), Decision::Skip)],
            now,
        );

        assert!(result.is_err());
        assert!(s.decisions().is_empty());
        assert_eq!(s.current_item_index(), 0);
    }

    #[test]
    fn test_bulk_last_entry_wins_and_cursor_reaches_end() {
        let now = Utc::now();
        let mut s = session(now);
        let milk = s.expired_items()[0].item_id;
        let bread = s.expired_items()[1].item_id;

        s.record_decisions(
            vec![
                (milk, Decision::Skip),
                (bread, Decision::Remove),
                (
                    milk,
                    Decision::Replace {
                        suggestion_id: FlyerProductId::new(1),
                    },
                ),
            ],
            now,
        )
        .unwrap();

        assert_eq!(s.current_item_index(), 2);
        assert!(s.current_item().is_none());
        assert_eq!(s.replacements().count(), 1);
        assert_eq!(s.removals().collect::<Vec<_>>(), vec![bread]);
    }

    #[test]
    fn test_completed_session_rejects_changes() {
        let now = Utc::now();
        let mut s = session(now);
        let milk = s.expired_items()[0].item_id;

        s.complete(now).unwrap();
        assert_eq!(s.status(), SessionStatus::Completed);
        assert!(s.complete(now).is_err());
        assert!(matches!(
            s.record_decision(milk, Decision::Skip, now),
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_store_selection_from_coverage() {
        let now = Utc::now();
        let s = session(now);
        let input: BTreeMap<ItemId, Vec<Suggestion>> = s
            .expired_items()
            .iter()
            .map(|i| (i.item_id, i.suggestions.clone()))
            .collect();
        let coverage = optimize_stores(&input, 2);

        let selections = StoreSelection::from_coverage(&coverage, s.expired_items());
        let store1 = &selections[&StoreId::new(1)];

        assert_eq!(selections.len(), 1);
        assert_eq!(store1.item_count, 2);
        assert_eq!(store1.total_price, Money::from_cents(450));
        assert_eq!(store1.savings, Money::from_cents(150));
    }

    #[test]
    fn test_session_serialization_roundtrip() {
        let s = session(Utc::now());
        let json = serde_json::to_string(&s).unwrap();
        let back: WizardSession = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
        assert!(json.contains("\"status\":\"ACTIVE\""));
    }
}
