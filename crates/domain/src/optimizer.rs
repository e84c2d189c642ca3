//! Greedy store coverage optimization.
//!
//! Picks at most [`MAX_STORES`] stores that together offer alternatives for
//! as many expired items as possible. Each round selects the store covering
//! the most still-uncovered items; ties go to the lower aggregate price and
//! then to the lower store id, so the result is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use common::{ItemId, Money, StoreId};
use serde::{Deserialize, Serialize};

use crate::item::Suggestion;

/// Business cap on the number of stores proposed to the user.
pub const MAX_STORES: usize = 2;

/// Items a selected store was chosen to cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreAssignment {
    pub store_id: StoreId,
    pub store_name: String,
    /// Items newly covered when this store was selected.
    pub items: Vec<ItemId>,
    /// Sum of this store's best offer price for each assigned item.
    pub total_price: Money,
}

/// Result of a coverage optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreCoverage {
    /// Store ids in selection order.
    pub selected_stores: Vec<StoreId>,
    pub assignments: Vec<StoreAssignment>,
    pub uncovered_items: Vec<ItemId>,
    pub coverage_percent: f64,
    pub total_price: Money,
    pub explanation: String,
}

impl StoreCoverage {
    /// Returns the assignment for a selected store.
    pub fn assignment(&self, store_id: StoreId) -> Option<&StoreAssignment> {
        self.assignments.iter().find(|a| a.store_id == store_id)
    }

    pub fn covered_count(&self) -> usize {
        self.assignments.iter().map(|a| a.items.len()).sum()
    }
}

#[derive(Debug)]
struct StoreCandidate {
    store_name: String,
    /// Best (first-ranked) price per item at this store.
    items: BTreeMap<ItemId, Money>,
    aggregate_price: Money,
}

fn build_candidates(
    suggestions: &BTreeMap<ItemId, Vec<Suggestion>>,
) -> BTreeMap<StoreId, StoreCandidate> {
    let mut candidates: BTreeMap<StoreId, StoreCandidate> = BTreeMap::new();

    for (item_id, ranked) in suggestions {
        for suggestion in ranked {
            let candidate = candidates
                .entry(suggestion.store_id)
                .or_insert_with(|| StoreCandidate {
                    store_name: suggestion.store_name.clone(),
                    items: BTreeMap::new(),
                    aggregate_price: Money::zero(),
                });

            // Lists are ranked, so the first offer seen per item is the best one.
            if !candidate.items.contains_key(item_id) {
                candidate.items.insert(*item_id, suggestion.price);
                candidate.aggregate_price += suggestion.price;
            }
        }
    }

    candidates
}

fn explain(
    assignments: &[StoreAssignment],
    covered: usize,
    total: usize,
    coverage_percent: f64,
) -> String {
    if assignments.is_empty() {
        return format!("No store carries an alternative for any of the {total} expired items.");
    }

    let names: Vec<&str> = assignments.iter().map(|a| a.store_name.as_str()).collect();
    let mut text = format!(
        "Shop at {} to replace {covered} of {total} expired items ({coverage_percent:.0}%).",
        names.join(" and ")
    );

    let missing = total - covered;
    if missing == 1 {
        text.push_str(" 1 item has no alternative at these stores.");
    } else if missing > 1 {
        text.push_str(&format!(" {missing} items have no alternative at these stores."));
    }

    text
}

/// Selects up to `max_stores` stores (clamped to `1..=MAX_STORES`) covering
/// the most items at the lowest aggregate price.
///
/// Every key of `suggestions` counts as an item to cover, including items
/// with an empty suggestion list.
pub fn optimize_stores(
    suggestions: &BTreeMap<ItemId, Vec<Suggestion>>,
    max_stores: usize,
) -> StoreCoverage {
    let cap = max_stores.clamp(1, MAX_STORES);
    let total_items = suggestions.len();

    let mut candidates = build_candidates(suggestions);
    let mut uncovered: BTreeSet<ItemId> = suggestions.keys().copied().collect();
    let mut selected_stores = Vec::new();
    let mut assignments = Vec::new();

    for _ in 0..cap {
        let best = candidates
            .iter()
            .map(|(store_id, c)| {
                let new_items = c.items.keys().filter(|i| uncovered.contains(i)).count();
                (*store_id, new_items, c.aggregate_price)
            })
            .filter(|(_, new_items, _)| *new_items > 0)
            .min_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));

        let Some((store_id, _, _)) = best else {
            break;
        };
        let Some(candidate) = candidates.remove(&store_id) else {
            break;
        };

        let mut items = Vec::new();
        let mut total_price = Money::zero();
        for (item_id, price) in &candidate.items {
            if uncovered.remove(item_id) {
                items.push(*item_id);
                total_price += *price;
            }
        }

        selected_stores.push(store_id);
        assignments.push(StoreAssignment {
            store_id,
            store_name: candidate.store_name,
            items,
            total_price,
        });
    }

    let covered = total_items - uncovered.len();
    let coverage_percent = if total_items == 0 {
        0.0
    } else {
        covered as f64 / total_items as f64 * 100.0
    };
    let total_price = assignments.iter().map(|a| a.total_price).sum();
    let explanation = explain(&assignments, covered, total_items, coverage_percent);

    StoreCoverage {
        selected_stores,
        assignments,
        uncovered_items: uncovered.into_iter().collect(),
        coverage_percent,
        total_price,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::FlyerProductId;

    fn offer(id: i64, store: i64, cents: i64) -> Suggestion {
        Suggestion::new(
            FlyerProductId::new(id),
            "Product",
            StoreId::new(store),
            format!("Store {store}"),
            Money::from_cents(cents),
        )
    }

    #[test]
    fn test_two_disjoint_stores_give_full_coverage() {
        let (a1, a2, b1) = (ItemId::new(), ItemId::new(), ItemId::new());
        let input = BTreeMap::from([
            (a1, vec![offer(1, 1, 100)]),
            (a2, vec![offer(2, 1, 200)]),
            (b1, vec![offer(3, 2, 300)]),
        ]);

        let coverage = optimize_stores(&input, 2);

        assert_eq!(coverage.selected_stores, vec![StoreId::new(1), StoreId::new(2)]);
        assert_eq!(coverage.coverage_percent, 100.0);
        assert!(coverage.uncovered_items.is_empty());
        assert_eq!(coverage.total_price, Money::from_cents(600));
        assert_eq!(coverage.assignment(StoreId::new(1)).unwrap().items.len(), 2);
        assert_eq!(coverage.assignment(StoreId::new(2)).unwrap().items, vec![b1]);
    }

    #[test]
    fn test_tie_on_coverage_prefers_cheaper_store() {
        let (i1, i2) = (ItemId::new(), ItemId::new());
        let input = BTreeMap::from([
            (i1, vec![offer(1, 1, 500), offer(2, 2, 300)]),
            (i2, vec![offer(3, 1, 500), offer(4, 2, 300)]),
        ]);

        let coverage = optimize_stores(&input, 2);

        assert_eq!(coverage.selected_stores, vec![StoreId::new(2)]);
        assert_eq!(coverage.total_price, Money::from_cents(600));
    }

    #[test]
    fn test_stops_when_no_store_adds_coverage() {
        let i1 = ItemId::new();
        let input = BTreeMap::from([(i1, vec![offer(1, 1, 100), offer(2, 2, 90)])]);

        let coverage = optimize_stores(&input, 2);

        // Both stores cover the single item; the cheaper one wins and the
        // other adds nothing in the second round.
        assert_eq!(coverage.selected_stores, vec![StoreId::new(2)]);
    }

    #[test]
    fn test_max_stores_is_clamped() {
        let items: Vec<ItemId> = (0..3).map(|_| ItemId::new()).collect();
        let input: BTreeMap<ItemId, Vec<Suggestion>> = items
            .iter()
            .enumerate()
            .map(|(n, id)| (*id, vec![offer(n as i64, n as i64 + 1, 100)]))
            .collect();

        assert_eq!(optimize_stores(&input, 0).selected_stores.len(), 1);
        assert_eq!(optimize_stores(&input, 5).selected_stores.len(), 2);

        let capped = optimize_stores(&input, 5);
        assert_eq!(capped.uncovered_items.len(), 1);
        assert!((capped.coverage_percent - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_items_without_suggestions_stay_uncovered() {
        let (i1, i2) = (ItemId::new(), ItemId::new());
        let input = BTreeMap::from([(i1, vec![offer(1, 1, 100)]), (i2, vec![])]);

        let coverage = optimize_stores(&input, 2);

        assert_eq!(coverage.uncovered_items, vec![i2]);
        assert_eq!(coverage.coverage_percent, 50.0);
        assert!(coverage.explanation.contains("1 item has no alternative"));
    }

    #[test]
    fn test_empty_input() {
        let coverage = optimize_stores(&BTreeMap::new(), 2);
        assert!(coverage.selected_stores.is_empty());
        assert_eq!(coverage.coverage_percent, 0.0);
        assert_eq!(coverage.total_price, Money::zero());
    }

    #[test]
    fn test_uses_first_ranked_offer_per_item_and_store() {
        let i1 = ItemId::new();
        let input = BTreeMap::from([(i1, vec![offer(1, 1, 250), offer(2, 1, 100)])]);

        let coverage = optimize_stores(&input, 1);

        assert_eq!(coverage.total_price, Money::from_cents(250));
    }

    #[test]
    fn test_greedy_picks_widest_store_first() {
        let items: Vec<ItemId> = (0..4).map(|_| ItemId::new()).collect();
        let input = BTreeMap::from([
            (items[0], vec![offer(1, 7, 100), offer(2, 3, 100)]),
            (items[1], vec![offer(3, 7, 100)]),
            (items[2], vec![offer(4, 7, 100)]),
            (items[3], vec![offer(5, 3, 100)]),
        ]);

        let coverage = optimize_stores(&input, 2);

        assert_eq!(coverage.selected_stores, vec![StoreId::new(7), StoreId::new(3)]);
        assert_eq!(coverage.assignment(StoreId::new(3)).unwrap().items, vec![items[3]]);
        assert_eq!(coverage.covered_count(), 4);
        assert!(coverage.explanation.starts_with("Shop at Store 7 and Store 3"));
    }
}
