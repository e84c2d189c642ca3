//! Deterministic multi-factor scoring of replacement suggestions.
//!
//! A suggestion's score is the weighted sum of four components, each in
//! `[0, 1]` before weighting:
//!
//! | component | value |
//! |-----------|-------|
//! | brand     | 1 when both brands are known and equal, else 0 |
//! | store     | 1 for a preferred store, else 0.5 |
//! | size      | 0.8 same unit, 0 different unit, 0.5 when either is unknown |
//! | price     | 0.5 at parity, rising to 1 as it gets cheaper, falling to 0 at double |
//!
//! Same-unit matches all score 0.8 regardless of magnitude; sizes are not
//! compared numerically.

use std::collections::BTreeSet;

use common::{Money, StoreId};
use serde::{Deserialize, Serialize};

use crate::item::{ScoreBreakdown, Suggestion};

const SAME_UNIT_SIZE_SCORE: f64 = 0.8;
const UNKNOWN_SIZE_SCORE: f64 = 0.5;
const NEUTRAL_PRICE_SCORE: f64 = 0.5;
const NON_PREFERRED_STORE_SCORE: f64 = 0.5;

/// Relative weights of the score components.
///
/// Passed explicitly to every scoring call; there is no process-wide override.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub brand: f64,
    pub store: f64,
    pub size: f64,
    pub price: f64,
}

impl ScoringWeights {
    /// The highest score attainable with these weights.
    pub fn max_score(&self) -> f64 {
        self.brand + self.store + self.size + self.price
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            brand: 3.0,
            store: 2.0,
            size: 1.0,
            price: 1.0,
        }
    }
}

/// The fields of the original list entry that scoring compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginalProduct<'a> {
    pub brand: Option<&'a str>,
    pub price: Money,
    pub unit: Option<&'a str>,
}

/// The set of stores a user marked as preferred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStorePreferences {
    preferred: BTreeSet<StoreId>,
}

impl UserStorePreferences {
    pub fn new(stores: impl IntoIterator<Item = StoreId>) -> Self {
        Self {
            preferred: stores.into_iter().collect(),
        }
    }

    pub fn is_preferred(&self, store_id: StoreId) -> bool {
        self.preferred.contains(&store_id)
    }

    pub fn len(&self) -> usize {
        self.preferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preferred.is_empty()
    }
}

fn brand_component(suggestion: &Suggestion, original: &OriginalProduct<'_>) -> f64 {
    match (original.brand, suggestion.brand.as_deref()) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => 0.0,
    }
}

fn store_component(suggestion: &Suggestion, preferences: &UserStorePreferences) -> f64 {
    if preferences.is_preferred(suggestion.store_id) {
        1.0
    } else {
        NON_PREFERRED_STORE_SCORE
    }
}

fn size_component(suggestion: &Suggestion, original: &OriginalProduct<'_>) -> f64 {
    match (original.unit, suggestion.effective_unit()) {
        (Some(a), Some(b)) if a == b => SAME_UNIT_SIZE_SCORE,
        (Some(_), Some(_)) => 0.0,
        _ => UNKNOWN_SIZE_SCORE,
    }
}

fn price_component(suggestion: &Suggestion, original: &OriginalProduct<'_>) -> f64 {
    let original_cents = original.price.cents();
    let suggested_cents = suggestion.price.cents();

    if original_cents <= 0 || suggested_cents <= 0 {
        return NEUTRAL_PRICE_SCORE;
    }

    let original = original_cents as f64;
    let suggested = suggested_cents as f64;

    if suggested <= original {
        0.5 + 0.5 * (original - suggested) / original
    } else {
        0.5 - f64::min(0.5, 0.5 * (suggested - original) / original)
    }
}

/// Computes the weighted score components for one suggestion.
pub fn score_breakdown(
    suggestion: &Suggestion,
    original: &OriginalProduct<'_>,
    preferences: &UserStorePreferences,
    weights: &ScoringWeights,
) -> ScoreBreakdown {
    let brand = brand_component(suggestion, original) * weights.brand;
    let store = store_component(suggestion, preferences) * weights.store;
    let size = size_component(suggestion, original) * weights.size;
    let price = price_component(suggestion, original) * weights.price;

    ScoreBreakdown {
        brand,
        store,
        size,
        price,
        total_score: brand + store + size + price,
    }
}

/// Scores a suggestion against the original product.
///
/// Pure: identical inputs always yield a bit-identical result.
pub fn score(
    suggestion: &Suggestion,
    original: &OriginalProduct<'_>,
    preferences: &UserStorePreferences,
    weights: &ScoringWeights,
) -> f64 {
    score_breakdown(suggestion, original, preferences, weights).total_score
}

/// Scores every suggestion and returns them in ranking order.
///
/// Each suggestion gets its score, breakdown and price difference filled
/// in. Order is total score descending, then price difference ascending,
/// then offer id ascending, so the result is a total order.
pub fn rank(
    suggestions: Vec<Suggestion>,
    original: &OriginalProduct<'_>,
    preferences: &UserStorePreferences,
    weights: &ScoringWeights,
) -> Vec<Suggestion> {
    let mut ranked: Vec<Suggestion> = suggestions
        .into_iter()
        .map(|mut s| {
            s.score_breakdown = score_breakdown(&s, original, preferences, weights);
            s.score = s.score_breakdown.total_score;
            s.price_difference = s.price - original.price;
            s
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.price_difference.cmp(&b.price_difference))
            .then(a.flyer_product_id.cmp(&b.flyer_product_id))
    });

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::FlyerProductId;

    fn coke_original() -> OriginalProduct<'static> {
        OriginalProduct {
            brand: Some("Coca-Cola"),
            price: Money::from_cents(300),
            unit: Some("L"),
        }
    }

    fn offer(id: i64, store: i64, cents: i64) -> Suggestion {
        Suggestion::new(
            FlyerProductId::new(id),
            "Cola 1.5L",
            StoreId::new(store),
            format!("Store {store}"),
            Money::from_cents(cents),
        )
    }

    #[test]
    fn test_reference_example_scores_about_6_38() {
        let suggestion = offer(1, 1, 250).with_brand("Coca-Cola").with_unit("L");
        let prefs = UserStorePreferences::new([StoreId::new(1)]);

        let breakdown = score_breakdown(
            &suggestion,
            &coke_original(),
            &prefs,
            &ScoringWeights::default(),
        );

        assert_eq!(breakdown.brand, 3.0);
        assert_eq!(breakdown.store, 2.0);
        assert_eq!(breakdown.size, 0.8);
        assert!((breakdown.price - (0.5 + 0.5 * (0.5 / 3.0))).abs() < 1e-12);
        assert!((breakdown.total_score - 6.3833).abs() < 1e-3);
    }

    #[test]
    fn test_score_is_deterministic() {
        let suggestion = offer(1, 2, 275).with_brand("Pepsi").with_unit("ml");
        let prefs = UserStorePreferences::new([StoreId::new(1)]);
        let weights = ScoringWeights::default();

        let runs: Vec<u64> = (0..3)
            .map(|_| score(&suggestion, &coke_original(), &prefs, &weights).to_bits())
            .collect();

        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[1], runs[2]);
    }

    #[test]
    fn test_brand_requires_exact_match_on_both_sides() {
        let prefs = UserStorePreferences::default();
        let weights = ScoringWeights::default();

        let lower = offer(1, 1, 300).with_brand("coca-cola");
        let missing = offer(2, 1, 300);
        let original_without_brand = OriginalProduct {
            brand: None,
            ..coke_original()
        };
        let same = offer(3, 1, 300).with_brand("Coca-Cola");

        assert_eq!(score_breakdown(&lower, &coke_original(), &prefs, &weights).brand, 0.0);
        assert_eq!(score_breakdown(&missing, &coke_original(), &prefs, &weights).brand, 0.0);
        assert_eq!(
            score_breakdown(&same, &original_without_brand, &prefs, &weights).brand,
            0.0
        );
        assert_eq!(score_breakdown(&same, &coke_original(), &prefs, &weights).brand, 3.0);
    }

    #[test]
    fn test_non_preferred_store_gets_half_weight() {
        let prefs = UserStorePreferences::new([StoreId::new(1)]);
        let b = score_breakdown(
            &offer(1, 9, 300),
            &coke_original(),
            &prefs,
            &ScoringWeights::default(),
        );
        assert_eq!(b.store, 1.0);
    }

    #[test]
    fn test_size_component_cases() {
        let prefs = UserStorePreferences::default();
        let weights = ScoringWeights::default();

        let unknown = offer(1, 1, 300);
        let other_unit = offer(2, 1, 300).with_unit("kg");
        let same_unit = offer(3, 1, 300).with_unit("L");

        assert_eq!(score_breakdown(&unknown, &coke_original(), &prefs, &weights).size, 0.5);
        assert_eq!(score_breakdown(&other_unit, &coke_original(), &prefs, &weights).size, 0.0);
        assert_eq!(score_breakdown(&same_unit, &coke_original(), &prefs, &weights).size, 0.8);
    }

    #[test]
    fn test_price_component_bounds() {
        let prefs = UserStorePreferences::default();
        let weights = ScoringWeights::default();
        let original = coke_original();

        let parity = score_breakdown(&offer(1, 1, 300), &original, &prefs, &weights).price;
        let pricier = score_breakdown(&offer(2, 1, 450), &original, &prefs, &weights).price;
        let double = score_breakdown(&offer(3, 1, 600), &original, &prefs, &weights).price;
        let triple = score_breakdown(&offer(4, 1, 900), &original, &prefs, &weights).price;

        assert_eq!(parity, 0.5);
        assert!((pricier - 0.25).abs() < 1e-12);
        assert_eq!(double, 0.0);
        assert_eq!(triple, 0.0);
    }

    #[test]
    fn test_unknown_prices_are_neutral() {
        let prefs = UserStorePreferences::default();
        let weights = ScoringWeights::default();
        let free_original = OriginalProduct {
            price: Money::zero(),
            ..coke_original()
        };

        assert_eq!(
            score_breakdown(&offer(1, 1, 250), &free_original, &prefs, &weights).price,
            0.5
        );
        assert_eq!(
            score_breakdown(&offer(2, 1, 0), &coke_original(), &prefs, &weights).price,
            0.5
        );
    }

    #[test]
    fn test_score_within_bounds() {
        let weights = ScoringWeights::default();
        let prefs = UserStorePreferences::new([StoreId::new(1)]);
        let original = coke_original();

        for cents in [1, 50, 150, 299, 300, 301, 600, 5_000] {
            for store in [1, 2] {
                for unit in [None, Some("L"), Some("kg")] {
                    let mut s = offer(cents, store, cents).with_brand("Coca-Cola");
                    s.unit = unit.map(str::to_string);
                    let value = score(&s, &original, &prefs, &weights);
                    assert!(value >= 0.0, "score {value} below zero");
                    assert!(value <= weights.max_score(), "score {value} above max");
                }
            }
        }
    }

    #[test]
    fn test_rank_orders_by_score_then_price_then_id() {
        let prefs = UserStorePreferences::new([StoreId::new(1)]);
        let weights = ScoringWeights::default();

        let ranked = rank(
            vec![
                offer(30, 2, 300),
                offer(20, 1, 300).with_brand("Coca-Cola"),
                offer(10, 2, 300),
            ],
            &coke_original(),
            &prefs,
            &weights,
        );

        let ids: Vec<i64> = ranked.iter().map(|s| s.flyer_product_id.as_i64()).collect();
        assert_eq!(ids, vec![20, 10, 30]);
        assert_eq!(ranked[0].price_difference, Money::zero());
        assert_eq!(ranked[0].score, ranked[0].score_breakdown.total_score);
    }

    #[test]
    fn test_tie_break_uses_ascending_offer_id() {
        let prefs = UserStorePreferences::default();
        let weights = ScoringWeights {
            price: 0.0,
            ..ScoringWeights::default()
        };

        // With price weight zero these two tie on score and price difference.
        let ranked = rank(
            vec![offer(9, 1, 200), offer(4, 2, 200)],
            &coke_original(),
            &prefs,
            &weights,
        );

        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranked[0].price_difference, ranked[1].price_difference);
        assert_eq!(ranked[0].flyer_product_id, FlyerProductId::new(4));
    }

    #[test]
    fn test_cheaper_wins_score_tie() {
        let prefs = UserStorePreferences::default();
        let weights = ScoringWeights {
            price: 0.0,
            ..ScoringWeights::default()
        };

        let ranked = rank(
            vec![offer(1, 1, 280), offer(2, 1, 260)],
            &coke_original(),
            &prefs,
            &weights,
        );

        assert_eq!(ranked[0].flyer_product_id, FlyerProductId::new(2));
        assert_eq!(ranked[0].price_difference, Money::from_cents(-40));
    }

    #[test]
    fn test_rank_is_repeatable() {
        let prefs = UserStorePreferences::new([StoreId::new(2)]);
        let weights = ScoringWeights::default();
        let input = vec![
            offer(5, 1, 310).with_brand("Coca-Cola"),
            offer(3, 2, 290),
            offer(8, 2, 290).with_unit("L"),
            offer(1, 3, 150).with_brand("Pepsi"),
        ];

        let orders: Vec<Vec<FlyerProductId>> = (0..3)
            .map(|_| {
                rank(input.clone(), &coke_original(), &prefs, &weights)
                    .into_iter()
                    .map(|s| s.flyer_product_id)
                    .collect()
            })
            .collect();

        assert_eq!(orders[0], orders[1]);
        assert_eq!(orders[1], orders[2]);
    }
}
