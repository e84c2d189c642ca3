//! Expired items and their replacement suggestions.

use chrono::{DateTime, Utc};
use common::{FlyerProductId, ItemId, Money, ProductMasterId, StoreId};
use serde::{Deserialize, Serialize};

use crate::scoring::OriginalProduct;

/// Weighted score components of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub brand: f64,
    pub store: f64,
    pub size: f64,
    pub price: f64,
    pub total_score: f64,
}

/// A replacement offer proposed for one expired item.
///
/// Created once when the session starts and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub flyer_product_id: FlyerProductId,
    pub product_master_id: Option<ProductMasterId>,
    pub product_name: String,
    pub brand: Option<String>,
    pub store_id: StoreId,
    pub store_name: String,
    pub price: Money,
    pub unit: Option<String>,
    pub size_value: Option<f64>,
    pub size_unit: Option<String>,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    /// `price - original price`; negative when the suggestion is cheaper.
    pub price_difference: Money,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl Suggestion {
    /// Creates an unscored suggestion for an offer.
    pub fn new(
        flyer_product_id: FlyerProductId,
        product_name: impl Into<String>,
        store_id: StoreId,
        store_name: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            flyer_product_id,
            product_master_id: None,
            product_name: product_name.into(),
            brand: None,
            store_id,
            store_name: store_name.into(),
            price,
            unit: None,
            size_value: None,
            size_unit: None,
            score: 0.0,
            score_breakdown: ScoreBreakdown::default(),
            price_difference: Money::zero(),
            valid_from: None,
            valid_to: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// The unit used for size comparison: the explicit size unit if present,
    /// otherwise the pricing unit.
    pub fn effective_unit(&self) -> Option<&str> {
        self.size_unit.as_deref().or(self.unit.as_deref())
    }
}

/// Snapshot of one expired shopping-list entry, captured at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardItem {
    pub item_id: ItemId,
    pub product_name: String,
    pub brand: Option<String>,
    pub original_price: Money,
    pub quantity: u32,
    pub unit: Option<String>,
    pub expiry_date: DateTime<Utc>,
    pub original_store: Option<StoreId>,
    pub original_offer: Option<FlyerProductId>,
    pub suggestions: Vec<Suggestion>,
}

impl WizardItem {
    /// Returns the scoring view of the original entry.
    pub fn original_product(&self) -> OriginalProduct<'_> {
        OriginalProduct {
            brand: self.brand.as_deref(),
            price: self.original_price,
            unit: self.unit.as_deref(),
        }
    }

    /// Looks up one of this item's suggestions by offer id.
    pub fn suggestion(&self, suggestion_id: FlyerProductId) -> Option<&Suggestion> {
        self.suggestions
            .iter()
            .find(|s| s.flyer_product_id == suggestion_id)
    }

    /// Returns true if at least one same-brand suggestion exists.
    pub fn has_same_brand_suggestion(&self) -> bool {
        match self.brand.as_deref() {
            Some(brand) => self
                .suggestions
                .iter()
                .any(|s| s.brand.as_deref() == Some(brand)),
            None => false,
        }
    }
}
