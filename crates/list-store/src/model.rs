//! Row-level types for lists, offers and snapshots.

use chrono::{DateTime, Utc};
use common::{
    FlyerId, FlyerProductId, ItemId, Money, ProductMasterId, SessionId, ShoppingListId,
    SnapshotId, StoreId, UserId,
};
use serde::{Deserialize, Serialize};

/// `snapshot_reason` recorded on snapshots created by the wizard.
pub const WIZARD_SNAPSHOT_REASON: &str = "wizard_migration";

/// A user's shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingList {
    pub id: ShoppingListId,
    pub user_id: UserId,
    pub name: String,
    /// True while a migration wizard holds the list.
    pub locked: bool,
    /// Wizard session that holds the lock.
    pub locked_by_session: Option<SessionId>,
}

impl ShoppingList {
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: ShoppingListId::new(),
            user_id,
            name: name.into(),
            locked: false,
            locked_by_session: None,
        }
    }
}

/// Where a list entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    /// Typed in by the user; never expires.
    #[default]
    Manual,
    /// Added from a flyer offer; expires with the offer.
    Flyer,
}

impl ItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemSource::Manual => "manual",
            ItemSource::Flyer => "flyer",
        }
    }
}

impl std::str::FromStr for ItemSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ItemSource::Manual),
            "flyer" => Ok(ItemSource::Flyer),
            other => Err(format!("unknown item source '{other}'")),
        }
    }
}

/// One entry of a shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub id: ItemId,
    pub list_id: ShoppingListId,
    pub product_name: String,
    pub brand: Option<String>,
    pub quantity: u32,
    pub unit: Option<String>,
    pub price: Money,
    pub store_id: Option<StoreId>,
    pub flyer_product_id: Option<FlyerProductId>,
    pub product_master_id: Option<ProductMasterId>,
    pub offer_valid_to: Option<DateTime<Utc>>,
    pub source: ItemSource,
}

impl ShoppingListItem {
    /// Creates a manually entered item.
    pub fn manual(list_id: ShoppingListId, product_name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            list_id,
            product_name: product_name.into(),
            brand: None,
            quantity: 1,
            unit: None,
            price: Money::zero(),
            store_id: None,
            flyer_product_id: None,
            product_master_id: None,
            offer_valid_to: None,
            source: ItemSource::Manual,
        }
    }

    /// Creates an item linked to a flyer offer.
    pub fn from_offer(
        list_id: ShoppingListId,
        product_name: impl Into<String>,
        flyer_product_id: FlyerProductId,
        store_id: StoreId,
        price: Money,
        offer_valid_to: DateTime<Utc>,
    ) -> Self {
        Self {
            store_id: Some(store_id),
            flyer_product_id: Some(flyer_product_id),
            price,
            offer_valid_to: Some(offer_valid_to),
            source: ItemSource::Flyer,
            ..Self::manual(list_id, product_name)
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

    /// An item is expired when it came from a flyer offer whose validity
    /// ended before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.source == ItemSource::Flyer
            && self.flyer_product_id.is_some()
            && self.offer_valid_to.is_some_and(|valid_to| valid_to < now)
    }
}

/// Current validity of an offer and the flyer it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferValidity {
    pub flyer_product_id: FlyerProductId,
    pub flyer_id: FlyerId,
    pub flyer_valid_to: DateTime<Utc>,
}

impl OfferValidity {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.flyer_valid_to < now
    }
}

/// Immutable audit record of the offer chosen for a list item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferSnapshot {
    pub id: SnapshotId,
    pub shopping_list_item_id: ItemId,
    pub flyer_product_id: FlyerProductId,
    pub product_master_id: Option<ProductMasterId>,
    pub store_id: Option<StoreId>,
    pub product_name: String,
    pub brand: Option<String>,
    pub price: Money,
    pub unit: Option<String>,
    pub size_value: Option<f64>,
    pub size_unit: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub estimated: bool,
    pub snapshot_reason: String,
    pub created_at: DateTime<Utc>,
}

/// New offer-link values written onto a replaced list item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReplacement {
    pub product_name: String,
    pub brand: Option<String>,
    pub unit: Option<String>,
    pub price: Money,
    pub store_id: StoreId,
    pub flyer_product_id: FlyerProductId,
    pub product_master_id: Option<ProductMasterId>,
    pub offer_valid_to: Option<DateTime<Utc>>,
}

/// A single write of a migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemChange {
    /// Record a snapshot and relink the item to the replacement offer.
    Replace {
        item_id: ItemId,
        snapshot: OfferSnapshot,
        replacement: ItemReplacement,
    },
    /// Delete the item.
    Remove { item_id: ItemId },
}

impl ItemChange {
    pub fn item_id(&self) -> ItemId {
        match self {
            ItemChange::Replace { item_id, .. } | ItemChange::Remove { item_id } => *item_id,
        }
    }
}

/// All writes of one confirmed wizard session.
///
/// Applying a batch also releases the list lock, which must still be held
/// by `session_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationBatch {
    pub list_id: ShoppingListId,
    pub session_id: SessionId,
    pub changes: Vec<ItemChange>,
}

/// What a committed batch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReceipt {
    pub items_updated: usize,
    pub items_deleted: usize,
    pub snapshot_ids: Vec<SnapshotId>,
}
