use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{FlyerProductId, ItemId, SessionId, ShoppingListId, StoreId, UserId};
use tokio::sync::RwLock;

use crate::store::ShoppingListStore;
use crate::{
    ItemChange, ListStoreError, MigrationBatch, MigrationReceipt, OfferSnapshot, OfferValidity,
    Result, ShoppingList, ShoppingListItem,
};

#[derive(Debug, Clone, Default)]
struct InMemoryState {
    lists: HashMap<ShoppingListId, ShoppingList>,
    /// Items in insertion order, which is also display order.
    items: Vec<ShoppingListItem>,
    offers: HashMap<FlyerProductId, OfferValidity>,
    preferences: HashMap<UserId, Vec<StoreId>>,
    snapshots: Vec<OfferSnapshot>,
}

/// In-memory shopping list store for testing.
///
/// `apply_migration` works on a copy of the state and swaps it in only when
/// every change succeeded, giving the same all-or-nothing behaviour as the
/// PostgreSQL transaction.
#[derive(Clone, Default)]
pub struct InMemoryShoppingListStore {
    state: Arc<RwLock<InMemoryState>>,
    fail_on_apply: Arc<RwLock<bool>>,
    committed_batches: Arc<RwLock<usize>>,
}

impl InMemoryShoppingListStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_list(&self, list: ShoppingList) {
        self.state.write().await.lists.insert(list.id, list);
    }

    pub async fn insert_item(&self, item: ShoppingListItem) {
        self.state.write().await.items.push(item);
    }

    pub async fn insert_offer(&self, offer: OfferValidity) {
        self.state
            .write()
            .await
            .offers
            .insert(offer.flyer_product_id, offer);
    }

    /// Deletes an offer, as when a flyer is withdrawn.
    pub async fn remove_offer(&self, flyer_product_id: FlyerProductId) {
        self.state.write().await.offers.remove(&flyer_product_id);
    }

    pub async fn set_preferred_stores(&self, user_id: UserId, stores: Vec<StoreId>) {
        self.state.write().await.preferences.insert(user_id, stores);
    }

    /// Makes `apply_migration` fail after applying its changes to the
    /// working copy, simulating a mid-transaction error.
    pub async fn set_fail_on_apply(&self, fail: bool) {
        *self.fail_on_apply.write().await = fail;
    }

    /// Returns the number of migration batches committed.
    pub async fn committed_batches(&self) -> usize {
        *self.committed_batches.read().await
    }

    pub async fn item(&self, item_id: ItemId) -> Option<ShoppingListItem> {
        self.state
            .read()
            .await
            .items
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
    }

    pub async fn snapshots(&self) -> Vec<OfferSnapshot> {
        self.state.read().await.snapshots.clone()
    }

    pub async fn is_locked(&self, list_id: ShoppingListId) -> bool {
        self.state
            .read()
            .await
            .lists
            .get(&list_id)
            .is_some_and(|l| l.locked)
    }

    /// Returns the session holding the list lock.
    pub async fn lock_holder(&self, list_id: ShoppingListId) -> Option<SessionId> {
        self.state
            .read()
            .await
            .lists
            .get(&list_id)
            .and_then(|l| l.locked_by_session)
    }
}

fn apply_change(
    state: &mut InMemoryState,
    list_id: ShoppingListId,
    change: ItemChange,
) -> Result<bool> {
    match change {
        ItemChange::Replace {
            item_id,
            snapshot,
            replacement,
        } => {
            let item = state
                .items
                .iter_mut()
                .find(|i| i.id == item_id && i.list_id == list_id)
                .ok_or(ListStoreError::ItemNotFound(item_id))?;

            item.product_name = replacement.product_name;
            item.brand = replacement.brand;
            item.unit = replacement.unit;
            item.price = replacement.price;
            item.store_id = Some(replacement.store_id);
            item.flyer_product_id = Some(replacement.flyer_product_id);
            item.product_master_id = replacement.product_master_id;
            item.offer_valid_to = replacement.offer_valid_to;
            item.source = crate::ItemSource::Flyer;

            state.snapshots.push(snapshot);
            Ok(true)
        }
        ItemChange::Remove { item_id } => {
            let before = state.items.len();
            state
                .items
                .retain(|i| !(i.id == item_id && i.list_id == list_id));
            if state.items.len() == before {
                return Err(ListStoreError::ItemNotFound(item_id));
            }
            Ok(false)
        }
    }
}

#[async_trait]
impl ShoppingListStore for InMemoryShoppingListStore {
    async fn get_list(&self, list_id: ShoppingListId) -> Result<Option<ShoppingList>> {
        Ok(self.state.read().await.lists.get(&list_id).cloned())
    }

    async fn get_items(&self, list_id: ShoppingListId) -> Result<Vec<ShoppingListItem>> {
        Ok(self
            .state
            .read()
            .await
            .items
            .iter()
            .filter(|i| i.list_id == list_id)
            .cloned()
            .collect())
    }

    async fn get_offer(&self, flyer_product_id: FlyerProductId) -> Result<Option<OfferValidity>> {
        Ok(self.state.read().await.offers.get(&flyer_product_id).copied())
    }

    async fn preferred_stores(&self, user_id: UserId) -> Result<Vec<StoreId>> {
        Ok(self
            .state
            .read()
            .await
            .preferences
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn acquire_lock(
        &self,
        list_id: ShoppingListId,
        session_id: SessionId,
        expected: Option<SessionId>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let list = state
            .lists
            .get_mut(&list_id)
            .ok_or(ListStoreError::ListNotFound(list_id))?;

        if list.locked_by_session != expected {
            return Err(ListStoreError::LockNotHeld {
                list_id,
                session_id,
            });
        }
        list.locked = true;
        list.locked_by_session = Some(session_id);
        Ok(())
    }

    async fn release_lock(&self, list_id: ShoppingListId, session_id: SessionId) -> Result<bool> {
        let mut state = self.state.write().await;
        let list = state
            .lists
            .get_mut(&list_id)
            .ok_or(ListStoreError::ListNotFound(list_id))?;

        if list.locked_by_session != Some(session_id) {
            return Ok(false);
        }
        list.locked = false;
        list.locked_by_session = None;
        Ok(true)
    }

    async fn apply_migration(&self, batch: MigrationBatch) -> Result<MigrationReceipt> {
        let mut state = self.state.write().await;
        let mut working = state.clone();

        let list = working
            .lists
            .get_mut(&batch.list_id)
            .ok_or(ListStoreError::ListNotFound(batch.list_id))?;
        if list.locked_by_session != Some(batch.session_id) {
            return Err(ListStoreError::LockNotHeld {
                list_id: batch.list_id,
                session_id: batch.session_id,
            });
        }
        list.locked = false;
        list.locked_by_session = None;

        let mut receipt = MigrationReceipt::default();
        for change in batch.changes {
            let snapshot_id = match &change {
                ItemChange::Replace { snapshot, .. } => Some(snapshot.id),
                ItemChange::Remove { .. } => None,
            };

            if apply_change(&mut working, batch.list_id, change)? {
                receipt.items_updated += 1;
            } else {
                receipt.items_deleted += 1;
            }
            receipt.snapshot_ids.extend(snapshot_id);
        }

        if *self.fail_on_apply.read().await {
            return Err(ListStoreError::Unavailable(
                "injected failure before commit".to_string(),
            ));
        }

        *state = working;
        *self.committed_batches.write().await += 1;
        Ok(receipt)
    }
}
