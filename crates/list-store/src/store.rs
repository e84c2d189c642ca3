use async_trait::async_trait;
use common::{FlyerProductId, SessionId, ShoppingListId, StoreId, UserId};

use crate::{
    MigrationBatch, MigrationReceipt, OfferValidity, Result, ShoppingList, ShoppingListItem,
};

/// Storage contract the migration wizard needs.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ShoppingListStore: Send + Sync {
    /// Loads a list by id.
    async fn get_list(&self, list_id: ShoppingListId) -> Result<Option<ShoppingList>>;

    /// Loads every item of a list in display order.
    async fn get_items(&self, list_id: ShoppingListId) -> Result<Vec<ShoppingListItem>>;

    /// Looks up an offer together with its flyer's validity.
    ///
    /// Returns None if the offer no longer exists.
    async fn get_offer(&self, flyer_product_id: FlyerProductId) -> Result<Option<OfferValidity>>;

    /// Returns the stores the user marked as preferred.
    async fn preferred_stores(&self, user_id: UserId) -> Result<Vec<StoreId>>;

    /// Locks the list to `session_id`.
    ///
    /// The lock is taken only if its current holder is still `expected`
    /// (`None` meaning unlocked). Otherwise fails with `LockNotHeld` and
    /// leaves the lock as it is.
    async fn acquire_lock(
        &self,
        list_id: ShoppingListId,
        session_id: SessionId,
        expected: Option<SessionId>,
    ) -> Result<()>;

    /// Unlocks the list if `session_id` holds the lock.
    ///
    /// Returns false when the lock is free or held by another session.
    async fn release_lock(&self, list_id: ShoppingListId, session_id: SessionId) -> Result<bool>;

    /// Applies every change of the batch and releases the list lock.
    ///
    /// Changes are applied atomically - either all succeed or none do. The
    /// batch's session must hold the lock, otherwise nothing is written and
    /// `LockNotHeld` is returned, so a batch commits at most once. A change
    /// targeting a missing item fails the whole batch with `ItemNotFound`.
    async fn apply_migration(&self, batch: MigrationBatch) -> Result<MigrationReceipt>;
}
