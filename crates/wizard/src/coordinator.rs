//! Session orchestration: start, decide, inspect and cancel.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Clock, FlyerProductId, ItemId, SessionId, ShoppingListId, UserId};
use domain::{
    DecisionAction, ItemDecision, StoreSelection, UserStorePreferences, WizardItem, WizardSession,
    optimize_stores, rank,
};
use list_store::{ListStoreError, ShoppingListItem, ShoppingListStore};
use session_store::{CacheBackend, SessionStore};

use crate::config::WizardConfig;
use crate::error::{Result, WizardError};
use crate::finder::AlternativeFinder;
use crate::services::search::SearchService;

/// Drives wizard sessions from start to confirm.
///
/// Sessions live only in the session cache. The shopping list is locked to
/// a session when it starts and unlocked by that session's confirm or
/// cancel. A lock whose session has left the cache may be taken over by a
/// new start.
pub struct WizardCoordinator<L, S, B>
where
    L: ShoppingListStore,
    S: SearchService,
    B: CacheBackend,
{
    pub(crate) lists: L,
    pub(crate) finder: AlternativeFinder<S>,
    pub(crate) sessions: SessionStore<B>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: WizardConfig,
}

impl<L, S, B> WizardCoordinator<L, S, B>
where
    L: ShoppingListStore,
    S: SearchService,
    B: CacheBackend,
{
    /// Creates a new coordinator.
    pub fn new(lists: L, search: S, cache: B, clock: Arc<dyn Clock>, config: WizardConfig) -> Self {
        let finder = AlternativeFinder::new(search, config.brand_pass_limit, config.name_pass_limit);
        let sessions = SessionStore::new(cache, clock.clone());
        Self {
            lists,
            finder,
            sessions,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    pub fn session_store(&self) -> &SessionStore<B> {
        &self.sessions
    }

    /// Starts a wizard for the expired items of a list.
    ///
    /// Fails with `ListNotFound` if the list does not exist or is not owned
    /// by `user_id`, with `ListLocked` while another live session holds the
    /// list, and with `NothingToMigrate` if no item is expired.
    #[tracing::instrument(skip(self))]
    pub async fn start_wizard(
        &self,
        list_id: ShoppingListId,
        user_id: UserId,
    ) -> Result<WizardSession> {
        let start = std::time::Instant::now();

        let list = self
            .lists
            .get_list(list_id)
            .await?
            .filter(|list| list.user_id == user_id)
            .ok_or(WizardError::ListNotFound(list_id))?;

        if let Some(holder) = list.locked_by_session
            && self.sessions.get(holder).await?.is_some()
        {
            tracing::info!(holder = %holder, "list is held by a live wizard session");
            return Err(WizardError::ListLocked(list_id));
        }

        let now = self.clock.now();
        let expired: Vec<ShoppingListItem> = self
            .lists
            .get_items(list.id)
            .await?
            .into_iter()
            .filter(|item| item.is_expired(now))
            .collect();

        if expired.is_empty() {
            return Err(WizardError::NothingToMigrate(list_id));
        }

        let preferences = UserStorePreferences::new(self.lists.preferred_stores(user_id).await?);

        let mut items = Vec::with_capacity(expired.len());
        for entry in &expired {
            let mut item = wizard_item(entry, now);
            let candidates = self.finder.find(&item, now).await;
            let mut ranked = rank(
                candidates,
                &item.original_product(),
                &preferences,
                &self.config.weights,
            );
            ranked.truncate(self.config.max_suggestions);
            item.suggestions = ranked;
            items.push(item);
        }

        let candidates: BTreeMap<ItemId, Vec<_>> = items
            .iter()
            .map(|item| (item.item_id, item.suggestions.clone()))
            .collect();
        let coverage = optimize_stores(&candidates, self.config.max_stores);
        let selected_stores = StoreSelection::from_coverage(&coverage, &items);

        let session = WizardSession::new(
            user_id,
            list_id,
            self.config.dataset_version,
            items,
            selected_stores,
            now,
        );

        self.lists
            .acquire_lock(list_id, session.id(), list.locked_by_session)
            .await
            .map_err(|e| match e {
                ListStoreError::LockNotHeld { .. } => WizardError::ListLocked(list_id),
                other => other.into(),
            })?;
        if let Err(e) = self.sessions.save(&session).await {
            if let Err(unlock) = self.lists.release_lock(list_id, session.id()).await {
                tracing::error!(error = %unlock, "failed to unlock list after session save failure");
            }
            return Err(e.into());
        }

        metrics::counter!("wizard_sessions_started_total").increment(1);
        metrics::histogram!("wizard_start_duration_seconds").record(start.elapsed().as_secs_f64());
        tracing::info!(
            session_id = %session.id(),
            expired_items = session.expired_items().len(),
            coverage_percent = coverage.coverage_percent,
            "wizard session started"
        );

        Ok(session)
    }

    /// Loads a live session.
    #[tracing::instrument(skip(self))]
    pub async fn get_session(&self, session_id: SessionId) -> Result<WizardSession> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or(WizardError::SessionNotFound(session_id))
    }

    /// Records or overwrites the decision for one item.
    #[tracing::instrument(skip(self))]
    pub async fn decide_item(
        &self,
        session_id: SessionId,
        item_id: ItemId,
        action: DecisionAction,
        suggestion_id: Option<FlyerProductId>,
    ) -> Result<WizardSession> {
        self.apply_bulk_decisions(
            session_id,
            vec![ItemDecision {
                item_id,
                action,
                suggestion_id,
            }],
        )
        .await
    }

    /// Records several decisions in one write.
    ///
    /// Either every decision is valid and all are stored, or none is.
    #[tracing::instrument(skip(self, decisions), fields(count = decisions.len()))]
    pub async fn apply_bulk_decisions(
        &self,
        session_id: SessionId,
        decisions: Vec<ItemDecision>,
    ) -> Result<WizardSession> {
        let parsed = decisions
            .iter()
            .map(|d| d.to_decision().map(|decision| (d.item_id, decision)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut session = self.get_session(session_id).await?;
        session.record_decisions(parsed.clone(), self.clock.now())?;
        self.sessions.save(&session).await?;

        for (_, decision) in &parsed {
            metrics::counter!("wizard_decisions_total", "action" => decision.action().as_str())
                .increment(1);
        }

        Ok(session)
    }

    /// Abandons a session and unlocks its list if it still holds it.
    ///
    /// Cancelling an unknown or expired session succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_wizard(&self, session_id: SessionId) -> Result<()> {
        let Some(session) = self.sessions.get(session_id).await? else {
            return Ok(());
        };

        self.sessions.delete(session_id).await?;
        match self
            .lists
            .release_lock(session.shopping_list_id(), session_id)
            .await
        {
            Ok(_) | Err(ListStoreError::ListNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("wizard_sessions_cancelled_total").increment(1);
        tracing::info!(%session_id, "wizard session cancelled");
        Ok(())
    }
}

fn wizard_item(entry: &ShoppingListItem, now: chrono::DateTime<chrono::Utc>) -> WizardItem {
    WizardItem {
        item_id: entry.id,
        product_name: entry.product_name.clone(),
        brand: entry.brand.clone(),
        original_price: entry.price,
        quantity: entry.quantity,
        unit: entry.unit.clone(),
        expiry_date: entry.offer_valid_to.unwrap_or(now),
        original_store: entry.store_id,
        original_offer: entry.flyer_product_id,
        suggestions: Vec::new(),
    }
}
