//! The confirm step: revalidate, apply in one transaction, finalize.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use common::{FlyerProductId, Money, SessionId, SnapshotId};
use domain::{ConfirmOutcome, Decision, Suggestion, WizardItem, WizardSession};
use list_store::{
    ItemChange, ItemReplacement, ListStoreError, MigrationBatch, OfferSnapshot, OfferValidity,
    ShoppingListStore, WIZARD_SNAPSHOT_REASON,
};
use session_store::CacheBackend;

use crate::coordinator::WizardCoordinator;
use crate::error::{Result, WizardError};
use crate::services::search::SearchService;

impl<L, S, B> WizardCoordinator<L, S, B>
where
    L: ShoppingListStore,
    S: SearchService,
    B: CacheBackend,
{
    /// Applies the session's decisions to the shopping list.
    ///
    /// Steps:
    /// ```text
    /// replay? ──► load ──► revalidate ──► apply (one transaction) ──► finalize
    /// ```
    /// A replayed idempotency key returns the cached outcome without any
    /// storage access. Any failure before the transaction commits leaves
    /// the session active and the list untouched. Undecided items are
    /// skipped.
    ///
    /// The transaction releases the list lock held by this session, so a
    /// session's writes commit at most once. A confirm that loses that race
    /// replays the cached outcome when it carries an idempotency key and
    /// one was recorded, and fails with `LockLost` otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_wizard(
        &self,
        session_id: SessionId,
        idempotency_key: Option<&str>,
    ) -> Result<ConfirmOutcome> {
        if let Some(key) = idempotency_key
            && let Some(outcome) = self.replay(key, session_id).await?
        {
            return Ok(outcome);
        }

        let start = std::time::Instant::now();
        let mut session = self.get_session(session_id).await?;
        if !session.is_active() {
            return Err(WizardError::SessionNotActive {
                session_id,
                status: session.status(),
            });
        }

        let now = self.clock.now();
        if session.is_expired(now) {
            self.sessions.delete(session_id).await?;
            return Err(WizardError::SessionExpired(session_id));
        }

        let offers = self.revalidate(&session, now).await?;
        let batch = migration_batch(&session, &offers, now);

        let receipt = match self.lists.apply_migration(batch).await {
            Ok(receipt) => receipt,
            Err(ListStoreError::ItemNotFound(item_id)) => {
                return Err(WizardError::ListChanged(item_id));
            }
            Err(ListStoreError::LockNotHeld { .. }) => {
                return self.lock_lost(session_id, idempotency_key).await;
            }
            Err(e) => return Err(e.into()),
        };

        session.complete(now)?;

        let replacements: Vec<(&WizardItem, &Suggestion)> = session.replacements().collect();
        let stores_involved = replacements
            .iter()
            .map(|(_, s)| s.store_id)
            .collect::<BTreeSet<_>>()
            .len();
        let total_estimated_price: Money = replacements.iter().map(|(_, s)| s.price).sum();

        let outcome = ConfirmOutcome {
            session_id,
            items_updated: receipt.items_updated,
            items_deleted: receipt.items_deleted,
            snapshot_ids: receipt.snapshot_ids,
            stores_involved,
            total_estimated_price,
        };

        self.finalize(&outcome, idempotency_key).await;

        metrics::counter!("wizard_confirmations_total").increment(1);
        metrics::histogram!("wizard_confirm_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        tracing::info!(
            items_updated = outcome.items_updated,
            items_deleted = outcome.items_deleted,
            stores_involved = outcome.stores_involved,
            "wizard session confirmed"
        );

        Ok(outcome)
    }

    async fn replay(&self, key: &str, session_id: SessionId) -> Result<Option<ConfirmOutcome>> {
        let Some(completed) = self.sessions.get_idempotency_key(key).await? else {
            return Ok(None);
        };

        if completed != session_id {
            return Err(WizardError::IdempotencyKeyReused {
                key: key.to_string(),
                session_id: completed,
            });
        }

        let outcome = self.sessions.get_result(completed).await?;
        if outcome.is_some() {
            metrics::counter!("wizard_confirm_replays_total").increment(1);
            tracing::info!(%session_id, "replaying confirmed wizard session");
        }
        Ok(outcome)
    }

    /// Handles a confirm whose session no longer holds the list lock.
    ///
    /// The cached session can never commit, so it is dropped.
    async fn lock_lost(
        &self,
        session_id: SessionId,
        idempotency_key: Option<&str>,
    ) -> Result<ConfirmOutcome> {
        if idempotency_key.is_some()
            && let Some(outcome) = self.sessions.get_result(session_id).await?
        {
            metrics::counter!("wizard_confirm_replays_total").increment(1);
            tracing::info!(%session_id, "replaying confirmed wizard session");
            return Ok(outcome);
        }

        tracing::warn!(%session_id, "confirm rejected, session no longer holds its list");
        if let Err(e) = self.sessions.delete(session_id).await {
            tracing::error!(%session_id, error = %e, "failed to delete orphaned session");
        }
        Err(WizardError::LockLost(session_id))
    }

    /// Re-reads every chosen offer and fails if any is gone or expired.
    ///
    /// Prices are not compared.
    async fn revalidate(
        &self,
        session: &WizardSession,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<FlyerProductId, OfferValidity>> {
        let mut valid = BTreeMap::new();
        let mut stale = Vec::new();

        for (_, suggestion) in session.replacements() {
            match self.lists.get_offer(suggestion.flyer_product_id).await? {
                Some(offer) if !offer.is_expired(now) => {
                    valid.insert(suggestion.flyer_product_id, offer);
                }
                _ => stale.push(suggestion.flyer_product_id),
            }
        }

        if !stale.is_empty() {
            metrics::counter!("wizard_stale_confirmations_total").increment(1);
            tracing::warn!(
                session_id = %session.id(),
                stale = stale.len(),
                "confirm rejected, chosen offers are no longer valid"
            );
            return Err(WizardError::StaleSuggestions {
                session_id: session.id(),
                offers: stale,
            });
        }

        Ok(valid)
    }

    /// Post-commit bookkeeping.
    ///
    /// The list is already migrated at this point, so cache failures are
    /// logged rather than returned.
    async fn finalize(&self, outcome: &ConfirmOutcome, idempotency_key: Option<&str>) {
        let session_id = outcome.session_id;

        if let Err(e) = self.sessions.save_result(outcome).await {
            tracing::error!(%session_id, error = %e, "failed to cache confirm result");
        }
        if let Some(key) = idempotency_key
            && let Err(e) = self.sessions.save_idempotency_key(key, session_id).await
        {
            tracing::error!(%session_id, error = %e, "failed to record idempotency key");
        }
        if let Err(e) = self.sessions.delete(session_id).await {
            tracing::error!(%session_id, error = %e, "failed to delete completed session");
        }
    }
}

fn migration_batch(
    session: &WizardSession,
    offers: &BTreeMap<FlyerProductId, OfferValidity>,
    now: DateTime<Utc>,
) -> MigrationBatch {
    let changes = session
        .expired_items()
        .iter()
        .filter_map(|item| match session.decision(item.item_id)? {
            Decision::Replace { suggestion_id } => {
                let suggestion = item.suggestion(*suggestion_id)?;
                let flyer_valid_to = offers.get(suggestion_id).map(|o| o.flyer_valid_to);
                Some(replace_change(item, suggestion, flyer_valid_to, now))
            }
            Decision::Remove => Some(ItemChange::Remove {
                item_id: item.item_id,
            }),
            Decision::Skip => None,
        })
        .collect();

    MigrationBatch {
        list_id: session.shopping_list_id(),
        session_id: session.id(),
        changes,
    }
}

fn replace_change(
    item: &WizardItem,
    suggestion: &Suggestion,
    flyer_valid_to: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ItemChange {
    let valid_to = suggestion.valid_to.or(flyer_valid_to);

    ItemChange::Replace {
        item_id: item.item_id,
        snapshot: OfferSnapshot {
            id: SnapshotId::new(),
            shopping_list_item_id: item.item_id,
            flyer_product_id: suggestion.flyer_product_id,
            product_master_id: suggestion.product_master_id,
            store_id: Some(suggestion.store_id),
            product_name: suggestion.product_name.clone(),
            brand: suggestion.brand.clone(),
            price: suggestion.price,
            unit: suggestion.unit.clone(),
            size_value: suggestion.size_value,
            size_unit: suggestion.size_unit.clone(),
            valid_from: suggestion.valid_from,
            valid_to,
            estimated: false,
            snapshot_reason: WIZARD_SNAPSHOT_REASON.to_string(),
            created_at: now,
        },
        replacement: ItemReplacement {
            product_name: suggestion.product_name.clone(),
            brand: suggestion.brand.clone(),
            unit: suggestion.unit.clone(),
            price: suggestion.price,
            store_id: suggestion.store_id,
            flyer_product_id: suggestion.flyer_product_id,
            product_master_id: suggestion.product_master_id,
            offer_valid_to: valid_to,
        },
    }
}
