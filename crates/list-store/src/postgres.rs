use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    FlyerId, FlyerProductId, ItemId, Money, ProductMasterId, SessionId, ShoppingListId, StoreId,
    UserId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::store::ShoppingListStore;
use crate::{
    ItemChange, ListStoreError, MigrationBatch, MigrationReceipt, OfferSnapshot, OfferValidity,
    Result, ShoppingList, ShoppingListItem,
};

/// PostgreSQL-backed shopping list store.
#[derive(Clone)]
pub struct PostgresShoppingListStore {
    pool: PgPool,
}

impl PostgresShoppingListStore {
    /// Creates a new PostgreSQL shopping list store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Inserts a new list.
    pub async fn create_list(&self, list: &ShoppingList) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shopping_lists (id, user_id, name, locked, locked_by_session)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(list.id.as_uuid())
        .bind(list.user_id.as_uuid())
        .bind(&list.name)
        .bind(list.locked)
        .bind(list.locked_by_session.map(|s| s.as_uuid()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_exists(&self, list_id: ShoppingListId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM shopping_lists WHERE id = $1)")
                .bind(list_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Appends an item at the end of its list.
    pub async fn add_item(&self, item: &ShoppingListItem) -> Result<()> {
        let quantity = i32::try_from(item.quantity)
            .map_err(|_| ListStoreError::InvalidRow(format!("quantity {}", item.quantity)))?;

        sqlx::query(
            r#"
            INSERT INTO shopping_list_items (
                id, list_id, product_name, brand, quantity, unit, price_cents, store_id,
                flyer_product_id, product_master_id, offer_valid_to, source, position
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM shopping_list_items WHERE list_id = $2)
            )
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.list_id.as_uuid())
        .bind(&item.product_name)
        .bind(&item.brand)
        .bind(quantity)
        .bind(&item.unit)
        .bind(item.price.cents())
        .bind(item.store_id.map(|s| s.as_i64()))
        .bind(item.flyer_product_id.map(|f| f.as_i64()))
        .bind(item.product_master_id.map(|p| p.as_i64()))
        .bind(item.offer_valid_to)
        .bind(item.source.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Publishes a flyer with a single offer and returns the offer's id.
    pub async fn create_offer(
        &self,
        store_id: StoreId,
        name: &str,
        price: Money,
        valid_to: DateTime<Utc>,
    ) -> Result<FlyerProductId> {
        let mut tx = self.pool.begin().await?;

        let flyer_id: i64 =
            sqlx::query_scalar("INSERT INTO flyers (store_id, valid_to) VALUES ($1, $2) RETURNING id")
                .bind(store_id.as_i64())
                .bind(valid_to)
                .fetch_one(&mut *tx)
                .await?;

        let offer_id: i64 = sqlx::query_scalar(
            "INSERT INTO flyer_products (flyer_id, name, price_cents) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(flyer_id)
        .bind(name)
        .bind(price.cents())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(FlyerProductId::new(offer_id))
    }

    /// Replaces the user's preferred stores.
    pub async fn set_preferred_stores(&self, user_id: UserId, stores: &[StoreId]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_store_preferences WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for store in stores {
            sqlx::query(
                "INSERT INTO user_store_preferences (user_id, store_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(user_id.as_uuid())
            .bind(store.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Loads the snapshots recorded for an item, oldest first.
    pub async fn snapshots_for_item(&self, item_id: ItemId) -> Result<Vec<OfferSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT id, shopping_list_item_id, flyer_product_id, product_master_id, store_id,
                   product_name, brand, price_cents, unit, size_value, size_unit,
                   valid_from, valid_to, estimated, snapshot_reason, created_at
            FROM offer_snapshots
            WHERE shopping_list_item_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_snapshot).collect()
    }

    fn row_to_item(row: PgRow) -> Result<ShoppingListItem> {
        let quantity: i32 = row.try_get("quantity")?;
        let source: String = row.try_get("source")?;

        Ok(ShoppingListItem {
            id: ItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            list_id: ShoppingListId::from_uuid(row.try_get::<Uuid, _>("list_id")?),
            product_name: row.try_get("product_name")?,
            brand: row.try_get("brand")?,
            quantity: u32::try_from(quantity)
                .map_err(|_| ListStoreError::InvalidRow(format!("negative quantity {quantity}")))?,
            unit: row.try_get("unit")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            store_id: row.try_get::<Option<i64>, _>("store_id")?.map(StoreId::new),
            flyer_product_id: row
                .try_get::<Option<i64>, _>("flyer_product_id")?
                .map(FlyerProductId::new),
            product_master_id: row
                .try_get::<Option<i64>, _>("product_master_id")?
                .map(ProductMasterId::new),
            offer_valid_to: row.try_get("offer_valid_to")?,
            source: source.parse().map_err(ListStoreError::InvalidRow)?,
        })
    }

    fn row_to_snapshot(row: PgRow) -> Result<OfferSnapshot> {
        Ok(OfferSnapshot {
            id: common::SnapshotId::from_uuid(row.try_get::<Uuid, _>("id")?),
            shopping_list_item_id: ItemId::from_uuid(
                row.try_get::<Uuid, _>("shopping_list_item_id")?,
            ),
            flyer_product_id: FlyerProductId::new(row.try_get("flyer_product_id")?),
            product_master_id: row
                .try_get::<Option<i64>, _>("product_master_id")?
                .map(ProductMasterId::new),
            store_id: row.try_get::<Option<i64>, _>("store_id")?.map(StoreId::new),
            product_name: row.try_get("product_name")?,
            brand: row.try_get("brand")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            unit: row.try_get("unit")?,
            size_value: row.try_get("size_value")?,
            size_unit: row.try_get("size_unit")?,
            valid_from: row.try_get("valid_from")?,
            valid_to: row.try_get("valid_to")?,
            estimated: row.try_get("estimated")?,
            snapshot_reason: row.try_get("snapshot_reason")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn insert_snapshot(
        tx: &mut Transaction<'_, Postgres>,
        snapshot: &OfferSnapshot,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO offer_snapshots (
                id, shopping_list_item_id, flyer_product_id, product_master_id, store_id,
                product_name, brand, price_cents, unit, size_value, size_unit,
                valid_from, valid_to, estimated, snapshot_reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(snapshot.shopping_list_item_id.as_uuid())
        .bind(snapshot.flyer_product_id.as_i64())
        .bind(snapshot.product_master_id.map(|p| p.as_i64()))
        .bind(snapshot.store_id.map(|s| s.as_i64()))
        .bind(&snapshot.product_name)
        .bind(&snapshot.brand)
        .bind(snapshot.price.cents())
        .bind(&snapshot.unit)
        .bind(snapshot.size_value)
        .bind(&snapshot.size_unit)
        .bind(snapshot.valid_from)
        .bind(snapshot.valid_to)
        .bind(snapshot.estimated)
        .bind(&snapshot.snapshot_reason)
        .bind(snapshot.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ShoppingListStore for PostgresShoppingListStore {
    async fn get_list(&self, list_id: ShoppingListId) -> Result<Option<ShoppingList>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, locked, locked_by_session FROM shopping_lists WHERE id = $1",
        )
        .bind(list_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ShoppingList {
                id: ShoppingListId::from_uuid(row.try_get::<Uuid, _>("id")?),
                user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
                name: row.try_get("name")?,
                locked: row.try_get("locked")?,
                locked_by_session: row
                    .try_get::<Option<Uuid>, _>("locked_by_session")?
                    .map(SessionId::from_uuid),
            })),
            None => Ok(None),
        }
    }

    async fn get_items(&self, list_id: ShoppingListId) -> Result<Vec<ShoppingListItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, list_id, product_name, brand, quantity, unit, price_cents, store_id,
                   flyer_product_id, product_master_id, offer_valid_to, source
            FROM shopping_list_items
            WHERE list_id = $1
            ORDER BY position ASC, id ASC
            "#,
        )
        .bind(list_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn get_offer(&self, flyer_product_id: FlyerProductId) -> Result<Option<OfferValidity>> {
        let row = sqlx::query(
            r#"
            SELECT fp.id, fp.flyer_id, f.valid_to
            FROM flyer_products fp
            JOIN flyers f ON f.id = fp.flyer_id
            WHERE fp.id = $1
            "#,
        )
        .bind(flyer_product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(OfferValidity {
                flyer_product_id: FlyerProductId::new(row.try_get("id")?),
                flyer_id: FlyerId::new(row.try_get("flyer_id")?),
                flyer_valid_to: row.try_get("valid_to")?,
            })),
            None => Ok(None),
        }
    }

    async fn preferred_stores(&self, user_id: UserId) -> Result<Vec<StoreId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT store_id FROM user_store_preferences WHERE user_id = $1 ORDER BY store_id",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(StoreId::new).collect())
    }

    async fn acquire_lock(
        &self,
        list_id: ShoppingListId,
        session_id: SessionId,
        expected: Option<SessionId>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE shopping_lists SET locked = TRUE, locked_by_session = $2
            WHERE id = $1 AND locked_by_session IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(list_id.as_uuid())
        .bind(session_id.as_uuid())
        .bind(expected.map(|s| s.as_uuid()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if !self.list_exists(list_id).await? {
                return Err(ListStoreError::ListNotFound(list_id));
            }
            return Err(ListStoreError::LockNotHeld {
                list_id,
                session_id,
            });
        }
        Ok(())
    }

    async fn release_lock(&self, list_id: ShoppingListId, session_id: SessionId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shopping_lists SET locked = FALSE, locked_by_session = NULL
            WHERE id = $1 AND locked_by_session = $2
            "#,
        )
        .bind(list_id.as_uuid())
        .bind(session_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && !self.list_exists(list_id).await? {
            return Err(ListStoreError::ListNotFound(list_id));
        }
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(
        skip(self, batch),
        fields(list_id = %batch.list_id, session_id = %batch.session_id, changes = batch.changes.len())
    )]
    async fn apply_migration(&self, batch: MigrationBatch) -> Result<MigrationReceipt> {
        let start = std::time::Instant::now();
        let mut tx = self.pool.begin().await?;
        let mut receipt = MigrationReceipt::default();

        // Releasing the lock first holds the list row for the rest of the
        // transaction; a concurrent apply for the same session blocks here
        // and then matches no row.
        let released = sqlx::query(
            r#"
            UPDATE shopping_lists SET locked = FALSE, locked_by_session = NULL
            WHERE id = $1 AND locked_by_session = $2
            "#,
        )
        .bind(batch.list_id.as_uuid())
        .bind(batch.session_id.as_uuid())
        .execute(&mut *tx)
        .await?;
        if released.rows_affected() == 0 {
            return Err(ListStoreError::LockNotHeld {
                list_id: batch.list_id,
                session_id: batch.session_id,
            });
        }

        for change in &batch.changes {
            match change {
                ItemChange::Replace {
                    item_id,
                    snapshot,
                    replacement,
                } => {
                    Self::insert_snapshot(&mut tx, snapshot).await?;

                    let result = sqlx::query(
                        r#"
                        UPDATE shopping_list_items SET
                            product_name = $3,
                            brand = $4,
                            unit = $5,
                            price_cents = $6,
                            store_id = $7,
                            flyer_product_id = $8,
                            product_master_id = $9,
                            offer_valid_to = $10,
                            source = 'flyer',
                            updated_at = NOW()
                        WHERE id = $1 AND list_id = $2
                        "#,
                    )
                    .bind(item_id.as_uuid())
                    .bind(batch.list_id.as_uuid())
                    .bind(&replacement.product_name)
                    .bind(&replacement.brand)
                    .bind(&replacement.unit)
                    .bind(replacement.price.cents())
                    .bind(replacement.store_id.as_i64())
                    .bind(replacement.flyer_product_id.as_i64())
                    .bind(replacement.product_master_id.map(|p| p.as_i64()))
                    .bind(replacement.offer_valid_to)
                    .execute(&mut *tx)
                    .await?;

                    // Dropping the transaction rolls back the snapshot insert.
                    if result.rows_affected() == 0 {
                        return Err(ListStoreError::ItemNotFound(*item_id));
                    }
                    receipt.items_updated += 1;
                    receipt.snapshot_ids.push(snapshot.id);
                }
                ItemChange::Remove { item_id } => {
                    let result = sqlx::query(
                        "DELETE FROM shopping_list_items WHERE id = $1 AND list_id = $2",
                    )
                    .bind(item_id.as_uuid())
                    .bind(batch.list_id.as_uuid())
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() == 0 {
                        return Err(ListStoreError::ItemNotFound(*item_id));
                    }
                    receipt.items_deleted += 1;
                }
            }
        }

        tx.commit().await?;

        metrics::histogram!("list_store_migration_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        tracing::debug!(
            items_updated = receipt.items_updated,
            items_deleted = receipt.items_deleted,
            "migration batch committed"
        );

        Ok(receipt)
    }
}
