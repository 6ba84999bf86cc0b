//! Record store for drafts, published listings, sold snapshots and the
//! owner aggregates.
//!
//! State is represented as location: three parallel tables hold pending,
//! published and sold records. The copy+delete transitions between them are
//! driven by the moderation and lifecycle layers; this module only provides
//! the named operations they compose.

use crate::config::DatabaseConfig;
use crate::error::{MarketError, MarketResult};
use crate::vehicle::{
    ListingDraft, Owner, OwnerRole, PublishedListing, SoldListing, VehicleAttributes,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Input for creating a pending draft.
#[derive(Debug, Clone)]
pub struct NewDraft {
    pub attributes: VehicleAttributes,
    pub images: Vec<String>,
    pub listed_by: Uuid,
}

/// Input for promoting a draft into the published collection.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub attributes: VehicleAttributes,
    pub images: Vec<String>,
    pub listed_by: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Input for archiving a published listing as sold.
#[derive(Debug, Clone)]
pub struct NewSold {
    pub attributes: VehicleAttributes,
    pub images: Vec<String>,
    pub listed_by: Uuid,
}

/// Store boundary for all listing collections and owner aggregates.
#[async_trait]
pub trait ListingStore: Send + Sync {
    // Drafts
    async fn insert_draft(&self, new: NewDraft) -> MarketResult<ListingDraft>;
    async fn draft(&self, id: Uuid) -> MarketResult<Option<ListingDraft>>;
    /// Delete a draft record, returning it. The caller decides what happens
    /// to the images.
    async fn remove_draft(&self, id: Uuid) -> MarketResult<Option<ListingDraft>>;
    /// Chronologically first draft in the review queue.
    async fn oldest_draft(&self) -> MarketResult<Option<ListingDraft>>;
    /// Draft with the smallest creation time strictly after the given one.
    async fn draft_after(&self, created_at: DateTime<Utc>) -> MarketResult<Option<ListingDraft>>;

    // Published listings
    async fn insert_listing(&self, new: NewListing) -> MarketResult<PublishedListing>;
    async fn listing(&self, id: Uuid) -> MarketResult<Option<PublishedListing>>;
    async fn remove_listing(&self, id: Uuid) -> MarketResult<Option<PublishedListing>>;
    async fn update_listing_attributes(
        &self,
        id: Uuid,
        attributes: VehicleAttributes,
    ) -> MarketResult<Option<PublishedListing>>;

    // Sold snapshots
    async fn insert_sold(&self, new: NewSold) -> MarketResult<SoldListing>;
    async fn sold(&self, id: Uuid) -> MarketResult<Option<SoldListing>>;

    // Owner aggregates
    async fn owner(&self, id: Uuid) -> MarketResult<Option<Owner>>;
    /// Atomically adjust the owner's active-listing counter.
    async fn adjust_owner_total(&self, id: Uuid, delta: i64) -> MarketResult<()>;
    async fn add_listed_vehicle(&self, owner_id: Uuid, vehicle_id: Uuid) -> MarketResult<()>;
    async fn remove_listed_vehicle(&self, owner_id: Uuid, vehicle_id: Uuid) -> MarketResult<()>;

    // Likes
    /// Cascade-delete every like referencing a vehicle; returns how many
    /// rows went away.
    async fn remove_likes_for_vehicle(&self, vehicle_id: Uuid) -> MarketResult<u64>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> MarketResult<()>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

/// Columns shared by all three vehicle tables.
#[derive(Debug, FromRow)]
struct AttributeColumns {
    make: String,
    model: String,
    variant: Option<String>,
    year: i32,
    price: i64,
    fuel_type: String,
    transmission: String,
    engine_displacement: Option<f64>,
    engine_type: Option<String>,
    odometer: i64,
    ownership: i32,
    state: String,
    location: String,
    description: String,
}

impl TryFrom<AttributeColumns> for VehicleAttributes {
    type Error = MarketError;

    fn try_from(row: AttributeColumns) -> Result<Self, Self::Error> {
        Ok(Self {
            make: row.make,
            model: row.model,
            variant: row.variant,
            year: row.year,
            price: row.price,
            fuel_type: row
                .fuel_type
                .parse()
                .map_err(|e: String| MarketError::Internal(anyhow!("corrupt fuel_type column: {e}")))?,
            transmission: row.transmission.parse().map_err(|e: String| {
                MarketError::Internal(anyhow!("corrupt transmission column: {e}"))
            })?,
            engine_displacement: row.engine_displacement,
            engine_type: row
                .engine_type
                .map(|v| v.parse())
                .transpose()
                .map_err(|e: String| MarketError::Internal(anyhow!("corrupt engine_type column: {e}")))?,
            odometer: row.odometer,
            ownership: row.ownership,
            state: row.state,
            location: row.location,
            description: row.description,
        })
    }
}

#[derive(Debug, FromRow)]
struct DraftRow {
    id: Uuid,
    #[sqlx(flatten)]
    attrs: AttributeColumns,
    images: Vec<String>,
    listed_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DraftRow> for ListingDraft {
    type Error = MarketError;

    fn try_from(row: DraftRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            attributes: row.attrs.try_into()?,
            images: row.images,
            listed_by: row.listed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ListingRow {
    id: Uuid,
    #[sqlx(flatten)]
    attrs: AttributeColumns,
    images: Vec<String>,
    listed_by: Uuid,
    number_of_likes: i64,
    is_featured: bool,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for PublishedListing {
    type Error = MarketError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            attributes: row.attrs.try_into()?,
            images: row.images,
            listed_by: row.listed_by,
            number_of_likes: row.number_of_likes,
            is_featured: row.is_featured,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SoldRow {
    id: Uuid,
    #[sqlx(flatten)]
    attrs: AttributeColumns,
    images: Vec<String>,
    listed_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SoldRow> for SoldListing {
    type Error = MarketError;

    fn try_from(row: SoldRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            attributes: row.attrs.try_into()?,
            images: row.images,
            listed_by: row.listed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OwnerRow {
    id: Uuid,
    role: String,
    total_vehicles: i64,
    listed_vehicles: Vec<Uuid>,
}

impl TryFrom<OwnerRow> for Owner {
    type Error = MarketError;

    fn try_from(row: OwnerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            role: row
                .role
                .parse::<OwnerRole>()
                .map_err(|e: String| MarketError::Internal(anyhow!("corrupt role column: {e}")))?,
            total_vehicles: row.total_vehicles,
            listed_vehicles: row.listed_vehicles,
        })
    }
}

const DRAFT_COLUMNS: &str = "id, make, model, variant, year, price, fuel_type, transmission, \
     engine_displacement, engine_type, odometer, ownership, state, location, description, \
     images, listed_by, created_at, updated_at";

const LISTING_COLUMNS: &str = "id, make, model, variant, year, price, fuel_type, transmission, \
     engine_displacement, engine_type, odometer, ownership, state, location, description, \
     images, listed_by, number_of_likes, is_featured, expires_at, created_at, updated_at";

/// PostgreSQL-backed listing store.
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    /// Create a new store with a connection pool.
    pub async fn new(config: &DatabaseConfig) -> MarketResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(std::time::Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> MarketResult<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MarketError::Internal(anyhow!("failed to run migrations: {e}")))?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    #[instrument(skip(self, new), fields(listed_by = %new.listed_by))]
    async fn insert_draft(&self, new: NewDraft) -> MarketResult<ListingDraft> {
        let row: DraftRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO pending_vehicles (
                id, make, model, variant, year, price, fuel_type, transmission,
                engine_displacement, engine_type, odometer, ownership, state,
                location, description, images, listed_by
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
            )
            RETURNING {DRAFT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.attributes.make)
        .bind(&new.attributes.model)
        .bind(&new.attributes.variant)
        .bind(new.attributes.year)
        .bind(new.attributes.price)
        .bind(new.attributes.fuel_type.as_str())
        .bind(new.attributes.transmission.as_str())
        .bind(new.attributes.engine_displacement)
        .bind(new.attributes.engine_type.map(|e| e.as_str()))
        .bind(new.attributes.odometer)
        .bind(new.attributes.ownership)
        .bind(&new.attributes.state)
        .bind(&new.attributes.location)
        .bind(&new.attributes.description)
        .bind(&new.images)
        .bind(new.listed_by)
        .fetch_one(&self.pool)
        .await?;

        debug!(draft_id = %row.id, "Draft inserted");
        row.try_into()
    }

    async fn draft(&self, id: Uuid) -> MarketResult<Option<ListingDraft>> {
        let row: Option<DraftRow> = sqlx::query_as(&format!(
            "SELECT {DRAFT_COLUMNS} FROM pending_vehicles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn remove_draft(&self, id: Uuid) -> MarketResult<Option<ListingDraft>> {
        let row: Option<DraftRow> = sqlx::query_as(&format!(
            "DELETE FROM pending_vehicles WHERE id = $1 RETURNING {DRAFT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn oldest_draft(&self) -> MarketResult<Option<ListingDraft>> {
        let row: Option<DraftRow> = sqlx::query_as(&format!(
            "SELECT {DRAFT_COLUMNS} FROM pending_vehicles ORDER BY created_at ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn draft_after(&self, created_at: DateTime<Utc>) -> MarketResult<Option<ListingDraft>> {
        let row: Option<DraftRow> = sqlx::query_as(&format!(
            "SELECT {DRAFT_COLUMNS} FROM pending_vehicles \
             WHERE created_at > $1 ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(created_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, new), fields(listed_by = %new.listed_by))]
    async fn insert_listing(&self, new: NewListing) -> MarketResult<PublishedListing> {
        let row: ListingRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO vehicles (
                id, make, model, variant, year, price, fuel_type, transmission,
                engine_displacement, engine_type, odometer, ownership, state,
                location, description, images, listed_by, expires_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
            )
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.attributes.make)
        .bind(&new.attributes.model)
        .bind(&new.attributes.variant)
        .bind(new.attributes.year)
        .bind(new.attributes.price)
        .bind(new.attributes.fuel_type.as_str())
        .bind(new.attributes.transmission.as_str())
        .bind(new.attributes.engine_displacement)
        .bind(new.attributes.engine_type.map(|e| e.as_str()))
        .bind(new.attributes.odometer)
        .bind(new.attributes.ownership)
        .bind(&new.attributes.state)
        .bind(&new.attributes.location)
        .bind(&new.attributes.description)
        .bind(&new.images)
        .bind(new.listed_by)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(listing_id = %row.id, "Listing inserted");
        row.try_into()
    }

    async fn listing(&self, id: Uuid) -> MarketResult<Option<PublishedListing>> {
        let row: Option<ListingRow> = sqlx::query_as(&format!(
            "SELECT {LISTING_COLUMNS} FROM vehicles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn remove_listing(&self, id: Uuid) -> MarketResult<Option<PublishedListing>> {
        let row: Option<ListingRow> = sqlx::query_as(&format!(
            "DELETE FROM vehicles WHERE id = $1 RETURNING {LISTING_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_listing_attributes(
        &self,
        id: Uuid,
        attributes: VehicleAttributes,
    ) -> MarketResult<Option<PublishedListing>> {
        let row: Option<ListingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE vehicles SET
                make = $2, model = $3, variant = $4, year = $5, price = $6,
                fuel_type = $7, transmission = $8, engine_displacement = $9,
                engine_type = $10, odometer = $11, ownership = $12, state = $13,
                location = $14, description = $15, updated_at = NOW()
            WHERE id = $1
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&attributes.make)
        .bind(&attributes.model)
        .bind(&attributes.variant)
        .bind(attributes.year)
        .bind(attributes.price)
        .bind(attributes.fuel_type.as_str())
        .bind(attributes.transmission.as_str())
        .bind(attributes.engine_displacement)
        .bind(attributes.engine_type.map(|e| e.as_str()))
        .bind(attributes.odometer)
        .bind(attributes.ownership)
        .bind(&attributes.state)
        .bind(&attributes.location)
        .bind(&attributes.description)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, new), fields(listed_by = %new.listed_by))]
    async fn insert_sold(&self, new: NewSold) -> MarketResult<SoldListing> {
        let row: SoldRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO sold_vehicles (
                id, make, model, variant, year, price, fuel_type, transmission,
                engine_displacement, engine_type, odometer, ownership, state,
                location, description, images, listed_by
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
            )
            RETURNING {DRAFT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.attributes.make)
        .bind(&new.attributes.model)
        .bind(&new.attributes.variant)
        .bind(new.attributes.year)
        .bind(new.attributes.price)
        .bind(new.attributes.fuel_type.as_str())
        .bind(new.attributes.transmission.as_str())
        .bind(new.attributes.engine_displacement)
        .bind(new.attributes.engine_type.map(|e| e.as_str()))
        .bind(new.attributes.odometer)
        .bind(new.attributes.ownership)
        .bind(&new.attributes.state)
        .bind(&new.attributes.location)
        .bind(&new.attributes.description)
        .bind(&new.images)
        .bind(new.listed_by)
        .fetch_one(&self.pool)
        .await?;

        debug!(sold_id = %row.id, "Sold snapshot inserted");
        row.try_into()
    }

    async fn sold(&self, id: Uuid) -> MarketResult<Option<SoldListing>> {
        let row: Option<SoldRow> = sqlx::query_as(&format!(
            "SELECT {DRAFT_COLUMNS} FROM sold_vehicles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn owner(&self, id: Uuid) -> MarketResult<Option<Owner>> {
        let row: Option<OwnerRow> = sqlx::query_as(
            "SELECT id, role, total_vehicles, listed_vehicles FROM owners WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn adjust_owner_total(&self, id: Uuid, delta: i64) -> MarketResult<()> {
        let result = sqlx::query(
            "UPDATE owners SET total_vehicles = total_vehicles + $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::NotFound("owner"));
        }
        Ok(())
    }

    async fn add_listed_vehicle(&self, owner_id: Uuid, vehicle_id: Uuid) -> MarketResult<()> {
        let result = sqlx::query(
            "UPDATE owners SET listed_vehicles = array_append(listed_vehicles, $2), \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(owner_id)
        .bind(vehicle_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::NotFound("owner"));
        }
        Ok(())
    }

    async fn remove_listed_vehicle(&self, owner_id: Uuid, vehicle_id: Uuid) -> MarketResult<()> {
        let result = sqlx::query(
            "UPDATE owners SET listed_vehicles = array_remove(listed_vehicles, $2), \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(owner_id)
        .bind(vehicle_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::NotFound("owner"));
        }
        Ok(())
    }

    async fn remove_likes_for_vehicle(&self, vehicle_id: Uuid) -> MarketResult<u64> {
        let result = sqlx::query("DELETE FROM likes WHERE vehicle_id = $1")
            .bind(vehicle_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> MarketResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    drafts: HashMap<Uuid, ListingDraft>,
    listings: HashMap<Uuid, PublishedListing>,
    sold: HashMap<Uuid, SoldListing>,
    owners: HashMap<Uuid, Owner>,
    likes: Vec<(Uuid, Uuid)>,
    last_created_at: Option<DateTime<Utc>>,
}

/// In-memory listing store for tests and local development.
#[derive(Default)]
pub struct MemoryListingStore {
    state: RwLock<MemoryState>,
    fail_next_draft_insert: AtomicBool,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an owner account (normally provisioned by the account system).
    pub fn insert_owner(&self, owner: Owner) {
        self.state.write().unwrap().owners.insert(owner.id, owner);
    }

    /// Seed a like record.
    pub fn insert_like(&self, user_id: Uuid, vehicle_id: Uuid) {
        self.state.write().unwrap().likes.push((user_id, vehicle_id));
    }

    pub fn draft_count(&self) -> usize {
        self.state.read().unwrap().drafts.len()
    }

    pub fn like_count(&self, vehicle_id: Uuid) -> usize {
        self.state
            .read()
            .unwrap()
            .likes
            .iter()
            .filter(|(_, v)| *v == vehicle_id)
            .count()
    }

    /// Make the next draft insert fail, to exercise compensating cleanup.
    pub fn fail_next_draft_insert(&self) {
        self.fail_next_draft_insert.store(true, Ordering::SeqCst);
    }

    /// Timestamps must be strictly increasing for the queue-navigation
    /// ordering to be deterministic, even when inserts land within one
    /// clock tick.
    fn next_created_at(state: &mut MemoryState) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = state.last_created_at {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        state.last_created_at = Some(now);
        now
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn insert_draft(&self, new: NewDraft) -> MarketResult<ListingDraft> {
        if self.fail_next_draft_insert.swap(false, Ordering::SeqCst) {
            return Err(MarketError::Internal(anyhow!("simulated draft insert failure")));
        }

        let mut state = self.state.write().unwrap();
        let created_at = Self::next_created_at(&mut state);
        let draft = ListingDraft {
            id: Uuid::new_v4(),
            attributes: new.attributes,
            images: new.images,
            listed_by: new.listed_by,
            created_at,
            updated_at: created_at,
        };
        state.drafts.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn draft(&self, id: Uuid) -> MarketResult<Option<ListingDraft>> {
        Ok(self.state.read().unwrap().drafts.get(&id).cloned())
    }

    async fn remove_draft(&self, id: Uuid) -> MarketResult<Option<ListingDraft>> {
        Ok(self.state.write().unwrap().drafts.remove(&id))
    }

    async fn oldest_draft(&self) -> MarketResult<Option<ListingDraft>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .drafts
            .values()
            .min_by_key(|d| d.created_at)
            .cloned())
    }

    async fn draft_after(&self, created_at: DateTime<Utc>) -> MarketResult<Option<ListingDraft>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .drafts
            .values()
            .filter(|d| d.created_at > created_at)
            .min_by_key(|d| d.created_at)
            .cloned())
    }

    async fn insert_listing(&self, new: NewListing) -> MarketResult<PublishedListing> {
        let mut state = self.state.write().unwrap();
        let now = Utc::now();
        let listing = PublishedListing {
            id: Uuid::new_v4(),
            attributes: new.attributes,
            images: new.images,
            listed_by: new.listed_by,
            number_of_likes: 0,
            is_featured: false,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
        };
        state.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn listing(&self, id: Uuid) -> MarketResult<Option<PublishedListing>> {
        Ok(self.state.read().unwrap().listings.get(&id).cloned())
    }

    async fn remove_listing(&self, id: Uuid) -> MarketResult<Option<PublishedListing>> {
        Ok(self.state.write().unwrap().listings.remove(&id))
    }

    async fn update_listing_attributes(
        &self,
        id: Uuid,
        attributes: VehicleAttributes,
    ) -> MarketResult<Option<PublishedListing>> {
        let mut state = self.state.write().unwrap();
        match state.listings.get_mut(&id) {
            Some(listing) => {
                listing.attributes = attributes;
                listing.updated_at = Utc::now();
                Ok(Some(listing.clone()))
            }
            None => Ok(None),
        }
    }

    async fn insert_sold(&self, new: NewSold) -> MarketResult<SoldListing> {
        let mut state = self.state.write().unwrap();
        let now = Utc::now();
        let sold = SoldListing {
            id: Uuid::new_v4(),
            attributes: new.attributes,
            images: new.images,
            listed_by: new.listed_by,
            created_at: now,
            updated_at: now,
        };
        state.sold.insert(sold.id, sold.clone());
        Ok(sold)
    }

    async fn sold(&self, id: Uuid) -> MarketResult<Option<SoldListing>> {
        Ok(self.state.read().unwrap().sold.get(&id).cloned())
    }

    async fn owner(&self, id: Uuid) -> MarketResult<Option<Owner>> {
        Ok(self.state.read().unwrap().owners.get(&id).cloned())
    }

    async fn adjust_owner_total(&self, id: Uuid, delta: i64) -> MarketResult<()> {
        let mut state = self.state.write().unwrap();
        let owner = state.owners.get_mut(&id).ok_or(MarketError::NotFound("owner"))?;
        owner.total_vehicles += delta;
        Ok(())
    }

    async fn add_listed_vehicle(&self, owner_id: Uuid, vehicle_id: Uuid) -> MarketResult<()> {
        let mut state = self.state.write().unwrap();
        let owner = state
            .owners
            .get_mut(&owner_id)
            .ok_or(MarketError::NotFound("owner"))?;
        owner.listed_vehicles.push(vehicle_id);
        Ok(())
    }

    async fn remove_listed_vehicle(&self, owner_id: Uuid, vehicle_id: Uuid) -> MarketResult<()> {
        let mut state = self.state.write().unwrap();
        let owner = state
            .owners
            .get_mut(&owner_id)
            .ok_or(MarketError::NotFound("owner"))?;
        owner.listed_vehicles.retain(|v| *v != vehicle_id);
        Ok(())
    }

    async fn remove_likes_for_vehicle(&self, vehicle_id: Uuid) -> MarketResult<u64> {
        let mut state = self.state.write().unwrap();
        let before = state.likes.len();
        state.likes.retain(|(_, v)| *v != vehicle_id);
        Ok((before - state.likes.len()) as u64)
    }

    async fn ping(&self) -> MarketResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::{EngineType, FuelType, Transmission};

    pub fn sample_attributes() -> VehicleAttributes {
        VehicleAttributes {
            make: "Mazda".to_string(),
            model: "RX-7".to_string(),
            variant: None,
            year: 1999,
            price: 2_500_000,
            fuel_type: FuelType::Petrol,
            transmission: Transmission::Manual,
            engine_displacement: Some(1.3),
            engine_type: Some(EngineType::Rotary),
            odometer: 84_000,
            ownership: 2,
            state: "Karnataka".to_string(),
            location: "Bengaluru".to_string(),
            description: "Well maintained.".to_string(),
        }
    }

    fn sample_owner(role: OwnerRole) -> Owner {
        Owner {
            id: Uuid::new_v4(),
            role,
            total_vehicles: 0,
            listed_vehicles: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_draft_crud() {
        let store = MemoryListingStore::new();
        let owner = sample_owner(OwnerRole::User);
        store.insert_owner(owner.clone());

        let draft = store
            .insert_draft(NewDraft {
                attributes: sample_attributes(),
                images: vec!["memory://a".into(), "memory://b".into()],
                listed_by: owner.id,
            })
            .await
            .unwrap();

        assert_eq!(store.draft(draft.id).await.unwrap().unwrap().images.len(), 2);

        let removed = store.remove_draft(draft.id).await.unwrap().unwrap();
        assert_eq!(removed.id, draft.id);
        assert!(store.draft(draft.id).await.unwrap().is_none());
        assert!(store.remove_draft(draft.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_navigation_order() {
        let store = MemoryListingStore::new();
        let owner = sample_owner(OwnerRole::User);
        store.insert_owner(owner.clone());

        let mut ids = Vec::new();
        for _ in 0..3 {
            let draft = store
                .insert_draft(NewDraft {
                    attributes: sample_attributes(),
                    images: vec![],
                    listed_by: owner.id,
                })
                .await
                .unwrap();
            ids.push(draft.id);
        }

        let oldest = store.oldest_draft().await.unwrap().unwrap();
        assert_eq!(oldest.id, ids[0]);

        let second = store.draft_after(oldest.created_at).await.unwrap().unwrap();
        assert_eq!(second.id, ids[1]);

        let third = store.draft_after(second.created_at).await.unwrap().unwrap();
        assert_eq!(third.id, ids[2]);

        assert!(store.draft_after(third.created_at).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owner_aggregates() {
        let store = MemoryListingStore::new();
        let owner = sample_owner(OwnerRole::User);
        store.insert_owner(owner.clone());

        store.adjust_owner_total(owner.id, 1).await.unwrap();
        store.adjust_owner_total(owner.id, 1).await.unwrap();
        store.adjust_owner_total(owner.id, -1).await.unwrap();

        let vehicle_id = Uuid::new_v4();
        store.add_listed_vehicle(owner.id, vehicle_id).await.unwrap();

        let loaded = store.owner(owner.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_vehicles, 1);
        assert_eq!(loaded.listed_vehicles, vec![vehicle_id]);

        store.remove_listed_vehicle(owner.id, vehicle_id).await.unwrap();
        let loaded = store.owner(owner.id).await.unwrap().unwrap();
        assert!(loaded.listed_vehicles.is_empty());
    }

    #[tokio::test]
    async fn test_adjusting_missing_owner_fails() {
        let store = MemoryListingStore::new();
        let err = store.adjust_owner_total(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, MarketError::NotFound("owner")));
    }

    #[tokio::test]
    async fn test_like_cascade() {
        let store = MemoryListingStore::new();
        let vehicle_id = Uuid::new_v4();
        store.insert_like(Uuid::new_v4(), vehicle_id);
        store.insert_like(Uuid::new_v4(), vehicle_id);
        store.insert_like(Uuid::new_v4(), Uuid::new_v4());

        let removed = store.remove_likes_for_vehicle(vehicle_id).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.like_count(vehicle_id), 0);
    }
}
