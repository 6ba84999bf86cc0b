//! Moderation state machine: `Pending → {Published, Rejected}`.
//!
//! Both branches are terminal. Approval copies the draft into the published
//! collection and deletes the draft while leaving its images in storage;
//! rejection deletes the draft together with its images. The admin review
//! queue is walked chronologically.

use crate::error::{MarketError, MarketResult};
use crate::listing_store::{ListingStore, NewListing};
use crate::object_storage::ObjectStorage;
use crate::vehicle::{ListingDraft, PublishedListing};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Approve/reject transitions over the pending collection.
pub struct ModerationQueue {
    store: Arc<dyn ListingStore>,
    storage: Arc<dyn ObjectStorage>,
    listing_ttl: Duration,
}

impl ModerationQueue {
    pub fn new(
        store: Arc<dyn ListingStore>,
        storage: Arc<dyn ObjectStorage>,
        listing_ttl: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            listing_ttl,
        }
    }

    /// Promote a draft into the published collection.
    ///
    /// The published record gets a fresh identity, fresh timestamps and an
    /// expiry derived from the configured listing lifetime. The draft is
    /// deleted afterwards without touching its images; a failure anywhere
    /// in between leaves the images in storage.
    #[instrument(skip(self), fields(draft_id = %id))]
    pub async fn approve(&self, id: Uuid) -> MarketResult<PublishedListing> {
        let draft = self
            .store
            .draft(id)
            .await?
            .ok_or(MarketError::NotFound("pending vehicle"))?;

        let listing = self
            .store
            .insert_listing(NewListing {
                attributes: draft.attributes.clone(),
                images: draft.images.clone(),
                listed_by: draft.listed_by,
                expires_at: Utc::now() + self.listing_ttl,
            })
            .await?;

        self.store
            .add_listed_vehicle(draft.listed_by, listing.id)
            .await?;

        // The draft record goes away; its images now belong to the
        // published listing.
        self.store.remove_draft(id).await?;

        metrics::counter!("listings.moderation.approved").increment(1);
        info!(
            listing_id = %listing.id,
            owner_id = %listing.listed_by,
            "Draft approved and published"
        );

        Ok(listing)
    }

    /// Reject a draft: the record and all of its images go away, and the
    /// owner's active-listing counter is decremented.
    #[instrument(skip(self), fields(draft_id = %id))]
    pub async fn disapprove(&self, id: Uuid) -> MarketResult<ListingDraft> {
        let draft = self
            .store
            .remove_draft(id)
            .await?
            .ok_or(MarketError::NotFound("pending vehicle"))?;

        // Per-image best effort; one failure does not stop the rest.
        for url in &draft.images {
            if let Err(e) = self.storage.delete_by_url(url).await {
                warn!(url = %url, error = %e, "Failed to delete rejected draft image");
            }
        }

        self.store.adjust_owner_total(draft.listed_by, -1).await?;

        metrics::counter!("listings.moderation.rejected").increment(1);
        info!(owner_id = %draft.listed_by, "Draft rejected and removed");

        Ok(draft)
    }

    /// Chronologically first draft awaiting review, if any.
    pub async fn oldest(&self) -> MarketResult<Option<ListingDraft>> {
        self.store.oldest_draft().await
    }

    /// The draft created strictly after the given one, for sequential
    /// review. `NotFound` when the given draft is gone or the queue is
    /// exhausted.
    pub async fn next_after(&self, id: Uuid) -> MarketResult<ListingDraft> {
        let draft = self
            .store
            .draft(id)
            .await?
            .ok_or(MarketError::NotFound("pending vehicle"))?;

        self.store
            .draft_after(draft.created_at)
            .await?
            .ok_or(MarketError::NotFound("next pending vehicle"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListingConfig;
    use crate::listing_store::{MemoryListingStore, NewDraft};
    use crate::object_storage::MemoryObjectStorage;
    use crate::submission::SubmissionPipeline;
    use crate::vehicle::{
        EngineType, FuelType, Owner, OwnerRole, Transmission, VehicleAttributes,
    };
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn attributes() -> VehicleAttributes {
        VehicleAttributes {
            make: "Nissan".to_string(),
            model: "Skyline".to_string(),
            variant: Some("GT-R".to_string()),
            year: 1995,
            price: 4_000_000,
            fuel_type: FuelType::Petrol,
            transmission: Transmission::Manual,
            engine_displacement: Some(2.6),
            engine_type: Some(EngineType::Inline6),
            odometer: 60_000,
            ownership: 1,
            state: "Maharashtra".to_string(),
            location: "Pune".to_string(),
            description: "Imported, all records available.".to_string(),
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    struct Harness {
        store: Arc<MemoryListingStore>,
        storage: Arc<MemoryObjectStorage>,
        queue: ModerationQueue,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryListingStore::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let queue = ModerationQueue::new(store.clone(), storage.clone(), Duration::days(60));
        Harness {
            store,
            storage,
            queue,
        }
    }

    fn seed_owner(store: &MemoryListingStore, total_vehicles: i64) -> Uuid {
        let owner = Owner {
            id: Uuid::new_v4(),
            role: OwnerRole::User,
            total_vehicles,
            listed_vehicles: Vec::new(),
        };
        store.insert_owner(owner.clone());
        owner.id
    }

    /// Create a draft whose images actually live in the storage, the way
    /// the submission pipeline leaves them.
    async fn seed_draft(h: &Harness, owner_id: Uuid, image_count: usize) -> crate::vehicle::ListingDraft {
        let mut urls = Vec::new();
        for i in 0..image_count {
            let key = format!("vehicles/test/{}-{i}", Uuid::new_v4());
            urls.push(h.storage.put(&key, vec![0u8; 8], "image/jpeg").await.unwrap());
        }
        h.store
            .insert_draft(NewDraft {
                attributes: attributes(),
                images: urls,
                listed_by: owner_id,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_approve_copies_fields_and_preserves_images() {
        let h = harness();
        let owner_id = seed_owner(&h.store, 1);
        let draft = seed_draft(&h, owner_id, 3).await;

        let listing = h.queue.approve(draft.id).await.unwrap();

        // Fresh identity, identical attributes and image URLs, same order.
        assert_ne!(listing.id, draft.id);
        assert_eq!(listing.attributes, draft.attributes);
        assert_eq!(listing.images, draft.images);
        assert_eq!(listing.number_of_likes, 0);
        assert!(!listing.is_featured);
        assert!(listing.expires_at > listing.created_at);

        // Draft is gone; images are untouched.
        assert!(h.store.draft(draft.id).await.unwrap().is_none());
        for url in &listing.images {
            assert!(h.storage.contains_url(url));
        }
        assert!(h.storage.deleted_keys().is_empty());

        // Owner gained a listed-vehicle reference; counter is unchanged
        // (the submission already counted this vehicle).
        let owner = h.store.owner(owner_id).await.unwrap().unwrap();
        assert_eq!(owner.listed_vehicles, vec![listing.id]);
        assert_eq!(owner.total_vehicles, 1);
    }

    #[tokio::test]
    async fn test_approve_missing_draft_is_not_found() {
        let h = harness();
        let err = h.queue.approve(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, MarketError::NotFound("pending vehicle")));
    }

    #[tokio::test]
    async fn test_disapprove_purges_images_and_decrements_counter() {
        let h = harness();
        let owner_id = seed_owner(&h.store, 1);
        let draft = seed_draft(&h, owner_id, 2).await;

        h.queue.disapprove(draft.id).await.unwrap();

        assert!(h.store.draft(draft.id).await.unwrap().is_none());
        for url in &draft.images {
            assert!(!h.storage.contains_url(url));
        }
        assert_eq!(h.storage.deleted_keys().len(), 2);

        let owner = h.store.owner(owner_id).await.unwrap().unwrap();
        assert_eq!(owner.total_vehicles, 0);
        assert!(owner.listed_vehicles.is_empty());
    }

    #[tokio::test]
    async fn test_disapprove_missing_draft_is_not_found() {
        let h = harness();
        let err = h.queue.disapprove(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, MarketError::NotFound("pending vehicle")));
    }

    #[tokio::test]
    async fn test_queue_navigation() {
        let h = harness();
        let owner_id = seed_owner(&h.store, 0);
        let first = seed_draft(&h, owner_id, 1).await;
        let second = seed_draft(&h, owner_id, 1).await;
        let third = seed_draft(&h, owner_id, 1).await;

        assert_eq!(h.queue.oldest().await.unwrap().unwrap().id, first.id);
        assert_eq!(h.queue.next_after(first.id).await.unwrap().id, second.id);
        assert_eq!(h.queue.next_after(second.id).await.unwrap().id, third.id);

        let err = h.queue.next_after(third.id).await.unwrap_err();
        assert!(matches!(err, MarketError::NotFound("next pending vehicle")));
    }

    #[tokio::test]
    async fn test_empty_queue_has_no_oldest() {
        let h = harness();
        assert!(h.queue.oldest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_then_approve_keeps_counter_steady() {
        // Full cycle: counter +1 on submit, unchanged on approve, while the
        // listed-vehicles set gains exactly one entry.
        let h = harness();
        let owner_id = seed_owner(&h.store, 0);
        let pipeline = SubmissionPipeline::new(
            h.store.clone(),
            h.storage.clone(),
            ListingConfig::default(),
            "vehicles".to_string(),
        );

        let draft = pipeline
            .submit(owner_id, attributes(), vec![png_bytes(), png_bytes()])
            .await
            .unwrap();
        let listing = h.queue.approve(draft.id).await.unwrap();

        // Cover-photo order survives the transition.
        assert_eq!(listing.images, draft.images);

        let owner = h.store.owner(owner_id).await.unwrap().unwrap();
        assert_eq!(owner.total_vehicles, 1);
        assert_eq!(owner.listed_vehicles, vec![listing.id]);
    }

    #[tokio::test]
    async fn test_submit_then_disapprove_restores_counter() {
        let h = harness();
        let owner_id = seed_owner(&h.store, 0);
        let pipeline = SubmissionPipeline::new(
            h.store.clone(),
            h.storage.clone(),
            ListingConfig::default(),
            "vehicles".to_string(),
        );

        let draft = pipeline
            .submit(owner_id, attributes(), vec![png_bytes()])
            .await
            .unwrap();
        h.queue.disapprove(draft.id).await.unwrap();

        let owner = h.store.owner(owner_id).await.unwrap().unwrap();
        assert_eq!(owner.total_vehicles, 0);
        assert_eq!(h.storage.object_count(), 0);
    }
}
