//! Lifecycle operations on published listings: owner updates, deletion with
//! cascading cleanup, and the mark-as-sold variant delete.
//!
//! Cleanup runs as an explicit post-delete step at the call site,
//! parameterized by [`CleanupOptions`], instead of hiding behind a store
//! trigger. State transitions that reuse the images (mark-as-sold) pass
//! `delete_images: false`.

use crate::error::{MarketError, MarketResult};
use crate::listing_store::{ListingStore, NewSold};
use crate::object_storage::ObjectStorage;
use crate::vehicle::{Owner, PublishedListing, SoldListing, VehicleUpdate};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What the post-delete cleanup is allowed to touch.
#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    /// When false the storage objects survive the record deletion, for
    /// transitions that re-display the images elsewhere.
    pub delete_images: bool,
}

/// Deletion, sale and update flows for published listings.
pub struct ListingLifecycle {
    store: Arc<dyn ListingStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl ListingLifecycle {
    pub fn new(store: Arc<dyn ListingStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { store, storage }
    }

    /// Delete a published listing with full cascading cleanup. The lister
    /// or an admin may delete.
    #[instrument(skip(self, requester), fields(listing_id = %id, requester_id = %requester.id))]
    pub async fn delete_listing(&self, id: Uuid, requester: &Owner) -> MarketResult<()> {
        let listing = self
            .store
            .listing(id)
            .await?
            .ok_or(MarketError::NotFound("vehicle"))?;

        if listing.listed_by != requester.id && !requester.is_admin() {
            return Err(MarketError::Forbidden("delete this vehicle"));
        }

        let removed = self
            .store
            .remove_listing(id)
            .await?
            .ok_or(MarketError::NotFound("vehicle"))?;

        self.cleanup_after_delete(&removed, CleanupOptions { delete_images: true })
            .await?;

        metrics::counter!("listings.deleted").increment(1);
        info!(owner_id = %removed.listed_by, "Listing deleted");
        Ok(())
    }

    /// Archive a published listing as sold. Only the lister may do this.
    /// The images are reused by the sold snapshot, so the record deletion
    /// skips image cleanup.
    #[instrument(skip(self, requester), fields(listing_id = %id, requester_id = %requester.id))]
    pub async fn mark_sold(&self, id: Uuid, requester: &Owner) -> MarketResult<SoldListing> {
        let listing = self
            .store
            .listing(id)
            .await?
            .ok_or(MarketError::NotFound("vehicle"))?;

        if listing.listed_by != requester.id {
            return Err(MarketError::Forbidden("mark this vehicle as sold"));
        }

        let sold = self
            .store
            .insert_sold(NewSold {
                attributes: listing.attributes.clone(),
                images: listing.images.clone(),
                listed_by: listing.listed_by,
            })
            .await?;

        let removed = self
            .store
            .remove_listing(id)
            .await?
            .ok_or(MarketError::NotFound("vehicle"))?;

        self.cleanup_after_delete(&removed, CleanupOptions { delete_images: false })
            .await?;

        metrics::counter!("listings.sold").increment(1);
        info!(sold_id = %sold.id, owner_id = %sold.listed_by, "Listing marked as sold");
        Ok(sold)
    }

    /// Partial attribute update by the lister. Images are not editable in
    /// place; sellers resubmit for photo changes.
    #[instrument(skip(self, requester, update), fields(listing_id = %id, requester_id = %requester.id))]
    pub async fn update_listing(
        &self,
        id: Uuid,
        requester: &Owner,
        update: VehicleUpdate,
    ) -> MarketResult<PublishedListing> {
        let listing = self
            .store
            .listing(id)
            .await?
            .ok_or(MarketError::NotFound("vehicle"))?;

        if listing.listed_by != requester.id {
            return Err(MarketError::Forbidden("update this vehicle"));
        }

        let attributes = update.apply_to(&listing.attributes)?;
        self.store
            .update_listing_attributes(id, attributes)
            .await?
            .ok_or(MarketError::NotFound("vehicle"))
    }

    /// Post-delete cleanup, always in the same order: storage objects
    /// (optional), owner aggregates, like cascade.
    async fn cleanup_after_delete(
        &self,
        listing: &PublishedListing,
        options: CleanupOptions,
    ) -> MarketResult<()> {
        if options.delete_images {
            // Each image independently, best effort; orphaned objects are
            // an accepted operational cost.
            for url in &listing.images {
                if let Err(e) = self.storage.delete_by_url(url).await {
                    warn!(url = %url, error = %e, "Failed to delete listing image");
                }
            }
        }

        self.store
            .remove_listed_vehicle(listing.listed_by, listing.id)
            .await?;
        self.store.adjust_owner_total(listing.listed_by, -1).await?;

        let removed_likes = self.store.remove_likes_for_vehicle(listing.id).await?;
        if removed_likes > 0 {
            debug!(
                listing_id = %listing.id,
                removed_likes,
                "Cascade-deleted likes"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing_store::{MemoryListingStore, NewListing};
    use crate::object_storage::MemoryObjectStorage;
    use crate::vehicle::{
        EngineType, FuelType, OwnerRole, Transmission, VehicleAttributes,
    };
    use chrono::{Duration, Utc};

    fn attributes() -> VehicleAttributes {
        VehicleAttributes {
            make: "Toyota".to_string(),
            model: "Supra".to_string(),
            variant: Some("RZ".to_string()),
            year: 1997,
            price: 5_500_000,
            fuel_type: FuelType::Petrol,
            transmission: Transmission::Manual,
            engine_displacement: Some(3.0),
            engine_type: Some(EngineType::Inline6),
            odometer: 72_000,
            ownership: 1,
            state: "Delhi".to_string(),
            location: "New Delhi".to_string(),
            description: "Twin turbo, unmodified.".to_string(),
        }
    }

    struct Harness {
        store: Arc<MemoryListingStore>,
        storage: Arc<MemoryObjectStorage>,
        lifecycle: ListingLifecycle,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryListingStore::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let lifecycle = ListingLifecycle::new(store.clone(), storage.clone());
        Harness {
            store,
            storage,
            lifecycle,
        }
    }

    fn seed_owner(store: &MemoryListingStore, role: OwnerRole) -> Owner {
        let owner = Owner {
            id: Uuid::new_v4(),
            role,
            total_vehicles: 0,
            listed_vehicles: Vec::new(),
        };
        store.insert_owner(owner.clone());
        owner
    }

    /// Publish a listing the way an approved draft ends up: images in
    /// storage, owner reference and counter in place.
    async fn seed_listing(h: &Harness, owner: &Owner, image_count: usize) -> PublishedListing {
        let mut urls = Vec::new();
        for i in 0..image_count {
            let key = format!("vehicles/test/{}-{i}", Uuid::new_v4());
            urls.push(h.storage.put(&key, vec![0u8; 8], "image/jpeg").await.unwrap());
        }
        let listing = h
            .store
            .insert_listing(NewListing {
                attributes: attributes(),
                images: urls,
                listed_by: owner.id,
                expires_at: Utc::now() + Duration::days(60),
            })
            .await
            .unwrap();
        h.store.add_listed_vehicle(owner.id, listing.id).await.unwrap();
        h.store.adjust_owner_total(owner.id, 1).await.unwrap();
        listing
    }

    #[tokio::test]
    async fn test_delete_cascades_everything() {
        let h = harness();
        let owner = seed_owner(&h.store, OwnerRole::User);
        let listing = seed_listing(&h, &owner, 2).await;
        h.store.insert_like(Uuid::new_v4(), listing.id);
        h.store.insert_like(Uuid::new_v4(), listing.id);

        h.lifecycle.delete_listing(listing.id, &owner).await.unwrap();

        assert!(h.store.listing(listing.id).await.unwrap().is_none());
        for url in &listing.images {
            assert!(!h.storage.contains_url(url));
        }
        assert_eq!(h.store.like_count(listing.id), 0);

        let owner = h.store.owner(owner.id).await.unwrap().unwrap();
        assert_eq!(owner.total_vehicles, 0);
        assert!(owner.listed_vehicles.is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_ownership_or_admin() {
        let h = harness();
        let owner = seed_owner(&h.store, OwnerRole::User);
        let stranger = seed_owner(&h.store, OwnerRole::User);
        let admin = seed_owner(&h.store, OwnerRole::Admin);

        let listing = seed_listing(&h, &owner, 1).await;
        let err = h
            .lifecycle
            .delete_listing(listing.id, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        assert!(h.store.listing(listing.id).await.unwrap().is_some());

        h.lifecycle.delete_listing(listing.id, &admin).await.unwrap();
        assert!(h.store.listing(listing.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_listing_is_not_found() {
        let h = harness();
        let owner = seed_owner(&h.store, OwnerRole::User);
        let err = h
            .lifecycle
            .delete_listing(Uuid::new_v4(), &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound("vehicle")));
    }

    #[tokio::test]
    async fn test_mark_sold_keeps_images_in_storage() {
        // Scenario: sold snapshot reuses the image URLs and the objects
        // stay resolvable after the published record is gone.
        let h = harness();
        let owner = seed_owner(&h.store, OwnerRole::User);
        let listing = seed_listing(&h, &owner, 2).await;
        h.store.insert_like(Uuid::new_v4(), listing.id);

        let sold = h.lifecycle.mark_sold(listing.id, &owner).await.unwrap();

        assert_ne!(sold.id, listing.id);
        assert_eq!(sold.images, listing.images);
        assert_eq!(sold.attributes, listing.attributes);
        assert!(h.store.listing(listing.id).await.unwrap().is_none());
        assert!(h.store.sold(sold.id).await.unwrap().is_some());

        // Images still resolve in storage.
        for url in &listing.images {
            assert!(h.storage.contains_url(url));
        }
        assert!(h.storage.deleted_keys().is_empty());

        // Owner aggregates and likes are still cleaned up.
        let owner = h.store.owner(owner.id).await.unwrap().unwrap();
        assert_eq!(owner.total_vehicles, 0);
        assert!(owner.listed_vehicles.is_empty());
        assert_eq!(h.store.like_count(listing.id), 0);
    }

    #[tokio::test]
    async fn test_mark_sold_is_owner_only() {
        let h = harness();
        let owner = seed_owner(&h.store, OwnerRole::User);
        let admin = seed_owner(&h.store, OwnerRole::Admin);
        let listing = seed_listing(&h, &owner, 1).await;

        let err = h.lifecycle.mark_sold(listing.id, &admin).await.unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_update_listing_merges_and_revalidates() {
        let h = harness();
        let owner = seed_owner(&h.store, OwnerRole::User);
        let listing = seed_listing(&h, &owner, 1).await;

        let updated = h
            .lifecycle
            .update_listing(
                listing.id,
                &owner,
                VehicleUpdate {
                    price: Some(5_000_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.attributes.price, 5_000_000);
        assert_eq!(updated.attributes.make, "Toyota");
        assert_eq!(updated.images, listing.images);
    }

    #[tokio::test]
    async fn test_update_listing_is_owner_only() {
        let h = harness();
        let owner = seed_owner(&h.store, OwnerRole::User);
        let stranger = seed_owner(&h.store, OwnerRole::User);
        let listing = seed_listing(&h, &owner, 1).await;

        let err = h
            .lifecycle
            .update_listing(listing.id, &stranger, VehicleUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }
}
