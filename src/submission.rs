//! Submission pipeline: quota check → image transform + upload → draft
//! creation → owner counter update.
//!
//! The pipeline offers no cross-step atomicity. Images are uploaded
//! sequentially, in input order, into an accumulator of written keys; any
//! later failure triggers a best-effort compensating delete of everything
//! written so far. A delete failure is logged, never retried, and never
//! masks the error that caused the rollback.

use crate::config::ListingConfig;
use crate::error::{MarketError, MarketResult};
use crate::image_pipeline::{ImagePipeline, STORED_CONTENT_TYPE};
use crate::listing_store::{ListingStore, NewDraft};
use crate::object_storage::{object_key, ObjectStorage};
use crate::vehicle::{ListingDraft, VehicleAttributes};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Orchestrates one listing submission end to end.
pub struct SubmissionPipeline {
    store: Arc<dyn ListingStore>,
    storage: Arc<dyn ObjectStorage>,
    images: ImagePipeline,
    config: ListingConfig,
    key_prefix: String,
}

impl SubmissionPipeline {
    pub fn new(
        store: Arc<dyn ListingStore>,
        storage: Arc<dyn ObjectStorage>,
        config: ListingConfig,
        key_prefix: String,
    ) -> Self {
        Self {
            store,
            storage,
            images: ImagePipeline::from_config(&config),
            config,
            key_prefix,
        }
    }

    /// Submit a new draft for the given owner.
    ///
    /// On success the draft holds the stored image URLs in input order,
    /// index 0 being the cover photo. On any failure no draft exists and
    /// every object written during this attempt has been scheduled for
    /// deletion.
    #[instrument(skip(self, attributes, images), fields(owner_id = %owner_id, image_count = images.len()))]
    pub async fn submit(
        &self,
        owner_id: Uuid,
        mut attributes: VehicleAttributes,
        images: Vec<Vec<u8>>,
    ) -> MarketResult<ListingDraft> {
        if images.is_empty() {
            return Err(MarketError::validation("images", "no images provided"));
        }

        let combined_bytes: usize = images.iter().map(Vec::len).sum();
        if combined_bytes > self.config.max_upload_bytes {
            return Err(MarketError::validation(
                "images",
                format!(
                    "combined upload of {combined_bytes} bytes exceeds the {} byte limit",
                    self.config.max_upload_bytes
                ),
            ));
        }

        attributes.normalize();
        attributes.validate()?;

        // Quota check; reads and later increments are not atomic with each
        // other, so concurrent submissions can transiently overshoot. The
        // quota is a soft limit.
        let owner = self
            .store
            .owner(owner_id)
            .await?
            .ok_or(MarketError::NotFound("owner"))?;
        if !owner.is_admin() && owner.total_vehicles >= i64::from(self.config.max_per_owner) {
            metrics::counter!("listings.submissions.quota_rejected").increment(1);
            return Err(MarketError::QuotaExceeded {
                limit: self.config.max_per_owner,
            });
        }

        // Transform and upload sequentially, in input order. The linear
        // accumulator is what makes the rollback accounting trivial.
        let mut uploaded_keys: Vec<String> = Vec::with_capacity(images.len());
        let mut urls: Vec<String> = Vec::with_capacity(images.len());

        for (index, raw) in images.iter().enumerate() {
            match self.transform_and_upload(&attributes, raw).await {
                Ok((key, url)) => {
                    uploaded_keys.push(key);
                    urls.push(url);
                }
                Err(e) => {
                    warn!(
                        index,
                        uploaded = uploaded_keys.len(),
                        error = %e,
                        "Image upload failed, discarding objects written so far"
                    );
                    self.discard_uploaded(&uploaded_keys).await;
                    metrics::counter!("listings.submissions.failed").increment(1);
                    return Err(e);
                }
            }
        }

        let draft = match self
            .store
            .insert_draft(NewDraft {
                attributes,
                images: urls,
                listed_by: owner_id,
            })
            .await
        {
            Ok(draft) => draft,
            Err(e) => {
                warn!(error = %e, "Draft creation failed, discarding uploaded objects");
                self.discard_uploaded(&uploaded_keys).await;
                metrics::counter!("listings.submissions.failed").increment(1);
                return Err(e);
            }
        };

        // Best effort: a failed counter update does not fail the submission.
        // The owner aggregate drifts until reconciled out of band.
        if let Err(e) = self.store.adjust_owner_total(owner_id, 1).await {
            warn!(owner_id = %owner_id, error = %e, "Failed to increment owner listing counter");
        }

        metrics::counter!("listings.submissions.accepted").increment(1);
        metrics::counter!("listings.images.uploaded").increment(uploaded_keys.len() as u64);

        info!(
            draft_id = %draft.id,
            images = draft.images.len(),
            "Draft submitted for moderation"
        );

        Ok(draft)
    }

    async fn transform_and_upload(
        &self,
        attributes: &VehicleAttributes,
        raw: &[u8],
    ) -> MarketResult<(String, String)> {
        let processed = self.images.process(raw)?;
        let key = object_key(
            &self.key_prefix,
            &attributes.make,
            &attributes.model,
            attributes.year,
        );
        let url = self
            .storage
            .put(&key, processed.bytes, STORED_CONTENT_TYPE)
            .await?;
        Ok((key, url))
    }

    /// Best-effort compensating delete of every key written during this
    /// attempt. Failures leave orphaned objects, which is an accepted
    /// operational cost.
    async fn discard_uploaded(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.storage.delete(key).await {
                warn!(key = %key, error = %e, "Compensating delete failed, object orphaned");
            }
            metrics::counter!("listings.images.compensating_deletes").increment(1);
        }
    }
}
