//! Listing Service
//!
//! Submission, moderation and publication backend for an enthusiast vehicle
//! marketplace. Sellers submit drafts with images, an admin queue approves
//! or rejects them, and approved listings go live until they are deleted or
//! marked as sold.
//!
//! ## Features
//!
//! - **Submission Pipeline**: quota check, per-image transform + upload,
//!   draft creation, with best-effort compensating deletes on any partial
//!   failure
//! - **Image Normalization**: orientation fix, width-bounded resize and
//!   JPEG re-encode before anything hits object storage
//! - **Moderation Queue**: chronological review navigation with terminal
//!   approve/reject transitions between collections
//! - **Lifecycle Cleanup**: explicit post-delete cascade over storage
//!   objects, owner aggregates and like records
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum)                 S3 Bucket                 PostgreSQL
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────────┐
//! │ Submission   │           │ vehicles/    │          │ pending_vehicles │
//! │ endpoint     │──────────▶│   {listing}/ │          │ vehicles         │
//! └──────────────┘           │   {random}   │          │ sold_vehicles    │
//!        │                   └──────────────┘          │ owners, likes    │
//!        ▼                          ▲                  └──────────────────┘
//! ┌──────────────┐                  │                         ▲
//! │ Image        │                  │                         │
//! │ Pipeline     │                  │                         │
//! └──────────────┘                  │                         │
//!        │                          │                         │
//!        ▼                          ▼                         │
//! ┌──────────────┐           ┌──────────────┐                │
//! │ Submission / │           │ Object       │                │
//! │ Moderation / │──────────▶│ Storage      │                │
//! │ Lifecycle    │           │ Gateway      │                │
//! └──────────────┘           └──────────────┘                │
//!        │                                                    │
//!        └────────────────────────────────────────────────────┘
//!                        Listing Record Store
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod image_pipeline;
pub mod lifecycle;
pub mod listing_store;
pub mod moderation;
pub mod object_storage;
pub mod submission;
pub mod vehicle;

pub use api::{create_router, start_api_server, AppState, CurrentUser};
pub use config::Config;
pub use error::{ErrorResponse, MarketError, MarketResult};
pub use image_pipeline::{ImagePipeline, ProcessedImage};
pub use lifecycle::{CleanupOptions, ListingLifecycle};
pub use listing_store::{
    ListingStore, MemoryListingStore, NewDraft, NewListing, NewSold, PgListingStore,
};
pub use moderation::ModerationQueue;
pub use object_storage::{MemoryObjectStorage, ObjectStorage, S3ObjectStorage};
pub use submission::SubmissionPipeline;
pub use vehicle::{
    EngineType, FuelType, ListingDraft, Owner, OwnerRole, PublishedListing, SoldListing,
    Transmission, VehicleAttributes, VehicleUpdate,
};
