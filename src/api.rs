//! HTTP surface for the listing service.
//!
//! Authentication is a collaborator: the fronting auth layer injects the
//! caller's id as an `X-User-Id` header, and this service resolves the
//! owner record (and its role) from the store. Admin-only moderation
//! routes reject non-admin callers with 403.

use crate::config::{ApiConfig, ListingConfig};
use crate::error::{MarketError, MarketResult};
use crate::lifecycle::ListingLifecycle;
use crate::listing_store::ListingStore;
use crate::moderation::ModerationQueue;
use crate::submission::SubmissionPipeline;
use crate::vehicle::{
    ListingDraft, Owner, PublishedListing, SoldListing, VehicleAttributes, VehicleUpdate,
};
use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use uuid::Uuid;

/// Header carrying the authenticated caller id, set by the auth proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extra body allowance on top of the configured image budget, for
/// multipart framing and the text fields.
const FORM_OVERHEAD_BYTES: usize = 256 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ListingStore>,
    pub submissions: Arc<SubmissionPipeline>,
    pub moderation: Arc<ModerationQueue>,
    pub lifecycle: Arc<ListingLifecycle>,
}

/// Authenticated caller id, extracted from [`USER_ID_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(CurrentUser)
            .ok_or(MarketError::Unauthorized)
    }
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

/// Create the API router
pub fn create_router(state: AppState, api: &ApiConfig, listings: &ListingConfig) -> Router {
    let cors = if api.cors_enabled {
        if api.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = api
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/pending-vehicles/list", post(submit_vehicle))
        .route("/pending-vehicles/oldest", get(oldest_pending))
        .route("/pending-vehicles/:id", get(get_pending))
        .route("/pending-vehicles/:id/next", get(next_pending))
        .route("/pending-vehicles/:id/approve", post(approve_vehicle))
        .route("/pending-vehicles/:id/disapprove", delete(disapprove_vehicle))
        .route(
            "/vehicles/:id",
            get(get_vehicle).patch(update_vehicle).delete(delete_vehicle),
        )
        .route("/vehicles/:id/sold", patch(mark_vehicle_sold))
        .route("/sold-vehicles/:id", get(get_sold_vehicle))
        .layer(DefaultBodyLimit::max(listings.max_upload_bytes + FORM_OVERHEAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "listing-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// POST /pending-vehicles/list - submit a draft with images
#[instrument(skip(state, multipart), fields(user_id = %user.0))]
async fn submit_vehicle(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> MarketResult<(StatusCode, Json<ListingDraft>)> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut images: Vec<Vec<u8>> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        MarketError::validation("body", format!("malformed multipart body: {e}"))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "images" {
            let bytes = field.bytes().await.map_err(|e| {
                MarketError::validation("images", format!("failed to read image part: {e}"))
            })?;
            images.push(bytes.to_vec());
        } else {
            let text = field.text().await.map_err(|e| {
                MarketError::validation(name.clone(), format!("failed to read field: {e}"))
            })?;
            fields.insert(name, text);
        }
    }

    let attributes = VehicleAttributes::from_form(&fields)?;
    let draft = state.submissions.submit(user.0, attributes, images).await?;

    Ok((StatusCode::CREATED, Json(draft)))
}

/// GET /pending-vehicles/oldest - first draft in the review queue
async fn oldest_pending(
    State(state): State<AppState>,
    user: CurrentUser,
) -> MarketResult<Json<Option<ListingDraft>>> {
    let caller = require_owner(&state, user.0).await?;
    require_admin(&caller)?;

    Ok(Json(state.moderation.oldest().await?))
}

/// GET /pending-vehicles/:id - fetch one draft
async fn get_pending(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> MarketResult<Json<ListingDraft>> {
    let caller = require_owner(&state, user.0).await?;
    require_admin(&caller)?;

    state
        .store
        .draft(id)
        .await?
        .map(Json)
        .ok_or(MarketError::NotFound("pending vehicle"))
}

/// GET /pending-vehicles/:id/next - next draft in the review queue
async fn next_pending(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> MarketResult<Json<ListingDraft>> {
    let caller = require_owner(&state, user.0).await?;
    require_admin(&caller)?;

    Ok(Json(state.moderation.next_after(id).await?))
}

/// POST /pending-vehicles/:id/approve - promote a draft
async fn approve_vehicle(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> MarketResult<(StatusCode, Json<PublishedListing>)> {
    let caller = require_owner(&state, user.0).await?;
    require_admin(&caller)?;

    let listing = state.moderation.approve(id).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// DELETE /pending-vehicles/:id/disapprove - reject a draft
async fn disapprove_vehicle(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> MarketResult<Json<MessageResponse>> {
    let caller = require_owner(&state, user.0).await?;
    require_admin(&caller)?;

    state.moderation.disapprove(id).await?;
    Ok(Json(MessageResponse {
        message: "vehicle disapproved and removed from the pending queue".to_string(),
    }))
}

/// GET /vehicles/:id - fetch one published listing
async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> MarketResult<Json<PublishedListing>> {
    state
        .store
        .listing(id)
        .await?
        .map(Json)
        .ok_or(MarketError::NotFound("vehicle"))
}

/// PATCH /vehicles/:id - update a listing's attributes
async fn update_vehicle(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(update): Json<VehicleUpdate>,
) -> MarketResult<Json<PublishedListing>> {
    let caller = require_owner(&state, user.0).await?;
    let listing = state.lifecycle.update_listing(id, &caller, update).await?;
    Ok(Json(listing))
}

/// PATCH /vehicles/:id/sold - archive a listing as sold
async fn mark_vehicle_sold(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> MarketResult<Json<SoldListing>> {
    let caller = require_owner(&state, user.0).await?;
    let sold = state.lifecycle.mark_sold(id, &caller).await?;
    Ok(Json(sold))
}

/// DELETE /vehicles/:id - delete a listing with cascading cleanup
async fn delete_vehicle(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> MarketResult<StatusCode> {
    let caller = require_owner(&state, user.0).await?;
    state.lifecycle.delete_listing(id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /sold-vehicles/:id - fetch one sold snapshot
async fn get_sold_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> MarketResult<Json<SoldListing>> {
    state
        .store
        .sold(id)
        .await?
        .map(Json)
        .ok_or(MarketError::NotFound("sold vehicle"))
}

/// Resolve the caller's owner record; an id with no account is treated as
/// unauthenticated.
async fn require_owner(state: &AppState, id: Uuid) -> MarketResult<Owner> {
    state.store.owner(id).await?.ok_or(MarketError::Unauthorized)
}

fn require_admin(owner: &Owner) -> MarketResult<()> {
    if owner.is_admin() {
        Ok(())
    } else {
        Err(MarketError::Forbidden("access the moderation queue"))
    }
}

/// Start the API server
pub async fn start_api_server(
    state: AppState,
    api: &ApiConfig,
    listings: &ListingConfig,
) -> anyhow::Result<()> {
    let router = create_router(state, api, listings);
    let addr = format!("{}:{}", api.host, api.port);

    info!(address = %addr, "Starting listing API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind to {addr}: {e}"))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::OwnerRole;
    use axum::http::Request;

    #[tokio::test]
    async fn test_current_user_extractor() {
        let id = Uuid::new_v4();
        let req = Request::builder()
            .uri("/")
            .header(USER_ID_HEADER, id.to_string())
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();

        let user = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.0, id);
    }

    #[tokio::test]
    async fn test_current_user_missing_header_is_unauthorized() {
        let req = Request::builder().uri("/").body(()).unwrap();
        let (mut parts, _) = req.into_parts();

        let err = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized));
    }

    #[tokio::test]
    async fn test_current_user_rejects_garbage_header() {
        let req = Request::builder()
            .uri("/")
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();

        assert!(CurrentUser::from_request_parts(&mut parts, &()).await.is_err());
    }

    #[test]
    fn test_require_admin() {
        let admin = Owner {
            id: Uuid::new_v4(),
            role: OwnerRole::Admin,
            total_vehicles: 0,
            listed_vehicles: Vec::new(),
        };
        let user = Owner {
            role: OwnerRole::User,
            ..admin.clone()
        };

        assert!(require_admin(&admin).is_ok());
        assert!(matches!(
            require_admin(&user),
            Err(MarketError::Forbidden(_))
        ));
    }
}
