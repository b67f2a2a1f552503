use crate::claim::ClaimCoordinator;
use crate::constants::{self, USER_ID_HEADER};
use crate::discovery::{DiscoveryService, NearbyPage, NearbyQuery};
use crate::domain::{Category, Condition, Listing, ListingLocation, NewListing};
use crate::error::CurbsideError;
use crate::geo::{GeoPoint, GeospatialIndex};
use crate::lifecycle::{ListingLifecycleManager, SweepReport};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use hyper::Server;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub discovery: Arc<DiscoveryService>,
    pub claims: Arc<ClaimCoordinator>,
    pub lifecycle: Arc<ListingLifecycleManager>,
    pub index: Arc<GeospatialIndex>,
    pub default_page_size: usize,
}

/// JSON error body: `{"error": code, "message": text}`.
pub struct ApiError(CurbsideError);

impl From<CurbsideError> for ApiError {
    fn from(err: CurbsideError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            CurbsideError::Validation(_) => StatusCode::BAD_REQUEST,
            CurbsideError::NotFound(_) => StatusCode::NOT_FOUND,
            CurbsideError::AlreadyResolved { .. } | CurbsideError::Conflict(_) => StatusCode::CONFLICT,
            CurbsideError::Expired(_) => StatusCode::GONE,
            CurbsideError::Forbidden(_) => StatusCode::FORBIDDEN,
            CurbsideError::Storage(_) | CurbsideError::Timeout(_) | CurbsideError::ShutDown(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self.0, code = self.0.code(), "Request failed");
        }
        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Caller identity established by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| AuthenticatedUser(v.to_string()))
            .ok_or_else(|| {
                let body = ErrorResponse {
                    error: "unauthenticated".into(),
                    message: format!("missing {USER_ID_HEADER} header"),
                };
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            })
    }
}

#[derive(Debug, Serialize)]
struct ListingEnvelope {
    listing: Listing,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyParams {
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub category: Option<String>,
}

/// Body of `POST /listings`; the owner comes from the auth context.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: Category,
    pub condition: Condition,
    pub location: ListingLocation,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub ai_tags: Vec<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl CreateListingRequest {
    fn into_new_listing(self, owner_id: String) -> NewListing {
        NewListing {
            owner_id,
            title: self.title,
            description: self.description,
            category: self.category,
            condition: self.condition,
            location: self.location,
            image_urls: self.image_urls,
            ai_tags: self.ai_tags,
            confidence_score: self.confidence_score,
        }
    }
}

fn invalid(rejection: impl std::fmt::Display) -> ApiError {
    ApiError(CurbsideError::Validation(rejection.to_string()))
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": constants::SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "indexedListings": state.index.len(),
    }))
}

async fn metrics() -> Response {
    match crate::metrics::render() {
        Some(body) => {
            ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

async fn nearby(
    State(state): State<AppState>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> ApiResult<Json<NearbyPage>> {
    let Query(params) = params.map_err(invalid)?;
    let mut query = NearbyQuery::new(GeoPoint { latitude: params.lat, longitude: params.lon }, params.radius)
        .page(
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(state.default_page_size),
        );
    if let Some(raw) = params.category.as_deref() {
        query.category = Some(raw.parse::<Category>()?);
    }
    Ok(Json(state.discovery.nearby(&query).await?))
}

async fn create_listing(
    State(state): State<AppState>,
    AuthenticatedUser(owner_id): AuthenticatedUser,
    body: Result<Json<CreateListingRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ListingEnvelope>)> {
    let Json(body) = body.map_err(invalid)?;
    let listing = state.lifecycle.create_listing(body.into_new_listing(owner_id)).await?;
    Ok((StatusCode::CREATED, Json(ListingEnvelope { listing })))
}

async fn get_listing(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ListingEnvelope>> {
    let Path(id) = id.map_err(invalid)?;
    let listing = state.lifecycle.get_listing(id).await?;
    Ok(Json(ListingEnvelope { listing }))
}

async fn collect_listing(
    State(state): State<AppState>,
    AuthenticatedUser(collector_id): AuthenticatedUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ListingEnvelope>> {
    let Path(id) = id.map_err(invalid)?;
    let listing = state.claims.claim(id, &collector_id).await?;
    Ok(Json(ListingEnvelope { listing }))
}

async fn delete_listing(
    State(state): State<AppState>,
    AuthenticatedUser(requester_id): AuthenticatedUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ListingEnvelope>> {
    let Path(id) = id.map_err(invalid)?;
    let listing = state.lifecycle.delete_listing(id, &requester_id).await?;
    Ok(Json(ListingEnvelope { listing }))
}

/// Run one TTL sweep now instead of waiting for the next tick.
async fn admin_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    Ok(Json(state.lifecycle.sweep_expired().await?))
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/listings", post(create_listing))
        .route("/listings/nearby", get(nearby))
        .route("/listings/:id", get(get_listing).delete(delete_listing))
        .route("/listings/:id/collect", put(collect_listing))
        // Admin/task endpoints
        .route("/admin/sweep", post(admin_sweep))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(%addr, "HTTP server listening");
    info!("Health check: http://{addr}/health");
    info!("Nearby:       http://{addr}/listings/nearby?lat=..&lon=..&radius=..");

    Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
