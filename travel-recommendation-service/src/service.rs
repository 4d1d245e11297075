use axum::{
    Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode},
    middleware::from_fn,
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use travel_flow::{
    CompletionBackend, InMemoryTravelRequestStore, PlaceGenerator, PostgresTravelRequestStore,
    RecommendError, Recommender, RigCompletionBackend, Statistics, TravelRequest,
    TravelRequestStore,
};

use crate::{
    config::{ConfigError, Settings},
    models::{
        CreateRecommendationRequest, HistoryQuery, MessageResponse, RefineRecommendationRequest,
        SearchQuery,
    },
    telemetry::correlation_id_middleware,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(id: i64) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Request not found",
            "id": id
        })),
    )
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

fn rejection_error(message: String) -> ApiError {
    warn!(error = %message, "Rejected malformed request");
    bad_request_error(&message)
}

/// Map core errors to responses. Generation and storage details only go to the log.
fn api_error(err: RecommendError) -> ApiError {
    match err {
        RecommendError::NotFound(id) => not_found_error(id),
        RecommendError::InvalidInput(message) => bad_request_error(&message),
        RecommendError::Generation(details) => {
            error!(details = %details, "Recommendation generation failed");
            internal_error("Failed to generate recommendations")
        }
        RecommendError::Storage(details) => {
            error!(details = %details, "Storage operation failed");
            internal_error("Failed to access recommendation history")
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub recommender: Recommender,
}

impl AppState {
    pub fn new(recommender: Recommender) -> Self {
        Self { recommender }
    }
}

/// Build the full application from settings
pub async fn create_app(settings: &Settings) -> anyhow::Result<Router> {
    let store = create_store(settings).await;
    let backend = create_backend(settings)?;
    let generator = PlaceGenerator::new(backend, settings.retry_policy());
    let state = AppState::new(Recommender::new(generator, store));

    Ok(build_router(state, cors_layer(settings)?))
}

async fn create_store(settings: &Settings) -> Arc<dyn TravelRequestStore> {
    match settings.database_url.as_deref() {
        Some(database_url) => {
            info!("Using PostgreSQL request history");
            match PostgresTravelRequestStore::connect(database_url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(
                        "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                        e
                    );
                    Arc::new(InMemoryTravelRequestStore::new())
                }
            }
        }
        None => {
            info!("Using in-memory request history (set DATABASE_URL to use PostgreSQL)");
            Arc::new(InMemoryTravelRequestStore::new())
        }
    }
}

fn create_backend(settings: &Settings) -> Result<Arc<dyn CompletionBackend>, ConfigError> {
    let api_key = settings.api_key()?;
    let backend = RigCompletionBackend::new(
        settings.provider.into(),
        api_key,
        settings.completion_settings(),
    );
    info!(provider = ?settings.provider, model = %backend.model(), "LLM backend ready");
    Ok(Arc::new(backend))
}

pub fn cors_layer(settings: &Settings) -> Result<CorsLayer, ConfigError> {
    if settings.allows_any_origin() {
        return Ok(CorsLayer::permissive());
    }

    let origins = settings
        .cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin.trim())
                .map_err(|_| ConfigError::InvalidCorsOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any))
}

pub fn build_router(app_state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1/recommendations", recommendation_routes())
        .layer(from_fn(correlation_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

fn recommendation_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_recommendations))
        .route("/history", get(get_history))
        .route("/search", get(search_recommendations))
        .route("/statistics", get(get_statistics))
        .route(
            "/{id}",
            get(get_recommendation)
                .put(refine_recommendation)
                .delete(delete_recommendation),
        )
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Travel Recommender API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Place recommendations generated by an LLM, refined turn by turn",
        "endpoints": {
            "POST /api/v1/recommendations": "New turn: {text, num_places?, exclude?}",
            "GET /api/v1/recommendations/history": "History page (?limit=1..100&offset=0..)",
            "GET /api/v1/recommendations/search": "Search by text (?q=...&limit=1..50)",
            "GET /api/v1/recommendations/statistics": "Aggregate statistics",
            "GET /api/v1/recommendations/{id}": "A single record",
            "PUT /api/v1/recommendations/{id}": "Refine a record: {exclude, num_places?}",
            "DELETE /api/v1/recommendations/{id}": "Delete a record",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_recommendations(
    State(state): State<AppState>,
    payload: Result<Json<CreateRecommendationRequest>, JsonRejection>,
) -> ApiResult<TravelRequest> {
    let Json(request) = payload.map_err(|e| rejection_error(e.body_text()))?;
    let turn = request.into_turn().map_err(|m| bad_request_error(&m))?;

    info!(
        text_length = turn.text.len(),
        num_places = ?turn.num_places,
        explicit_exclusions = turn.exclude.len(),
        "Creating recommendations"
    );

    let record = state.recommender.create(turn).await.map_err(api_error)?;
    Ok(Json(record))
}

async fn refine_recommendation(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RefineRecommendationRequest>, JsonRejection>,
) -> ApiResult<TravelRequest> {
    let Path(id) = id.map_err(|e| rejection_error(e.body_text()))?;
    let Json(request) = payload.map_err(|e| rejection_error(e.body_text()))?;
    let refinement = request.into_refinement().map_err(|m| bad_request_error(&m))?;

    info!(id, exclusions = ?refinement.exclude, "Refining recommendations");

    let record = state
        .recommender
        .refine(id, refinement)
        .await
        .map_err(api_error)?;
    Ok(Json(record))
}

async fn get_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Vec<TravelRequest>> {
    let Query(query) = query.map_err(|e| rejection_error(e.body_text()))?;
    let (limit, offset) = query.bounds().map_err(|m| bad_request_error(&m))?;

    let records = state
        .recommender
        .history(limit, offset)
        .await
        .map_err(api_error)?;
    Ok(Json(records))
}

async fn search_recommendations(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Vec<TravelRequest>> {
    let Query(query) = query.map_err(|e| rejection_error(e.body_text()))?;
    let (term, limit) = query.validated().map_err(|m| bad_request_error(&m))?;

    let records = state
        .recommender
        .search(&term, limit)
        .await
        .map_err(api_error)?;
    info!(term = %term, results = records.len(), "Searched recommendations");
    Ok(Json(records))
}

async fn get_statistics(State(state): State<AppState>) -> ApiResult<Statistics> {
    let stats = state.recommender.statistics().await.map_err(api_error)?;
    Ok(Json(stats))
}

async fn get_recommendation(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<TravelRequest> {
    let Path(id) = id.map_err(|e| rejection_error(e.body_text()))?;
    match state.recommender.get(id).await {
        Ok(record) => Ok(Json(record)),
        Err(e) => {
            if e.is_not_found() {
                warn!(id, "Travel request not found");
            }
            Err(api_error(e))
        }
    }
}

async fn delete_recommendation(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<MessageResponse> {
    let Path(id) = id.map_err(|e| rejection_error(e.body_text()))?;
    state.recommender.delete(id).await.map_err(api_error)?;
    Ok(Json(MessageResponse {
        message: "Recommendations deleted successfully".to_string(),
    }))
}
