use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::clock::league_today;
use crate::db::models::{ModelAccuracyStats, PredictionRecord};
use crate::model::{GameWithPlayers, ModelVersion};
use crate::service::{PredictionService, RunSummary};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub league_tz: Tz,
}

impl AppState {
    fn resolve_date(&self, query: DateQuery) -> NaiveDate {
        query
            .date
            .unwrap_or_else(|| league_today(Utc::now(), self.league_tz))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct AccuracyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version_id: Option<i64>,
    /// Share of validated predictions that hit, 0.0 to 1.0
    pub accuracy: f64,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub active_version: i64,
    pub models: Vec<ModelVersion>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub league_today: NaiveDate,
    pub active_version: i64,
    pub upstream_requests: u64,
}

/// Build the Axum router for the operational API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/predictions", get(predictions_handler))
        .route("/api/predictions/run", post(run_handler))
        .route("/api/prediction-records", get(prediction_records_handler))
        .route("/api/accuracy", get(accuracy_handler))
        .route("/api/accuracy/players/:id", get(player_accuracy_handler))
        .route("/api/accuracy/models/:id", get(model_accuracy_handler))
        .route("/api/models", get(models_handler))
        .route("/api/models/comparison", get(model_comparison_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// GET /api/predictions?date=YYYY-MM-DD
async fn predictions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Vec<GameWithPlayers>> {
    let date = state.resolve_date(query);
    state
        .service
        .predictions_for_date(date)
        .await
        .map(Json)
        .map_err(|e| internal(format!("{:#}", e)))
}

/// POST /api/predictions/run?date=YYYY-MM-DD
async fn run_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> ApiResult<RunSummary> {
    let date = state.resolve_date(query);
    state
        .service
        .run_and_store_all_models(date)
        .await
        .map(Json)
        .map_err(|e| internal(format!("{:#}", e)))
}

/// GET /api/prediction-records?date=YYYY-MM-DD
async fn prediction_records_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Vec<PredictionRecord>> {
    let date = state.resolve_date(query);
    state
        .service
        .prediction_records_for_date(date)
        .map(Json)
        .map_err(|e| internal(format!("{:#}", e)))
}

/// GET /api/accuracy
async fn accuracy_handler(State(state): State<Arc<AppState>>) -> ApiResult<AccuracyResponse> {
    state
        .service
        .database()
        .total_accuracy()
        .map(|accuracy| {
            Json(AccuracyResponse {
                player_id: None,
                model_version_id: None,
                accuracy,
            })
        })
        .map_err(internal)
}

/// GET /api/accuracy/players/:id
async fn player_accuracy_handler(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<i64>,
) -> ApiResult<AccuracyResponse> {
    state
        .service
        .database()
        .player_past_accuracy(player_id)
        .map(|accuracy| {
            Json(AccuracyResponse {
                player_id: Some(player_id),
                model_version_id: None,
                accuracy,
            })
        })
        .map_err(internal)
}

/// GET /api/accuracy/models/:id
async fn model_accuracy_handler(
    State(state): State<Arc<AppState>>,
    Path(model_version_id): Path<i64>,
) -> ApiResult<AccuracyResponse> {
    state
        .service
        .database()
        .model_accuracy(model_version_id)
        .map(|accuracy| {
            Json(AccuracyResponse {
                player_id: None,
                model_version_id: Some(model_version_id),
                accuracy,
            })
        })
        .map_err(internal)
}

/// GET /api/models
async fn models_handler(State(state): State<Arc<AppState>>) -> ApiResult<ModelsResponse> {
    let registry = state.service.registry();
    Ok(Json(ModelsResponse {
        active_version: registry.active_version().await,
        models: registry.all_models().await,
    }))
}

/// GET /api/models/comparison
async fn model_comparison_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<BTreeMap<i64, ModelAccuracyStats>> {
    state
        .service
        .database()
        .model_comparison_stats()
        .map(Json)
        .map_err(internal)
}

/// GET /api/health
async fn health_handler(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "ok",
        league_today: league_today(Utc::now(), state.league_tz),
        active_version: state.service.registry().active_version().await,
        upstream_requests: state.service.source().request_count(),
    }))
}
