//! HTTP surface: `/forecast`, `/health` and `/providers`.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::{CoordinateError, ForecastHoursError},
    model::{AggregatedForecast, Coordinate, ForecastHours, HealthState, HealthStatus, ProviderInfo},
    state::AppState,
};

/// Client errors. Upstream failures never reach this type; they are reported inside the
/// forecast body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Coordinate(#[from] CoordinateError),
    #[error("{0}")]
    Hours(#[from] ForecastHoursError),
    #[error("invalid query: {0}")]
    Query(String),
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Query(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub lat: f64,
    pub lon: f64,
    pub hours: Option<u32>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/forecast", get(forecast_handler))
        .route("/health", get(health_handler))
        .route("/providers", get(providers_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// GET /forecast?lat=..&lon=..&hours=..
///
/// Always 200 once the query is valid, even if every source failed.
async fn forecast_handler(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<ForecastQuery>, QueryRejection>,
) -> Result<Json<AggregatedForecast>, ApiError> {
    let Query(query) = query?;
    let coordinate = Coordinate::new(query.lat, query.lon)?;
    let hours = match query.hours {
        Some(h) => ForecastHours::new(h)?,
        None => ForecastHours::default(),
    };

    Ok(Json(state.coordinator.aggregate(coordinate, hours).await))
}

/// GET /health: 200 when everything is up, 207 Multi-Status when degraded.
async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.health.check_health().await;
    let code = match status.status {
        HealthState::Ok => StatusCode::OK,
        HealthState::Degraded => StatusCode::MULTI_STATUS,
    };
    (code, Json(status))
}

async fn providers_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<ProviderInfo>> {
    Json(state.provider_info())
}
