use axum::extract::{Path, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use url::form_urlencoded;

use crate::error::AppError;
use crate::models::{CurrentReading, StationLocation};
use crate::service::PredictionService;
use crate::store::StationStore;

const JSON_UTF8: &str = "application/json; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub predictions: PredictionService,
    pub store: Arc<dyn StationStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predictions", get(predictions))
        .route("/zone_info/{station}", get(zone_info))
        .route("/locations", get(locations))
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::StationNotFound(_) => {
                tracing::warn!(error = %self, "station lookup failed");
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            other => {
                tracing::error!(error = %other, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Always 200: failures are reported inside the body
async fn predictions(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let station = raw.as_deref().and_then(|raw| {
        form_urlencoded::parse(raw.as_bytes())
            .find(|(key, _)| key == "estacion")
            .map(|(_, value)| value.into_owned())
    });

    let body = state.predictions.predict(station.as_deref()).await;
    ([(header::CONTENT_TYPE, JSON_UTF8)], body).into_response()
}

async fn zone_info(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<Json<CurrentReading>, AppError> {
    Ok(Json(state.store.current_reading(&station).await?))
}

async fn locations(State(state): State<AppState>) -> Result<Json<Vec<StationLocation>>, AppError> {
    Ok(Json(state.store.list_locations().await?))
}
