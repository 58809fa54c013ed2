//! HTTP request handlers for the telemetry read API.

use crate::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use voltra_domain::{DomainError, RangeQuery, TimeRange, RECOGNIZED_GROUPS};

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let code = match err {
            DomainError::InvalidTimeRange(_)
            | DomainError::MalformedPayload(_)
            | DomainError::UnsupportedCountry(_) => 400,
            DomainError::StorageError(_) => 502,
            _ => 500,
        };
        Self {
            error: err.to_string(),
            code,
        }
    }
}

#[derive(Deserialize)]
pub struct DataParams {
    pub device_id: Option<String>,
}

/// GET /api/data
///
/// With `device_id`, returns the latest cached reading for that device.
/// Without it, returns the whole cache keyed by device id.
pub async fn data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DataParams>,
) -> Result<Response, ApiError> {
    match params.device_id {
        Some(device_id) => match state.cache.get(&device_id).await? {
            Some(reading) => Ok(Json(reading).into_response()),
            None => Err(ApiError {
                error: "Device not found".to_string(),
                code: 404,
            }),
        },
        None => {
            let readings = state.cache.snapshot().await?;
            Ok(Json(readings).into_response())
        }
    }
}

#[derive(Deserialize)]
pub struct HistoricalParams {
    pub device_id: Option<String>,
    pub measurement: Option<String>,
    #[serde(rename = "timeRange")]
    pub time_range: Option<String>,
}

/// GET /api/historical
///
/// Runs a range query against the time-series store and returns its JSON
/// results untouched. `timeRange` defaults to the last 24 hours.
pub async fn historical(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoricalParams>,
) -> Result<Response, ApiError> {
    let (Some(device_id), Some(measurement)) = (params.device_id, params.measurement) else {
        return Err(ApiError {
            error: "Missing required parameters".to_string(),
            code: 400,
        });
    };

    if !RECOGNIZED_GROUPS.contains(&measurement.as_str()) {
        return Err(ApiError {
            error: format!("Unknown measurement: {}", measurement),
            code: 400,
        });
    }

    let range = match params.time_range {
        Some(raw) => raw.parse::<TimeRange>()?,
        None => TimeRange::default(),
    };

    let results = state
        .store
        .query_range(RangeQuery {
            measurement,
            device_id,
            range,
        })
        .await?;

    Ok(Json(results).into_response())
}

/// GET /api/health
pub async fn health() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}
