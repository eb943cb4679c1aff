//! HTTP handlers

use crate::serving::process::{HealthReport, ServingError, ServingProcess};
use crate::types::transaction::{FieldErrorKind, Transaction, ValidationError};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

/// Content type of the Prometheus text exposition format
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub async fn health(State(process): State<Arc<ServingProcess>>) -> Json<HealthReport> {
    Json(process.health())
}

pub async fn predict(
    State(process): State<Arc<ServingProcess>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let transaction = Transaction::from_slice(&body).map_err(|e| {
        debug!(error = %e, "Rejected prediction request");
        ApiError::Validation(e)
    })?;

    match process.predict(&transaction) {
        Ok(result) => Ok(Json(result).into_response()),
        Err(ServingError::NotReady) => Err(ApiError::NotReady),
        Err(e) => {
            error!(error = %e, "Prediction failed");
            Err(ApiError::PredictionFailed)
        }
    }
}

pub async fn metrics(State(process): State<Arc<ServingProcess>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        process.metrics().render_prometheus(),
    )
}

/// Error responses of the prediction endpoint
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    NotReady,
    PredictionFailed,
}

/// One entry of a 422 `detail` list
#[derive(Debug, Serialize)]
struct ErrorDetail {
    loc: Vec<&'static str>,
    msg: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
}

fn validation_details(err: &ValidationError) -> Vec<ErrorDetail> {
    match err {
        ValidationError::MalformedJson(_) => vec![ErrorDetail {
            loc: vec!["body"],
            msg: "JSON decode error",
            kind: "json_invalid",
        }],
        ValidationError::NotAnObject => vec![ErrorDetail {
            loc: vec!["body"],
            msg: "Input should be a valid dictionary",
            kind: "model_attributes_type",
        }],
        ValidationError::InvalidFields(fields) => fields
            .iter()
            .map(|f| ErrorDetail {
                loc: vec!["body", f.field],
                msg: f.kind.message(),
                kind: match f.kind {
                    FieldErrorKind::Missing => "missing",
                    FieldErrorKind::FloatType => "float_type",
                },
            })
            .collect(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": validation_details(&err) })),
            )
                .into_response(),
            ApiError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Model not loaded" })),
            )
                .into_response(),
            ApiError::PredictionFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "Prediction failed" })),
            )
                .into_response(),
        }
    }
}
