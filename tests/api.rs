//! HTTP-level tests driving the service router in-process

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use fraud_detection_service::feature_transform::FeatureTransform;
use fraud_detection_service::metrics::Outcome;
use fraud_detection_service::models::{
    ArtifactError, ArtifactLoader, ModelArtifacts, Scorer, ScorerError,
};
use fraud_detection_service::serving::{self, ServingProcess};
use fraud_detection_service::types::{Frame, FIELD_NAMES};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

struct FixedScorer(f64);

impl Scorer for FixedScorer {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict_proba(&self, features: &Frame) -> Result<Vec<f64>, ScorerError> {
        Ok(vec![self.0; features.len()])
    }
}

struct BrokenScorer;

impl Scorer for BrokenScorer {
    fn name(&self) -> &str {
        "broken"
    }

    fn predict_proba(&self, _features: &Frame) -> Result<Vec<f64>, ScorerError> {
        Err(ScorerError::PredictionFailed("corrupted tree".to_string()))
    }
}

struct StubLoader(Arc<dyn Scorer>);

impl ArtifactLoader for StubLoader {
    fn load_artifacts(&self) -> Result<ModelArtifacts, ArtifactError> {
        let mut amounts = vec![vec![0.0; 29], vec![0.0; 29]];
        amounts[1][28] = 300.0;
        let mut transform = FeatureTransform::default();
        transform
            .fit(&Frame::from_columns(&FIELD_NAMES, amounts).unwrap())
            .unwrap();
        ModelArtifacts::new(transform, self.0.clone())
    }
}

struct MissingLoader;

impl ArtifactLoader for MissingLoader {
    fn load_artifacts(&self) -> Result<ModelArtifacts, ArtifactError> {
        Err(ArtifactError::NotFound(PathBuf::from("models/model.json")))
    }
}

fn ready_service(scorer: Arc<dyn Scorer>) -> (Arc<ServingProcess>, Router) {
    let process = Arc::new(ServingProcess::new(0.5));
    process.start(&StubLoader(scorer)).unwrap();
    let app = serving::router(process.clone());
    (process, app)
}

fn transaction(amount: f64) -> Map<String, Value> {
    let mut body = Map::new();
    for (i, field) in FIELD_NAMES.iter().enumerate() {
        body.insert(field.to_string(), json!(i as f64 * 0.01 - 0.1));
    }
    body.insert("Amount".to_string(), json!(amount));
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn post_predict(app: &Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::post("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, bytes) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn to_body(value: &Map<String, Value>) -> String {
    serde_json::to_string(value).unwrap()
}

#[tokio::test]
async fn test_predict_fraud() {
    let (process, app) = ready_service(Arc::new(FixedScorer(0.7)));

    let (status, body) = post_predict(&app, to_body(&transaction(150.0))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"is_fraud": true, "fraud_probability": 0.7}));
    assert_eq!(process.metrics().predictions(Outcome::Fraud), 1);
}

#[tokio::test]
async fn test_predict_not_fraud() {
    let (process, app) = ready_service(Arc::new(FixedScorer(0.3)));

    let (status, body) = post_predict(&app, to_body(&transaction(25.0))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_fraud"], false);
    assert_eq!(body["fraud_probability"], 0.3);
    assert_eq!(process.metrics().predictions(Outcome::NotFraud), 1);
}

#[tokio::test]
async fn test_threshold_is_strict() {
    let (_, app) = ready_service(Arc::new(FixedScorer(0.5)));

    let (status, body) = post_predict(&app, to_body(&transaction(25.0))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_fraud"], false);
}

#[tokio::test]
async fn test_missing_field_is_rejected() {
    let (process, app) = ready_service(Arc::new(FixedScorer(0.7)));
    let mut body = transaction(150.0);
    body.remove("V7");

    let (status, response) = post_predict(&app, to_body(&body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response["detail"],
        json!([{"loc": ["body", "V7"], "msg": "Field required", "type": "missing"}])
    );
    assert_eq!(process.metrics().total_predictions(), 0);
    assert_eq!(process.metrics().latency().count, 0);
}

#[tokio::test]
async fn test_invalid_types_are_rejected() {
    let (process, app) = ready_service(Arc::new(FixedScorer(0.7)));
    let mut body = transaction(150.0);
    body.insert("V1".to_string(), json!("invalid"));
    body.insert("Amount".to_string(), Value::Null);

    let (status, response) = post_predict(&app, to_body(&body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let detail = response["detail"].as_array().unwrap();
    assert_eq!(detail.len(), 2);
    assert_eq!(detail[0]["loc"], json!(["body", "V1"]));
    assert_eq!(detail[0]["type"], "float_type");
    assert_eq!(detail[1]["loc"], json!(["body", "Amount"]));
    assert_eq!(process.metrics().total_predictions(), 0);
}

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let (_, app) = ready_service(Arc::new(FixedScorer(0.7)));

    let (status, response) = post_predict(&app, "{not json").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["detail"][0]["type"], "json_invalid");

    let (status, _) = post_predict(&app, "[1, 2, 3]").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, response) = post_predict(&app, r#"{"invalid": "data"}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["detail"].as_array().unwrap().len(), 29);
}

#[tokio::test]
async fn test_extra_fields_are_ignored() {
    let (_, app) = ready_service(Arc::new(FixedScorer(0.3)));
    let mut body = transaction(50.0);
    body.insert("Time".to_string(), json!(406.0));
    body.insert("merchant".to_string(), json!("acme"));

    let (status, _) = post_predict(&app, to_body(&body)).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_reports_loaded_model() {
    let (_, app) = ready_service(Arc::new(FixedScorer(0.7)));

    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "model_loaded": true}));
}

#[tokio::test]
async fn test_not_loaded() {
    let process = Arc::new(ServingProcess::new(0.5));
    let app = serving::router(process.clone());

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "unhealthy", "model_loaded": false}));

    let (status, body) = post_predict(&app, to_body(&transaction(150.0))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"detail": "Model not loaded"}));

    // A failed load leaves the service up but unhealthy
    assert!(process.start(&MissingLoader).is_err());
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_scorer_failure_returns_500() {
    let (process, app) = ready_service(Arc::new(BrokenScorer));

    let (status, body) = post_predict(&app, to_body(&transaction(150.0))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"detail": "Prediction failed"}));
    assert_eq!(process.metrics().total_predictions(), 0);
}

#[tokio::test]
async fn test_repeated_predictions_are_identical() {
    let (process, app) = ready_service(Arc::new(FixedScorer(0.6)));
    let body = to_body(&transaction(100.0));

    for _ in 0..5 {
        let (status, response) = post_predict(&app, body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["fraud_probability"], 0.6);
    }
    assert_eq!(process.metrics().predictions(Outcome::Fraud), 5);
}

#[tokio::test]
async fn test_end_to_end_flow() {
    let (_, app) = ready_service(Arc::new(FixedScorer(0.6)));

    let (_, health) = get_json(&app, "/health").await;
    assert_eq!(health["status"], "healthy");

    let (status, _) = post_predict(&app, to_body(&transaction(150.0))).await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; version=0.0.4"
    );

    let text = String::from_utf8(
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();
    assert!(text.contains("fraud_predictions_total{result=\"fraud\"} 1"));
    assert!(text.contains("fraud_predictions_total{result=\"not_fraud\"} 0"));
    assert!(text.contains("fraud_prediction_latency_seconds_count 1"));
}

#[tokio::test]
async fn test_concurrent_predictions() {
    let (process, app) = ready_service(Arc::new(FixedScorer(0.9)));
    let body = to_body(&transaction(500.0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let app = app.clone();
            let body = body.clone();
            tokio::spawn(async move { post_predict(&app, body).await.0 })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(process.metrics().predictions(Outcome::Fraud), 16);
    assert_eq!(process.metrics().latency().count, 16);
}
