//! Shared fixtures for the integration tests
//!
//! Artifacts are written to a temporary directory so every test runs against
//! a freshly loaded predictor.

#![allow(dead_code)]

use axum::{body::Body, http::Request, Router};
use cicd_failure_predictor::{
    api::{build_router, AppState},
    config::{ModelConfig, NotificationConfig, PredictionLogConfig, ServerConfig},
    ml::Predictor,
    notifications::NotificationService,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "----cicd-predictor-boundary";

/// Pipeline that mentions `deploy` often enough to trip the fixture tree
pub const RISKY_PIPELINE: &str = "stages:
  - deploy
deploy_job:
  stage: deploy
  script:
    - kubectl apply -f k8s/
";

/// GitHub Actions workflow without any deploy step
pub const SAFE_PIPELINE: &str = "on:
  push:
    branches: [main]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: make test
";

/// Four-term vocabulary paired with a single XGBoost stump on `deploy`:
/// weight < 0.5 gives leaf -1.0, otherwise +2.0, around base_score 0.5.
pub fn write_xgboost_artifacts(dir: &Path) -> ModelConfig {
    let vectorizer = json!({
        "vocabulary": { "build": 0, "deploy": 1, "test": 2, "kubectl": 3 },
        "idf": [1.0, 1.0, 1.0, 1.0],
        "ngram_range": [1, 1],
        "lowercase": true,
        "norm": "l2",
        "sublinear_tf": false
    });

    let model = json!({
        "learner": {
            "attributes": {},
            "feature_names": [],
            "feature_types": [],
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "gbtree_model_param": { "num_parallel_tree": "1", "num_trees": "1" },
                    "tree_info": [0],
                    "trees": [{
                        "id": 0,
                        "base_weights": [0.0, -1.0, 2.0],
                        "left_children": [1, -1, -1],
                        "right_children": [2, -1, -1],
                        "parents": [2147483647, 0, 0],
                        "split_indices": [1, 0, 0],
                        "split_conditions": [0.5, -1.0, 2.0],
                        "split_type": [0, 0, 0],
                        "default_left": [1, 0, 0],
                        "sum_hessian": [10.0, 5.0, 5.0],
                        "loss_changes": [1.0, 0.0, 0.0],
                        "categories": [],
                        "categories_nodes": [],
                        "categories_segments": [],
                        "categories_sizes": [],
                        "tree_param": {
                            "num_deleted": "0",
                            "num_feature": "4",
                            "num_nodes": "3",
                            "size_leaf_vector": "1"
                        }
                    }]
                }
            },
            "learner_model_param": {
                "base_score": "5E-1",
                "boost_from_average": "1",
                "num_class": "0",
                "num_feature": "4",
                "num_target": "1"
            },
            "objective": {
                "name": "binary:logistic",
                "reg_loss_param": { "scale_pos_weight": "1" }
            }
        },
        "version": [2, 0, 3]
    });

    write_pair(dir, &model, &vectorizer)
}

/// Eleven-term vocabulary with a linear model, wide enough for the manual
/// form encoding. Only `build_duration` (column 0) carries weight.
pub fn write_linear_artifacts(dir: &Path) -> ModelConfig {
    let terms = [
        "build", "deploy", "test", "lint", "docker", "kubectl", "npm", "pytest", "cache",
        "release", "helm",
    ];
    let vocabulary: serde_json::Map<String, Value> = terms
        .iter()
        .enumerate()
        .map(|(i, term)| (term.to_string(), json!(i)))
        .collect();

    let vectorizer = json!({
        "vocabulary": vocabulary,
        "idf": vec![1.0; terms.len()],
    });

    let mut weights = vec![0.0; terms.len()];
    weights[0] = 0.01;
    let model = json!({
        "model_type": "logistic_regression",
        "weights": weights,
        "intercept": -1.0
    });

    write_pair(dir, &model, &vectorizer)
}

fn write_pair(dir: &Path, model: &Value, vectorizer: &Value) -> ModelConfig {
    let model_path = dir.join("model.json");
    let vectorizer_path = dir.join("vectorizer.json");
    std::fs::write(&model_path, model.to_string()).unwrap();
    std::fs::write(&vectorizer_path, vectorizer.to_string()).unwrap();
    ModelConfig {
        model_path,
        vectorizer_path,
    }
}

/// Router plus the temp directory backing its artifacts and log
pub struct TestApp {
    pub router: Router,
    pub dir: TempDir,
}

pub fn app_with(
    model: impl FnOnce(&Path) -> Option<ModelConfig>,
    server: ServerConfig,
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();

    let predictor = match model(dir.path()) {
        Some(config) => Predictor::load(&config),
        None => Predictor::unavailable("no artifacts"),
    };

    let notifications = NotificationService::new(
        NotificationConfig::default(),
        &PredictionLogConfig {
            prediction_log_path: dir.path().join("logs").join("predictions.log"),
            ..PredictionLogConfig::default()
        },
    );

    let state = AppState::new(Arc::new(predictor), Arc::new(notifications), server);
    TestApp {
        router: build_router(state),
        dir,
    }
}

pub fn xgboost_app() -> TestApp {
    app_with(|dir| Some(write_xgboost_artifacts(dir)), ServerConfig::default())
}

pub fn linear_app() -> TestApp {
    app_with(|dir| Some(write_linear_artifacts(dir)), ServerConfig::default())
}

pub fn unavailable_app() -> TestApp {
    app_with(|_| None, ServerConfig::default())
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Single-file multipart upload under the given field name
pub fn upload(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/x-yaml\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict-file")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

/// Multipart request carrying a plain form value rather than a file
pub fn form_value(field: &str, value: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n--{BOUNDARY}--\r\n"
    );

    Request::builder()
        .method("POST")
        .uri("/predict-file")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
