use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::ml::models::{
    ConfidenceLevel, FeatureRecord, Label, PredictionResult, RiskLevel,
};
use crate::ml::{extract_manual_features, parse_pipeline_yaml, recommend};
use crate::notifications::{DeliveryResult, HistoryEntry, NotificationDecision, NotifyRequest};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Extensions accepted by `/predict-file`
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

const UPLOAD_FIELD: &str = "file";

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ml_processor = if state.predictor.is_ready() {
        "ready"
    } else {
        "not available"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: iso_timestamp(),
        ml_processor: ml_processor.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub ml_processor: String,
    pub version: String,
}

/// Prediction returned by both prediction endpoints
#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: Label,
    pub probability: f64,
    pub message: String,
    pub timestamp: String,
    pub confidence_level: ConfidenceLevel,
    pub risk_level: RiskLevel,
    pub notification: NotificationDecision,
}

impl PredictionResponse {
    fn new(result: &PredictionResult, notification: NotificationDecision) -> Self {
        Self {
            prediction: result.label,
            probability: (result.probability * 1000.0).round() / 1000.0,
            message: recommend(result.label, result.probability).to_string(),
            timestamp: iso_timestamp(),
            confidence_level: result.confidence_level(),
            risk_level: result.risk_level(),
            notification,
        }
    }
}

/// Predict from an uploaded pipeline definition
pub async fn predict_file(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>> {
    if !state.predictor.is_ready() {
        return Err(model_unavailable());
    }

    let mut multipart =
        multipart.map_err(|_| AppError::Validation("No file uploaded".to_string()))?;

    let (file_name, bytes) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| upload_error(&state, e))?
            .ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;

        // Plain form values are not uploads, even under the upload field name
        let file_name = match field.file_name() {
            Some(name) if field.name() == Some(UPLOAD_FIELD) => name.to_string(),
            _ => continue,
        };
        if file_name.is_empty() {
            return Err(AppError::Validation("No file selected".to_string()));
        }
        if !allowed_file(&file_name) {
            return Err(AppError::Validation(
                "Invalid file type. Please upload a .yml or .yaml file.".to_string(),
            ));
        }

        let bytes = field.bytes().await.map_err(|e| upload_error(&state, e))?;
        break (file_name, bytes);
    };

    let content = std::str::from_utf8(&bytes)
        .map_err(|_| AppError::Validation("File must be UTF-8 encoded text".to_string()))?;

    let features = parse_pipeline_yaml(content)?;
    debug!(
        pipeline_tool = %features.pipeline_tool,
        build_steps = features.number_of_build_steps,
        complexity = features.yaml_complexity,
        "Pipeline features extracted"
    );

    let result = state
        .predictor
        .predict_record(&FeatureRecord::Pipeline(features))?;

    let source = secure_filename(&file_name);
    state
        .notifications
        .log_prediction(Some(source.as_str()), &result)
        .await;

    info!(
        file = %source,
        prediction = %result.label,
        probability = result.probability,
        "File prediction served"
    );

    let decision = state.notifications.decide(result.probability);
    Ok(Json(PredictionResponse::new(&result, decision)))
}

/// Predict from manually entered build metrics
pub async fn predict_form(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResponse>> {
    if !state.predictor.is_ready() {
        return Err(model_unavailable());
    }

    let form = json_object(&state, body, "No form data provided")?;
    let features = extract_manual_features(&form)?;

    let result = state
        .predictor
        .predict_record(&FeatureRecord::Manual(features))?;

    state.notifications.log_prediction(None, &result).await;

    info!(
        prediction = %result.label,
        probability = result.probability,
        "Form prediction served"
    );

    let decision = state.notifications.decide(result.probability);
    Ok(Json(PredictionResponse::new(&result, decision)))
}

/// Send a risk alert email
pub async fn notify(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<DeliveryResult>> {
    let data = json_object(&state, body, "No data provided")?;
    let request = notify_request(&data)?;
    Ok(Json(state.notifications.notify(&request).await))
}

fn notify_request(data: &Map<String, Value>) -> Result<NotifyRequest> {
    for field in ["prediction", "probability", "email"] {
        if data.get(field).map_or(true, Value::is_null) {
            return Err(AppError::Validation(format!(
                "Missing required field: {}",
                field
            )));
        }
    }

    let probability = match &data["probability"] {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|p| p.is_finite())
    .ok_or_else(|| {
        AppError::Validation(format!(
            "Invalid probability value: {}",
            data["probability"]
        ))
    })?;

    Ok(NotifyRequest {
        prediction: text_value(&data["prediction"]),
        probability,
        email: text_value(&data["email"]),
        message: data
            .get("message")
            .filter(|m| !m.is_null())
            .map(text_value),
    })
}

/// Metadata about the loaded artifacts
pub async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfoResponse>> {
    let predictor = &state.predictor;
    let model_type = predictor
        .model_type()
        .ok_or_else(|| AppError::ModelUnavailable("ML model not available".to_string()))?;

    Ok(Json(ModelInfoResponse {
        model_type: model_type.to_string(),
        vectorizer_type: "TF-IDF Vectorizer".to_string(),
        model_loaded: true,
        vectorizer_loaded: true,
        model_features: predictor.model_features().into(),
        vocabulary_size: predictor.vocabulary_size().into(),
        notification_threshold: state.notifications.threshold(),
        supported_formats: ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        max_file_size: state.server.max_upload_label(),
        model_sha256: predictor.model_sha256().map(str::to_string),
        vectorizer_sha256: predictor.vectorizer_sha256().map(str::to_string),
    }))
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_type: String,
    pub vectorizer_type: String,
    pub model_loaded: bool,
    pub vectorizer_loaded: bool,
    pub model_features: Count,
    pub vocabulary_size: Count,
    pub notification_threshold: f64,
    pub supported_formats: Vec<String>,
    pub max_file_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vectorizer_sha256: Option<String>,
}

/// A count that renders as `"Unknown"` when absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Count {
    Known(usize),
    Unknown(&'static str),
}

impl From<Option<usize>> for Count {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Count::Unknown("Unknown"), Count::Known)
    }
}

/// Recent predictions from the prediction log
pub async fn upload_history(State(state): State<AppState>) -> Result<Json<HistoryResponse>> {
    let history = state
        .notifications
        .history()
        .await
        .map_err(|e| AppError::Internal(format!("Error retrieving history: {}", e)))?;
    Ok(Json(HistoryResponse { history }))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

/// Fallback for unknown routes
pub async fn not_found() -> AppError {
    AppError::NotFound("Endpoint not found".to_string())
}

fn model_unavailable() -> AppError {
    AppError::ModelUnavailable(crate::ml::service::MODEL_UNAVAILABLE_MESSAGE.to_string())
}

fn upload_error(state: &AppState, error: MultipartError) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(state.server.max_upload_label())
    } else {
        AppError::Validation(error.body_text())
    }
}

/// Unwrap a JSON body that must be a non-empty object
fn json_object(
    state: &AppState,
    body: std::result::Result<Json<Value>, JsonRejection>,
    empty_message: &str,
) -> Result<Map<String, Value>> {
    match body {
        Ok(Json(Value::Object(map))) if !map.is_empty() => Ok(map),
        Ok(Json(Value::Object(_))) | Ok(Json(Value::Null)) => {
            Err(AppError::Validation(empty_message.to_string()))
        }
        Ok(Json(_)) => Err(AppError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(AppError::PayloadTooLarge(state.server.max_upload_label()))
        }
        Err(JsonRejection::MissingJsonContentType(_)) => {
            Err(AppError::Validation(empty_message.to_string()))
        }
        Err(rejection) => Err(AppError::Validation(format!(
            "Invalid JSON body: {}",
            rejection.body_text()
        ))),
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn iso_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Case-insensitive extension check on the client-supplied name
pub fn allowed_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Reduce a client-supplied file name to a safe ASCII basename
pub fn secure_filename(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("ci.yml"));
        assert!(allowed_file("pipeline.YAML"));
        assert!(allowed_file("archive.tar.yml"));
        assert!(!allowed_file("ci.txt"));
        assert!(!allowed_file("yml"));
        assert!(!allowed_file("ci.yml.bak"));
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("ci.yml"), "ci.yml");
        assert_eq!(secure_filename("../../etc/passwd.yml"), "etc_passwd.yml");
        assert_eq!(secure_filename("my pipeline.yaml"), "my_pipeline.yaml");
        assert_eq!(secure_filename("C:\\builds\\déploy.yml"), "C_builds_dploy.yml");
        assert_eq!(secure_filename("a|b.yml"), "ab.yml");
        assert_eq!(secure_filename("..."), "");
    }

    #[test]
    fn test_count_renders_unknown() {
        assert_eq!(serde_json::to_value(Count::from(Some(42))).unwrap(), json!(42));
        assert_eq!(serde_json::to_value(Count::from(None)).unwrap(), json!("Unknown"));
    }

    #[test]
    fn test_notify_request_validation() {
        let missing = json!({ "prediction": "Fail", "email": "dev@example.com" });
        let err = notify_request(missing.as_object().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: probability");

        let bad = json!({ "prediction": "Fail", "probability": "high", "email": "a@b.c" });
        assert!(notify_request(bad.as_object().unwrap()).is_err());

        let ok = json!({ "prediction": "Fail", "probability": "0.82", "email": "a@b.c" });
        let request = notify_request(ok.as_object().unwrap()).unwrap();
        assert_eq!(request.probability, 0.82);
        assert_eq!(request.message, None);
    }
}
