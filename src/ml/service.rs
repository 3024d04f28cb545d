use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::ml::classifier::{classifier_from_slice, Classifier, ModelType};
use crate::ml::encoder;
use crate::ml::models::{EncodedVector, FeatureRecord, Label, PredictionResult};
use crate::ml::vectorizer::TfidfVectorizer;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, error, info};

/// Message returned by every prediction entry point while artifacts are missing
pub const MODEL_UNAVAILABLE_MESSAGE: &str =
    "ML model not available. Please check server configuration.";

/// Classifier and vectorizer loaded together at startup, never mutated
pub struct ModelArtifacts {
    classifier: Box<dyn Classifier>,
    vectorizer: TfidfVectorizer,
    model_sha256: Option<String>,
    vectorizer_sha256: Option<String>,
}

impl ModelArtifacts {
    /// Pair a classifier with its vectorizer, checking that their widths agree
    pub fn new(classifier: Box<dyn Classifier>, vectorizer: TfidfVectorizer) -> Result<Self> {
        if let Some(expected) = classifier.n_features() {
            let vocabulary = vectorizer.vocabulary_size();
            if expected != vocabulary {
                return Err(AppError::ModelUnavailable(format!(
                    "Model expects {} features but the vectorizer produces {}",
                    expected, vocabulary
                )));
            }
        }

        Ok(Self {
            classifier,
            vectorizer,
            model_sha256: None,
            vectorizer_sha256: None,
        })
    }

    /// Read both artifact files and record their digests
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let model_bytes = read_artifact(&config.model_path, "model")?;
        let vectorizer_bytes = read_artifact(&config.vectorizer_path, "vectorizer")?;

        let classifier = classifier_from_slice(&model_bytes).map_err(|e| {
            AppError::ModelUnavailable(format!(
                "Invalid model {}: {}",
                config.model_path.display(),
                e
            ))
        })?;
        let vectorizer = TfidfVectorizer::from_slice(&vectorizer_bytes).map_err(|e| {
            AppError::ModelUnavailable(format!(
                "Invalid vectorizer {}: {}",
                config.vectorizer_path.display(),
                e
            ))
        })?;

        let mut artifacts = Self::new(classifier, vectorizer)?;
        artifacts.model_sha256 = Some(sha256_hex(&model_bytes));
        artifacts.vectorizer_sha256 = Some(sha256_hex(&vectorizer_bytes));
        Ok(artifacts)
    }
}

fn read_artifact(path: &Path, kind: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        AppError::ModelUnavailable(format!("Failed to read {} {}: {}", kind, path.display(), e))
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Prediction service over read-only model artifacts.
///
/// Constructed once before the server starts. When the artifacts fail to load
/// the predictor stays in a degraded state: health reports "not available" and
/// every prediction fails with [`AppError::ModelUnavailable`].
pub struct Predictor {
    artifacts: Option<ModelArtifacts>,
    load_error: Option<String>,
}

impl Predictor {
    /// Load artifacts from the configured paths; never fails
    pub fn load(config: &ModelConfig) -> Self {
        match ModelArtifacts::load(config) {
            Ok(artifacts) => {
                info!(
                    model_path = %config.model_path.display(),
                    vectorizer_path = %config.vectorizer_path.display(),
                    model_type = %artifacts.classifier.model_type(),
                    vocabulary_size = artifacts.vectorizer.vocabulary_size(),
                    "✅ ML model and vectorizer loaded"
                );
                Self::from_artifacts(artifacts)
            }
            Err(e) => {
                error!(error = %e, "Failed to load ML artifacts, predictions disabled");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn from_artifacts(artifacts: ModelArtifacts) -> Self {
        Self {
            artifacts: Some(artifacts),
            load_error: None,
        }
    }

    /// Degraded predictor that rejects every request
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            artifacts: None,
            load_error: Some(reason.into()),
        }
    }

    /// Whether both artifacts are loaded
    pub fn is_ready(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Why the artifacts failed to load, if they did
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    fn artifacts(&self) -> Result<&ModelArtifacts> {
        self.artifacts
            .as_ref()
            .ok_or_else(|| AppError::ModelUnavailable(MODEL_UNAVAILABLE_MESSAGE.to_string()))
    }

    /// Encode a feature record with the loaded vectorizer
    pub fn encode(&self, record: &FeatureRecord) -> Result<EncodedVector> {
        let artifacts = self.artifacts()?;
        Ok(encoder::encode(record, Some(&artifacts.vectorizer)))
    }

    /// Classify an encoded vector
    pub fn predict(&self, features: &EncodedVector) -> Result<PredictionResult> {
        let classifier = &self.artifacts()?.classifier;

        if let Some(expected) = classifier.n_features() {
            if features.len() != expected {
                return Err(AppError::FeatureMismatch {
                    expected,
                    actual: features.len(),
                });
            }
        }

        let probability = classifier.predict_proba(features)?;
        if !probability.is_finite() {
            return Err(AppError::Prediction(
                "model returned a non-finite probability".to_string(),
            ));
        }

        let label = if classifier.predict(features)? == 1 {
            Label::Fail
        } else {
            Label::Success
        };

        debug!(
            encoding = ?features.path(),
            width = features.len(),
            probability,
            "Prediction computed"
        );

        Ok(PredictionResult::new(label, probability))
    }

    /// Encode then classify
    pub fn predict_record(&self, record: &FeatureRecord) -> Result<PredictionResult> {
        let vector = self.encode(record)?;
        self.predict(&vector)
    }

    pub fn model_type(&self) -> Option<ModelType> {
        self.artifacts
            .as_ref()
            .map(|artifacts| artifacts.classifier.model_type())
    }

    /// Input width declared by the model, `None` when unknown
    pub fn model_features(&self) -> Option<usize> {
        self.artifacts
            .as_ref()
            .and_then(|artifacts| artifacts.classifier.n_features())
    }

    pub fn vocabulary_size(&self) -> Option<usize> {
        self.artifacts
            .as_ref()
            .map(|artifacts| artifacts.vectorizer.vocabulary_size())
    }

    pub fn model_sha256(&self) -> Option<&str> {
        self.artifacts
            .as_ref()
            .and_then(|artifacts| artifacts.model_sha256.as_deref())
    }

    pub fn vectorizer_sha256(&self) -> Option<&str> {
        self.artifacts
            .as_ref()
            .and_then(|artifacts| artifacts.vectorizer_sha256.as_deref())
    }
}

/// Canned advice for a prediction
pub fn recommend(label: Label, probability: f64) -> &'static str {
    match label {
        Label::Fail if probability > 0.8 => {
            "⚠️ Very high risk of build failure. Review your pipeline configuration immediately."
        }
        Label::Fail if probability > 0.6 => {
            "⚠️ High risk of build failure. Consider adding more testing stages."
        }
        Label::Fail => {
            "⚠️ Moderate risk of build failure. Review configuration before deployment."
        }
        Label::Success if probability < 0.3 => {
            "✅ Very low risk of build failure. Configuration looks good!"
        }
        Label::Success if probability < 0.5 => {
            "✅ Low risk of build failure. Good pipeline configuration."
        }
        Label::Success => "✅ Build likely to succeed, but monitor for potential issues.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::LogisticRegressionClassifier;
    use crate::ml::models::{EnvironmentType, ManualFeatures, PipelineFeatures, PipelineTool};
    use crate::ml::vectorizer::VectorizerArtifact;
    use std::collections::HashMap;

    fn vectorizer() -> TfidfVectorizer {
        TfidfVectorizer::from_artifact(VectorizerArtifact {
            vocabulary: HashMap::from([("deploy".to_string(), 0), ("test".to_string(), 1)]),
            idf: vec![1.0, 1.0],
            ngram_range: (1, 1),
            lowercase: true,
            norm: None,
            sublinear_tf: false,
            token_pattern: r"(?u)\b\w\w+\b".to_string(),
            stop_words: Vec::new(),
        })
        .unwrap()
    }

    fn predictor(weights: Vec<f64>) -> Predictor {
        let classifier = Box::new(LogisticRegressionClassifier::new(weights, 0.0).unwrap());
        Predictor::from_artifacts(ModelArtifacts::new(classifier, vectorizer()).unwrap())
    }

    fn pipeline(raw_text: &str) -> FeatureRecord {
        FeatureRecord::Pipeline(PipelineFeatures {
            pipeline_tool: PipelineTool::GithubActions,
            number_of_build_steps: 1,
            environment_type: EnvironmentType::Unknown,
            build_trigger_type: "push".to_string(),
            has_test_stage: false,
            has_deploy_stage: true,
            number_of_dependencies: 0,
            yaml_complexity: 3,
            raw_text: Some(raw_text.to_string()),
        })
    }

    #[test]
    fn test_text_prediction_labels() {
        let predictor = predictor(vec![3.0, -3.0]);

        let risky = predictor.predict_record(&pipeline("deploy deploy")).unwrap();
        assert_eq!(risky.label, Label::Fail);
        assert!(risky.probability > 0.99);

        let safe = predictor.predict_record(&pipeline("test")).unwrap();
        assert_eq!(safe.label, Label::Success);
        assert!(safe.probability < 0.05);
    }

    #[test]
    fn test_width_mismatch_rejected_at_load() {
        let classifier = Box::new(LogisticRegressionClassifier::new(vec![1.0; 3], 0.0).unwrap());
        assert!(ModelArtifacts::new(classifier, vectorizer()).is_err());
    }

    #[test]
    fn test_structured_vector_against_text_model_is_mismatch() {
        let predictor = predictor(vec![1.0, 1.0]);
        let err = predictor
            .predict_record(&FeatureRecord::Manual(ManualFeatures::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::FeatureMismatch { expected: 2, actual: 11 }
        ));
    }

    #[test]
    fn test_unavailable_predictor() {
        let predictor = Predictor::unavailable("missing file");
        assert!(!predictor.is_ready());
        assert_eq!(predictor.load_error(), Some("missing file"));
        assert_eq!(predictor.model_features(), None);
        assert_eq!(predictor.vocabulary_size(), None);

        let err = predictor.predict_record(&pipeline("deploy")).unwrap_err();
        assert_eq!(err.to_string(), MODEL_UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn test_load_records_digests() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        let vectorizer_path = dir.path().join("vectorizer.json");
        std::fs::write(
            &model_path,
            r#"{"model_type": "logistic_regression", "weights": [0.5, -0.5], "intercept": 0.0}"#,
        )
        .unwrap();
        std::fs::write(
            &vectorizer_path,
            r#"{"vocabulary": {"deploy": 0, "test": 1}, "idf": [1.0, 1.0]}"#,
        )
        .unwrap();

        let predictor = Predictor::load(&ModelConfig {
            model_path,
            vectorizer_path,
        });

        assert!(predictor.is_ready());
        assert_eq!(predictor.model_type(), Some(ModelType::LogisticRegression));
        assert_eq!(predictor.model_features(), Some(2));
        assert_eq!(predictor.vocabulary_size(), Some(2));
        assert_eq!(predictor.model_sha256().map(str::len), Some(64));
        assert_ne!(predictor.model_sha256(), predictor.vectorizer_sha256());
    }

    #[test]
    fn test_missing_artifacts_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = Predictor::load(&ModelConfig {
            model_path: dir.path().join("missing-model.json"),
            vectorizer_path: dir.path().join("missing-vectorizer.json"),
        });
        assert!(!predictor.is_ready());
        assert!(predictor.load_error().unwrap().contains("Failed to read model"));
    }

    #[test]
    fn test_recommendation_bands() {
        assert!(recommend(Label::Fail, 0.85).starts_with("⚠️ Very high risk"));
        assert!(recommend(Label::Fail, 0.8).starts_with("⚠️ High risk"));
        assert!(recommend(Label::Fail, 0.6).starts_with("⚠️ Moderate risk"));
        assert!(recommend(Label::Success, 0.1).starts_with("✅ Very low risk"));
        assert!(recommend(Label::Success, 0.3).starts_with("✅ Low risk"));
        assert!(recommend(Label::Success, 0.5).starts_with("✅ Build likely to succeed"));
    }
}
