/// Machine learning pipeline for build failure prediction
///
/// This module provides:
/// - Feature extraction from CI/CD pipeline YAML and manual entry forms
/// - Categorical and TF-IDF feature encoding
/// - Inference over pre-trained XGBoost and logistic regression artifacts
/// - Risk banding and recommendations

pub mod classifier;
pub mod encoder;
pub mod manual;
pub mod models;
pub mod parser;
pub mod service;
pub mod vectorizer;

pub use classifier::{Classifier, LogisticRegressionClassifier, ModelType, XGBoostClassifier};
pub use manual::extract_manual_features;
pub use models::{
    ConfidenceLevel, EncodedVector, EncodingPath, EnvironmentType, FeatureRecord, Label,
    ManualFeatures, PipelineFeatures, PipelineTool, PredictionResult, RiskLevel,
};
pub use parser::parse_pipeline_yaml;
pub use service::{recommend, ModelArtifacts, Predictor};
pub use vectorizer::TfidfVectorizer;
