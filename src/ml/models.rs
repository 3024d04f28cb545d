use ndarray::Array1;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// CI/CD platform a pipeline definition was written for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineTool {
    GithubActions,
    GitlabCi,
    AzureDevops,
    Circleci,
    TravisCi,
    Unknown,
}

/// Deployment environment inferred from pipeline keywords
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnvironmentType {
    Production,
    Staging,
    Development,
    Unknown,
}

/// Features derived from an uploaded pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFeatures {
    pub pipeline_tool: PipelineTool,
    pub number_of_build_steps: usize,
    pub environment_type: EnvironmentType,
    /// `push`, `pull_request`, `scheduled`, `manual`, or a verbatim `on:` string
    pub build_trigger_type: String,
    pub has_test_stage: bool,
    pub has_deploy_stage: bool,
    pub number_of_dependencies: usize,
    pub yaml_complexity: usize,
    /// Original document text, fed to the TF-IDF vectorizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

/// Features submitted through the manual entry form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualFeatures {
    pub build_duration: f64,
    pub number_of_dependencies: i64,
    pub lines_of_code_changed: i64,
    pub commit_frequency: f64,
    pub test_coverage: f64,
    pub number_of_build_steps: i64,
    pub code_complexity_score: f64,
    pub environment_type: String,
    pub build_trigger_type: String,
    pub previous_build_status: String,
    pub pipeline_tool: String,
}

impl Default for ManualFeatures {
    fn default() -> Self {
        Self {
            build_duration: 0.0,
            number_of_dependencies: 0,
            lines_of_code_changed: 0,
            commit_frequency: 0.0,
            test_coverage: 0.0,
            number_of_build_steps: 0,
            code_complexity_score: 0.0,
            environment_type: "unknown".to_string(),
            build_trigger_type: "manual".to_string(),
            previous_build_status: "unknown".to_string(),
            pipeline_tool: "unknown".to_string(),
        }
    }
}

/// Output of either extraction path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureRecord {
    Pipeline(PipelineFeatures),
    Manual(ManualFeatures),
}

impl FeatureRecord {
    /// Raw document text, if this record came from an upload that kept it
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            FeatureRecord::Pipeline(features) => features.raw_text.as_deref(),
            FeatureRecord::Manual(_) => None,
        }
    }
}

/// Which encoding produced a vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingPath {
    /// TF-IDF over the raw document
    Text,
    /// Fixed-order numeric and categorical fields
    Structured,
}

/// Fixed-order numeric input for the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVector {
    values: Array1<f64>,
    path: EncodingPath,
}

impl EncodedVector {
    pub fn new(values: Array1<f64>, path: EncodingPath) -> Self {
        Self { values, path }
    }

    pub fn structured(values: Vec<f64>) -> Self {
        Self::new(Array1::from(values), EncodingPath::Structured)
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn path(&self) -> EncodingPath {
        self.path
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Feature value at `index`, or `None` when absent or NaN
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().filter(|v| !v.is_nan())
    }
}

/// Predicted build outcome
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum Label {
    Success,
    Fail,
}

/// Classifier output for one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Label,
    /// Probability of the failure class, in [0, 1]
    pub probability: f64,
}

impl PredictionResult {
    pub fn new(label: Label, probability: f64) -> Self {
        Self {
            label,
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_probability(self.probability)
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_probability(self.probability)
    }
}

/// Failure-risk band reported with every prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.8 {
            RiskLevel::Critical
        } else if probability >= 0.6 {
            RiskLevel::High
        } else if probability >= 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// How far the prediction sits from the decision boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ConfidenceLevel {
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_probability(probability: f64) -> Self {
        if (probability - 0.5).abs() > 0.3 {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Medium
        }
    }
}
