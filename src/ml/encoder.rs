//! Feature encoding for the classifier.
//!
//! The lookup tables and column orders below are part of the contract with
//! the trained model: they must be identical to the encoding used at training
//! time. Changing any value silently shifts predictions.

use crate::ml::models::{EncodedVector, EncodingPath, FeatureRecord, ManualFeatures, PipelineFeatures};
use crate::ml::vectorizer::TfidfVectorizer;

/// Code assigned to any categorical value missing from its table
pub const UNKNOWN_CODE: i32 = -1;

pub const ENVIRONMENT_CODES: &[(&str, i32)] = &[
    ("production", 2),
    ("staging", 1),
    ("development", 0),
    ("unknown", -1),
];

pub const TRIGGER_CODES: &[(&str, i32)] = &[
    ("push", 2),
    ("pull_request", 1),
    ("scheduled", 0),
    ("manual", -1),
];

pub const BUILD_STATUS_CODES: &[(&str, i32)] = &[("success", 1), ("failure", 0), ("unknown", -1)];

pub const PIPELINE_TOOL_CODES: &[(&str, i32)] = &[
    ("github_actions", 4),
    ("gitlab_ci", 3),
    ("azure_devops", 2),
    ("circleci", 1),
    ("travis_ci", 0),
    ("unknown", -1),
];

/// Column order for pipeline features without raw text
pub const PIPELINE_FEATURE_ORDER: [&str; 8] = [
    "number_of_build_steps",
    "number_of_dependencies",
    "yaml_complexity",
    "has_test_stage",
    "has_deploy_stage",
    "pipeline_tool",
    "environment_type",
    "build_trigger_type",
];

/// Column order for manual form features
pub const MANUAL_FEATURE_ORDER: [&str; 11] = [
    "build_duration",
    "number_of_dependencies",
    "lines_of_code_changed",
    "commit_frequency",
    "test_coverage",
    "number_of_build_steps",
    "code_complexity_score",
    "environment_type",
    "build_trigger_type",
    "previous_build_status",
    "pipeline_tool",
];

fn lookup(table: &[(&str, i32)], value: &str) -> i32 {
    table
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, code)| *code)
        .unwrap_or(UNKNOWN_CODE)
}

pub fn encode_environment(value: &str) -> i32 {
    lookup(ENVIRONMENT_CODES, value)
}

pub fn encode_trigger(value: &str) -> i32 {
    lookup(TRIGGER_CODES, value)
}

pub fn encode_build_status(value: &str) -> i32 {
    lookup(BUILD_STATUS_CODES, value)
}

pub fn encode_pipeline_tool(value: &str) -> i32 {
    lookup(PIPELINE_TOOL_CODES, value)
}

/// Encode a record for the classifier.
///
/// Records carrying raw text go through the TF-IDF vectorizer when one is
/// available, ignoring every derived field. Everything else uses the
/// structured encoding. The two are never mixed.
pub fn encode(record: &FeatureRecord, vectorizer: Option<&TfidfVectorizer>) -> EncodedVector {
    match (record.raw_text(), vectorizer) {
        (Some(text), Some(vectorizer)) => {
            EncodedVector::new(vectorizer.transform(text), EncodingPath::Text)
        }
        _ => encode_structured(record),
    }
}

/// Structured encoding: numbers as-is, booleans as 0/1, categoricals via tables
pub fn encode_structured(record: &FeatureRecord) -> EncodedVector {
    match record {
        FeatureRecord::Pipeline(features) => encode_pipeline(features),
        FeatureRecord::Manual(features) => encode_manual(features),
    }
}

fn encode_pipeline(features: &PipelineFeatures) -> EncodedVector {
    EncodedVector::structured(vec![
        features.number_of_build_steps as f64,
        features.number_of_dependencies as f64,
        features.yaml_complexity as f64,
        bool_value(features.has_test_stage),
        bool_value(features.has_deploy_stage),
        f64::from(encode_pipeline_tool(features.pipeline_tool.as_ref())),
        f64::from(encode_environment(features.environment_type.as_ref())),
        f64::from(encode_trigger(&features.build_trigger_type)),
    ])
}

fn encode_manual(features: &ManualFeatures) -> EncodedVector {
    EncodedVector::structured(vec![
        features.build_duration,
        features.number_of_dependencies as f64,
        features.lines_of_code_changed as f64,
        features.commit_frequency,
        features.test_coverage,
        features.number_of_build_steps as f64,
        features.code_complexity_score,
        f64::from(encode_environment(&features.environment_type)),
        f64::from(encode_trigger(&features.build_trigger_type)),
        f64::from(encode_build_status(&features.previous_build_status)),
        f64::from(encode_pipeline_tool(&features.pipeline_tool)),
    ])
}

fn bool_value(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}
