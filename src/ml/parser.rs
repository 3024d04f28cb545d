//! Heuristic feature extraction from CI/CD pipeline definitions.
//!
//! Tool, step and trigger detection use direct key lookups on the top-level
//! mapping. Keyword and dependency checks run over a lower-cased rendering of
//! the whole document, so they are intentionally fuzzy: a keyword anywhere in
//! a key or value counts.

use crate::error::ExtractionError;
use crate::ml::models::{EnvironmentType, PipelineFeatures, PipelineTool};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::fmt::Write;

/// Nesting depth beyond which structure stops counting toward complexity
const MAX_COMPLEXITY_DEPTH: usize = 10;

// Checked in order; the first list with a hit wins.
const PRODUCTION_KEYWORDS: &[&str] = &["prod", "production", "main", "master"];
const STAGING_KEYWORDS: &[&str] = &["staging", "stage", "test"];
const DEVELOPMENT_KEYWORDS: &[&str] = &["dev", "development", "feature"];

const TEST_KEYWORDS: &[&str] = &["test", "jest", "pytest", "junit", "rspec", "mocha"];
const DEPLOY_KEYWORDS: &[&str] = &["deploy", "deployment", "release", "publish"];

static DEPENDENCY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"npm install",
        r"pip install",
        r"yarn install",
        r"composer install",
        r"bundle install",
        r"go get",
        r"requirements\.txt",
        r"package\.json",
        r"pom\.xml",
        r"build\.gradle",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("dependency pattern is valid"))
    .collect()
});

/// Parse a pipeline definition and derive its features.
///
/// Empty or malformed documents come back as [`ExtractionError::Parse`];
/// nothing in here panics on user input.
pub fn parse_pipeline_yaml(content: &str) -> Result<PipelineFeatures, ExtractionError> {
    if content.trim().is_empty() {
        return Err(ExtractionError::Parse("Empty or invalid YAML file".to_string()));
    }

    let mut document: Value = serde_yaml::from_str(content)
        .map_err(|e| ExtractionError::Parse(format!("YAML parsing error: {}", e)))?;
    // `<<` merge keys are folded into their parent mapping before analysis
    document
        .apply_merge()
        .map_err(|e| ExtractionError::Parse(format!("YAML parsing error: {}", e)))?;

    let root = match untag(&document) {
        Value::Mapping(mapping) if !mapping.is_empty() => mapping,
        Value::Mapping(_) | Value::Null => {
            return Err(ExtractionError::Parse("Empty or invalid YAML file".to_string()))
        }
        _ => {
            return Err(ExtractionError::Parse(
                "Invalid pipeline file: top-level YAML element must be a mapping".to_string(),
            ))
        }
    };

    let rendered = render_document(&document).to_lowercase();

    Ok(PipelineFeatures {
        pipeline_tool: detect_pipeline_tool(root),
        number_of_build_steps: count_build_steps(root),
        environment_type: detect_environment_type(&rendered),
        build_trigger_type: detect_build_trigger(root),
        has_test_stage: contains_any(&rendered, TEST_KEYWORDS),
        has_deploy_stage: contains_any(&rendered, DEPLOY_KEYWORDS),
        number_of_dependencies: count_dependencies(&rendered),
        yaml_complexity: yaml_complexity(&document),
        raw_text: Some(content.to_string()),
    })
}

/// Identify the CI/CD platform from distinguishing top-level keys
pub fn detect_pipeline_tool(root: &Mapping) -> PipelineTool {
    if root.contains_key("jobs") && root.contains_key("on") {
        PipelineTool::GithubActions
    } else if root.contains_key("stages") || root.contains_key("before_script") {
        PipelineTool::GitlabCi
    } else if root.contains_key("pipeline") || root.contains_key("steps") {
        PipelineTool::AzureDevops
    } else if matches!(root.get("version").map(untag), Some(Value::Number(_))) {
        PipelineTool::Circleci
    } else if root.contains_key("language") || root.contains_key("script") {
        PipelineTool::TravisCi
    } else {
        PipelineTool::Unknown
    }
}

/// Count build steps for the recognised schema shapes
pub fn count_build_steps(root: &Mapping) -> usize {
    if let Some(jobs) = root.get("jobs") {
        // GitHub Actions and CircleCI: steps listed per job
        match untag(jobs) {
            Value::Mapping(jobs) => jobs
                .values()
                .filter_map(|job| match untag(job) {
                    Value::Mapping(job) => job.get("steps").map(collection_len),
                    _ => None,
                })
                .sum(),
            _ => 0,
        }
    } else if let Some(stages) = root.get("stages") {
        collection_len(stages)
    } else if let Some(steps) = root.get("steps") {
        collection_len(steps)
    } else {
        0
    }
}

/// Classify the target environment from keywords anywhere in the document
pub fn detect_environment_type(rendered: &str) -> EnvironmentType {
    if contains_any(rendered, PRODUCTION_KEYWORDS) {
        EnvironmentType::Production
    } else if contains_any(rendered, STAGING_KEYWORDS) {
        EnvironmentType::Staging
    } else if contains_any(rendered, DEVELOPMENT_KEYWORDS) {
        EnvironmentType::Development
    } else {
        EnvironmentType::Unknown
    }
}

/// Work out what starts the pipeline from its `on:` block
pub fn detect_build_trigger(root: &Mapping) -> String {
    match root.get("on").map(untag) {
        Some(Value::Mapping(triggers)) => {
            if triggers.contains_key("push") {
                "push".to_string()
            } else if triggers.contains_key("pull_request") {
                "pull_request".to_string()
            } else if triggers.contains_key("schedule") {
                "scheduled".to_string()
            } else {
                "manual".to_string()
            }
        }
        Some(Value::String(trigger)) => trigger.clone(),
        _ => "manual".to_string(),
    }
}

/// Count dependency-manager commands and manifest references
pub fn count_dependencies(rendered: &str) -> usize {
    DEPENDENCY_PATTERNS
        .iter()
        .map(|pattern| pattern.find_iter(rendered).count())
        .sum()
}

/// Total number of mapping entries and sequence items, recursively
pub fn yaml_complexity(document: &Value) -> usize {
    count_nested_elements(document, 0)
}

fn count_nested_elements(value: &Value, depth: usize) -> usize {
    if depth > MAX_COMPLEXITY_DEPTH {
        return 0;
    }

    match untag(value) {
        Value::Mapping(mapping) => {
            mapping.len()
                + mapping
                    .values()
                    .map(|child| count_nested_elements(child, depth + 1))
                    .sum::<usize>()
        }
        Value::Sequence(items) => {
            items.len()
                + items
                    .iter()
                    .map(|child| count_nested_elements(child, depth + 1))
                    .sum::<usize>()
        }
        _ => 0,
    }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| haystack.contains(keyword))
}

fn collection_len(value: &Value) -> usize {
    match untag(value) {
        Value::Sequence(items) => items.len(),
        Value::Mapping(mapping) => mapping.len(),
        Value::String(text) => text.chars().count(),
        _ => 0,
    }
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

/// Render a document as a single line, `{key: value, ...}` style.
///
/// Strings are quoted and escaped so that values never run together, which
/// keeps substring checks from matching across neighbouring fields.
pub fn render_document(value: &Value) -> String {
    let mut out = String::new();
    render_into(value, &mut out);
    out
}

fn render_into(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(number) => {
            let _ = write!(out, "{}", number);
        }
        Value::String(text) => render_string(text, out),
        Value::Sequence(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_into(item, out);
            }
            out.push(']');
        }
        Value::Mapping(mapping) => {
            out.push('{');
            for (i, (key, item)) in mapping.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_into(key, out);
                out.push_str(": ");
                render_into(item, out);
            }
            out.push('}');
        }
        Value::Tagged(tagged) => render_into(&tagged.value, out),
    }
}

fn render_string(text: &str, out: &mut String) {
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
}
