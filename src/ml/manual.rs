use crate::error::ExtractionError;
use crate::ml::models::ManualFeatures;
use serde_json::{Map, Value};

/// Coerce a manual-entry form into typed features.
///
/// Missing (or null) fields take their defaults. A value that cannot be
/// coerced to its field type fails the whole form with
/// [`ExtractionError::Validation`]. Unrecognised fields are ignored.
pub fn extract_manual_features(form: &Map<String, Value>) -> Result<ManualFeatures, ExtractionError> {
    let defaults = ManualFeatures::default();

    Ok(ManualFeatures {
        build_duration: float_field(form, "build_duration")?,
        number_of_dependencies: int_field(form, "number_of_dependencies")?,
        lines_of_code_changed: int_field(form, "lines_of_code_changed")?,
        commit_frequency: float_field(form, "commit_frequency")?,
        test_coverage: float_field(form, "test_coverage")?,
        number_of_build_steps: int_field(form, "number_of_build_steps")?,
        code_complexity_score: float_field(form, "code_complexity_score")?,
        environment_type: categorical_field(form, "environment_type", defaults.environment_type),
        build_trigger_type: categorical_field(
            form,
            "build_trigger_type",
            defaults.build_trigger_type,
        ),
        previous_build_status: categorical_field(
            form,
            "previous_build_status",
            defaults.previous_build_status,
        ),
        pipeline_tool: categorical_field(form, "pipeline_tool", defaults.pipeline_tool),
    })
}

fn float_field(form: &Map<String, Value>, field: &str) -> Result<f64, ExtractionError> {
    match form.get(field) {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| invalid(field, "a number", &Value::Number(number.clone()))),
        Some(Value::Bool(flag)) => Ok(if *flag { 1.0 } else { 0.0 }),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(field, "a number", &Value::String(text.clone()))),
        Some(other) => Err(invalid(field, "a number", other)),
    }
}

fn int_field(form: &Map<String, Value>, field: &str) -> Result<i64, ExtractionError> {
    match form.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(number)) => {
            if let Some(value) = number.as_i64() {
                Ok(value)
            } else if let Some(value) = number.as_f64() {
                // Fractional input truncates toward zero
                Ok(value.trunc() as i64)
            } else {
                Err(invalid(field, "an integer", &Value::Number(number.clone())))
            }
        }
        Some(Value::Bool(flag)) => Ok(i64::from(*flag)),
        Some(Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(field, "an integer", &Value::String(text.clone()))),
        Some(other) => Err(invalid(field, "an integer", other)),
    }
}

fn categorical_field(form: &Map<String, Value>, field: &str, default: String) -> String {
    match form.get(field) {
        None | Some(Value::Null) => default,
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn invalid(field: &str, expected: &str, value: &Value) -> ExtractionError {
    ExtractionError::Validation(format!("{} must be {}, got {}", field, expected, value))
}
