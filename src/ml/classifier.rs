use crate::error::{AppError, Result};
use crate::ml::models::EncodedVector;
use ndarray::Array1;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use strum::Display;

/// Kind of classifier behind a loaded artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ModelType {
    #[strum(serialize = "XGBoost Classifier")]
    XGBoost,
    #[strum(serialize = "Logistic Regression")]
    LogisticRegression,
}

/// Trait for pre-trained binary classifiers
pub trait Classifier: Send + Sync {
    /// Probability of the positive (failure) class
    fn predict_proba(&self, features: &EncodedVector) -> Result<f64>;

    /// Positive-class prediction, 1 when the failure probability exceeds 0.5
    fn predict(&self, features: &EncodedVector) -> Result<u8> {
        Ok(u8::from(self.predict_proba(features)? > 0.5))
    }

    /// Input width the model was trained on, when the artifact records it
    fn n_features(&self) -> Option<usize>;

    /// Get model type
    fn model_type(&self) -> ModelType;
}

/// Load a classifier artifact from disk.
///
/// Accepts XGBoost's native JSON model (`Booster.save_model("*.json")`) or a
/// linear export `{"model_type": "logistic_regression", "weights": [..],
/// "intercept": x}`.
pub fn load_classifier(path: &Path) -> Result<Box<dyn Classifier>> {
    let bytes = std::fs::read(path).map_err(|e| {
        AppError::ModelUnavailable(format!("Failed to read model {}: {}", path.display(), e))
    })?;
    classifier_from_slice(&bytes).map_err(|e| {
        AppError::ModelUnavailable(format!("Invalid model {}: {}", path.display(), e))
    })
}

/// Parse a classifier artifact already read into memory
pub fn classifier_from_slice(bytes: &[u8]) -> Result<Box<dyn Classifier>> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| AppError::ModelUnavailable(format!("not valid JSON: {}", e)))?;
    classifier_from_json(document)
}

pub fn classifier_from_json(document: Value) -> Result<Box<dyn Classifier>> {
    if document.get("learner").is_some() {
        let model: XgbDocument = serde_json::from_value(document).map_err(|e| {
            AppError::ModelUnavailable(format!("Invalid XGBoost model: {}", e))
        })?;
        return Ok(Box::new(XGBoostClassifier::from_document(model)?));
    }

    match document.get("model_type").and_then(Value::as_str) {
        Some("logistic_regression") => {
            let model: LinearArtifact = serde_json::from_value(document).map_err(|e| {
                AppError::ModelUnavailable(format!("Invalid logistic regression model: {}", e))
            })?;
            Ok(Box::new(LogisticRegressionClassifier::new(
                model.weights,
                model.intercept,
            )?))
        }
        Some(other) => Err(AppError::ModelUnavailable(format!(
            "Unsupported model_type '{}'",
            other
        ))),
        None => Err(AppError::ModelUnavailable(
            "Unrecognised model artifact".to_string(),
        )),
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

// XGBoost JSON model schema (the subset needed for inference)

#[derive(Debug, Deserialize)]
struct XgbDocument {
    learner: XgbLearner,
}

#[derive(Debug, Deserialize)]
struct XgbLearner {
    gradient_booster: XgbBooster,
    learner_model_param: XgbModelParam,
    objective: XgbObjective,
}

#[derive(Debug, Deserialize)]
struct XgbBooster {
    name: String,
    model: Option<XgbForest>,
}

#[derive(Debug, Deserialize)]
struct XgbForest {
    trees: Vec<XgbTree>,
}

#[derive(Debug, Deserialize)]
struct XgbTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f64>,
    default_left: Vec<XgbFlag>,
}

/// Older exports write `default_left` as 0/1, newer ones as booleans
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum XgbFlag {
    Bool(bool),
    Int(i64),
}

impl XgbFlag {
    fn is_set(&self) -> bool {
        match self {
            XgbFlag::Bool(flag) => *flag,
            XgbFlag::Int(value) => *value != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct XgbModelParam {
    base_score: String,
    #[serde(default)]
    num_feature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XgbObjective {
    name: String,
}

/// One regression tree in array-of-nodes layout
#[derive(Debug, Clone)]
struct RegressionTree {
    left: Vec<usize>,
    right: Vec<usize>,
    is_leaf: Vec<bool>,
    split_index: Vec<usize>,
    /// Split threshold for inner nodes, leaf weight for leaves
    value: Vec<f64>,
    default_left: Vec<bool>,
}

impl RegressionTree {
    fn from_json(tree: XgbTree, position: usize) -> Result<Self> {
        let n = tree.left_children.len();
        if n == 0
            || tree.right_children.len() != n
            || tree.split_indices.len() != n
            || tree.split_conditions.len() != n
            || tree.default_left.len() != n
        {
            return Err(AppError::ModelUnavailable(format!(
                "Tree {} has inconsistent node arrays",
                position
            )));
        }

        let mut parsed = RegressionTree {
            left: vec![0; n],
            right: vec![0; n],
            is_leaf: vec![false; n],
            split_index: vec![0; n],
            value: tree.split_conditions,
            default_left: tree.default_left.iter().map(XgbFlag::is_set).collect(),
        };

        for node in 0..n {
            let (left, right) = (tree.left_children[node], tree.right_children[node]);
            if left == -1 {
                parsed.is_leaf[node] = true;
                continue;
            }

            // Children always follow their parent; this also rules out cycles
            let valid_child = |child: i64| child > node as i64 && (child as usize) < n;
            if !valid_child(left) || !valid_child(right) || tree.split_indices[node] < 0 {
                return Err(AppError::ModelUnavailable(format!(
                    "Tree {} node {} has invalid children or split index",
                    position, node
                )));
            }

            parsed.left[node] = left as usize;
            parsed.right[node] = right as usize;
            parsed.split_index[node] = tree.split_indices[node] as usize;
        }

        Ok(parsed)
    }

    fn leaf_value(&self, features: &EncodedVector) -> f64 {
        let mut node = 0;
        while !self.is_leaf[node] {
            let go_left = match features.get(self.split_index[node]) {
                // XGBoost evaluates splits in single precision
                Some(x) => (x as f32) < (self.value[node] as f32),
                None => self.default_left[node],
            };
            node = if go_left {
                self.left[node]
            } else {
                self.right[node]
            };
        }
        self.value[node]
    }
}

/// Gradient-boosted tree ensemble with a logistic link
#[derive(Debug, Clone)]
pub struct XGBoostClassifier {
    trees: Vec<RegressionTree>,
    base_margin: f64,
    n_features: Option<usize>,
}

impl XGBoostClassifier {
    fn from_document(document: XgbDocument) -> Result<Self> {
        let learner = document.learner;

        match learner.objective.name.as_str() {
            "binary:logistic" | "reg:logistic" => {}
            other => {
                return Err(AppError::ModelUnavailable(format!(
                    "Unsupported XGBoost objective '{}'",
                    other
                )))
            }
        }

        if learner.gradient_booster.name != "gbtree" {
            return Err(AppError::ModelUnavailable(format!(
                "Unsupported XGBoost booster '{}'",
                learner.gradient_booster.name
            )));
        }

        let forest = learner.gradient_booster.model.ok_or_else(|| {
            AppError::ModelUnavailable("XGBoost model has no trees".to_string())
        })?;

        let base_score = parse_base_score(&learner.learner_model_param.base_score)?;
        let n_features = learner
            .learner_model_param
            .num_feature
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|&n| n > 0);

        let trees = forest
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| RegressionTree::from_json(tree, i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            trees,
            base_margin: (base_score / (1.0 - base_score)).ln(),
            n_features,
        })
    }
}

/// `base_score` is written as "5E-1", or "[5E-1]" by newer releases
fn parse_base_score(raw: &str) -> Result<f64> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let score: f64 = trimmed.trim().parse().map_err(|_| {
        AppError::ModelUnavailable(format!("Invalid XGBoost base_score '{}'", raw))
    })?;
    if !(score > 0.0 && score < 1.0) {
        return Err(AppError::ModelUnavailable(format!(
            "XGBoost base_score {} outside (0, 1)",
            score
        )));
    }
    Ok(score)
}

impl Classifier for XGBoostClassifier {
    fn predict_proba(&self, features: &EncodedVector) -> Result<f64> {
        let margin = self.base_margin
            + self
                .trees
                .iter()
                .map(|tree| tree.leaf_value(features))
                .sum::<f64>();
        Ok(sigmoid(margin))
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn model_type(&self) -> ModelType {
        ModelType::XGBoost
    }
}

#[derive(Debug, Deserialize)]
struct LinearArtifact {
    weights: Vec<f64>,
    intercept: f64,
}

/// Logistic Regression Classifier
#[derive(Debug, Clone)]
pub struct LogisticRegressionClassifier {
    weights: Array1<f64>,
    intercept: f64,
}

impl LogisticRegressionClassifier {
    pub fn new(weights: Vec<f64>, intercept: f64) -> Result<Self> {
        if weights.is_empty() {
            return Err(AppError::ModelUnavailable(
                "Logistic regression model has no weights".to_string(),
            ));
        }
        Ok(Self {
            weights: Array1::from(weights),
            intercept,
        })
    }
}

impl Classifier for LogisticRegressionClassifier {
    fn predict_proba(&self, features: &EncodedVector) -> Result<f64> {
        if features.len() != self.weights.len() {
            return Err(AppError::FeatureMismatch {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }
        Ok(sigmoid(self.weights.dot(features.values()) + self.intercept))
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.weights.len())
    }

    fn model_type(&self) -> ModelType {
        ModelType::LogisticRegression
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Single stump on feature 0: x < 0.5 -> -1.0, otherwise +2.0
    fn stump_model(default_left: Value) -> Value {
        json!({
            "learner": {
                "gradient_booster": {
                    "name": "gbtree",
                    "model": {
                        "trees": [{
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "split_indices": [0, 0, 0],
                            "split_conditions": [0.5, -1.0, 2.0],
                            "default_left": default_left
                        }]
                    }
                },
                "learner_model_param": { "base_score": "5E-1", "num_feature": "2" },
                "objective": { "name": "binary:logistic" }
            },
            "version": [1, 7, 6]
        })
    }

    #[test]
    fn test_xgboost_stump_prediction() {
        let model = classifier_from_json(stump_model(json!([0, 0, 0]))).unwrap();
        assert_eq!(model.model_type(), ModelType::XGBoost);
        assert_eq!(model.n_features(), Some(2));

        let low = EncodedVector::structured(vec![0.1, 0.0]);
        let high = EncodedVector::structured(vec![0.9, 0.0]);

        assert!((model.predict_proba(&low).unwrap() - sigmoid(-1.0)).abs() < 1e-12);
        assert!((model.predict_proba(&high).unwrap() - sigmoid(2.0)).abs() < 1e-12);
        assert_eq!(model.predict(&low).unwrap(), 0);
        assert_eq!(model.predict(&high).unwrap(), 1);
    }

    #[test]
    fn test_missing_feature_follows_default_direction() {
        let right = classifier_from_json(stump_model(json!([false, false, false]))).unwrap();
        let left = classifier_from_json(stump_model(json!([true, false, false]))).unwrap();
        let empty = EncodedVector::structured(vec![]);
        let nan = EncodedVector::structured(vec![f64::NAN]);

        assert!(right.predict_proba(&empty).unwrap() > 0.5);
        assert!(left.predict_proba(&empty).unwrap() < 0.5);
        assert!(left.predict_proba(&nan).unwrap() < 0.5);
    }

    #[test]
    fn test_bracketed_base_score() {
        assert_eq!(parse_base_score("[5E-1]").unwrap(), 0.5);
        assert_eq!(parse_base_score("2.5E-1").unwrap(), 0.25);
        assert!(parse_base_score("1").is_err());
        assert!(parse_base_score("abc").is_err());
    }

    #[test]
    fn test_rejects_unsupported_objective() {
        let mut doc = stump_model(json!([0, 0, 0]));
        doc["learner"]["objective"]["name"] = json!("multi:softprob");
        assert!(classifier_from_json(doc).is_err());
    }

    #[test]
    fn test_rejects_cyclic_tree() {
        let mut doc = stump_model(json!([0, 0, 0]));
        doc["learner"]["gradient_booster"]["model"]["trees"][0]["left_children"] =
            json!([0, -1, -1]);
        assert!(classifier_from_json(doc).is_err());
    }

    #[test]
    fn test_logistic_regression() {
        let model = classifier_from_json(json!({
            "model_type": "logistic_regression",
            "weights": [1.0, -2.0],
            "intercept": 0.5
        }))
        .unwrap();

        assert_eq!(model.model_type(), ModelType::LogisticRegression);
        assert_eq!(model.n_features(), Some(2));

        let vector = EncodedVector::structured(vec![1.0, 1.0]);
        assert!((model.predict_proba(&vector).unwrap() - sigmoid(-0.5)).abs() < 1e-12);

        let short = EncodedVector::structured(vec![1.0]);
        assert!(matches!(
            model.predict_proba(&short),
            Err(AppError::FeatureMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xgb_model.json");
        std::fs::write(&path, stump_model(json!([1, 0, 0])).to_string()).unwrap();

        let model = load_classifier(&path).unwrap();
        assert_eq!(model.n_features(), Some(2));
        assert!(load_classifier(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_unrecognised_artifact() {
        assert!(classifier_from_json(json!({ "weights": [1.0] })).is_err());
        assert!(classifier_from_json(json!({ "model_type": "svm" })).is_err());
    }

    #[test]
    fn test_model_type_names() {
        assert_eq!(ModelType::XGBoost.to_string(), "XGBoost Classifier");
        assert_eq!(ModelType::LogisticRegression.to_string(), "Logistic Regression");
    }
}
