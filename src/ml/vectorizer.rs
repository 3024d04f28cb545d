use crate::error::{AppError, Result};
use ndarray::Array1;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Row normalisation applied after IDF weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

/// On-disk export of a fitted TF-IDF vectorizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerArtifact {
    /// Term -> column index
    pub vocabulary: HashMap<String, usize>,

    /// IDF weight per column
    pub idf: Vec<f64>,

    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),

    #[serde(default = "default_true")]
    pub lowercase: bool,

    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,

    #[serde(default)]
    pub sublinear_tf: bool,

    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,

    #[serde(default)]
    pub stop_words: Vec<String>,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_true() -> bool {
    true
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

fn default_token_pattern() -> String {
    r"(?u)\b\w\w+\b".to_string()
}

/// Fitted TF-IDF vectorizer with a frozen vocabulary
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Array1<f64>,
    ngram_range: (usize, usize),
    lowercase: bool,
    norm: Option<Norm>,
    sublinear_tf: bool,
    token_regex: Regex,
    stop_words: HashSet<String>,
}

impl TfidfVectorizer {
    /// Load and validate a vectorizer export
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::ModelUnavailable(format!(
                "Failed to read vectorizer {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_slice(&bytes).map_err(|e| {
            AppError::ModelUnavailable(format!("Invalid vectorizer {}: {}", path.display(), e))
        })
    }

    /// Parse and validate a vectorizer export already read into memory
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let artifact: VectorizerArtifact = serde_json::from_slice(bytes)
            .map_err(|e| AppError::ModelUnavailable(format!("not valid JSON: {}", e)))?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: VectorizerArtifact) -> Result<Self> {
        let width = artifact.vocabulary.len();

        if artifact.idf.len() != width {
            return Err(AppError::ModelUnavailable(format!(
                "Vectorizer has {} terms but {} idf weights",
                width,
                artifact.idf.len()
            )));
        }

        let mut seen = vec![false; width];
        for (term, &index) in &artifact.vocabulary {
            if index >= width || seen[index] {
                return Err(AppError::ModelUnavailable(format!(
                    "Vectorizer term '{}' has invalid column {}",
                    term, index
                )));
            }
            seen[index] = true;
        }

        let (min_n, max_n) = artifact.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(AppError::ModelUnavailable(format!(
                "Invalid ngram_range ({}, {})",
                min_n, max_n
            )));
        }

        let token_regex = Regex::new(&artifact.token_pattern).map_err(|e| {
            AppError::ModelUnavailable(format!("Invalid token_pattern: {}", e))
        })?;

        Ok(Self {
            vocabulary: artifact.vocabulary,
            idf: Array1::from(artifact.idf),
            ngram_range: artifact.ngram_range,
            lowercase: artifact.lowercase,
            norm: artifact.norm,
            sublinear_tf: artifact.sublinear_tf,
            token_regex,
            stop_words: artifact.stop_words.into_iter().collect(),
        })
    }

    /// Number of output columns
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vectorize one document
    pub fn transform(&self, document: &str) -> Array1<f64> {
        let mut row = Array1::<f64>::zeros(self.vocabulary.len());

        for term in self.analyze(document) {
            if let Some(&index) = self.vocabulary.get(&term) {
                row[index] += 1.0;
            }
        }

        if self.sublinear_tf {
            row.mapv_inplace(|count| if count > 0.0 { 1.0 + count.ln() } else { 0.0 });
        }

        row *= &self.idf;

        match self.norm {
            Some(Norm::L2) => {
                let length = row.dot(&row).sqrt();
                if length > 0.0 {
                    row /= length;
                }
            }
            Some(Norm::L1) => {
                let total: f64 = row.iter().map(|v| v.abs()).sum();
                if total > 0.0 {
                    row /= total;
                }
            }
            None => {}
        }

        row
    }

    /// Tokenize and build word n-grams
    fn analyze(&self, document: &str) -> Vec<String> {
        let text = if self.lowercase {
            document.to_lowercase()
        } else {
            document.to_string()
        };

        let tokens: Vec<&str> = self
            .token_regex
            .find_iter(&text)
            .map(|m| m.as_str())
            .filter(|token| !self.stop_words.contains(*token))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }
}
