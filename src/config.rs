use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variables accepted without the `CICD_PREDICTOR__` prefix.
const ENV_SMTP_SERVER: &str = "SMTP_SERVER";
const ENV_SMTP_PORT: &str = "SMTP_PORT";
const ENV_SENDER_EMAIL: &str = "SENDER_EMAIL";
const ENV_SENDER_PASSWORD: &str = "SENDER_PASSWORD";
const ENV_NOTIFICATION_THRESHOLD: &str = "NOTIFICATION_THRESHOLD";
const ENV_MODEL_PATH: &str = "MODEL_PATH";
const ENV_VECTORIZER_PATH: &str = "VECTORIZER_PATH";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Model artifact locations
    #[serde(default)]
    pub model: ModelConfig,

    /// Notification configuration
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Prediction log configuration
    #[serde(default)]
    pub logging: PredictionLogConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration, layering the given file over the embedded defaults
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: CICD_PREDICTOR__)
            .add_source(
                config::Environment::with_prefix("CICD_PREDICTOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            // Flat variables used by existing deployments take precedence
            .set_override_option("notifications.smtp_server", env_string(ENV_SMTP_SERVER))?
            .set_override_option("notifications.smtp_port", env_parsed::<i64>(ENV_SMTP_PORT)?)?
            .set_override_option("notifications.sender_email", env_string(ENV_SENDER_EMAIL))?
            .set_override_option(
                "notifications.sender_password",
                env_string(ENV_SENDER_PASSWORD),
            )?
            .set_override_option(
                "notifications.threshold",
                env_parsed::<f64>(ENV_NOTIFICATION_THRESHOLD)?,
            )?
            .set_override_option("model.model_path", env_string(ENV_MODEL_PATH))?
            .set_override_option("model.vectorizer_path", env_string(ENV_VECTORIZER_PATH))?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let threshold = self.notifications.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(config::ConfigError::Message(format!(
                "notification threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        if self.logging.history_limit > self.logging.history_scan {
            return Err(config::ConfigError::Message(format!(
                "history_limit ({}) cannot exceed history_scan ({})",
                self.logging.history_limit, self.logging.history_scan
            )));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(config::ConfigError::Message(
                "max_upload_bytes must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_parsed<T>(key: &str) -> Result<Option<T>, config::ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            config::ConfigError::Message(format!("invalid value for {}: {} ({})", key, raw, e))
        }),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size (bytes)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Human-readable upload limit, e.g. "16MB"
    pub fn max_upload_label(&self) -> String {
        const MIB: usize = 1024 * 1024;
        if self.max_upload_bytes % MIB == 0 {
            format!("{}MB", self.max_upload_bytes / MIB)
        } else {
            format!("{} bytes", self.max_upload_bytes)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Classifier artifact (XGBoost JSON or linear export)
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// TF-IDF vectorizer export
    #[serde(default = "default_vectorizer_path")]
    pub vectorizer_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            vectorizer_path: default_vectorizer_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// SMTP server
    #[serde(default = "default_smtp_server")]
    pub smtp_server: String,

    /// SMTP port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Sender address, also used as the SMTP username
    #[serde(default)]
    pub sender_email: String,

    /// SMTP password
    #[serde(default)]
    pub sender_password: String,

    /// Minimum failure probability that warrants an alert
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl NotificationConfig {
    /// Whether both sender credentials are present
    pub fn has_credentials(&self) -> bool {
        !self.sender_email.is_empty() && !self.sender_password.is_empty()
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            smtp_server: default_smtp_server(),
            smtp_port: default_smtp_port(),
            sender_email: String::new(),
            sender_password: String::new(),
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionLogConfig {
    /// Append-only prediction log
    #[serde(default = "default_prediction_log_path")]
    pub prediction_log_path: PathBuf,

    /// Trailing lines considered by the history endpoint
    #[serde(default = "default_history_scan")]
    pub history_scan: usize,

    /// Entries returned by the history endpoint
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for PredictionLogConfig {
    fn default() -> Self {
        Self {
            prediction_log_path: default_prediction_log_path(),
            history_scan: default_history_scan(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/xgb_cicd_model.json")
}

fn default_vectorizer_path() -> PathBuf {
    PathBuf::from("models/tfidf_vectorizer.json")
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_threshold() -> f64 {
    0.7
}

fn default_prediction_log_path() -> PathBuf {
    PathBuf::from("logs/predictions.log")
}

fn default_history_scan() -> usize {
    50
}

fn default_history_limit() -> usize {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}
