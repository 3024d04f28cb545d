use crate::config::{NotificationConfig, PredictionLogConfig};
use crate::ml::models::{Label, PredictionResult};
use crate::ml::service::recommend;
use crate::notifications::email::{AlertEmail, EmailSender};
use crate::notifications::log::{HistoryEntry, PredictionLog};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::Display;
use tracing::{info, warn};

const DEFAULT_RECOMMENDATION: &str = "Please review your pipeline configuration.";

/// Severity of the alert attached to a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertType {
    Critical,
    Warning,
    Info,
    Success,
}

impl AlertType {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.8 {
            AlertType::Critical
        } else if probability >= 0.6 {
            AlertType::Warning
        } else if probability >= 0.4 {
            AlertType::Info
        } else {
            AlertType::Success
        }
    }

    pub fn message(&self, probability: f64) -> String {
        let percent = format_percent(probability);
        match self {
            AlertType::Critical => format!("🚨 Critical Alert: {} chance of build failure!", percent),
            AlertType::Warning => format!("⚠️ Warning: {} chance of build failure.", percent),
            AlertType::Info => format!("ℹ️ Moderate risk: {} chance of build failure.", percent),
            AlertType::Success => format!("✅ Low risk: {} chance of build failure.", percent),
        }
    }
}

/// Whether and how a prediction should be escalated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDecision {
    pub should_notify: bool,
    pub threshold: f64,
    pub alert_type: AlertType,
    pub alert_message: String,
}

/// Outcome of a notification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub message: String,
}

impl DeliveryResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Validated `/notify` request
#[derive(Debug, Clone)]
pub struct NotifyRequest {
    pub prediction: String,
    pub probability: f64,
    pub email: String,
    pub message: Option<String>,
}

/// Threshold decisions, alert delivery and the prediction log
pub struct NotificationService {
    config: NotificationConfig,
    email_sender: EmailSender,
    prediction_log: PredictionLog,
}

impl NotificationService {
    pub fn new(config: NotificationConfig, log_config: &PredictionLogConfig) -> Self {
        if !config.has_credentials() {
            warn!("Email credentials not configured, alert emails are disabled");
        }

        Self {
            email_sender: EmailSender::new(&config),
            prediction_log: PredictionLog::new(log_config),
            config,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// True iff `probability` reaches the configured threshold
    pub fn should_notify(&self, probability: f64) -> bool {
        probability >= self.config.threshold
    }

    pub fn decide(&self, probability: f64) -> NotificationDecision {
        let alert_type = AlertType::from_probability(probability);
        NotificationDecision {
            should_notify: self.should_notify(probability),
            threshold: self.config.threshold,
            alert_type,
            alert_message: alert_type.message(probability),
        }
    }

    /// Send an alert email when the probability warrants one.
    ///
    /// Every failure is reported in the returned [`DeliveryResult`].
    pub async fn notify(&self, request: &NotifyRequest) -> DeliveryResult {
        if !self.should_notify(request.probability) {
            return DeliveryResult::failed(format!(
                "Probability ({}) below notification threshold ({})",
                format_percent(request.probability),
                format_percent(self.config.threshold)
            ));
        }

        let recommendation = match request.message.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(message) => message.to_string(),
            None => Label::from_str(&request.prediction)
                .map(|label| recommend(label, request.probability).to_string())
                .unwrap_or_else(|_| DEFAULT_RECOMMENDATION.to_string()),
        };

        let alert = AlertEmail::new(&request.prediction, request.probability, recommendation);

        match self.email_sender.send(&alert, &request.email).await {
            Ok(()) => {
                info!(
                    prediction = %request.prediction,
                    probability = request.probability,
                    "Risk alert delivered"
                );
                DeliveryResult {
                    success: true,
                    message: format!(
                        "Notification email sent successfully to {}",
                        request.email.trim()
                    ),
                }
            }
            Err(e) => {
                warn!(error = %e, "Risk alert not delivered");
                DeliveryResult::failed(e.to_string())
            }
        }
    }

    /// Record a prediction in the append-only log
    pub async fn log_prediction(&self, source: Option<&str>, result: &PredictionResult) {
        self.prediction_log.append(source, result).await;
    }

    pub async fn history(&self) -> std::io::Result<Vec<HistoryEntry>> {
        self.prediction_log.history().await
    }
}

fn format_percent(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(threshold: f64) -> NotificationService {
        let dir = std::env::temp_dir();
        NotificationService::new(
            NotificationConfig {
                threshold,
                ..NotificationConfig::default()
            },
            &PredictionLogConfig {
                prediction_log_path: dir.join("cicd-predictor-unused.log"),
                ..PredictionLogConfig::default()
            },
        )
    }

    fn request(probability: f64) -> NotifyRequest {
        NotifyRequest {
            prediction: "Fail".to_string(),
            probability,
            email: "dev@example.com".to_string(),
            message: None,
        }
    }

    #[test]
    fn test_should_notify_is_inclusive() {
        let service = service(0.7);
        assert!(service.should_notify(0.7));
        assert!(service.should_notify(0.71));
        assert!(!service.should_notify(0.6999));
    }

    #[test]
    fn test_higher_threshold_never_notifies_more() {
        let thresholds = [0.0, 0.25, 0.5, 0.7, 0.9, 1.0];
        for p in [0.0, 0.3, 0.5, 0.7, 0.95, 1.0] {
            let decisions: Vec<bool> = thresholds
                .iter()
                .map(|&t| service(t).should_notify(p))
                .collect();
            assert!(decisions.windows(2).all(|w| w[0] >= w[1]), "p = {}", p);
        }
    }

    #[test]
    fn test_decision_for_warning_band() {
        let decision = service(0.7).decide(0.75);
        assert!(decision.should_notify);
        assert_eq!(decision.threshold, 0.7);
        assert_eq!(decision.alert_type, AlertType::Warning);
        assert_eq!(decision.alert_message, "⚠️ Warning: 75.0% chance of build failure.");
    }

    #[test]
    fn test_alert_type_bands() {
        assert_eq!(AlertType::from_probability(0.8), AlertType::Critical);
        assert_eq!(AlertType::from_probability(0.6), AlertType::Warning);
        assert_eq!(AlertType::from_probability(0.4), AlertType::Info);
        assert_eq!(AlertType::from_probability(0.39), AlertType::Success);
        assert_eq!(AlertType::Critical.to_string(), "critical");
        assert_eq!(
            AlertType::Critical.message(0.912),
            "🚨 Critical Alert: 91.2% chance of build failure!"
        );
    }

    #[tokio::test]
    async fn test_below_threshold_short_circuits() {
        let result = service(0.7).notify(&request(0.5)).await;
        assert!(!result.success);
        assert_eq!(
            result.message,
            "Probability (50.0%) below notification threshold (70.0%)"
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_reported() {
        let result = service(0.7).notify(&request(0.9)).await;
        assert!(!result.success);
        assert!(result.message.starts_with("Email credentials not configured"));
    }
}
