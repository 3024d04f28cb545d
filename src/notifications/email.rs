use crate::config::NotificationConfig;
use crate::error::DeliveryError;
use chrono::Local;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};

pub const ALERT_SUBJECT: &str = "⚠️ CI/CD Build Risk Alert";

/// Static checklist appended to every alert
pub const COMMON_ISSUES: [&str; 5] = [
    "Missing test stages or inadequate test coverage",
    "Complex build steps that might fail",
    "Missing error handling in pipeline scripts",
    "Insufficient resource allocation",
    "Dependency conflicts or missing dependencies",
];

/// Contents of one risk alert
#[derive(Debug, Clone)]
pub struct AlertEmail {
    pub prediction: String,
    pub probability: f64,
    pub recommendation: String,
    pub timestamp: String,
}

impl AlertEmail {
    pub fn new(prediction: impl Into<String>, probability: f64, recommendation: impl Into<String>) -> Self {
        Self {
            prediction: prediction.into(),
            probability,
            recommendation: recommendation.into(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// SMTP sender for risk alerts
#[derive(Clone)]
pub struct EmailSender {
    config: NotificationConfig,
}

impl EmailSender {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Send an alert over an authenticated STARTTLS connection.
    ///
    /// Credentials and recipient are checked before any connection is opened.
    pub async fn send(&self, alert: &AlertEmail, recipient: &str) -> Result<(), DeliveryError> {
        if !self.config.has_credentials() {
            return Err(DeliveryError::CredentialsNotConfigured);
        }

        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(DeliveryError::MissingRecipient);
        }

        let message = self.build_message(alert, recipient)?;

        let result = tokio::task::spawn_blocking({
            let smtp_server = self.config.smtp_server.clone();
            let smtp_port = self.config.smtp_port;
            let credentials = Credentials::new(
                self.config.sender_email.clone(),
                self.config.sender_password.clone(),
            );

            move || {
                let mailer = SmtpTransport::starttls_relay(&smtp_server)
                    .map_err(|e| DeliveryError::Smtp(e.to_string()))?
                    .port(smtp_port)
                    .credentials(credentials)
                    .build();

                mailer.send(&message).map_err(classify_smtp_error)?;
                Ok::<(), DeliveryError>(())
            }
        })
        .await
        .map_err(|e| DeliveryError::Unexpected(format!("Task join error: {}", e)))?;

        match result {
            Ok(()) => {
                info!(
                    recipient = %recipient,
                    probability = alert.probability,
                    "Alert email sent"
                );
                Ok(())
            }
            Err(e) => {
                error!(recipient = %recipient, error = %e, "Failed to send alert email");
                Err(e)
            }
        }
    }

    /// Build the multipart alert message
    pub fn build_message(&self, alert: &AlertEmail, recipient: &str) -> Result<Message, DeliveryError> {
        let from: Mailbox = self.config.sender_email.parse().map_err(|e: lettre::address::AddressError| {
            DeliveryError::InvalidAddress {
                address: self.config.sender_email.clone(),
                reason: e.to_string(),
            }
        })?;

        let to: Mailbox = recipient.parse().map_err(|e: lettre::address::AddressError| {
            DeliveryError::InvalidAddress {
                address: recipient.to_string(),
                reason: e.to_string(),
            }
        })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(ALERT_SUBJECT)
            .multipart(MultiPart::alternative_plain_html(
                build_plain_text(alert),
                build_html(alert),
            ))
            .map_err(|e| DeliveryError::Unexpected(format!("Failed to build email: {}", e)))
    }
}

/// 534/535 are the authentication rejections
fn classify_smtp_error(e: lettre::transport::smtp::Error) -> DeliveryError {
    match e.status().map(|code| code.to_string()) {
        Some(code) if code == "534" || code == "535" => DeliveryError::AuthenticationFailed,
        _ => DeliveryError::Smtp(e.to_string()),
    }
}

fn build_plain_text(alert: &AlertEmail) -> String {
    let issues: String = COMMON_ISSUES
        .iter()
        .map(|issue| format!("  - {}\n", issue))
        .collect();

    format!(
        r#"CI/CD Build Risk Alert

Our ML model has detected a potential risk in your CI/CD pipeline.

Prediction: {}
Failure Probability: {:.1}%
Timestamp: {}

Recommendation:
{}

Common Issues to Check:
{}
---
This alert was sent by the CI/CD Failure Predictor
"#,
        alert.prediction,
        alert.probability * 100.0,
        alert.timestamp,
        alert.recommendation,
        issues
    )
}

fn build_html(alert: &AlertEmail) -> String {
    let issues: String = COMMON_ISSUES
        .iter()
        .map(|issue| format!("            <li>{}</li>\n", issue))
        .collect();

    format!(
        r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 600px;
            margin: 0 auto;
            padding: 20px;
        }}
        .header {{
            background-color: #ff6b35;
            color: white;
            padding: 20px;
            border-radius: 8px;
            margin-bottom: 20px;
        }}
        .details {{
            background-color: #f8f9fa;
            padding: 15px;
            border-radius: 8px;
            margin-bottom: 20px;
        }}
        .recommendation {{
            border-left: 4px solid #ff6b35;
            padding: 15px;
            margin-bottom: 20px;
        }}
        .footer {{
            margin-top: 30px;
            padding-top: 20px;
            border-top: 1px solid #e9ecef;
            font-size: 12px;
            color: #6c757d;
            text-align: center;
        }}
    </style>
</head>
<body>
    <div class="header">
        <h2>⚠️ CI/CD Build Risk Alert</h2>
        <p>Our ML model has detected a potential risk in your CI/CD pipeline.</p>
    </div>

    <div class="details">
        <p><strong>Prediction:</strong> {}</p>
        <p><strong>Failure Probability:</strong> {:.1}%</p>
        <p><strong>Timestamp:</strong> {}</p>
    </div>

    <div class="recommendation">
        <h3>Recommendation</h3>
        <p>{}</p>
    </div>

    <div class="details">
        <h3>Common Issues to Check</h3>
        <ul>
{}        </ul>
    </div>

    <div class="footer">
        This alert was sent by the <strong>CI/CD Failure Predictor</strong>
    </div>
</body>
</html>
"#,
        escape_html(&alert.prediction),
        alert.probability * 100.0,
        escape_html(&alert.timestamp),
        escape_html(&alert.recommendation),
        issues
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
