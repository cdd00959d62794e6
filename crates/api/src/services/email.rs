//! Email delivery for rendered reports.
//!
//! Supports multiple email providers:
//! - `console`: Logs emails to console (development)
//! - `smtp`: Sends via SMTP server
//! - `sendgrid`: Uses SendGrid API

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::EmailConfig;
use crate::services::render::Artifact;

/// Errors that can occur during email operations.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Email send timed out after {0}s")]
    Timeout(u64),

    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// A report email: one plain-text body and one attachment.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body_text: String,
    pub attachment: Artifact,
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Send with an upper bound on the transport round-trip.
pub async fn send_with_timeout(
    mailer: &dyn Mailer,
    message: &EmailMessage,
    timeout: Duration,
) -> Result<(), EmailError> {
    match tokio::time::timeout(timeout, mailer.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(EmailError::Timeout(timeout.as_secs())),
    }
}

/// Build the transport selected by `email.provider`.
///
/// With email disabled every send fails as not configured, so runs are
/// recorded as delivery failures instead of silent successes.
pub fn build_mailer(config: &EmailConfig) -> Result<Arc<dyn Mailer>, EmailError> {
    if !config.enabled {
        warn!("Email delivery is disabled, report sends will be recorded as failures");
        return Ok(Arc::new(ConsoleMailer { enabled: false }));
    }

    match config.provider.as_str() {
        "console" => Ok(Arc::new(ConsoleMailer { enabled: true })),
        "smtp" => Ok(Arc::new(SmtpMailer::new(config)?)),
        "sendgrid" => Ok(Arc::new(SendGridMailer::new(config)?)),
        provider => {
            error!(provider = %provider, "Unknown email provider");
            Err(EmailError::NotConfigured(format!(
                "unknown provider '{}'",
                provider
            )))
        }
    }
}

/// Console provider - logs instead of sending.
pub struct ConsoleMailer {
    enabled: bool,
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if !self.enabled {
            warn!(
                recipients = message.recipients.len(),
                subject = %message.subject,
                "Email service disabled, report not delivered"
            );
            return Err(EmailError::NotConfigured("email delivery is disabled".to_string()));
        }

        info!(
            to = %message.recipients.join(", "),
            subject = %message.subject,
            attachment = %message.attachment.filename,
            bytes = message.attachment.size(),
            "Email (console provider)"
        );
        debug!(body = %message.body_text, "Email body");
        Ok(())
    }
}

fn mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", address, e)))
}

/// SMTP provider.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        if config.smtp_host.is_empty() {
            return Err(EmailError::NotConfigured("email.smtp_host is empty".into()));
        }

        let builder = if config.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| EmailError::NotConfigured(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        let builder = builder.port(config.smtp_port);
        let builder = if config.smtp_username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
        };

        let from = mailbox(&format!(
            "{} <{}>",
            config.sender_name, config.sender_email
        ))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message, EmailError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for recipient in &message.recipients {
            builder = builder.to(mailbox(recipient)?);
        }

        let content_type = ContentType::parse(message.attachment.mime_type)
            .map_err(|e| EmailError::SendFailed(format!("bad content type: {}", e)))?;
        let attachment = Attachment::new(message.attachment.filename.clone())
            .body(message.attachment.bytes.clone(), content_type);

        builder
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(message.body_text.clone()))
                    .singlepart(attachment),
            )
            .map_err(|e| EmailError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let email = self.build_message(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| EmailError::SendFailed(format!("SMTP error: {}", e)))?;

        info!(
            recipients = message.recipients.len(),
            subject = %message.subject,
            "Email sent via SMTP"
        );
        Ok(())
    }
}

/// SendGrid provider - sends via SendGrid API.
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

impl SendGridMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        if config.sendgrid_api_key.is_empty() {
            return Err(EmailError::NotConfigured(
                "email.sendgrid_api_key is empty".into(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: config.sendgrid_api_key.clone(),
            sender_email: config.sender_email.clone(),
            sender_name: config.sender_name.clone(),
        })
    }

    fn body(&self, message: &EmailMessage) -> serde_json::Value {
        let to: Vec<serde_json::Value> = message
            .recipients
            .iter()
            .map(|email| serde_json::json!({ "email": email }))
            .collect();

        serde_json::json!({
            "personalizations": [{ "to": to }],
            "from": {
                "email": self.sender_email,
                "name": self.sender_name
            },
            "subject": message.subject,
            "content": [{
                "type": "text/plain",
                "value": message.body_text
            }],
            "attachments": [{
                "content": STANDARD.encode(&message.attachment.bytes),
                "type": message.attachment.mime_type,
                "filename": message.attachment.filename,
                "disposition": "attachment"
            }]
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let response = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.body(message))
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(format!("SendGrid request failed: {}", e)))?;

        if response.status().is_success() {
            info!(
                recipients = message.recipients.len(),
                subject = %message.subject,
                "Email sent via SendGrid"
            );
            Ok(())
        } else {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!(
                status = %status,
                error = %error_body,
                "SendGrid API error"
            );
            Err(EmailError::ProviderError(format!(
                "SendGrid returned {}: {}",
                status, error_body
            )))
        }
    }
}

/// Keeps sent messages in memory. Can be told to fail or stall.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make every following send fail with `reason`, or succeed again with `None`.
    pub fn fail_with(&self, reason: Option<&str>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = reason.map(str::to_string);
        }
    }

    /// Delay every following send.
    pub fn stall_for(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.delay.lock() {
            *slot = delay;
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(reason) = failure {
            return Err(EmailError::SendFailed(reason));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn test_config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            provider: "console".to_string(),
            sender_email: "reports@example.com".to_string(),
            sender_name: "Reports".to_string(),
            ..EmailConfig::default()
        }
    }

    fn message() -> EmailMessage {
        EmailMessage {
            recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            subject: "Weekly assets (Assets report)".to_string(),
            body_text: "Total items: 3".to_string(),
            attachment: Artifact {
                filename: "assets-report-20250106-0900.csv".to_string(),
                mime_type: "text/csv; charset=utf-8",
                bytes: b"Report,Assets Report\r\n".to_vec(),
            },
        }
    }

    #[tokio::test]
    async fn test_console_mailer_sends() {
        let mailer = build_mailer(&test_config()).unwrap();
        assert_ok!(mailer.send(&message()).await);
    }

    #[tokio::test]
    async fn test_disabled_mailer_reports_not_configured() {
        let mut config = test_config();
        config.enabled = false;
        config.provider = "smtp".to_string();
        let mailer = build_mailer(&config).unwrap();
        let err = assert_err!(mailer.send(&message()).await);
        assert!(matches!(err, EmailError::NotConfigured(_)));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = test_config();
        config.provider = "pigeon".to_string();
        assert!(matches!(
            build_mailer(&config),
            Err(EmailError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_sendgrid_requires_api_key() {
        let mut config = test_config();
        config.provider = "sendgrid".to_string();
        assert!(matches!(
            build_mailer(&config),
            Err(EmailError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_sendgrid_body_carries_attachment() {
        let mut config = test_config();
        config.sendgrid_api_key = "key".to_string();
        let mailer = SendGridMailer::new(&config).unwrap();
        let body = mailer.body(&message());

        assert_eq!(body["personalizations"][0]["to"].as_array().unwrap().len(), 2);
        assert_eq!(
            body["attachments"][0]["filename"],
            "assets-report-20250106-0900.csv"
        );
        assert_eq!(
            body["attachments"][0]["content"],
            STANDARD.encode(b"Report,Assets Report\r\n")
        );
    }

    #[tokio::test]
    async fn test_smtp_message_has_all_recipients() {
        let mut config = test_config();
        config.provider = "smtp".to_string();
        config.smtp_host = "localhost".to_string();
        config.smtp_use_tls = false;
        let mailer = SmtpMailer::new(&config).unwrap();
        let email = mailer.build_message(&message()).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("assets-report-20250106-0900.csv"));
    }

    #[tokio::test]
    async fn test_smtp_rejects_invalid_recipient() {
        let mut config = test_config();
        config.smtp_host = "localhost".to_string();
        config.smtp_use_tls = false;
        let mailer = SmtpMailer::new(&config).unwrap();
        let mut bad = message();
        bad.recipients = vec!["not-an-address".to_string()];
        assert!(matches!(
            mailer.build_message(&bad),
            Err(EmailError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_send_timeout() {
        let mailer = RecordingMailer::new();
        mailer.stall_for(Some(Duration::from_secs(5)));
        let result =
            send_with_timeout(&mailer, &message(), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(EmailError::Timeout(_))));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_recording_mailer_failure_toggle() {
        let mailer = RecordingMailer::new();
        mailer.fail_with(Some("relay refused"));
        assert_err!(mailer.send(&message()).await);
        mailer.fail_with(None);
        assert_ok!(mailer.send(&message()).await);
        assert_eq!(mailer.sent().len(), 1);
    }
}
