use crate::error::{AuthError, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025,
            username: None,
            password: None,
            from_email: "noreply@ticketing.local".to_string(),
        }
    }
}

impl SmtpConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SMTP_HOST").unwrap_or(defaults.host),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            username: std::env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty()),
            password: std::env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty()),
            from_email: std::env::var("FROM_EMAIL").unwrap_or(defaults.from_email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Delivery seam for the email workers.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: EmailMessage) -> Result<()>;
}

/// Sends through an SMTP relay with lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };

        // Local catchers (MailHog on 1025) speak plain SMTP; everything else
        // goes through STARTTLS.
        let builder = if config.port == 1025 {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                AuthError::Internal(format!("Failed to create SMTP transport: {}", e))
            })?
        };
        let mut builder = builder.port(config.port);

        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: EmailMessage) -> Result<()> {
        let from = self
            .config
            .from_email
            .parse::<Mailbox>()
            .map_err(|e| AuthError::Internal(format!("Invalid from address: {}", e)))?;
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| AuthError::Internal(format!("Invalid to address: {}", e)))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| AuthError::Internal(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AuthError::Internal(format!("Failed to send email: {}", e)))?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}
