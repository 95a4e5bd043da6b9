//! Outbound SMTP for completion receipts.

use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::{MailError, Result};

/// SMTP configuration for the reply channel.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Address receipts are sent from.
    pub from: String,
    /// Connection timeout.
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Create a new SMTP configuration with STARTTLS defaults.
    pub fn new(host: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            username: None,
            password: None,
            from: from.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Sends plain-text receipts over SMTP (STARTTLS).
pub struct ReplyMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl ReplyMailer {
    /// Create a mailer from configuration.
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(host = %config.host, port = config.port, "SMTP reply mailer initialized");

        Ok(Self {
            transport: builder.build(),
            from: config.from,
        })
    }

    /// Send a plain-text receipt.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.parse().map_err(MailError::from)?)
            .to(to.parse().map_err(MailError::from)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        debug!(to = %to, subject = %subject, "Sending receipt");
        self.transport.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_config_builder() {
        let config = SmtpConfig::new("smtp.example.com", "pricewire@example.com")
            .port(2525)
            .credentials("user", "pass");

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 2525);
        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.from, "pricewire@example.com");
    }
}
