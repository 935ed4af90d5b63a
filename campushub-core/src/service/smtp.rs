//! SMTP delivery channel
//!
//! Sends communication emails over an outbound SMTP relay. This is the
//! production [`DeliveryChannel`]; dispatch queue workers treat every
//! failure here as transient and retriable.

use async_trait::async_trait;
use lettre::{
    message::Mailbox,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use crate::channel::DeliveryChannel;
use crate::config::SmtpConfig;
use crate::logging::mask_email;
use crate::{Error, Result};

/// Email delivery channel backed by an SMTP relay
#[derive(Clone)]
pub struct SmtpChannel {
    config: SmtpConfig,
}

impl std::fmt::Debug for SmtpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpChannel")
            .field("smtp_host", &self.config.smtp_host)
            .field("smtp_port", &self.config.smtp_port)
            .finish()
    }
}

impl SmtpChannel {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Validate the shape of a recipient address before handing it to SMTP
    ///
    /// Intentionally lighter than full RFC 5322: the directory is trusted
    /// to hold sane addresses, this only rejects values that could never
    /// be one.
    fn validate_address(address: &str) -> Result<()> {
        let address = address.trim();

        if address.is_empty() {
            return Err(Error::InvalidInput("Email cannot be empty".to_string()));
        }
        if address.len() > 254 {
            return Err(Error::InvalidInput(
                "Email too long (max 254 characters)".to_string(),
            ));
        }

        let parts: Vec<&str> = address.split('@').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(Error::InvalidInput(
                "Email must have a local part and a domain".to_string(),
            ));
        }
        if !parts[1].contains('.') {
            return Err(Error::InvalidInput(
                "Email domain must contain at least one dot".to_string(),
            ));
        }

        Ok(())
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(
            self.config.smtp_username.clone(),
            self.config.smtp_password.clone(),
        );

        let transport = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
                .map_err(|e| {
                    Error::DeliveryAttemptFailed(format!("Failed to create SMTP transport: {e}"))
                })?
                .credentials(creds)
                .port(self.config.smtp_port)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.smtp_host)
                .credentials(creds)
                .port(self.config.smtp_port)
                .build()
        };

        Ok(transport)
    }
}

#[async_trait]
impl DeliveryChannel for SmtpChannel {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<()> {
        if !self.config.is_configured() {
            return Err(Error::DeliveryAttemptFailed(
                "SMTP relay not configured".to_string(),
            ));
        }

        Self::validate_address(address)?;

        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| {
                    Error::DeliveryAttemptFailed(format!("Invalid from address: {e}"))
                })?;

        let to_mailbox: Mailbox = address
            .parse()
            .map_err(|e| Error::DeliveryAttemptFailed(format!("Invalid to address: {e}")))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| Error::DeliveryAttemptFailed(format!("Failed to build email: {e}")))?;

        self.build_transport()?
            .send(email)
            .await
            .map_err(|e| Error::DeliveryAttemptFailed(format!("Failed to send email: {e}")))?;

        debug!(
            to = %mask_email(address),
            smtp_host = %self.config.smtp_host,
            smtp_port = self.config.smtp_port,
            "Email delivered via SMTP"
        );

        Ok(())
    }
}
