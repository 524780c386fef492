//! Email transport port.
//!
//! The engine never talks SMTP directly — the notifier hands finished
//! messages to an [`EmailSender`]. Production wires [`SmtpEmailSender`];
//! with email disabled the node wires [`NoopEmailSender`] and alerts still
//! reach the push channel.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use vigil_core::{SmtpConfig, VigilError};

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), VigilError>;
}

// ── SmtpEmailSender ──────────────────────────────────────────────────────────

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, VigilError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.relay)
            .map_err(|e| VigilError::Invalid(format!("smtp relay {:?}: {e}", config.relay)))?;
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let from = config
            .from
            .parse()
            .map_err(|e| VigilError::Invalid(format!("smtp from address {:?}: {e}", config.from)))?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), VigilError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for recipient in to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| VigilError::Invalid(format!("recipient {recipient:?}: {e}")))?;
            builder = builder.to(mailbox);
        }
        let message = builder
            .body(body.to_string())
            .map_err(|e| VigilError::Internal(format!("building email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| VigilError::Unavailable(format!("smtp send: {e}")))?;
        Ok(())
    }
}

// ── NoopEmailSender ──────────────────────────────────────────────────────────

/// Used when `email_enabled = false`.
pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send(&self, to: &[String], subject: &str, _body: &str) -> Result<(), VigilError> {
        debug!(recipients = to.len(), subject, "email disabled; dropping alert");
        Ok(())
    }
}
