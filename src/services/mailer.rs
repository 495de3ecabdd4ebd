//! Outgoing mail
//!
//! Handlers never talk to SMTP directly. They push an `OutgoingMail` onto the
//! `MailQueue`, and a background task hands it to the configured `Mailer`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::MailConfig;

/// Queue capacity used by `main`
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A plain-text message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers one message
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<()>;
}

/// Accepts messages for later delivery
pub trait MailSink: Send + Sync {
    fn enqueue(&self, mail: OutgoingMail);
}

/// SMTP delivery through lettre
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", config.from, e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);

        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mail
                .to
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        Ok(())
    }
}

/// Writes messages to the log. Used when `mail.enabled` is false.
///
/// Bodies carry reset links, so they only show up at debug level.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<()> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            "Mail delivery disabled, message not sent"
        );
        tracing::debug!(to = %mail.to, "Undelivered message body\n{}", mail.body);
        Ok(())
    }
}

/// Pick the mailer for this configuration
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.enabled {
        tracing::info!(host = %config.smtp_host, port = config.smtp_port, "SMTP mail delivery enabled");
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// Bounded queue drained by a background delivery task
#[derive(Clone)]
pub struct MailQueue {
    sender: mpsc::Sender<OutgoingMail>,
}

impl MailQueue {
    /// Spawn the delivery worker. It exits once every `MailQueue` clone is dropped.
    pub fn start(mailer: Arc<dyn Mailer>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<OutgoingMail>(capacity);

        let worker = tokio::spawn(async move {
            while let Some(mail) = receiver.recv().await {
                match mailer.deliver(&mail).await {
                    Ok(()) => tracing::debug!(to = %mail.to, subject = %mail.subject, "Mail delivered"),
                    Err(e) => tracing::error!(to = %mail.to, error = %e, "Mail delivery failed"),
                }
            }
            tracing::debug!("Mail queue closed");
        });

        (Self { sender }, worker)
    }
}

impl MailSink for MailQueue {
    fn enqueue(&self, mail: OutgoingMail) {
        match self.sender.try_send(mail) {
            Ok(()) => {}
            Err(TrySendError::Full(mail)) => {
                tracing::warn!(to = %mail.to, "Mail queue full, dropping message");
            }
            Err(TrySendError::Closed(mail)) => {
                tracing::error!(to = %mail.to, "Mail queue closed, dropping message");
            }
        }
    }
}

/// Collects enqueued mail in memory
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    sent: std::sync::Mutex<Vec<OutgoingMail>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl MailSink for RecordingSink {
    fn enqueue(&self, mail: OutgoingMail) {
        self.sent.lock().unwrap().push(mail);
    }
}
