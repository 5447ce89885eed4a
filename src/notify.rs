//! Best-effort email notifications.
//!
//! The engine hands emails to a [`NotificationSink`] only after a unit of work
//! has committed. Delivery happens on a background worker; a full queue or a
//! failing [`Notifier`] is logged and never reaches the caller.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("recipient '{0}' rejected")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Delivers one email. Called from a blocking worker thread.
pub trait Notifier: Send + Sync + 'static {
    fn send_email(&self, email: &Email) -> Result<(), NotifyError>;
}

/// Notifier that writes emails to the log instead of sending them.
/// Emails without a recipient address are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_email(&self, email: &Email) -> Result<(), NotifyError> {
        if email.recipient.trim().is_empty() {
            return Err(NotifyError::Rejected(email.recipient.clone()));
        }
        info!(
            recipient = %email.recipient,
            subject = %email.subject,
            body = %email.body,
            "email sent"
        );
        Ok(())
    }
}

/// Queue in front of a [`Notifier`].
#[derive(Debug)]
pub struct NotificationSink {
    sender: Option<mpsc::Sender<Email>>,
}

impl NotificationSink {
    /// Start a worker delivering through `notifier`. The worker exits once the
    /// sink is dropped and the queue is drained.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(notifier: impl Notifier, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Email>(capacity);
        let worker = tokio::task::spawn_blocking(move || {
            while let Some(email) = receiver.blocking_recv() {
                if let Err(e) = notifier.send_email(&email) {
                    warn!(
                        recipient = %email.recipient,
                        subject = %email.subject,
                        reason = %e,
                        "email delivery failed"
                    );
                }
            }
        });
        (
            Self {
                sender: Some(sender),
            },
            worker,
        )
    }

    /// A sink that discards every email.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Queue an email without waiting.
    pub fn notify(&self, email: Email) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(email) {
            Ok(()) => {}
            Err(TrySendError::Full(email)) => {
                warn!(recipient = %email.recipient, "notification queue full, email dropped");
            }
            Err(TrySendError::Closed(email)) => {
                warn!(recipient = %email.recipient, "notification worker stopped, email dropped");
            }
        }
    }
}

impl Default for NotificationSink {
    fn default() -> Self {
        Self::disabled()
    }
}
