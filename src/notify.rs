//! Notification dispatch with retry bookkeeping
//!
//! Turns a newly created alert into one delivery attempt record per
//! recipient and drives each record through the transport with
//! exponential backoff. Dispatch runs as its own actor task, decoupled
//! from the sweep that produced the alert: a slow transport never delays
//! alert or device persistence.
//!
//! ## Retry state machine
//!
//! ```text
//! PENDING ──send ok──> SENT
//!    │
//!    └─send failed─> RETRY (attempts < max, next_retry = now + backoff)
//!                      │
//!                      └─attempts == max──> FAILED (terminal)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use crate::alerts::{Alert, AlertId};
use crate::repository::AlertRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Sms,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Retry,
}

/// One delivery attempt record for one alert and one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub id: u64,
    pub alert_id: AlertId,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub status: NotificationStatus,

    /// Monotonically non-decreasing attempt counter.
    pub attempts: u32,
    pub max_attempts: u32,

    pub last_attempt: Option<DateTime<Utc>>,

    /// Only meaningful while `status == Retry`.
    pub next_retry: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Candidate notification record, before the repository assigns identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub alert_id: AlertId,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub max_attempts: u32,
}

/// A configured notification target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub channel: NotificationChannel,
    pub address: String,
}

/// Errors from the notification transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The gateway answered but refused the notification
    Rejected(String),

    /// The gateway could not be reached
    Network(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Rejected(msg) => write!(f, "notification rejected: {msg}"),
            TransportError::Network(msg) => write!(f, "transport unreachable: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Boundary to the external delivery mechanism.
///
/// The monitor decides *that* and *when* to notify; how the bytes reach
/// the recipient is the transport's business.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), TransportError>;
}

/// Transport that posts notifications to an HTTP gateway as JSON.
pub struct HttpTransport {
    client: reqwest::Client,
    gateway_url: String,
}

impl HttpTransport {
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: gateway_url.into(),
        }
    }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    #[instrument(skip(self, body))]
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), TransportError> {
        let payload = serde_json::json!({
            "channel": channel,
            "recipient": recipient,
            "subject": subject,
            "body": body,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let response = self
            .client
            .post(&self.gateway_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if response.status().is_success() {
            debug!("notification accepted by gateway");
            Ok(())
        } else {
            Err(TransportError::Rejected(format!(
                "gateway returned {}",
                response.status()
            )))
        }
    }
}

/// Transport that only logs. Used when no gateway is configured.
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), TransportError> {
        tracing::info!("notification ({channel}) to {recipient}: {subject}");
        Ok(())
    }
}

/// Backoff delay before retry number `attempt + 1`, given that `attempt`
/// attempts have already failed. Doubles per failed attempt.
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Subject and body of the outbound notification for an alert.
fn notification_content(alert: &Alert) -> (String, String) {
    let subject = format!(
        "Monitoring Alert: {} is {}",
        alert.device_name,
        alert.current_value.to_uppercase()
    );

    let body = format!(
        "Device Alert - {}\n\n\
         Device: {}\n\
         Severity: {}\n\
         Time: {}\n\n\
         {}\n\n\
         Alert ID: {}\n\
         This is an automated alert from the network monitoring service.",
        alert.current_value.to_uppercase(),
        alert.device_name,
        alert.severity,
        alert.last_occurred.format("%Y-%m-%d %H:%M:%S"),
        alert.message,
        alert.id,
    );

    (subject, body)
}

/// Delivery engine: creates notification records and drives each one
/// through the transport until SENT or terminally FAILED.
pub struct NotificationDispatcher {
    transport: Arc<dyn NotificationTransport>,
    repo: Arc<dyn AlertRepository>,
    recipients: Vec<Recipient>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        repo: Arc<dyn AlertRepository>,
        recipients: Vec<Recipient>,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            transport,
            repo,
            recipients,
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Deliver `alert` to every configured recipient.
    ///
    /// Recipients are delivered concurrently; one slow or failing
    /// recipient never holds up the others. With no recipients
    /// configured this is a no-op.
    #[instrument(skip_all, fields(alert_id = alert.id))]
    pub async fn dispatch(&self, alert: &Alert) -> Vec<AlertNotification> {
        let deliveries = self
            .recipients
            .iter()
            .map(|recipient| self.deliver_to(alert, recipient));

        futures::future::join_all(deliveries)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn deliver_to(
        &self,
        alert: &Alert,
        recipient: &Recipient,
    ) -> Option<AlertNotification> {
        let mut notification = match self
            .repo
            .create_notification(NewNotification {
                alert_id: alert.id,
                channel: recipient.channel,
                recipient: recipient.address.clone(),
                max_attempts: self.max_attempts,
            })
            .await
        {
            Ok(n) => n,
            Err(e) => {
                error!("failed to record notification for {}: {e}", recipient.address);
                return None;
            }
        };

        let (subject, body) = notification_content(alert);

        loop {
            notification.attempts += 1;
            notification.last_attempt = Some(Utc::now());

            match self
                .transport
                .send(recipient.channel, &recipient.address, &subject, &body)
                .await
            {
                Ok(()) => {
                    notification.status = NotificationStatus::Sent;
                    notification.next_retry = None;
                    self.persist(&notification).await;
                    debug!(
                        "notification {} sent to {} on attempt {}",
                        notification.id, recipient.address, notification.attempts
                    );
                    return Some(notification);
                }
                Err(e) => {
                    warn!(
                        "delivery to {} failed (attempt {}/{}): {e}",
                        recipient.address, notification.attempts, notification.max_attempts
                    );

                    if notification.attempts >= notification.max_attempts {
                        notification.status = NotificationStatus::Failed;
                        notification.next_retry = None;
                        self.persist(&notification).await;
                        return Some(notification);
                    }

                    let delay = backoff(self.backoff_base, notification.attempts);
                    notification.status = NotificationStatus::Retry;
                    notification.next_retry =
                        Some(Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64));
                    self.persist(&notification).await;

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn persist(&self, notification: &AlertNotification) {
        if let Err(e) = self.repo.save_notification(notification).await {
            error!("failed to persist notification {}: {e}", notification.id);
        }
    }
}

/// Commands understood by the dispatcher actor.
#[derive(Debug)]
pub enum DispatcherCommand {
    /// Deliver notifications for a newly created alert
    Dispatch { alert: Alert },

    /// Wait until every in-flight delivery has finished
    Drain { respond_to: oneshot::Sender<()> },

    /// Finish in-flight deliveries, then exit
    Shutdown,
}

/// Actor that owns the delivery engine and runs dispatches in the
/// background, one task per alert.
pub struct DispatcherActor {
    dispatcher: Arc<NotificationDispatcher>,
    command_rx: mpsc::Receiver<DispatcherCommand>,
}

impl DispatcherActor {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting notification dispatcher");

        let mut deliveries: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(DispatcherCommand::Dispatch { alert }) => {
                        let dispatcher = self.dispatcher.clone();
                        deliveries.spawn(async move {
                            dispatcher.dispatch(&alert).await;
                        });
                    }

                    Some(DispatcherCommand::Drain { respond_to }) => {
                        while deliveries.join_next().await.is_some() {}
                        let _ = respond_to.send(());
                    }

                    Some(DispatcherCommand::Shutdown) | None => break,
                },

                Some(_) = deliveries.join_next(), if !deliveries.is_empty() => {}
            }
        }

        // Let in-flight deliveries run to completion before exiting.
        while deliveries.join_next().await.is_some() {}
        debug!("notification dispatcher stopped");
    }
}

/// Handle for the dispatcher actor.
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// Spawn the dispatcher actor.
    pub fn spawn(dispatcher: NotificationDispatcher) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = DispatcherActor {
            dispatcher: Arc::new(dispatcher),
            command_rx: cmd_rx,
        };
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Queue delivery for a newly created alert.
    pub async fn dispatch(&self, alert: Alert) {
        if self
            .sender
            .send(DispatcherCommand::Dispatch { alert })
            .await
            .is_err()
        {
            warn!("dispatcher is gone, dropping notification request");
        }
    }

    /// Wait for all queued and in-flight deliveries to finish.
    pub async fn drain(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(DispatcherCommand::Drain { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(DispatcherCommand::Shutdown).await;
    }
}
