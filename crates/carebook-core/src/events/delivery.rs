//! Isolated delivery of one event to one subscriber, plus the diagnostics
//! channel that collects subscriber failures.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::subscriber::Subscriber;
use super::types::AppointmentEvent;
use crate::appointment::AppointmentId;

/// Default timeout for a single subscriber invocation.
pub const DEFAULT_SUBSCRIBER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default buffer size for the diagnostics channel.
const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

/// How a subscriber invocation went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Handler returned an error
    Error,
    /// Handler panicked
    Panic,
    /// Handler did not finish within the delivery timeout
    Timeout,
}

/// A failed delivery, reported on the diagnostics channel.
#[derive(Debug, Clone)]
pub struct SubscriberFailure {
    pub subscriber: String,
    pub appointment_id: AppointmentId,
    pub sequence: u64,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome counters for one publish or broadcast call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose handler completed successfully
    pub delivered: usize,
    /// Subscribers whose handler errored, panicked or timed out
    pub failed: usize,
    /// Subscribers filtered out by `matches` or already dropped
    pub skipped: usize,
}

impl PublishReport {
    pub fn merge(self, other: PublishReport) -> PublishReport {
        PublishReport {
            delivered: self.delivered + other.delivered,
            failed: self.failed + other.failed,
            skipped: self.skipped + other.skipped,
        }
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Broadcast channel carrying subscriber failures to whoever is watching.
///
/// Cloning shares the underlying channel, so the notifier and the registry
/// can report into the same stream.
#[derive(Clone)]
pub struct Diagnostics {
    sender: broadcast::Sender<SubscriberFailure>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DIAGNOSTICS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive failures reported after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SubscriberFailure> {
        self.sender.subscribe()
    }

    /// Log a failure and forward it to diagnostics receivers.
    ///
    /// Returns the number of receivers that got it.
    pub fn report(&self, failure: SubscriberFailure) -> usize {
        match failure.kind {
            FailureKind::Error => warn!(
                subscriber = %failure.subscriber,
                appointment_id = %failure.appointment_id,
                sequence = failure.sequence,
                error = %failure.message,
                "Subscriber failed to handle event"
            ),
            FailureKind::Panic => error!(
                subscriber = %failure.subscriber,
                appointment_id = %failure.appointment_id,
                sequence = failure.sequence,
                panic = %failure.message,
                "Subscriber panicked"
            ),
            FailureKind::Timeout => error!(
                subscriber = %failure.subscriber,
                appointment_id = %failure.appointment_id,
                sequence = failure.sequence,
                "Subscriber timed out"
            ),
        }
        self.sender.send(failure).unwrap_or_default()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Run one subscriber against one event with timeout and panic protection.
pub(crate) async fn deliver_isolated<S>(
    subscriber: &S,
    event: &AppointmentEvent,
    timeout: Duration,
) -> Result<(), SubscriberFailure>
where
    S: Subscriber + ?Sized,
{
    let result = tokio::time::timeout(
        timeout,
        AssertUnwindSafe(subscriber.handle(event)).catch_unwind(),
    )
    .await;

    let (kind, message) = match result {
        Ok(Ok(Ok(()))) => {
            debug!(
                subscriber = %subscriber.name(),
                sequence = event.sequence,
                "Event delivered"
            );
            return Ok(());
        }
        Ok(Ok(Err(e))) => (FailureKind::Error, e.to_string()),
        Ok(Err(panic)) => {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            (FailureKind::Panic, panic_msg)
        }
        Err(_) => (
            FailureKind::Timeout,
            format!("no response within {}ms", timeout.as_millis()),
        ),
    };

    Err(SubscriberFailure {
        subscriber: subscriber.name().to_string(),
        appointment_id: event.appointment_id(),
        sequence: event.sequence,
        kind,
        message,
    })
}
