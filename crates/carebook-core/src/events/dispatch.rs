//! Event sinks the scheduler pushes committed events into.
//!
//! [`FanOut`] delivers inline: the caller awaits the notifier and registry.
//! [`EventQueue`] decouples delivery onto a single background
//! [`EventDispatcher`] task, so a slow subscriber never delays the scheduling
//! caller while every subscriber still sees events in commit order.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::delivery::PublishReport;
use super::notifier::EventNotifier;
use super::registry::ComponentRegistry;
use super::types::AppointmentEvent;

/// Destination for committed lifecycle events.
///
/// Emitting never fails from the caller's point of view: delivery problems
/// are the sink's to log and report.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: AppointmentEvent);

    /// Whether emitted events still reach their subscribers. Producers must
    /// stop committing once this turns false.
    fn is_running(&self) -> bool {
        true
    }
}

/// Inline delivery: notifier subscribers first, then registered components.
#[derive(Clone, Default)]
pub struct FanOut {
    notifier: Arc<EventNotifier>,
    registry: Arc<ComponentRegistry>,
}

impl FanOut {
    pub fn new(notifier: Arc<EventNotifier>, registry: Arc<ComponentRegistry>) -> Self {
        Self { notifier, registry }
    }

    pub fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub async fn deliver(&self, event: &AppointmentEvent) -> PublishReport {
        let subscribers = self.notifier.publish(event).await;
        let components = self.registry.broadcast(event).await;
        subscribers.merge(components)
    }
}

#[async_trait]
impl EventSink for FanOut {
    async fn emit(&self, event: AppointmentEvent) {
        self.deliver(&event).await;
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut").finish_non_exhaustive()
    }
}

/// Queued delivery through a background [`EventDispatcher`].
///
/// The channel is unbounded so `emit` never waits on subscribers. Dropping
/// every clone of the queue closes the channel; the dispatcher drains what is
/// left and stops.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<AppointmentEvent>,
}

impl EventQueue {
    /// Spawn a dispatcher for `fan_out` and return the queue feeding it.
    pub fn start(fan_out: FanOut) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new(fan_out);
        let handle = tokio::spawn(dispatcher.run(receiver));
        (Self { sender }, handle)
    }
}

#[async_trait]
impl EventSink for EventQueue {
    async fn emit(&self, event: AppointmentEvent) {
        let sequence = event.sequence;
        if let Err(e) = self.sender.send(event) {
            error!(
                sequence,
                appointment_id = %e.0.appointment_id(),
                "Event dispatcher is gone, dropping event"
            );
        }
    }

    /// False once the dispatcher has stopped or been aborted.
    fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Single consumer that delivers queued events one at a time.
pub struct EventDispatcher {
    fan_out: FanOut,
}

impl EventDispatcher {
    pub fn new(fan_out: FanOut) -> Self {
        Self { fan_out }
    }

    /// Run until every sender is dropped and the queue is drained.
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<AppointmentEvent>) {
        info!("Starting event dispatcher");

        while let Some(event) = receiver.recv().await {
            let report = self.fan_out.deliver(&event).await;
            debug!(
                sequence = event.sequence,
                event_type = %event.event_type(),
                delivered = report.delivered,
                failed = report.failed,
                "Dispatched event"
            );
        }

        info!("Event dispatcher channel closed, stopping");
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("fan_out", &self.fan_out)
            .finish()
    }
}
