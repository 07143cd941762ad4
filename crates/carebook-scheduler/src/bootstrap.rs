//! Wiring of a scheduler instance from configuration.

use std::sync::Arc;
use std::time::Duration;

use carebook_core::events::{
    ComponentRegistry, Diagnostics, EventNotifier, EventQueue, EventSink, FanOut,
    SubscriberFailure,
};
use carebook_storage::DynStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigError, DeliveryMode, SchedulerConfig};
use crate::coordinator::SchedulingCoordinator;

/// A coordinator together with the hubs its events flow into.
pub struct Scheduler {
    coordinator: Arc<SchedulingCoordinator>,
    notifier: Arc<EventNotifier>,
    registry: Arc<ComponentRegistry>,
    diagnostics: Diagnostics,
    dispatcher: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn coordinator(&self) -> &Arc<SchedulingCoordinator> {
        &self.coordinator
    }

    pub fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Subscriber failures from both the notifier and the registry.
    pub fn failures(&self) -> broadcast::Receiver<SubscriberFailure> {
        self.diagnostics.subscribe()
    }

    pub fn is_queued(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Stop accepting operations and let the dispatcher drain queued events.
    ///
    /// The dispatcher only stops once every coordinator handle is gone; if a
    /// clone is still alive after `grace`, the dispatcher is aborted and that
    /// clone rejects further operations with `SchedulingError::ShutDown`.
    pub async fn shutdown(self, grace: Duration) {
        let Scheduler {
            coordinator,
            dispatcher,
            ..
        } = self;
        drop(coordinator);

        let Some(mut handle) = dispatcher else {
            return;
        };
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => info!("Event dispatcher drained"),
            Ok(Err(e)) => warn!(error = %e, "Event dispatcher ended abnormally"),
            Err(_) => {
                warn!(?grace, "Event dispatcher still referenced after grace period, aborting");
                handle.abort();
                // the queue reports stopped once the aborted task is gone
                let _ = handle.await;
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("coordinator", &self.coordinator)
            .field("queued", &self.is_queued())
            .finish_non_exhaustive()
    }
}

/// Build a scheduler over `store`. Queued delivery spawns the dispatcher, so
/// this must run inside a Tokio runtime.
pub fn build_scheduler(store: DynStore, config: &SchedulerConfig) -> Result<Scheduler, ConfigError> {
    config.validate()?;
    let exclusion = config.exclusion_window()?;
    let timeout = config.subscriber_timeout();

    let diagnostics = Diagnostics::with_capacity(config.delivery.diagnostics_capacity);
    let notifier = Arc::new(
        EventNotifier::new()
            .with_timeout(timeout)
            .with_diagnostics(diagnostics.clone()),
    );
    let registry = Arc::new(
        ComponentRegistry::new()
            .with_timeout(timeout)
            .with_diagnostics(diagnostics.clone()),
    );
    let fan_out = FanOut::new(notifier.clone(), registry.clone());

    let (sink, dispatcher) = match config.delivery.mode {
        DeliveryMode::Inline => (Arc::new(fan_out) as Arc<dyn EventSink>, None),
        DeliveryMode::Queued => {
            let (queue, handle) = EventQueue::start(fan_out);
            (Arc::new(queue) as Arc<dyn EventSink>, Some(handle))
        }
    };

    info!(
        backend = store.backend_name(),
        buffer_minutes = config.scheduling.buffer_minutes,
        mode = ?config.delivery.mode,
        "Scheduler ready"
    );

    let coordinator = SchedulingCoordinator::new(store, sink)
        .with_exclusion(exclusion)
        .with_max_commit_retries(config.commit.max_retries);

    Ok(Scheduler {
        coordinator: Arc::new(coordinator),
        notifier,
        registry,
        diagnostics,
        dispatcher,
    })
}
