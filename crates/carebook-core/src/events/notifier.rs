//! Event notifier: ordered fan-out of lifecycle events to attached subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use super::delivery::{DEFAULT_SUBSCRIBER_TIMEOUT, Diagnostics, PublishReport, deliver_isolated};
use super::subscriber::Subscriber;
use super::types::AppointmentEvent;

/// Handle returned by [`EventNotifier::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    name: String,
    subscriber: Weak<dyn Subscriber>,
}

/// Observer hub for appointment lifecycle events.
///
/// Subscribers are held by weak reference in attachment order. Publishing
/// iterates over a snapshot of that list, so attach/detach calls made while
/// a publish is in flight neither skip nor duplicate deliveries to the
/// subscribers already in the snapshot. Each invocation is isolated: an
/// error, panic or timeout is reported to [`Diagnostics`] and delivery moves
/// on to the next subscriber.
pub struct EventNotifier {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    timeout: Duration,
    diagnostics: Diagnostics,
}

impl EventNotifier {
    /// Create a notifier with the default timeout and its own diagnostics channel.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_SUBSCRIBER_TIMEOUT,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Set the per-subscriber delivery timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report failures into a shared diagnostics channel.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Attach a subscriber at the end of the delivery order.
    ///
    /// Only a weak reference is kept: the subscriber stops receiving events
    /// once the caller drops its last `Arc`.
    pub async fn attach(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = subscriber.name().to_string();
        self.subscriptions.write().await.push(Subscription {
            id,
            name: name.clone(),
            subscriber: Arc::downgrade(&subscriber),
        });
        debug!(subscriber = %name, subscription = %id, "Attached subscriber");
        id
    }

    /// Detach a subscriber by pointer identity.
    ///
    /// Returns false if it was not attached.
    pub async fn detach<S>(&self, subscriber: &Arc<S>) -> bool
    where
        S: Subscriber + ?Sized,
    {
        let target = Arc::as_ptr(subscriber).cast::<()>() as usize;
        self.remove_where(|s| s.subscriber.as_ptr().cast::<()>() as usize == target)
            .await
    }

    /// Detach by the handle returned from [`EventNotifier::attach`].
    pub async fn detach_id(&self, id: SubscriptionId) -> bool {
        self.remove_where(|s| s.id == id).await
    }

    async fn remove_where(&self, predicate: impl Fn(&Subscription) -> bool) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let Some(index) = subscriptions.iter().position(predicate) else {
            return false;
        };
        let removed = subscriptions.remove(index);
        debug!(subscriber = %removed.name, subscription = %removed.id, "Detached subscriber");
        true
    }

    /// Number of attached subscribers, including ones whose owner has dropped
    /// them but which have not been pruned by a publish yet.
    pub async fn subscriber_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Deliver an event to every attached subscriber, in attachment order.
    ///
    /// Never fails; per-subscriber failures are counted in the report and sent
    /// to the diagnostics channel.
    pub async fn publish(&self, event: &AppointmentEvent) -> PublishReport {
        let snapshot: Vec<(SubscriptionId, Weak<dyn Subscriber>)> = self
            .subscriptions
            .read()
            .await
            .iter()
            .map(|s| (s.id, s.subscriber.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut dropped = Vec::new();

        for (id, weak) in snapshot {
            let Some(subscriber) = weak.upgrade() else {
                dropped.push(id);
                report.skipped += 1;
                continue;
            };
            if !subscriber.matches(event) {
                report.skipped += 1;
                continue;
            }
            match deliver_isolated(subscriber.as_ref(), event, self.timeout).await {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    report.failed += 1;
                    self.diagnostics.report(failure);
                }
            }
        }

        if !dropped.is_empty() {
            self.subscriptions
                .write()
                .await
                .retain(|s| !dropped.contains(&s.id));
            debug!(count = dropped.len(), "Pruned dropped subscribers");
        }

        debug!(
            event_type = %event.event_type(),
            sequence = event.sequence,
            delivered = report.delivered,
            failed = report.failed,
            "Published event"
        );
        report
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointment::{
        Appointment, AppointmentId, AppointmentStatus, Location, PatientRef, StaffRef,
    };
    use crate::events::delivery::FailureKind;
    use crate::events::subscriber::SubscriberError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;
    use time::macros::datetime;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Named {
        name: &'static str,
        log: Log,
    }

    #[async_trait]
    impl Subscriber for Named {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_created(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
            self.log.lock().unwrap().push(self.name.to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Subscriber for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_created(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
            Err(SubscriberError::delivery("mail server unreachable"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Subscriber for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn on_created(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
            panic!("dashboard exploded");
        }
    }

    struct Slow;

    #[async_trait]
    impl Subscriber for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn on_created(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct CancelOnly {
        count: AtomicU32,
    }

    #[async_trait]
    impl Subscriber for CancelOnly {
        fn name(&self) -> &str {
            "cancel_only"
        }

        fn matches(&self, event: &AppointmentEvent) -> bool {
            !event.appointment().is_scheduled()
        }

        async fn on_cancelled(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Detaches `victim` from inside its own delivery.
    struct Detacher {
        notifier: Arc<EventNotifier>,
        victim: Arc<Named>,
    }

    #[async_trait]
    impl Subscriber for Detacher {
        fn name(&self) -> &str {
            "detacher"
        }

        async fn on_created(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
            self.notifier.detach(&self.victim).await;
            Ok(())
        }
    }

    fn event() -> AppointmentEvent {
        let at = datetime!(2025-01-01 10:00 UTC);
        AppointmentEvent::created(Appointment {
            id: AppointmentId(1),
            patient: PatientRef(1),
            staff: StaffRef(10),
            start: at,
            location: Location::new("RoomA").unwrap(),
            status: AppointmentStatus::Scheduled,
            created_at: at,
            updated_at: at,
        })
    }

    fn named(name: &'static str, log: &Log) -> Arc<Named> {
        Arc::new(Named {
            name,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_publish_in_attachment_order() {
        let notifier = EventNotifier::new();
        let log: Log = Arc::default();
        let patient = named("patient", &log);
        let staff = named("staff", &log);
        let admin = named("admin", &log);

        notifier.attach(patient.clone()).await;
        notifier.attach(staff.clone()).await;
        notifier.attach(admin.clone()).await;

        let report = notifier.publish(&event()).await;
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock().unwrap(), vec!["patient", "staff", "admin"]);
    }

    #[tokio::test]
    async fn test_detach_by_identity_and_handle() {
        let notifier = EventNotifier::new();
        let log: Log = Arc::default();
        let first = named("first", &log);
        let second = named("second", &log);

        notifier.attach(first.clone()).await;
        let second_id = notifier.attach(second.clone()).await;

        assert!(notifier.detach(&first).await);
        assert!(!notifier.detach(&first).await);
        assert!(notifier.detach_id(second_id).await);
        assert_eq!(notifier.subscriber_count().await, 0);

        let report = notifier.publish(&event()).await;
        assert_eq!(report.attempted(), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detach_during_publish_uses_snapshot() {
        let notifier = Arc::new(EventNotifier::new());
        let log: Log = Arc::default();
        let victim = named("victim", &log);
        let detacher = Arc::new(Detacher {
            notifier: notifier.clone(),
            victim: victim.clone(),
        });

        notifier.attach(detacher.clone()).await;
        notifier.attach(victim.clone()).await;

        // the in-flight publish still reaches the detached subscriber once
        let report = notifier.publish(&event()).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["victim"]);

        let report = notifier.publish(&event()).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(*log.lock().unwrap(), vec!["victim"]);
        assert_eq!(notifier.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let notifier = EventNotifier::new().with_timeout(Duration::from_millis(50));
        let mut diagnostics = notifier.diagnostics().subscribe();
        let log: Log = Arc::default();
        let failing = Arc::new(Failing);
        let panicking = Arc::new(Panicking);
        let slow = Arc::new(Slow);
        let last = named("last", &log);

        notifier.attach(failing.clone()).await;
        notifier.attach(panicking.clone()).await;
        notifier.attach(slow.clone()).await;
        notifier.attach(last.clone()).await;

        let report = notifier.publish(&event()).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 3);
        assert_eq!(*log.lock().unwrap(), vec!["last"]);

        let kinds: Vec<FailureKind> = vec![
            diagnostics.recv().await.unwrap().kind,
            diagnostics.recv().await.unwrap().kind,
            diagnostics.recv().await.unwrap().kind,
        ];
        assert_eq!(
            kinds,
            vec![FailureKind::Error, FailureKind::Panic, FailureKind::Timeout]
        );
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let notifier = EventNotifier::new();
        let log: Log = Arc::default();
        let kept = named("kept", &log);

        notifier.attach(kept.clone()).await;
        notifier.attach(named("dropped", &log)).await;
        assert_eq!(notifier.subscriber_count().await, 2);

        let report = notifier.publish(&event()).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(notifier.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_matches_filters_events() {
        let notifier = EventNotifier::new();
        let cancel_only = Arc::new(CancelOnly {
            count: AtomicU32::new(0),
        });
        notifier.attach(cancel_only.clone()).await;

        let report = notifier.publish(&event()).await;
        assert_eq!(report.skipped, 1);

        let mut cancelled = event().appointment().clone();
        cancelled.status = AppointmentStatus::Cancelled;
        notifier
            .publish(&AppointmentEvent::cancelled(cancelled))
            .await;
        assert_eq!(cancel_only.count.load(Ordering::SeqCst), 1);
    }
}
