//! Subscriber traits for appointment lifecycle events.
//!
//! Subscribers are the notification sinks (patient reminders, staff pagers,
//! admin dashboards) that react to committed scheduling changes. They are:
//! - **Async**: handlers are awaited one subscriber at a time
//! - **Isolated**: errors, panics and timeouts in one subscriber never reach
//!   the others or the scheduling caller
//! - **Unowned**: the notifier and registry keep weak references only

use async_trait::async_trait;

use super::types::{AppointmentChange, AppointmentEvent};
use crate::appointment::{Appointment, Placement};

/// Error type for subscriber handlers.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    /// Handler failed with a message.
    #[error("Subscriber handler failed: {0}")]
    Execution(String),

    /// Handler failed to forward the event to an internal channel.
    #[error("Channel send failed: {0}")]
    Channel(String),

    /// Handler failed due to a downstream delivery error (mail, SMS, push).
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SubscriberError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        SubscriberError::Execution(msg.into())
    }

    /// Create a channel error from a string.
    pub fn channel(msg: impl Into<String>) -> Self {
        SubscriberError::Channel(msg.into())
    }

    /// Create a delivery error from a string.
    pub fn delivery(msg: impl Into<String>) -> Self {
        SubscriberError::Delivery(msg.into())
    }
}

/// Receiver of appointment lifecycle events.
///
/// Implement the handlers you care about; the rest default to no-ops.
///
/// # Example
///
/// ```ignore
/// struct ReminderSink {
///     outbox: mpsc::Sender<Reminder>,
/// }
///
/// #[async_trait]
/// impl Subscriber for ReminderSink {
///     fn name(&self) -> &str { "patient_reminders" }
///
///     async fn on_created(&self, appointment: &Appointment) -> Result<(), SubscriberError> {
///         self.outbox
///             .send(Reminder::for_appointment(appointment))
///             .await
///             .map_err(|e| SubscriberError::channel(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Name used in logs and failure diagnostics.
    fn name(&self) -> &str;

    /// Check if this subscriber wants the given event.
    ///
    /// Default implementation accepts every event.
    fn matches(&self, _event: &AppointmentEvent) -> bool {
        true
    }

    async fn on_created(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
        Ok(())
    }

    async fn on_rescheduled(
        &self,
        _appointment: &Appointment,
        _previous: &Placement,
    ) -> Result<(), SubscriberError> {
        Ok(())
    }

    async fn on_cancelled(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
        Ok(())
    }

    async fn on_completed(&self, _appointment: &Appointment) -> Result<(), SubscriberError> {
        Ok(())
    }

    /// Route an event to the matching handler.
    ///
    /// Override only when the subscriber needs the event envelope itself
    /// (sequence number, timestamp).
    async fn handle(&self, event: &AppointmentEvent) -> Result<(), SubscriberError> {
        match &event.change {
            AppointmentChange::Created { appointment } => self.on_created(appointment).await,
            AppointmentChange::Rescheduled {
                appointment,
                previous,
            } => self.on_rescheduled(appointment, previous).await,
            AppointmentChange::Cancelled { appointment } => self.on_cancelled(appointment).await,
            AppointmentChange::Completed { appointment } => self.on_completed(appointment).await,
        }
    }
}

/// Kind of structural participant wired into the component registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    StaffView,
    PatientView,
    RoomView,
    Other,
}

/// A subscriber wired in at construction time and addressed by identity.
pub trait Component: Subscriber {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Other
    }
}
