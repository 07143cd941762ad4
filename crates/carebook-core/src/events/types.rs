//! Event types for appointment lifecycle notifications.
//!
//! Events are value objects: built once per committed coordinator operation,
//! never mutated afterwards, and not persisted by the core.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::appointment::{Appointment, AppointmentId, Placement};

/// Type of lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentEventType {
    /// Appointment was booked
    Created,
    /// Appointment moved to a new start and/or location
    Rescheduled,
    /// Appointment was cancelled
    Cancelled,
    /// Appointment took place
    Completed,
}

impl AppointmentEventType {
    /// Returns the string representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentEventType::Created => "created",
            AppointmentEventType::Rescheduled => "rescheduled",
            AppointmentEventType::Cancelled => "cancelled",
            AppointmentEventType::Completed => "completed",
        }
    }
}

impl std::fmt::Display for AppointmentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened to the appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppointmentChange {
    Created {
        appointment: Appointment,
    },
    Rescheduled {
        appointment: Appointment,
        previous: Placement,
    },
    Cancelled {
        appointment: Appointment,
    },
    Completed {
        appointment: Appointment,
    },
}

/// Lifecycle event pushed to subscribers and registered components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentEvent {
    /// Commit order assigned by the coordinator (0 when built outside it)
    pub sequence: u64,
    /// Timestamp of the event
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    #[serde(flatten)]
    pub change: AppointmentChange,
}

impl AppointmentEvent {
    /// Create a new event for the given change.
    pub fn new(change: AppointmentChange) -> Self {
        Self {
            sequence: 0,
            occurred_at: OffsetDateTime::now_utc(),
            change,
        }
    }

    /// Create a "created" event.
    pub fn created(appointment: Appointment) -> Self {
        Self::new(AppointmentChange::Created { appointment })
    }

    /// Create a "rescheduled" event carrying the placement it moved away from.
    pub fn rescheduled(appointment: Appointment, previous: Placement) -> Self {
        Self::new(AppointmentChange::Rescheduled {
            appointment,
            previous,
        })
    }

    /// Create a "cancelled" event.
    pub fn cancelled(appointment: Appointment) -> Self {
        Self::new(AppointmentChange::Cancelled { appointment })
    }

    /// Create a "completed" event.
    pub fn completed(appointment: Appointment) -> Self {
        Self::new(AppointmentChange::Completed { appointment })
    }

    /// Set the commit sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn event_type(&self) -> AppointmentEventType {
        match &self.change {
            AppointmentChange::Created { .. } => AppointmentEventType::Created,
            AppointmentChange::Rescheduled { .. } => AppointmentEventType::Rescheduled,
            AppointmentChange::Cancelled { .. } => AppointmentEventType::Cancelled,
            AppointmentChange::Completed { .. } => AppointmentEventType::Completed,
        }
    }

    /// The appointment as it stands after the change.
    pub fn appointment(&self) -> &Appointment {
        match &self.change {
            AppointmentChange::Created { appointment }
            | AppointmentChange::Rescheduled { appointment, .. }
            | AppointmentChange::Cancelled { appointment }
            | AppointmentChange::Completed { appointment } => appointment,
        }
    }

    pub fn appointment_id(&self) -> AppointmentId {
        self.appointment().id
    }

    /// Placement before a reschedule, `None` for every other change.
    pub fn previous_placement(&self) -> Option<&Placement> {
        match &self.change {
            AppointmentChange::Rescheduled { previous, .. } => Some(previous),
            _ => None,
        }
    }
}
