use carebook_core::{AppointmentId, AppointmentStatus, CoreError, Location, StaffRef, TimeWindow};
use carebook_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// A shared resource an appointment occupies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Staff(StaffRef),
    Location(Location),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Staff(staff) => write!(f, "{staff}"),
            Resource::Location(location) => write!(f, "Location/{location}"),
        }
    }
}

/// Errors returned by scheduling operations.
///
/// Every failed operation leaves stored state untouched and emits no event.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// The staff member or location is already booked inside the candidate window.
    #[error("Resource conflict: {resource} is busy during {window} (held by {conflicting})")]
    ResourceConflict {
        resource: Resource,
        window: TimeWindow,
        conflicting: AppointmentId,
    },

    #[error("Appointment not found: {id}")]
    NotFound { id: AppointmentId },

    #[error("Appointment {id} is already {status}")]
    AlreadyTerminal {
        id: AppointmentId,
        status: AppointmentStatus,
    },

    /// The requested start cannot carry an appointment window.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] CoreError),

    /// Events can no longer be delivered, so nothing more is committed.
    #[error("Scheduler is shut down")]
    ShutDown,

    /// The persistence collaborator failed or rejected the write.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StorageError),
}

impl SchedulingError {
    pub fn not_found(id: AppointmentId) -> Self {
        Self::NotFound { id }
    }

    pub fn already_terminal(id: AppointmentId, status: AppointmentStatus) -> Self {
        Self::AlreadyTerminal { id, status }
    }

    /// The busy resource, for conflicts.
    pub fn busy_resource(&self) -> Option<&Resource> {
        match self {
            Self::ResourceConflict { resource, .. } => Some(resource),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ResourceConflict { .. })
    }

    /// Errors caused by the request itself rather than the infrastructure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ResourceConflict { .. }
                | Self::NotFound { .. }
                | Self::AlreadyTerminal { .. }
                | Self::InvalidRequest(_)
        )
    }

    /// Worth retrying later with the same arguments.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence(e) => !e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulingError>;
