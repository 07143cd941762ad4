//! Storage error types for the appointment persistence contract.

use std::fmt;

use carebook_core::AppointmentId;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The appointment to update does not exist.
    #[error("Appointment not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: AppointmentId,
    },

    /// The backend re-validated the exclusion invariant at write time and
    /// rejected the write.
    #[error("Write rejected, resource already booked: {message}")]
    Conflict {
        /// Description of the clashing booking.
        message: String,
    },

    /// The backend could not be reached.
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description of the connection problem.
        message: String,
    },

    /// The backend did not answer within its own deadline.
    #[error("Storage timed out: {message}")]
    Timeout {
        /// Which operation timed out.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(id: AppointmentId) -> Self {
        Self::NotFound { id }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the backend rejected a write on the exclusion invariant.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Unavailable { .. } | Self::Timeout { .. } => ErrorCategory::Infrastructure,
        }
    }
}

/// Categories of storage errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Write rejected by the exclusion invariant.
    Conflict,
    /// Infrastructure/connection error.
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}
