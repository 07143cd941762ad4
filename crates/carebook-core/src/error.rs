use thiserror::Error;

use crate::appointment::AppointmentStatus;

/// Core error types for Carebook data types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Invalid appointment status: {0}")]
    InvalidStatus(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),
}

impl CoreError {
    /// Create a new InvalidLocation error
    pub fn invalid_location(message: impl Into<String>) -> Self {
        Self::InvalidLocation(message.into())
    }

    /// Create a new InvalidStatus error
    pub fn invalid_status(value: impl Into<String>) -> Self {
        Self::InvalidStatus(value.into())
    }

    /// Create a new InvalidWindow error
    pub fn invalid_window(message: impl Into<String>) -> Self {
        Self::InvalidWindow(message.into())
    }

    /// Check if this error was caused by bad caller input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLocation(_)
                | Self::InvalidStatus(_)
                | Self::InvalidTransition { .. }
                | Self::InvalidWindow(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_location("   ");
        assert_eq!(err.to_string(), "Invalid location:    ");

        let err = CoreError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Scheduled,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition: CANCELLED -> SCHEDULED"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(CoreError::invalid_status("PENDING").is_client_error());
        assert!(CoreError::invalid_window("empty").is_client_error());
    }
}
