//! Appointment record and the references it holds.
//!
//! Patients and staff are owned by external record systems; the core only
//! carries their opaque numeric references. Locations are room identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::{CoreError, Result};

macro_rules! numeric_ref {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}/{}", $label, self.0)
            }
        }
    };
}

numeric_ref!(
    /// Identity assigned by the persistence layer when an appointment is created.
    AppointmentId,
    "Appointment"
);
numeric_ref!(
    /// Opaque reference to a patient record.
    PatientRef,
    "Patient"
);
numeric_ref!(
    /// Opaque reference to a staff member (doctor, nurse, therapist).
    StaffRef,
    "Staff"
);

/// Room identifier. Never empty, surrounding whitespace is stripped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location(String);

impl Location {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CoreError::invalid_location("location must not be empty"));
        }
        if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Location {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Location {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.0
    }
}

/// Appointment lifecycle status.
///
/// `Cancelled` and `Completed` are terminal. `Scheduled` may move to either,
/// or to `Scheduled` again when the appointment is rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            AppointmentStatus::Scheduled => false,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => true,
        }
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        match (self, next) {
            (AppointmentStatus::Scheduled, _) => true,
            (AppointmentStatus::Cancelled, _) | (AppointmentStatus::Completed, _) => false,
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(AppointmentStatus::Scheduled),
            "CANCELLED" | "CANCELED" => Ok(AppointmentStatus::Cancelled),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            _ => Err(CoreError::invalid_status(s)),
        }
    }
}

/// Where and when an appointment takes place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub location: Location,
}

impl Placement {
    pub fn new(start: OffsetDateTime, location: Location) -> Self {
        Self { start, location }
    }
}

/// A clinical appointment as held by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient: PatientRef,
    pub staff: StaffRef,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub location: Location,
    pub status: AppointmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Appointment {
    pub fn is_scheduled(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }

    pub fn placement(&self) -> Placement {
        Placement::new(self.start, self.location.clone())
    }

    /// Returns true if the appointment currently sits at `start` in `location`.
    pub fn is_placed_at(&self, start: OffsetDateTime, location: &Location) -> bool {
        self.start == start && &self.location == location
    }

    /// Move to `next`, rejecting transitions out of a terminal status.
    pub fn transition_to(&mut self, next: AppointmentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move the appointment to a new placement. Status stays `Scheduled`.
    pub fn move_to(&mut self, placement: Placement) -> Result<()> {
        self.transition_to(AppointmentStatus::Scheduled)?;
        self.start = placement.start;
        self.location = placement.location;
        Ok(())
    }
}
