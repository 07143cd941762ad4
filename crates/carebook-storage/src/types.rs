//! Data types exchanged with storage backends.

use carebook_core::{
    Appointment, AppointmentId, AppointmentStatus, Location, PatientRef, Placement, StaffRef,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An appointment that has not been assigned an identity yet.
///
/// Backends assign the [`AppointmentId`] on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient: PatientRef,
    pub staff: StaffRef,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub location: Location,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl NewAppointment {
    /// Creates a new booking stamped with the current time.
    #[must_use]
    pub fn new(patient: PatientRef, staff: StaffRef, placement: Placement) -> Self {
        Self {
            patient,
            staff,
            start: placement.start,
            location: placement.location,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Materializes the stored record once the backend has picked an id.
    #[must_use]
    pub fn into_appointment(self, id: AppointmentId) -> Appointment {
        Appointment {
            id,
            patient: self.patient,
            staff: self.staff,
            start: self.start,
            location: self.location,
            status: AppointmentStatus::Scheduled,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_into_appointment_is_scheduled() {
        let placement = Placement::new(
            datetime!(2025-01-01 10:00 UTC),
            Location::new("RoomA").unwrap(),
        );
        let new = NewAppointment::new(PatientRef(1), StaffRef(10), placement.clone());
        let created_at = new.created_at;

        let appointment = new.into_appointment(AppointmentId(42));
        assert_eq!(appointment.id, AppointmentId(42));
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert_eq!(appointment.placement(), placement);
        assert_eq!(appointment.updated_at, created_at);
    }
}
