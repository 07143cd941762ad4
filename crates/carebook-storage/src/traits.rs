//! Storage trait for the appointment persistence collaborator.

use async_trait::async_trait;
use carebook_core::{Appointment, AppointmentId, Location, StaffRef};
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::types::NewAppointment;

/// The persistence contract the scheduler consumes.
///
/// Implementations must be thread-safe (`Send + Sync`) and are expected to
/// complete or fail every call within their own bounded deadline; the
/// scheduler surfaces failures to its caller rather than retrying them.
///
/// Backends may additionally re-validate the no-double-booking invariant at
/// write time and reject with [`StorageError::Conflict`]. The scheduler then
/// re-runs its availability check before deciding what to report.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Persists a new appointment and returns the identity assigned to it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the backend enforces the exclusion
    /// invariant and the booking would break it.
    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<AppointmentId, StorageError>;

    /// Replaces the stored record with the same id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record has that id.
    /// Returns `StorageError::Conflict` as for inserts.
    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StorageError>;

    /// Reads an appointment by id.
    ///
    /// Returns `None` if the appointment does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing records.
    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError>;

    /// Appointments of any status for `staff` starting within `[from, to]`,
    /// ordered by start.
    async fn find_by_staff_in_range(
        &self,
        staff: StaffRef,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<Appointment>, StorageError>;

    /// Appointments of any status at `location` starting within `[from, to]`,
    /// ordered by start.
    async fn find_by_location_in_range(
        &self,
        location: &Location,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<Appointment>, StorageError>;

    /// Returns the name of the storage backend.
    fn backend_name(&self) -> &'static str;
}
