//! The scheduling coordinator.
//!
//! Every mutating operation runs under one commit lock: load, check, write and
//! emit happen as a unit, so two callers can never both pass the availability
//! check for overlapping windows. The lock also carries the event sequence
//! number, which makes the emission order identical to the commit order.
//!
//! Backends that re-validate at write time (several coordinators sharing one
//! store) reject a losing write with `StorageError::Conflict`; the coordinator
//! then re-runs the check, which reports the winner as a `ResourceConflict`.

use std::future::Future;
use std::sync::Arc;

use carebook_core::events::{AppointmentEvent, EventSink};
use carebook_core::{
    Appointment, AppointmentId, AppointmentStatus, ExclusionWindow, Location, PatientRef,
    Placement, StaffRef,
};
use carebook_storage::{DynStore, NewAppointment, StorageError, StorageResult};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::availability::{AvailabilityChecker, SlotQuery};
use crate::error::{Result, SchedulingError};

pub const DEFAULT_MAX_COMMIT_RETRIES: u32 = 3;

/// Intent to book a patient with a staff member at a given place and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub patient: PatientRef,
    pub staff: StaffRef,
    pub start: OffsetDateTime,
    pub location: Location,
}

impl ScheduleRequest {
    pub fn new(
        patient: PatientRef,
        staff: StaffRef,
        start: OffsetDateTime,
        location: Location,
    ) -> Self {
        Self {
            patient,
            staff,
            start,
            location,
        }
    }

    pub fn placement(&self) -> Placement {
        Placement::new(self.start, self.location.clone())
    }
}

/// Mediator owning the schedule / cancel / reschedule / complete protocol.
pub struct SchedulingCoordinator {
    store: DynStore,
    checker: AvailabilityChecker,
    sink: Arc<dyn EventSink>,
    /// Single-writer point. Holds the sequence of the last emitted event.
    commit: Mutex<u64>,
    max_commit_retries: u32,
}

impl SchedulingCoordinator {
    pub fn new(store: DynStore, sink: Arc<dyn EventSink>) -> Self {
        Self {
            checker: AvailabilityChecker::new(store.clone()),
            store,
            sink,
            commit: Mutex::new(0),
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
        }
    }

    pub fn with_exclusion(mut self, exclusion: ExclusionWindow) -> Self {
        self.checker = self.checker.with_exclusion(exclusion);
        self
    }

    pub fn with_max_commit_retries(mut self, retries: u32) -> Self {
        self.max_commit_retries = retries;
        self
    }

    pub fn checker(&self) -> &AvailabilityChecker {
        &self.checker
    }

    pub fn exclusion(&self) -> ExclusionWindow {
        self.checker.exclusion()
    }

    /// Sequence number of the most recently emitted event, 0 before the first.
    pub async fn last_sequence(&self) -> u64 {
        *self.commit.lock().await
    }

    /// Book a new appointment and emit `Created`.
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<AppointmentId> {
        let placement = request.placement();
        let booking = NewAppointment::new(request.patient, request.staff, placement.clone());

        let mut sequence = self.commit.lock().await;
        self.ensure_accepting("schedule")?;
        let id = self
            .commit_checked("schedule", request.staff, &placement, None, || {
                self.store.insert_appointment(&booking)
            })
            .await?;

        let appointment = booking.into_appointment(id);
        info!(
            appointment_id = %id,
            patient = %appointment.patient,
            staff = %appointment.staff,
            location = %appointment.location,
            start = %appointment.start,
            "Appointment scheduled"
        );
        self.emit(&mut sequence, AppointmentEvent::created(appointment))
            .await;
        Ok(id)
    }

    /// Cancel a scheduled appointment and emit `Cancelled`.
    pub async fn cancel(&self, id: AppointmentId) -> Result<Appointment> {
        self.close(id, AppointmentStatus::Cancelled, AppointmentEvent::cancelled)
            .await
    }

    /// Mark a scheduled appointment as held and emit `Completed`.
    pub async fn complete(&self, id: AppointmentId) -> Result<Appointment> {
        self.close(id, AppointmentStatus::Completed, AppointmentEvent::completed)
            .await
    }

    /// Move a scheduled appointment and emit `Rescheduled` with its previous
    /// placement. Moving to the current placement skips the availability check.
    pub async fn reschedule(
        &self,
        id: AppointmentId,
        start: OffsetDateTime,
        location: Location,
    ) -> Result<Appointment> {
        let target = Placement::new(start, location);

        let mut sequence = self.commit.lock().await;
        self.ensure_accepting("reschedule")?;
        let current = self.load(id).await?;
        if !current.is_scheduled() {
            return Err(SchedulingError::already_terminal(id, current.status));
        }

        let previous = current.placement();
        let in_place = current.is_placed_at(target.start, &target.location);
        let mut updated = current.clone();
        updated
            .move_to(target.clone())
            .map_err(|_| SchedulingError::already_terminal(id, current.status))?;
        updated.updated_at = OffsetDateTime::now_utc();

        if in_place {
            debug!(appointment_id = %id, "Reschedule to current placement, skipping availability check");
            self.store
                .update_appointment(&updated)
                .await
                .map_err(|e| self.write_failed("reschedule", id, e))?;
        } else {
            self.commit_checked("reschedule", updated.staff, &target, Some(id), || {
                self.store.update_appointment(&updated)
            })
            .await
            .map_err(|e| match e {
                SchedulingError::Persistence(inner) if inner.is_not_found() => {
                    SchedulingError::not_found(id)
                }
                other => other,
            })?;
        }

        info!(
            appointment_id = %id,
            staff = %updated.staff,
            from_start = %previous.start,
            from_location = %previous.location,
            start = %updated.start,
            location = %updated.location,
            "Appointment rescheduled"
        );
        self.emit(
            &mut sequence,
            AppointmentEvent::rescheduled(updated.clone(), previous),
        )
        .await;
        Ok(updated)
    }

    /// Look an appointment up in the store.
    pub async fn appointment(&self, id: AppointmentId) -> Result<Appointment> {
        self.load(id).await
    }

    /// Scheduled appointments of `staff` starting in `[from, to]`, by start.
    pub async fn staff_agenda(
        &self,
        staff: StaffRef,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<Appointment>> {
        let found = self.store.find_by_staff_in_range(staff, from, to).await?;
        Ok(found.into_iter().filter(Appointment::is_scheduled).collect())
    }

    /// Scheduled appointments in `location` starting in `[from, to]`, by start.
    pub async fn location_agenda(
        &self,
        location: &Location,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<Appointment>> {
        let found = self
            .store
            .find_by_location_in_range(location, from, to)
            .await?;
        Ok(found.into_iter().filter(Appointment::is_scheduled).collect())
    }

    /// Free starts to offer after a `ResourceConflict`.
    pub async fn suggest_slots(&self, query: &SlotQuery) -> Result<Vec<OffsetDateTime>> {
        Ok(self.checker.suggest_slots(query).await?)
    }

    async fn close(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
        event: fn(Appointment) -> AppointmentEvent,
    ) -> Result<Appointment> {
        let mut sequence = self.commit.lock().await;
        self.ensure_accepting(status.as_str())?;
        let mut appointment = self.load(id).await?;
        let from = appointment.status;
        if !appointment.is_scheduled() {
            return Err(SchedulingError::already_terminal(id, from));
        }

        appointment
            .transition_to(status)
            .map_err(|_| SchedulingError::already_terminal(id, from))?;
        appointment.updated_at = OffsetDateTime::now_utc();

        self.store
            .update_appointment(&appointment)
            .await
            .map_err(|e| self.write_failed(status.as_str(), id, e))?;

        info!(
            appointment_id = %id,
            staff = %appointment.staff,
            location = %appointment.location,
            status = %status,
            "Appointment closed"
        );
        self.emit(&mut sequence, event(appointment.clone())).await;
        Ok(appointment)
    }

    /// A write whose event could not be delivered must not happen.
    fn ensure_accepting(&self, operation: &str) -> Result<()> {
        if self.sink.is_running() {
            return Ok(());
        }
        warn!(operation, "Event delivery has stopped, rejecting operation");
        Err(SchedulingError::ShutDown)
    }

    async fn load(&self, id: AppointmentId) -> Result<Appointment> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| SchedulingError::not_found(id))
    }

    /// Check availability then write, re-checking when the store rejects the
    /// write on its own exclusion validation.
    async fn commit_checked<T, F, Fut>(
        &self,
        operation: &'static str,
        staff: StaffRef,
        placement: &Placement,
        ignore: Option<AppointmentId>,
        write: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut retries = 0;
        loop {
            self.checker
                .ensure_available(staff, placement, ignore)
                .await?;

            match write().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_conflict() && retries < self.max_commit_retries => {
                    retries += 1;
                    warn!(
                        operation,
                        %staff,
                        location = %placement.location,
                        retry = retries,
                        error = %e,
                        "Store rejected write, re-checking availability"
                    );
                }
                Err(e) => {
                    warn!(
                        operation,
                        %staff,
                        location = %placement.location,
                        category = %e.category(),
                        error = %e,
                        "Write failed"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    /// The record disappeared between load and write.
    fn write_failed(&self, operation: &str, id: AppointmentId, error: StorageError) -> SchedulingError {
        if error.is_not_found() {
            return SchedulingError::not_found(id);
        }
        warn!(
            operation,
            appointment_id = %id,
            backend = self.store.backend_name(),
            category = %error.category(),
            error = %error,
            "Write failed"
        );
        SchedulingError::Persistence(error)
    }

    async fn emit(&self, sequence: &mut u64, event: AppointmentEvent) {
        *sequence += 1;
        debug!(
            sequence = *sequence,
            event_type = %event.event_type(),
            appointment_id = %event.appointment_id(),
            "Emitting event"
        );
        self.sink.emit(event.with_sequence(*sequence)).await;
    }
}

impl std::fmt::Debug for SchedulingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingCoordinator")
            .field("checker", &self.checker)
            .field("max_commit_retries", &self.max_commit_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carebook_core::events::AppointmentEventType;
    use carebook_db_memory::InMemoryAppointmentStore;
    use carebook_storage::AppointmentStore;
    use std::sync::Mutex as StdMutex;
    use time::macros::datetime;

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<AppointmentEvent>>,
    }

    impl Recorder {
        fn kinds(&self) -> Vec<(u64, AppointmentEventType)> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| (e.sequence, e.event_type()))
                .collect()
        }
    }

    #[async_trait]
    impl EventSink for Recorder {
        async fn emit(&self, event: AppointmentEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// Sink whose delivery side has gone away.
    struct Stopped;

    #[async_trait]
    impl EventSink for Stopped {
        async fn emit(&self, _event: AppointmentEvent) {}

        fn is_running(&self) -> bool {
            false
        }
    }

    fn room(name: &str) -> Location {
        Location::new(name).unwrap()
    }

    fn setup() -> (Arc<InMemoryAppointmentStore>, Arc<Recorder>, SchedulingCoordinator) {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let recorder = Arc::new(Recorder::default());
        let coordinator = SchedulingCoordinator::new(store.clone(), recorder.clone());
        (store, recorder, coordinator)
    }

    fn request(patient: u64, staff: u64, start: OffsetDateTime, location: &str) -> ScheduleRequest {
        ScheduleRequest::new(PatientRef(patient), StaffRef(staff), start, room(location))
    }

    #[tokio::test]
    async fn test_sequences_follow_commits() {
        let (_store, recorder, coordinator) = setup();

        let id = coordinator
            .schedule(request(1, 10, datetime!(2025-01-01 10:00 UTC), "RoomA"))
            .await
            .unwrap();
        coordinator
            .reschedule(id, datetime!(2025-01-01 11:00 UTC), room("RoomA"))
            .await
            .unwrap();
        coordinator.complete(id).await.unwrap();

        assert_eq!(
            recorder.kinds(),
            vec![
                (1, AppointmentEventType::Created),
                (2, AppointmentEventType::Rescheduled),
                (3, AppointmentEventType::Completed),
            ]
        );
        assert_eq!(coordinator.last_sequence().await, 3);
    }

    #[tokio::test]
    async fn test_failed_operations_emit_nothing() {
        let (_store, recorder, coordinator) = setup();
        let id = coordinator
            .schedule(request(1, 10, datetime!(2025-01-01 10:00 UTC), "RoomA"))
            .await
            .unwrap();

        let err = coordinator
            .schedule(request(2, 10, datetime!(2025-01-01 10:20 UTC), "RoomB"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        coordinator.complete(id).await.unwrap();
        let err = coordinator
            .reschedule(id, datetime!(2025-01-01 12:00 UTC), room("RoomA"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::AlreadyTerminal {
                status: AppointmentStatus::Completed,
                ..
            }
        ));

        assert_eq!(recorder.kinds().len(), 2);
    }

    #[tokio::test]
    async fn test_completed_slot_is_free_again() {
        let (_store, _recorder, coordinator) = setup();
        let id = coordinator
            .schedule(request(1, 10, datetime!(2025-01-01 10:00 UTC), "RoomA"))
            .await
            .unwrap();
        coordinator.complete(id).await.unwrap();

        coordinator
            .schedule(request(2, 10, datetime!(2025-01-01 10:05 UTC), "RoomA"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_no_trace() {
        let (store, recorder, coordinator) = setup();
        let id = coordinator
            .schedule(request(1, 10, datetime!(2025-01-01 10:00 UTC), "RoomA"))
            .await
            .unwrap();

        store.set_unavailable(true);
        let err = coordinator.cancel(id).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Persistence(StorageError::Unavailable { .. })));
        assert!(err.is_retryable());

        store.set_unavailable(false);
        let stored = coordinator.appointment(id).await.unwrap();
        assert_eq!(stored.status, AppointmentStatus::Scheduled);
        assert_eq!(recorder.kinds().len(), 1);
    }

    #[tokio::test]
    async fn test_agendas_only_list_scheduled() {
        let (_store, _recorder, coordinator) = setup();
        let first = coordinator
            .schedule(request(1, 10, datetime!(2025-01-01 09:00 UTC), "RoomA"))
            .await
            .unwrap();
        coordinator
            .schedule(request(2, 10, datetime!(2025-01-01 10:00 UTC), "RoomB"))
            .await
            .unwrap();
        coordinator.cancel(first).await.unwrap();

        let day = (datetime!(2025-01-01 00:00 UTC), datetime!(2025-01-02 00:00 UTC));
        let agenda = coordinator.staff_agenda(StaffRef(10), day.0, day.1).await.unwrap();
        assert_eq!(agenda.len(), 1);
        assert_eq!(agenda[0].location, room("RoomB"));

        assert!(coordinator
            .location_agenda(&room("RoomA"), day.0, day.1)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_stopped_sink_rejects_every_operation() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let id = store
            .insert_appointment(&NewAppointment::new(
                PatientRef(1),
                StaffRef(10),
                Placement::new(datetime!(2025-01-01 10:00 UTC), room("RoomA")),
            ))
            .await
            .unwrap();
        let coordinator = SchedulingCoordinator::new(store.clone(), Arc::new(Stopped));

        let err = coordinator
            .schedule(request(2, 11, datetime!(2025-01-01 12:00 UTC), "RoomB"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::ShutDown));
        assert!(matches!(
            coordinator.cancel(id).await.unwrap_err(),
            SchedulingError::ShutDown
        ));
        assert!(matches!(
            coordinator
                .reschedule(id, datetime!(2025-01-01 14:00 UTC), room("RoomA"))
                .await
                .unwrap_err(),
            SchedulingError::ShutDown
        ));

        // nothing was written
        let stored = coordinator.appointment(id).await.unwrap();
        assert_eq!(stored.status, AppointmentStatus::Scheduled);
        assert_eq!(stored.start, datetime!(2025-01-01 10:00 UTC));
        assert!(coordinator
            .staff_agenda(StaffRef(11), datetime!(2025-01-01 00:00 UTC), datetime!(2025-01-02 00:00 UTC))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(coordinator.last_sequence().await, 0);
    }

    #[tokio::test]
    async fn test_unplaceable_start_is_rejected() {
        let (_store, recorder, coordinator) = setup();
        let err = coordinator
            .schedule(request(1, 10, datetime!(9999-12-31 23:50 UTC), "RoomA"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidRequest(_)));
        assert!(err.is_client_error());
        assert!(recorder.kinds().is_empty());
    }

    /// Store that rejects the first N inserts with a write-time conflict,
    /// as a second coordinator sharing the backend would cause.
    struct Contended {
        inner: InMemoryAppointmentStore,
        rejections: StdMutex<u32>,
    }

    #[async_trait]
    impl AppointmentStore for Contended {
        async fn insert_appointment(
            &self,
            appointment: &NewAppointment,
        ) -> std::result::Result<AppointmentId, StorageError> {
            {
                let mut left = self.rejections.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(StorageError::conflict("lost the race"));
                }
            }
            self.inner.insert_appointment(appointment).await
        }

        async fn update_appointment(
            &self,
            appointment: &Appointment,
        ) -> std::result::Result<(), StorageError> {
            self.inner.update_appointment(appointment).await
        }

        async fn find_by_id(
            &self,
            id: AppointmentId,
        ) -> std::result::Result<Option<Appointment>, StorageError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_staff_in_range(
            &self,
            staff: StaffRef,
            from: OffsetDateTime,
            to: OffsetDateTime,
        ) -> std::result::Result<Vec<Appointment>, StorageError> {
            self.inner.find_by_staff_in_range(staff, from, to).await
        }

        async fn find_by_location_in_range(
            &self,
            location: &Location,
            from: OffsetDateTime,
            to: OffsetDateTime,
        ) -> std::result::Result<Vec<Appointment>, StorageError> {
            self.inner.find_by_location_in_range(location, from, to).await
        }

        fn backend_name(&self) -> &'static str {
            "contended"
        }
    }

    #[tokio::test]
    async fn test_write_conflicts_are_retried() {
        let store = Arc::new(Contended {
            inner: InMemoryAppointmentStore::new(),
            rejections: StdMutex::new(2),
        });
        let coordinator = SchedulingCoordinator::new(store.clone(), Arc::new(Recorder::default()))
            .with_max_commit_retries(2);

        coordinator
            .schedule(request(1, 10, datetime!(2025-01-01 10:00 UTC), "RoomA"))
            .await
            .unwrap();

        *store.rejections.lock().unwrap() = 5;
        let err = coordinator
            .schedule(request(2, 11, datetime!(2025-01-01 12:00 UTC), "RoomB"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Persistence(StorageError::Conflict { .. })));
    }
}
