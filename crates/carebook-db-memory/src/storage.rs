use async_trait::async_trait;
use carebook_core::{Appointment, AppointmentId, ExclusionWindow, Location, StaffRef};
use carebook_storage::{AppointmentStore, NewAppointment, StorageError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory appointment store.
///
/// This storage implementation provides:
/// - Ids assigned from 1 in insertion order
/// - Every record kept regardless of status, for history
/// - Optional write-time validation of the exclusion invariant (atomic commit)
/// - Failure and latency injection for exercising callers
#[derive(Debug)]
pub struct InMemoryAppointmentStore {
    records: RwLock<BTreeMap<AppointmentId, Appointment>>,
    next_id: AtomicU64,
    /// When set, writes that would double-book a resource are rejected
    exclusion: Option<ExclusionWindow>,
    unavailable: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryAppointmentStore {
    /// Creates an empty store that accepts every write.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            exclusion: None,
            unavailable: AtomicBool::new(false),
            latency: None,
        }
    }

    /// Re-validate the no-overlap invariant under the write lock on every
    /// insert and update.
    pub fn with_exclusion(mut self, exclusion: ExclusionWindow) -> Self {
        self.exclusion = Some(exclusion);
        self
    }

    /// Delay every call by `latency` before touching the records.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While set, every call fails with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All records ordered by id.
    pub async fn snapshot(&self) -> Vec<Appointment> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn enter(&self, operation: &str) -> Result<(), StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(format!(
                "in-memory store switched off during {operation}"
            )));
        }
        Ok(())
    }

    /// Reject `candidate` if it would overlap a scheduled record on the same
    /// staff member or location.
    fn check_exclusion(
        &self,
        records: &BTreeMap<AppointmentId, Appointment>,
        candidate: &Appointment,
    ) -> Result<(), StorageError> {
        let Some(exclusion) = self.exclusion else {
            return Ok(());
        };
        if !candidate.is_scheduled() {
            return Ok(());
        }

        let clash = records.values().find(|existing| {
            existing.id != candidate.id
                && existing.is_scheduled()
                && (existing.staff == candidate.staff || existing.location == candidate.location)
                && exclusion.conflicts(existing.start, candidate.start)
        });

        match clash {
            Some(existing) => Err(StorageError::conflict(format!(
                "{} overlaps {} ({} in {})",
                candidate.start, existing.id, existing.staff, existing.location
            ))),
            None => Ok(()),
        }
    }

    fn in_range(
        records: &BTreeMap<AppointmentId, Appointment>,
        from: OffsetDateTime,
        to: OffsetDateTime,
        predicate: impl Fn(&Appointment) -> bool,
    ) -> Vec<Appointment> {
        let mut found: Vec<Appointment> = records
            .values()
            .filter(|a| a.start >= from && a.start <= to && predicate(a))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.start, a.id));
        found
    }
}

impl Default for InMemoryAppointmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<AppointmentId, StorageError> {
        self.enter("insert_appointment").await?;

        let mut records = self.records.write().await;
        // Validate with a provisional id; nothing is consumed on rejection
        let provisional = appointment
            .clone()
            .into_appointment(AppointmentId(self.next_id.load(Ordering::SeqCst)));
        self.check_exclusion(&records, &provisional)?;

        let id = AppointmentId(self.next_id.fetch_add(1, Ordering::SeqCst));
        records.insert(id, appointment.clone().into_appointment(id));
        debug!(appointment_id = %id, "Inserted appointment");
        Ok(id)
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StorageError> {
        self.enter("update_appointment").await?;

        let mut records = self.records.write().await;
        if !records.contains_key(&appointment.id) {
            return Err(StorageError::not_found(appointment.id));
        }
        self.check_exclusion(&records, appointment)?;

        records.insert(appointment.id, appointment.clone());
        debug!(appointment_id = %appointment.id, status = %appointment.status, "Updated appointment");
        Ok(())
    }

    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        self.enter("find_by_id").await?;
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_staff_in_range(
        &self,
        staff: StaffRef,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<Appointment>, StorageError> {
        self.enter("find_by_staff_in_range").await?;
        let records = self.records.read().await;
        Ok(Self::in_range(&records, from, to, |a| a.staff == staff))
    }

    async fn find_by_location_in_range(
        &self,
        location: &Location,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<Appointment>, StorageError> {
        self.enter("find_by_location_in_range").await?;
        let records = self.records.read().await;
        Ok(Self::in_range(&records, from, to, |a| &a.location == location))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carebook_core::{AppointmentStatus, PatientRef, Placement};
    use std::sync::Arc;
    use time::macros::datetime;

    fn booking(staff: u64, at: OffsetDateTime, room: &str) -> NewAppointment {
        NewAppointment::new(
            PatientRef(1),
            StaffRef(staff),
            Placement::new(at, Location::new(room).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let store = InMemoryAppointmentStore::new();
        let first = store
            .insert_appointment(&booking(10, datetime!(2025-01-01 10:00 UTC), "RoomA"))
            .await
            .unwrap();
        let second = store
            .insert_appointment(&booking(11, datetime!(2025-01-01 10:00 UTC), "RoomB"))
            .await
            .unwrap();
        assert_eq!(first, AppointmentId(1));
        assert_eq!(second, AppointmentId(2));

        let stored = store.find_by_id(first).await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Scheduled);
        assert!(store.find_by_id(AppointmentId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_queries_are_inclusive_and_sorted() {
        let store = InMemoryAppointmentStore::new();
        for at in [
            datetime!(2025-01-01 11:00 UTC),
            datetime!(2025-01-01 09:30 UTC),
            datetime!(2025-01-01 10:30 UTC),
            datetime!(2025-01-01 12:00 UTC),
        ] {
            store
                .insert_appointment(&booking(10, at, "RoomA"))
                .await
                .unwrap();
        }
        store
            .insert_appointment(&booking(20, datetime!(2025-01-01 10:00 UTC), "RoomB"))
            .await
            .unwrap();

        let found = store
            .find_by_staff_in_range(
                StaffRef(10),
                datetime!(2025-01-01 09:30 UTC),
                datetime!(2025-01-01 11:00 UTC),
            )
            .await
            .unwrap();
        let starts: Vec<_> = found.iter().map(|a| a.start).collect();
        assert_eq!(
            starts,
            vec![
                datetime!(2025-01-01 09:30 UTC),
                datetime!(2025-01-01 10:30 UTC),
                datetime!(2025-01-01 11:00 UTC),
            ]
        );

        let room_b = store
            .find_by_location_in_range(
                &Location::new("RoomB").unwrap(),
                datetime!(2025-01-01 00:00 UTC),
                datetime!(2025-01-02 00:00 UTC),
            )
            .await
            .unwrap();
        assert_eq!(room_b.len(), 1);
        assert_eq!(room_b[0].staff, StaffRef(20));
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let store = InMemoryAppointmentStore::new();
        let ghost = booking(10, datetime!(2025-01-01 10:00 UTC), "RoomA")
            .into_appointment(AppointmentId(7));
        let err = store.update_appointment(&ghost).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_exclusion_rejects_overlapping_writes() {
        let store = InMemoryAppointmentStore::new().with_exclusion(ExclusionWindow::default());
        let id = store
            .insert_appointment(&booking(10, datetime!(2025-01-01 10:00 UTC), "RoomA"))
            .await
            .unwrap();

        // same staff, 20 minutes later
        let err = store
            .insert_appointment(&booking(10, datetime!(2025-01-01 10:20 UTC), "RoomB"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // same room, different staff
        let err = store
            .insert_appointment(&booking(11, datetime!(2025-01-01 09:50 UTC), "RoomA"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // rejected inserts do not consume ids
        let next = store
            .insert_appointment(&booking(10, datetime!(2025-01-01 10:30 UTC), "RoomB"))
            .await
            .unwrap();
        assert_eq!(next, AppointmentId(2));

        // an update of the record itself is not a clash with itself
        let mut own = store.find_by_id(id).await.unwrap().unwrap();
        own.start = datetime!(2025-01-01 09:55 UTC);
        store.update_appointment(&own).await.unwrap();

        // cancelled records free the slot
        own.status = AppointmentStatus::Cancelled;
        store.update_appointment(&own).await.unwrap();
        store
            .insert_appointment(&booking(10, datetime!(2025-01-01 10:00 UTC), "RoomA"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let store = InMemoryAppointmentStore::new();
        store.set_unavailable(true);
        let err = store.find_by_id(AppointmentId(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));

        store.set_unavailable(false);
        assert!(store.find_by_id(AppointmentId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_with_exclusion() {
        let store = Arc::new(
            InMemoryAppointmentStore::new()
                .with_exclusion(ExclusionWindow::default())
                .with_latency(Duration::from_millis(5)),
        );

        let attempts = (0..8).map(|i| {
            let store = store.clone();
            async move {
                store
                    .insert_appointment(&booking(
                        10,
                        datetime!(2025-01-01 10:00 UTC) + time::Duration::minutes(i),
                        "RoomA",
                    ))
                    .await
            }
        });
        let results = futures_util::future::join_all(attempts).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.len().await, 1);
    }
}
