//! Availability checks against the shared staff and location resources.
//!
//! The checker is read-only. It asks the store for every appointment whose
//! start could possibly collide with a candidate start and narrows the result
//! with [`ExclusionWindow::conflicts`]. Store failures are propagated, never
//! read as "free".

use carebook_core::{Appointment, AppointmentId, ExclusionWindow, Location, Placement, StaffRef};
use carebook_storage::{DynStore, StorageResult};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::error::{Resource, Result, SchedulingError};

/// Step used by [`SlotQuery`] when none (or a non-positive one) is given.
pub const DEFAULT_SLOT_STEP_MINUTES: i64 = 15;

/// Default number of suggestions returned by [`AvailabilityChecker::suggest_slots`].
pub const DEFAULT_SLOT_LIMIT: usize = 5;

/// Finer steps are rounded up to this.
pub const MIN_SLOT_STEP_MINUTES: i64 = 1;

/// Search for free starts where a staff member and a location are both free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub staff: StaffRef,
    pub location: Location,
    /// First candidate start.
    pub from: OffsetDateTime,
    /// Last candidate start (inclusive).
    pub until: OffsetDateTime,
    pub step: Duration,
    pub limit: usize,
}

impl SlotQuery {
    pub fn new(
        staff: StaffRef,
        location: Location,
        from: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Self {
        Self {
            staff,
            location,
            from,
            until,
            step: Duration::minutes(DEFAULT_SLOT_STEP_MINUTES),
            limit: DEFAULT_SLOT_LIMIT,
        }
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn effective_step(&self) -> Duration {
        if !self.step.is_positive() {
            return Duration::minutes(DEFAULT_SLOT_STEP_MINUTES);
        }
        self.step.max(Duration::minutes(MIN_SLOT_STEP_MINUTES))
    }
}

/// Answers "is this staff member / location free at this instant?".
#[derive(Clone)]
pub struct AvailabilityChecker {
    store: DynStore,
    exclusion: ExclusionWindow,
}

impl AvailabilityChecker {
    pub fn new(store: DynStore) -> Self {
        Self {
            store,
            exclusion: ExclusionWindow::default(),
        }
    }

    pub fn with_exclusion(mut self, exclusion: ExclusionWindow) -> Self {
        self.exclusion = exclusion;
        self
    }

    pub fn exclusion(&self) -> ExclusionWindow {
        self.exclusion
    }

    pub async fn is_staff_free(&self, staff: StaffRef, instant: OffsetDateTime) -> StorageResult<bool> {
        Ok(self.staff_conflict(staff, instant, None).await?.is_none())
    }

    pub async fn is_location_free(
        &self,
        location: &Location,
        instant: OffsetDateTime,
    ) -> StorageResult<bool> {
        Ok(self.location_conflict(location, instant, None).await?.is_none())
    }

    /// First scheduled appointment of `staff` that blocks `instant`, skipping `ignore`.
    pub async fn staff_conflict(
        &self,
        staff: StaffRef,
        instant: OffsetDateTime,
        ignore: Option<AppointmentId>,
    ) -> StorageResult<Option<Appointment>> {
        let (from, to) = self.exclusion.search_range(instant);
        let candidates = self.store.find_by_staff_in_range(staff, from, to).await?;
        Ok(self.first_conflict(candidates, instant, ignore))
    }

    /// First scheduled appointment in `location` that blocks `instant`, skipping `ignore`.
    pub async fn location_conflict(
        &self,
        location: &Location,
        instant: OffsetDateTime,
        ignore: Option<AppointmentId>,
    ) -> StorageResult<Option<Appointment>> {
        let (from, to) = self.exclusion.search_range(instant);
        let candidates = self
            .store
            .find_by_location_in_range(location, from, to)
            .await?;
        Ok(self.first_conflict(candidates, instant, ignore))
    }

    /// Fail with `ResourceConflict` if either resource is busy. Staff is
    /// checked first, so a double conflict names the staff member.
    pub async fn ensure_available(
        &self,
        staff: StaffRef,
        placement: &Placement,
        ignore: Option<AppointmentId>,
    ) -> Result<()> {
        let window = self.exclusion.around(placement.start)?;

        if let Some(existing) = self.staff_conflict(staff, placement.start, ignore).await? {
            debug!(%staff, conflicting = %existing.id, "Staff member is busy");
            return Err(SchedulingError::ResourceConflict {
                resource: Resource::Staff(staff),
                window,
                conflicting: existing.id,
            });
        }

        if let Some(existing) = self
            .location_conflict(&placement.location, placement.start, ignore)
            .await?
        {
            debug!(location = %placement.location, conflicting = %existing.id, "Location is busy");
            return Err(SchedulingError::ResourceConflict {
                resource: Resource::Location(placement.location.clone()),
                window,
                conflicting: existing.id,
            });
        }

        Ok(())
    }

    /// Candidate starts in `[query.from, query.until]` where both resources are
    /// free, earliest first, at most `query.limit` of them.
    ///
    /// The store is queried once per resource for the whole horizon.
    pub async fn suggest_slots(&self, query: &SlotQuery) -> StorageResult<Vec<OffsetDateTime>> {
        if query.limit == 0 || query.until < query.from {
            return Ok(Vec::new());
        }

        let (from, _) = self.exclusion.search_range(query.from);
        let (_, to) = self.exclusion.search_range(query.until);
        let staff_busy = self
            .store
            .find_by_staff_in_range(query.staff, from, to)
            .await?;
        let location_busy = self
            .store
            .find_by_location_in_range(&query.location, from, to)
            .await?;

        let step = query.effective_step();
        let mut slots = Vec::new();
        let mut candidate = query.from;

        while candidate <= query.until && slots.len() < query.limit {
            let blocked = staff_busy
                .iter()
                .chain(location_busy.iter())
                .any(|existing| self.blocks(existing, candidate, None));
            // starts at the very edge of the time range cannot be booked
            if !blocked && self.exclusion.around(candidate).is_ok() {
                slots.push(candidate);
            }
            match candidate.checked_add(step) {
                Some(next) => candidate = next,
                None => break,
            }
        }

        Ok(slots)
    }

    fn blocks(
        &self,
        existing: &Appointment,
        instant: OffsetDateTime,
        ignore: Option<AppointmentId>,
    ) -> bool {
        existing.is_scheduled()
            && Some(existing.id) != ignore
            && self.exclusion.conflicts(existing.start, instant)
    }

    fn first_conflict(
        &self,
        candidates: Vec<Appointment>,
        instant: OffsetDateTime,
        ignore: Option<AppointmentId>,
    ) -> Option<Appointment> {
        candidates
            .into_iter()
            .find(|existing| self.blocks(existing, instant, ignore))
    }
}

impl std::fmt::Debug for AvailabilityChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityChecker")
            .field("backend", &self.store.backend_name())
            .field("exclusion", &self.exclusion)
            .finish()
    }
}
