//! Resource windows used for double-booking detection.
//!
//! Every scheduled appointment blocks its staff member and its location for
//! the half-open interval `[start - buffer, start + buffer)`. Two appointments
//! sharing a resource conflict when their windows intersect, so starts exactly
//! `2 * buffer` apart are compatible.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Duration, OffsetDateTime};

use crate::error::{CoreError, Result};

/// Default buffer on each side of an appointment start.
pub const DEFAULT_BUFFER_MINUTES: i64 = 15;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "time::serde::rfc3339")]
    start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    end: OffsetDateTime,
}

impl TimeWindow {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self> {
        if end <= start {
            return Err(CoreError::invalid_window(format!(
                "window end {end} must be after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Symmetric exclusion zone placed around every appointment start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusionWindow {
    buffer: Duration,
}

impl ExclusionWindow {
    pub fn new(buffer: Duration) -> Result<Self> {
        if !buffer.is_positive() {
            return Err(CoreError::invalid_window(format!(
                "buffer must be positive, got {buffer}"
            )));
        }
        if buffer.checked_mul(2).is_none() {
            return Err(CoreError::invalid_window(format!(
                "buffer {buffer} is out of range"
            )));
        }
        Ok(Self { buffer })
    }

    pub fn from_minutes(minutes: i64) -> Result<Self> {
        let seconds = minutes.checked_mul(60).ok_or_else(|| {
            CoreError::invalid_window(format!("buffer of {minutes} minutes is out of range"))
        })?;
        Self::new(Duration::seconds(seconds))
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// Window blocked by an appointment starting at `instant`.
    ///
    /// Fails when the window would leave the representable time range.
    pub fn around(&self, instant: OffsetDateTime) -> Result<TimeWindow> {
        match (
            instant.checked_sub(self.buffer),
            instant.checked_add(self.buffer),
        ) {
            (Some(start), Some(end)) => Ok(TimeWindow { start, end }),
            _ => Err(CoreError::invalid_window(format!(
                "no {} window fits around {instant}",
                self.buffer
            ))),
        }
    }

    /// Whether appointments starting at `a` and `b` would block each other.
    ///
    /// Two half-open windows of equal width intersect exactly when their
    /// starts are less than one full width apart.
    pub fn conflicts(&self, a: OffsetDateTime, b: OffsetDateTime) -> bool {
        (a - b).abs() < self.reach()
    }

    /// Closed range of starts that can possibly conflict with `instant`,
    /// clamped to the representable time range.
    ///
    /// Stores are queried with this range and the result is narrowed with
    /// [`ExclusionWindow::conflicts`].
    pub fn search_range(&self, instant: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
        let reach = self.reach();
        (instant.saturating_sub(reach), instant.saturating_add(reach))
    }

    fn reach(&self) -> Duration {
        self.buffer.saturating_mul(2)
    }
}

impl Default for ExclusionWindow {
    fn default() -> Self {
        Self {
            buffer: Duration::minutes(DEFAULT_BUFFER_MINUTES),
        }
    }
}
