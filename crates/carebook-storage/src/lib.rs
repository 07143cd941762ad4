//! # carebook-storage
//!
//! Persistence contract consumed by the Carebook scheduler.
//!
//! The scheduler never owns storage: it inserts and updates appointment
//! records and queries them by staff member or location within a time range
//! through [`AppointmentStore`]. Backends live in separate crates.
//!
//! ## Example
//!
//! ```ignore
//! use carebook_storage::{AppointmentStore, StorageError};
//!
//! async fn agenda(
//!     store: &dyn AppointmentStore,
//!     staff: StaffRef,
//!     day: OffsetDateTime,
//! ) -> Result<Vec<Appointment>, StorageError> {
//!     store
//!         .find_by_staff_in_range(staff, day, day + Duration::days(1))
//!         .await
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::AppointmentStore;
pub use types::NewAppointment;

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shareable store trait object.
pub type DynStore = std::sync::Arc<dyn AppointmentStore>;
