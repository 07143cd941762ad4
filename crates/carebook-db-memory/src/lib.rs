//! In-memory appointment storage backend for Carebook.
//!
//! This crate provides an in-memory implementation of the `AppointmentStore`
//! trait from `carebook-storage`. It is the reference backend for tests and
//! single-process deployments.
//!
//! # Example
//!
//! ```ignore
//! use carebook_db_memory::InMemoryAppointmentStore;
//! use carebook_core::ExclusionWindow;
//!
//! // Reject double bookings at write time as well
//! let store = InMemoryAppointmentStore::new().with_exclusion(ExclusionWindow::default());
//! let id = store.insert_appointment(&booking).await?;
//! ```

pub mod storage;

// Re-export the AppointmentStore trait for convenience
pub use carebook_storage::{AppointmentStore, StorageError};

pub use storage::InMemoryAppointmentStore;

/// Creates a new shareable in-memory store without write-time validation.
pub fn create_store() -> carebook_storage::DynStore {
    std::sync::Arc::new(InMemoryAppointmentStore::new())
}
