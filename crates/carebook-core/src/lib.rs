//! # carebook-core
//!
//! Shared appointment types and the lifecycle event system for Carebook.
//!
//! - [`appointment`]: `Appointment`, its status state machine and the opaque
//!   patient/staff/location references it points at
//! - [`window`]: resource windows used for double-booking detection
//! - [`events`]: lifecycle events, subscribers, the notifier hub, the component
//!   registry and the delivery sinks the scheduler pushes into

pub mod appointment;
pub mod error;
pub mod events;
pub mod window;

pub use appointment::{
    Appointment, AppointmentId, AppointmentStatus, Location, PatientRef, Placement, StaffRef,
};
pub use error::{CoreError, Result};
pub use window::{DEFAULT_BUFFER_MINUTES, ExclusionWindow, TimeWindow};
