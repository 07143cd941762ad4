//! # carebook-scheduler
//!
//! Books clinical appointments against two shared resources, staff time and
//! room time, without ever double-booking either, and tells interested parties
//! about every committed change.
//!
//! ```ignore
//! let config = config::loader::load_config(None)?;
//! observability::init_tracing_with_level(&config.logging.level);
//!
//! let scheduler = bootstrap::build_scheduler(carebook_db_memory::create_store(), &config)?;
//! scheduler.notifier().attach(Arc::new(sinks::TracingSubscriber)).await;
//!
//! let id = scheduler
//!     .coordinator()
//!     .schedule(ScheduleRequest::new(patient, staff, start, room))
//!     .await?;
//! ```

pub mod availability;
pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod observability;
pub mod sinks;

pub use availability::{AvailabilityChecker, SlotQuery};
pub use bootstrap::{Scheduler, build_scheduler};
pub use config::{ConfigError, DeliveryMode, SchedulerConfig};
pub use coordinator::{ScheduleRequest, SchedulingCoordinator};
pub use error::{Resource, Result, SchedulingError};
