//! Appointment lifecycle event system.
//!
//! Committed scheduling changes are turned into [`AppointmentEvent`]s and fanned
//! out to two kinds of listeners:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                     SchedulingCoordinator                          │
//! │                  (assigns commit sequence)                         │
//! └──────────────────────────────┬─────────────────────────────────────┘
//!                                │ EventSink::emit
//!                 ┌──────────────┴──────────────┐
//!                 ▼                             ▼
//!          FanOut (inline)        EventQueue ──► EventDispatcher (task)
//!                 │                             │
//!                 └──────────────┬──────────────┘
//!                    ┌───────────┴───────────┐
//!                    ▼                       ▼
//!             EventNotifier           ComponentRegistry
//!        (subscribers, in order)   (components, by identity)
//! ```
//!
//! # Module Structure
//!
//! - [`types`]: `AppointmentEvent` and its `AppointmentChange` payload
//! - [`subscriber`]: `Subscriber` / `Component` traits and `SubscriberError`
//! - [`delivery`]: isolated invocation, `PublishReport`, failure diagnostics
//! - [`notifier`]: `EventNotifier`, the dynamic subscription hub
//! - [`registry`]: `ComponentRegistry`, the identity-keyed arena
//! - [`dispatch`]: `EventSink` with inline and queued implementations

pub mod delivery;
pub mod dispatch;
pub mod notifier;
pub mod registry;
pub mod subscriber;
pub mod types;

// Re-export main types for convenience
pub use delivery::{
    DEFAULT_SUBSCRIBER_TIMEOUT, Diagnostics, FailureKind, PublishReport, SubscriberFailure,
};
pub use dispatch::{EventDispatcher, EventQueue, EventSink, FanOut};
pub use notifier::{EventNotifier, SubscriptionId};
pub use registry::{ComponentId, ComponentRegistry};
pub use subscriber::{Component, ComponentKind, Subscriber, SubscriberError};
pub use types::{AppointmentChange, AppointmentEvent, AppointmentEventType};
