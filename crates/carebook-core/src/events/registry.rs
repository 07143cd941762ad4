//! Component registry for structural participants.
//!
//! Components (a doctor's agenda view, a patient's portal view, a room's live
//! board) are wired in when they are constructed and later looked up or
//! removed by the [`ComponentId`] they were given. Delivery follows the same
//! contract as [`EventNotifier`](super::EventNotifier): registration order,
//! snapshot iteration, isolated invocations, weak references.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::delivery::{DEFAULT_SUBSCRIBER_TIMEOUT, Diagnostics, PublishReport, deliver_isolated};
use super::subscriber::{Component, ComponentKind, Subscriber};
use super::types::AppointmentEvent;

/// Opaque identity handed out by [`ComponentRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "component-{}", self.0)
    }
}

struct Entry {
    name: String,
    kind: ComponentKind,
    component: Weak<dyn Component>,
}

/// Arena of components keyed by identity, iterated in registration order.
pub struct ComponentRegistry {
    components: RwLock<IndexMap<ComponentId, Entry>>,
    next_id: AtomicU64,
    timeout: Duration,
    diagnostics: Diagnostics,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_SUBSCRIBER_TIMEOUT,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub async fn register(&self, component: Arc<dyn Component>) -> ComponentId {
        let id = ComponentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = component.name().to_string();
        let kind = component.kind();
        self.components.write().await.insert(
            id,
            Entry {
                name: name.clone(),
                kind,
                component: Arc::downgrade(&component),
            },
        );
        debug!(component = %name, id = %id, kind = ?kind, "Registered component");
        id
    }

    /// Remove a component. Returns false for unknown ids.
    pub async fn unregister(&self, id: ComponentId) -> bool {
        // shift_remove keeps the remaining components in registration order
        match self.components.write().await.shift_remove(&id) {
            Some(entry) => {
                debug!(component = %entry.name, id = %id, "Unregistered component");
                true
            }
            None => false,
        }
    }

    /// Look a component up by identity, if it is registered and still alive.
    pub async fn get(&self, id: ComponentId) -> Option<Arc<dyn Component>> {
        self.components
            .read()
            .await
            .get(&id)
            .and_then(|entry| entry.component.upgrade())
    }

    /// Ids of registered components of the given kind, in registration order.
    pub async fn ids_of_kind(&self, kind: ComponentKind) -> Vec<ComponentId> {
        self.components
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.kind == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn component_ids(&self) -> Vec<ComponentId> {
        self.components.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.components.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.components.read().await.is_empty()
    }

    /// Deliver an event to every registered component in registration order.
    pub async fn broadcast(&self, event: &AppointmentEvent) -> PublishReport {
        let snapshot: Vec<(ComponentId, Weak<dyn Component>)> = self
            .components
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, entry.component.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut dropped = Vec::new();

        for (id, weak) in snapshot {
            let Some(component) = weak.upgrade() else {
                dropped.push(id);
                report.skipped += 1;
                continue;
            };
            if !component.matches(event) {
                report.skipped += 1;
                continue;
            }
            match deliver_isolated(component.as_ref(), event, self.timeout).await {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    report.failed += 1;
                    self.diagnostics.report(failure);
                }
            }
        }

        if !dropped.is_empty() {
            let mut components = self.components.write().await;
            for id in &dropped {
                components.shift_remove(id);
            }
            debug!(count = dropped.len(), "Pruned dropped components");
        }

        report
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
