//! Built-in event subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use carebook_core::events::{
    AppointmentEvent, Component, ComponentKind, Subscriber, SubscriberError,
};
use carebook_core::{Appointment, AppointmentId, Location, Placement};
use tokio::sync::{RwLock, mpsc};
use tracing::info;

/// Audit trail: writes every lifecycle event to the log.
#[derive(Debug, Default)]
pub struct TracingSubscriber;

#[async_trait]
impl Subscriber for TracingSubscriber {
    fn name(&self) -> &str {
        "audit-log"
    }

    async fn handle(&self, event: &AppointmentEvent) -> Result<(), SubscriberError> {
        let appointment = event.appointment();
        match event.previous_placement() {
            Some(previous) => info!(
                target: "carebook::audit",
                sequence = event.sequence,
                event_type = %event.event_type(),
                appointment_id = %appointment.id,
                staff = %appointment.staff,
                location = %appointment.location,
                start = %appointment.start,
                previous_start = %previous.start,
                previous_location = %previous.location,
                "Appointment event"
            ),
            None => info!(
                target: "carebook::audit",
                sequence = event.sequence,
                event_type = %event.event_type(),
                appointment_id = %appointment.id,
                staff = %appointment.staff,
                location = %appointment.location,
                start = %appointment.start,
                "Appointment event"
            ),
        }
        Ok(())
    }
}

/// Forwards events into a channel, for dashboards and live views.
#[derive(Debug)]
pub struct ChannelSubscriber {
    name: String,
    sender: mpsc::UnboundedSender<AppointmentEvent>,
}

impl ChannelSubscriber {
    pub fn new(name: impl Into<String>) -> (Arc<Self>, mpsc::UnboundedReceiver<AppointmentEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriber = Arc::new(Self {
            name: name.into(),
            sender,
        });
        (subscriber, receiver)
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &AppointmentEvent) -> Result<(), SubscriberError> {
        self.sender
            .send(event.clone())
            .map_err(|_| SubscriberError::channel(format!("{} receiver dropped", self.name)))
    }
}

/// Live board of one room: the scheduled appointments currently placed there.
#[derive(Debug)]
pub struct RoomView {
    name: String,
    room: Location,
    board: RwLock<Vec<Appointment>>,
}

impl RoomView {
    pub fn new(room: Location) -> Arc<Self> {
        Arc::new(Self {
            name: format!("room-view:{room}"),
            room,
            board: RwLock::new(Vec::new()),
        })
    }

    pub fn room(&self) -> &Location {
        &self.room
    }

    /// Scheduled appointments in the room, by start.
    pub async fn board(&self) -> Vec<Appointment> {
        self.board.read().await.clone()
    }

    async fn place(&self, appointment: &Appointment) {
        let mut board = self.board.write().await;
        board.retain(|a| a.id != appointment.id);
        if appointment.is_scheduled() && appointment.location == self.room {
            board.push(appointment.clone());
            board.sort_by_key(|a| (a.start, a.id));
        }
    }

    async fn remove(&self, id: AppointmentId) {
        self.board.write().await.retain(|a| a.id != id);
    }
}

#[async_trait]
impl Subscriber for RoomView {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, event: &AppointmentEvent) -> bool {
        event.appointment().location == self.room
            || event
                .previous_placement()
                .is_some_and(|previous| previous.location == self.room)
    }

    async fn on_created(&self, appointment: &Appointment) -> Result<(), SubscriberError> {
        self.place(appointment).await;
        Ok(())
    }

    async fn on_rescheduled(
        &self,
        appointment: &Appointment,
        _previous: &Placement,
    ) -> Result<(), SubscriberError> {
        // place() also drops it when it moved to another room
        self.place(appointment).await;
        Ok(())
    }

    async fn on_cancelled(&self, appointment: &Appointment) -> Result<(), SubscriberError> {
        self.remove(appointment.id).await;
        Ok(())
    }

    async fn on_completed(&self, appointment: &Appointment) -> Result<(), SubscriberError> {
        self.remove(appointment.id).await;
        Ok(())
    }
}

impl Component for RoomView {
    fn kind(&self) -> ComponentKind {
        ComponentKind::RoomView
    }
}
