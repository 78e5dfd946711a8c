//! The host event bus
//!
//! Every event goes through a single broadcast channel. A [`Subscription`]
//! only yields the events of the type it was opened for, so a listener for
//! `pronote_event` never sees the `state_changed` traffic.

use ha_core::{Context, Event, EventPayload, MATCH_ALL};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

const CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    /// `capacity` events may be pending per subscription before it lags
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    /// Events of `event_type` fired from now on; [`MATCH_ALL`] for every event
    pub fn subscribe(&self, event_type: impl Into<String>) -> Subscription {
        let event_type = event_type.into();
        trace!(%event_type, "New subscription");
        Subscription {
            event_type,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(MATCH_ALL)
    }

    pub fn fire(&self, event: Event) {
        trace!(event_type = %event.event_type, "Firing");
        // Fails only without subscribers
        let _ = self.sender.send(event);
    }

    pub fn fire_payload<P: EventPayload>(&self, payload: &P, context: Context) {
        match Event::from_payload(payload, context) {
            Ok(event) => self.fire(event),
            Err(err) => warn!(event_type = P::EVENT_TYPE, "Cannot serialize event: {}", err),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    event_type: String,
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Next matching event
    ///
    /// `Lagged` counts every missed event, matching or not.
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if event.matches(&self.event_type) {
                return Ok(event);
            }
        }
    }

    /// Next matching event already fired, without waiting
    pub fn try_recv(&mut self) -> Result<Event, TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if event.matches(&self.event_type) {
                return Ok(event);
            }
        }
    }

    /// Next matching event whose data reads as `P`
    pub async fn recv_payload<P: EventPayload>(&mut self) -> Result<P, RecvError> {
        loop {
            if let Some(payload) = self.recv().await?.payload() {
                return Ok(payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Attributes, EntityId, State, StateChangedData};
    use serde_json::json;

    fn pronote_event(kind: &str) -> Event {
        Event::new("pronote_event", json!({"type": kind}), Context::new())
    }

    #[tokio::test]
    async fn test_subscription_filters_by_type() {
        let bus = EventBus::new();
        let mut pronote = bus.subscribe("pronote_event");
        let mut states = bus.subscribe("state_changed");

        bus.fire(Event::new("state_changed", json!({}), Context::new()));
        bus.fire(pronote_event("new_grade"));

        assert_eq!(pronote.recv().await.unwrap().data["type"], "new_grade");
        assert!(matches!(pronote.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(states.try_recv().unwrap().event_type, "state_changed");
        assert!(states.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_all() {
        let bus = EventBus::new();
        let mut all = bus.subscribe_all();

        bus.fire(pronote_event("new_grade"));
        bus.fire(Event::new("state_changed", json!({}), Context::new()));

        assert_eq!(all.recv().await.unwrap().event_type, "pronote_event");
        assert_eq!(all.recv().await.unwrap().event_type, "state_changed");
    }

    #[tokio::test]
    async fn test_only_events_fired_after_subscribing() {
        let bus = EventBus::new();
        bus.fire(pronote_event("new_absence"));

        let mut late = bus.subscribe("pronote_event");
        assert_eq!(bus.subscriber_count(), 1);
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lagging_subscription() {
        let bus = EventBus::with_capacity(2);
        let mut slow = bus.subscribe("pronote_event");
        for _ in 0..3 {
            bus.fire(pronote_event("new_delay"));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(1))));
        assert!(slow.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_payload_round_trip() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(StateChangedData::EVENT_TYPE);

        let entity_id = EntityId::new("sensor", "pronote_lea").unwrap();
        let new_state = State::new(entity_id.clone(), "Lea", Attributes::new(), Context::new());
        bus.fire_payload(
            &StateChangedData {
                entity_id,
                old_state: None,
                new_state: Some(new_state),
            },
            Context::new(),
        );

        let changed: StateChangedData = rx.recv_payload().await.unwrap();
        assert_eq!(changed.entity_id.to_string(), "sensor.pronote_lea");
        assert_eq!(changed.new_state.unwrap().state, "Lea");
    }
}
