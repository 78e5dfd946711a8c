//! Bus events

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Context;

/// Subscribing to this type receives every event
pub const MATCH_ALL: &str = "*";

/// A payload with a fixed event type, e.g. [`crate::StateChangedData`]
pub trait EventPayload: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub data: Value,
    pub time_fired: DateTime<Utc>,
    pub context: Context,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: Value, context: Context) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            time_fired: Utc::now(),
            context,
        }
    }

    pub fn from_payload<P: EventPayload>(
        payload: &P,
        context: Context,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(P::EVENT_TYPE, serde_json::to_value(payload)?, context))
    }

    /// The payload as `P`, `None` for other event types or unreadable data
    pub fn payload<P: EventPayload>(&self) -> Option<P> {
        if self.event_type != P::EVENT_TYPE {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }

    /// Whether a subscription to `event_type` receives this event
    pub fn matches(&self, event_type: &str) -> bool {
        event_type == MATCH_ALL || self.event_type == event_type
    }
}
