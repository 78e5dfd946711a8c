//! Calendar entities

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ha_core::{STATE_OFF, STATE_ON};
use serde_json::json;

use crate::entity::{Attributes, Entity};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl CalendarEvent {
    pub fn is_in_progress(&self, now: DateTime<Utc>) -> bool {
        self.start.with_timezone(&Utc) <= now && now < self.end.with_timezone(&Utc)
    }

    /// Whether the event overlaps `[start, end)`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start.with_timezone(&Utc) < end && self.end.with_timezone(&Utc) > start
    }
}

pub trait CalendarEntity: Entity {
    /// The current or next upcoming event
    fn event(&self) -> Option<CalendarEvent>;

    /// Events overlapping `[start, end)`, ordered by start
    fn get_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<CalendarEvent>;
}

/// State and attributes of a calendar whose current or next event is `event`
///
/// The state is `on` while the event is in progress and `off` otherwise.
pub fn calendar_state(event: Option<&CalendarEvent>, now: DateTime<Utc>) -> (String, Attributes) {
    let Some(event) = event else {
        return (STATE_OFF.to_string(), Attributes::new());
    };

    let mut attributes = Attributes::new();
    attributes.insert("message".into(), json!(event.summary));
    attributes.insert("description".into(), json!(event.description));
    attributes.insert("location".into(), json!(event.location));
    attributes.insert(
        "start_time".into(),
        json!(event.start.format(TIME_FORMAT).to_string()),
    );
    attributes.insert(
        "end_time".into(),
        json!(event.end.format(TIME_FORMAT).to_string()),
    );
    attributes.insert("all_day".into(), json!(false));

    let state = if event.is_in_progress(now) {
        STATE_ON
    } else {
        STATE_OFF
    };
    (state.to_string(), attributes)
}
