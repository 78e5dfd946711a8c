//! Value types shared by the host and its integrations
//!
//! Entity ids, the states published under them, the events on the bus and
//! the context linking both to their cause.

mod context;
mod entity_id;
mod event;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventPayload, MATCH_ALL};
pub use state::{
    Attributes, State, StateChangedData, MAX_STATE_LENGTH, STATE_OFF, STATE_ON,
    STATE_UNAVAILABLE, STATE_UNKNOWN,
};
