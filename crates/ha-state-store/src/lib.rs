//! Current state of every published entity
//!
//! Each write and removal is announced on the bus as `state_changed`.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ha_core::{Attributes, Context, EntityId, State, StateChangedData};
use ha_event_bus::EventBus;
use tracing::{debug, instrument};

pub struct StateStore {
    states: DashMap<EntityId, State>,
    bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            bus,
        }
    }

    /// Write a state, returning what was stored
    #[instrument(skip_all, fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: Attributes,
        context: Context,
    ) -> State {
        let state = state.into();
        let (old_state, new_state) = match self.states.entry(entity_id.clone()) {
            Entry::Occupied(mut slot) => {
                let new_state = slot.get().next(state, attributes, context.clone());
                (Some(slot.insert(new_state.clone())), new_state)
            }
            Entry::Vacant(slot) => {
                let new_state = State::new(entity_id.clone(), state, attributes, context.clone());
                slot.insert(new_state.clone());
                (None, new_state)
            }
        };
        debug!(state = %new_state.state, "State written");

        self.bus.fire_payload(
            &StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );
        new_state
    }

    /// Drop a state; fires `state_changed` without a new state
    #[instrument(skip_all, fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let (_, old_state) = self.states.remove(entity_id)?;
        debug!("State removed");

        self.bus.fire_payload(
            &StateChangedData {
                entity_id: entity_id.clone(),
                old_state: Some(old_state.clone()),
                new_state: None,
            },
            context,
        );
        Some(old_state)
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        let entity_id: EntityId = entity_id.parse().ok()?;
        self.states.get(&entity_id).map(|state| state.clone())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.get(entity_id).map(|state| state.state)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        entity_id
            .parse::<EntityId>()
            .map(|id| self.states.contains_key(&id))
            .unwrap_or(false)
    }

    /// States of one domain, sorted by entity id
    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        let mut states: Vec<State> = self
            .states
            .iter()
            .filter(|state| state.key().domain() == domain)
            .map(|state| state.value().clone())
            .collect();
        states.sort_by_key(|state| state.entity_id.to_string());
        states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
