//! Entity platform
//!
//! Registers the entities of each config entry, assigns their entity ids
//! and keeps their states in the state store current.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::{Context, EntityId, STATE_UNAVAILABLE, STATE_UNKNOWN};
use ha_state_store::StateStore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::calendar::{CalendarEntity, CalendarEvent};
use crate::entity::{Attributes, DeviceInfo, Entity};
use crate::update_coordinator::DataUpdateCoordinator;

struct RegisteredEntity {
    entry_id: String,
    entity: Arc<dyn Entity>,
}

pub struct EntityPlatform {
    states: Arc<StateStore>,
    entities: DashMap<EntityId, RegisteredEntity>,
    calendars: DashMap<EntityId, Arc<dyn CalendarEntity>>,
    /// Coordinator listeners per entry
    followers: DashMap<String, Vec<JoinHandle<()>>>,
}

impl EntityPlatform {
    pub fn new(states: Arc<StateStore>) -> Self {
        Self {
            states,
            entities: DashMap::new(),
            calendars: DashMap::new(),
            followers: DashMap::new(),
        }
    }

    /// Register entities for a config entry and write their first state
    ///
    /// Entity ids are `<domain>.<slug of name>`, suffixed `_2`, `_3`... when
    /// taken. An entity whose unique id is already registered is skipped.
    pub fn add_entities(&self, entry_id: &str, entities: Vec<Arc<dyn Entity>>) -> Vec<EntityId> {
        let mut added = Vec::with_capacity(entities.len());

        for entity in entities {
            if let Some(entity_id) = self.register(entry_id, entity) {
                self.write_state(&entity_id);
                added.push(entity_id);
            }
        }

        debug!("Added {} entities for entry {}", added.len(), entry_id);
        added
    }

    /// Register a calendar entity
    pub fn add_calendar<C>(&self, entry_id: &str, calendar: Arc<C>) -> Option<EntityId>
    where
        C: CalendarEntity + 'static,
    {
        let entity: Arc<dyn Entity> = calendar.clone();
        let entity_id = self.register(entry_id, entity)?;
        self.calendars.insert(entity_id.clone(), calendar);
        self.write_state(&entity_id);
        Some(entity_id)
    }

    fn register(&self, entry_id: &str, entity: Arc<dyn Entity>) -> Option<EntityId> {
        if let Some(unique_id) = entity.unique_id() {
            let taken = self.entities.iter().any(|r| {
                r.value().entity.domain() == entity.domain()
                    && r.value().entity.unique_id().as_deref() == Some(unique_id.as_str())
            });
            if taken {
                warn!(
                    "Platform already has a {} entity with unique id {}, skipping",
                    entity.domain(),
                    unique_id
                );
                return None;
            }
        }

        let base_name = entity.object_id().unwrap_or_else(|| entity.name());
        let base = match EntityId::from_name(entity.domain(), &base_name) {
            Ok(id) => id,
            Err(err) => {
                warn!("Cannot build entity id for '{}': {}", base_name, err);
                return None;
            }
        };

        let entity_id = self.free_entity_id(base);
        self.entities.insert(
            entity_id.clone(),
            RegisteredEntity {
                entry_id: entry_id.to_string(),
                entity,
            },
        );
        Some(entity_id)
    }

    fn free_entity_id(&self, base: EntityId) -> EntityId {
        let is_free =
            |id: &EntityId| !self.entities.contains_key(id) && !self.states.contains(&id.to_string());

        if is_free(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = base.with_suffix(n);
            if is_free(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Write one entity's current state to the state store
    pub fn write_state(&self, entity_id: &EntityId) {
        let Some(entity) = self.entities.get(entity_id).map(|r| r.entity.clone()) else {
            return;
        };

        let (state, attributes) = if entity.available() {
            (
                entity.state().unwrap_or_else(|| STATE_UNKNOWN.to_string()),
                entity.attributes(),
            )
        } else {
            (STATE_UNAVAILABLE.to_string(), Attributes::new())
        };

        self.states
            .set(entity_id.clone(), state, attributes, Context::new());
    }

    /// Rewrite every state of an entry
    pub fn update_entry_states(&self, entry_id: &str) {
        for entity_id in self.entity_ids(entry_id) {
            self.write_state(&entity_id);
        }
    }

    /// Rewrite the entry's states after every refresh of `coordinator`
    pub fn follow<T>(self: &Arc<Self>, entry_id: &str, coordinator: &DataUpdateCoordinator<T>)
    where
        T: Send + Sync + 'static,
    {
        let mut refreshed = coordinator.subscribe();
        let platform = Arc::clone(self);
        let entry = entry_id.to_string();

        let handle = tokio::spawn(async move {
            while refreshed.changed().await.is_ok() {
                platform.update_entry_states(&entry);
            }
        });

        self.followers
            .entry(entry_id.to_string())
            .or_default()
            .push(handle);
    }

    /// Drop an entry's entities and their states
    pub fn remove_entry(&self, entry_id: &str) -> usize {
        if let Some((_, handles)) = self.followers.remove(entry_id) {
            for handle in handles {
                handle.abort();
            }
        }

        let entity_ids = self.entity_ids(entry_id);
        for entity_id in &entity_ids {
            self.entities.remove(entity_id);
            self.calendars.remove(entity_id);
            self.states.remove(entity_id, Context::new());
        }

        debug!("Removed {} entities of entry {}", entity_ids.len(), entry_id);
        entity_ids.len()
    }

    /// Entity ids of an entry, sorted
    pub fn entity_ids(&self, entry_id: &str) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|r| r.value().entry_id == entry_id)
            .map(|r| r.key().clone())
            .collect();
        ids.sort_by_key(|id| id.to_string());
        ids
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<Arc<dyn Entity>> {
        self.entities.get(entity_id).map(|r| r.entity.clone())
    }

    /// Entity id of the entity registered under `unique_id`
    pub fn entity_id_for(&self, domain: &str, unique_id: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|r| {
                r.key().domain() == domain
                    && r.value().entity.unique_id().as_deref() == Some(unique_id)
            })
            .map(|r| r.key().clone())
    }

    pub fn calendar_events(
        &self,
        entity_id: &EntityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Vec<CalendarEvent>> {
        self.calendars
            .get(entity_id)
            .map(|calendar| calendar.get_events(start, end))
    }

    /// Distinct devices of an entry's entities
    pub fn devices(&self, entry_id: &str) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = Vec::new();
        for entity_id in self.entity_ids(entry_id) {
            let Some(device) = self.get(&entity_id).and_then(|e| e.device_info()) else {
                continue;
            };
            if !devices.iter().any(|d| d.identifiers == device.identifiers) {
                devices.push(device);
            }
        }
        devices
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
