//! Entity state storage with domain indexing for Autoflow
//!
//! This crate provides the StateStore, which tracks the current state of
//! all entities known to the engine. It maintains an index by domain for
//! efficient queries and publishes a StateChanged event on every write.

use dashmap::DashMap;
use af_core::{EntityId, State, StateChanged};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Default capacity of the state change channel
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The state store tracks all entity states
///
/// The StateStore is responsible for:
/// - Storing the current state of all entities
/// - Maintaining a domain index for efficient domain-based queries
/// - Publishing StateChanged events when states are written
/// - Providing thread-safe concurrent access to states
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Index of entity_ids by domain
    domain_index: DashMap<String, Vec<String>>,
    /// Broadcast channel for state change notifications
    changes_tx: broadcast::Sender<StateChanged>,
}

impl StateStore {
    /// Create a new state store
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new state store with the given change channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes_tx, _) = broadcast::channel(capacity);
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            changes_tx,
        }
    }

    /// Subscribe to state change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.changes_tx.subscribe()
    }

    /// Set the state of an entity
    ///
    /// If the entity already has a state, the `last_changed` timestamp will
    /// only be updated if the state value actually changed.
    ///
    /// Publishes a StateChanged event with the old and new state.
    #[instrument(skip(self, state, attributes), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: std::collections::HashMap<String, serde_json::Value>,
    ) -> State {
        let entity_id_str = entity_id.to_string();
        let domain = entity_id.domain().to_string();

        let old_state = self.states.get(&entity_id_str).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes),
            None => State::new(entity_id.clone(), state, attributes),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(entity_id_str.clone(), new_state.clone());

        // Update domain index if this is a new entity
        if old_state.is_none() {
            self.domain_index
                .entry(domain)
                .or_default()
                .push(entity_id_str);
        }

        // Send errors only mean there are no active receivers
        let _ = self.changes_tx.send(StateChanged {
            entity_id,
            old_state,
            new_state: Some(new_state.clone()),
        });

        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value as a string, or None if entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Check if an entity is in a specific state
    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Get all entity IDs for a domain
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Get all states for a domain
    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Get all entity IDs
    pub fn all_entity_ids(&self) -> Vec<String> {
        self.states.iter().map(|r| r.key().clone()).collect()
    }

    /// Remove an entity's state
    ///
    /// Publishes a StateChanged event with the old state and None for new_state.
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        let entity_id_str = entity_id.to_string();
        let domain = entity_id.domain();

        let old_state = self.states.remove(&entity_id_str).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");

            if let Some(mut ids) = self.domain_index.get_mut(domain) {
                ids.retain(|id| id != &entity_id_str);
            }

            let _ = self.changes_tx.send(StateChanged {
                entity_id: entity_id.clone(),
                old_state: Some(state.clone()),
                new_state: None,
            });
        }

        old_state
    }

    /// Get the total number of entities
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn eid(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = StateStore::new();
        store.set(eid("binary_sensor.hall_motion"), "on", HashMap::new());

        assert_eq!(
            store.get_state("binary_sensor.hall_motion").as_deref(),
            Some("on")
        );
        assert!(store.is_state("binary_sensor.hall_motion", "on"));
        assert!(!store.is_state("binary_sensor.hall_motion", "off"));
        assert!(store.get_state("binary_sensor.unknown").is_none());
    }

    #[tokio::test]
    async fn test_change_notification() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        store.set(eid("light.kitchen"), "off", HashMap::new());
        store.set(eid("light.kitchen"), "on", HashMap::new());

        let first = rx.recv().await.unwrap();
        assert!(first.old_state.is_none());
        assert_eq!(first.new_state.unwrap().state, "off");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.old_state.unwrap().state, "off");
        assert_eq!(second.new_state.unwrap().state, "on");
        assert!(second.entity_id.to_string() == "light.kitchen");
    }

    #[tokio::test]
    async fn test_domain_index() {
        let store = StateStore::new();
        store.set(eid("light.kitchen"), "on", HashMap::new());
        store.set(eid("light.hallway"), "off", HashMap::new());
        store.set(eid("sensor.kitchen_lux"), "18.0", HashMap::new());

        let mut lights = store.entity_ids("light");
        lights.sort();
        assert_eq!(lights, vec!["light.hallway", "light.kitchen"]);
        assert_eq!(store.domain_states("sensor").len(), 1);
        assert!(store.entity_ids("climate").is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = StateStore::new();
        let id = eid("light.kitchen");
        store.set(id.clone(), "on", HashMap::new());

        let mut rx = store.subscribe();
        let removed = store.remove(&id);
        assert_eq!(removed.unwrap().state, "on");
        assert!(store.get(&id.to_string()).is_none());
        assert!(store.entity_ids("light").is_empty());

        let event = rx.recv().await.unwrap();
        assert!(event.new_state.is_none());
    }

    #[tokio::test]
    async fn test_unchanged_write_still_notifies() {
        let store = StateStore::new();
        store.set(eid("sensor.kitchen_lux"), "18.0", HashMap::new());

        let mut rx = store.subscribe();
        store.set(eid("sensor.kitchen_lux"), "18.0", HashMap::new());

        let event = rx.recv().await.unwrap();
        assert!(!event.value_changed());
    }
}
