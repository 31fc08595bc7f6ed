//! States object for accessing entity states in templates
//!
//! Provides the `states` object that allows templates to access entity states.

use af_core::State;
use af_state_store::StateStore;
use minijinja::value::{Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;

/// Helper to convert Value to f64
pub(crate) fn to_f64(value: &Value) -> Option<f64> {
    f64::try_from(value.clone())
        .ok()
        .or_else(|| value.as_i64().map(|i| i as f64))
}

/// The states object exposed to templates
///
/// Allows access to entity states via:
/// - `states('entity_id')` - Get state value as string
/// - `states.domain.object_id` - Get full state object
#[derive(Clone)]
pub struct StatesObject {
    store: Arc<StateStore>,
}

impl std::fmt::Debug for StatesObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatesObject").finish_non_exhaustive()
    }
}

impl StatesObject {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Get the state value as a string
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.store.get_state(entity_id)
    }

    /// Get the full state object
    pub fn get_full_state(&self, entity_id: &str) -> Option<State> {
        self.store.get(entity_id)
    }

    /// Check if entity is in a specific state
    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.store.is_state(entity_id, state)
    }

    /// Check if entity is in any of the specified states
    pub fn is_state_any(&self, entity_id: &str, states: &[&str]) -> bool {
        if let Some(current) = self.get_state(entity_id) {
            states.iter().any(|s| *s == current)
        } else {
            false
        }
    }

    /// Get an attribute value
    pub fn state_attr(&self, entity_id: &str, attribute: &str) -> Value {
        self.store
            .get(entity_id)
            .and_then(|s| s.attributes.get(attribute).cloned())
            .map(json_to_value)
            .unwrap_or(Value::UNDEFINED)
    }

    /// Check if entity has a meaningful value (not unknown/unavailable)
    pub fn has_value(&self, entity_id: &str) -> bool {
        if let Some(state) = self.store.get(entity_id) {
            !state.is_unavailable() && !state.is_unknown()
        } else {
            false
        }
    }
}

impl Object for StatesObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;

        // Full entity_id (domain.object_id) yields the state object directly
        if key.contains('.') {
            return self.get_full_state(key).map(state_to_value);
        }

        // Otherwise, return a domain proxy
        Some(Value::from_object(DomainProxy {
            domain: key.to_string(),
            store: self.store.clone(),
        }))
    }

    fn call(self: &Arc<Self>, _state: &minijinja::State, args: &[Value]) -> Result<Value, Error> {
        // states('entity_id') -> returns state string
        let entity_id = args.first().and_then(|v| v.as_str()).ok_or_else(|| {
            Error::new(ErrorKind::InvalidOperation, "states() requires entity_id")
        })?;

        Ok(self
            .get_state(entity_id)
            .map(Value::from)
            .unwrap_or(Value::UNDEFINED))
    }
}

/// Proxy for accessing entities by domain
///
/// Allows `states.light.living_room` syntax
#[derive(Clone)]
struct DomainProxy {
    domain: String,
    store: Arc<StateStore>,
}

impl std::fmt::Debug for DomainProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainProxy")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl Object for DomainProxy {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let object_id = key.as_str()?;
        let entity_id = format!("{}.{}", self.domain, object_id);

        self.store.get(&entity_id).map(state_to_value)
    }

    fn call(self: &Arc<Self>, _state: &minijinja::State, _args: &[Value]) -> Result<Value, Error> {
        // Return all entities in this domain as a list
        let entities: Vec<Value> = self
            .store
            .domain_states(&self.domain)
            .into_iter()
            .map(state_to_value)
            .collect();

        Ok(Value::from(entities))
    }
}

/// Convert a State to a template Value
fn state_to_value(state: State) -> Value {
    Value::from_object(StateWrapper(state))
}

/// Wrapper for State to expose to templates
#[derive(Debug, Clone)]
pub struct StateWrapper(pub State);

impl std::fmt::Display for StateWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.state)
    }
}

impl Object for StateWrapper {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        match key {
            "state" => Some(Value::from(self.0.state.as_str())),
            "entity_id" => Some(Value::from(self.0.entity_id.to_string())),
            "domain" => Some(Value::from(self.0.entity_id.domain())),
            "object_id" => Some(Value::from(self.0.entity_id.object_id())),
            "last_changed" => Some(Value::from(self.0.last_changed.to_rfc3339())),
            "last_updated" => Some(Value::from(self.0.last_updated.to_rfc3339())),
            "attributes" => {
                let attrs: HashMap<String, Value> = self
                    .0
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), json_to_value(v.clone())))
                    .collect();
                Some(Value::from_object(attrs))
            }
            _ => self.0.attributes.get(key).map(|v| json_to_value(v.clone())),
        }
    }
}

/// Convert serde_json::Value to minijinja Value
fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::from(()),
        serde_json::Value::Bool(b) => Value::from(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(f) = n.as_f64() {
                Value::from(f)
            } else {
                Value::from(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(arr) => {
            Value::from(arr.into_iter().map(json_to_value).collect::<Vec<_>>())
        }
        serde_json::Value::Object(obj) => {
            let map: std::collections::BTreeMap<String, Value> = obj
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect();
            Value::from_object(map)
        }
    }
}

/// Function wrapper for is_state
pub(crate) fn is_state_fn(states: Arc<StatesObject>, entity_id: &str, state: Value) -> bool {
    // Strings are iterable in minijinja, so check for a string first
    if let Some(s) = state.as_str() {
        states.is_state(entity_id, s)
    } else if let Ok(iter) = state.try_iter() {
        let states_vec: Vec<String> = iter
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();
        let refs: Vec<&str> = states_vec.iter().map(|s| s.as_str()).collect();
        states.is_state_any(entity_id, &refs)
    } else {
        false
    }
}

/// Function wrapper for state_attr
pub(crate) fn state_attr_fn(states: Arc<StatesObject>, entity_id: &str, attribute: &str) -> Value {
    states.state_attr(entity_id, attribute)
}

/// Function wrapper for has_value
pub(crate) fn has_value_fn(states: Arc<StatesObject>, entity_id: &str) -> bool {
    states.has_value(entity_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::EntityId;
    use std::collections::HashMap;

    fn make_test_setup() -> (Arc<StateStore>, StatesObject) {
        let store = Arc::new(StateStore::new());

        store.set(
            EntityId::new("light", "living_room").unwrap(),
            "on",
            HashMap::from([("brightness".to_string(), serde_json::json!(255))]),
        );

        store.set(
            EntityId::new("sensor", "temperature").unwrap(),
            "23.5",
            HashMap::new(),
        );

        store.set(
            EntityId::new("switch", "unavailable_device").unwrap(),
            "unavailable",
            HashMap::new(),
        );

        let states = StatesObject::new(store.clone());
        (store, states)
    }

    #[test]
    fn test_get_state() {
        let (_, states) = make_test_setup();
        assert_eq!(
            states.get_state("light.living_room"),
            Some("on".to_string())
        );
        assert_eq!(states.get_state("nonexistent.entity"), None);
    }

    #[test]
    fn test_is_state_any() {
        let (_, states) = make_test_setup();
        assert!(states.is_state_any("light.living_room", &["on", "off"]));
        assert!(!states.is_state_any("light.living_room", &["off", "unavailable"]));
    }

    #[test]
    fn test_state_attr() {
        let (_, states) = make_test_setup();
        let brightness = states.state_attr("light.living_room", "brightness");
        assert_eq!(brightness.as_i64(), Some(255));
    }

    #[test]
    fn test_has_value() {
        let (_, states) = make_test_setup();
        assert!(states.has_value("light.living_room"));
        assert!(!states.has_value("switch.unavailable_device"));
        assert!(!states.has_value("nonexistent.entity"));
    }

    #[test]
    fn test_to_f64_handles_floats_ints_and_junk() {
        assert_eq!(to_f64(&Value::from(2.5)), Some(2.5));
        assert_eq!(to_f64(&Value::from(3)), Some(3.0));
        assert_eq!(to_f64(&Value::from("abc")), None);
    }

    #[test]
    fn test_state_wrapper_display() {
        let (store, _) = make_test_setup();
        let state = store.get("light.living_room").unwrap();
        let wrapper = StateWrapper(state);
        assert_eq!(format!("{}", wrapper), "on");
    }
}
