//! State type representing an entity's current state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EntityId;

/// Represents the state of an entity at a point in time
///
/// State includes the entity's current value (as a string), any associated
/// attributes, and timestamps for when the state was last changed and updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to
    pub entity_id: EntityId,

    /// The state value (e.g., "on", "off", "23.5", "unavailable")
    pub state: String,

    /// Additional attributes associated with the state
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state was last changed (different from previous state)
    pub last_changed: DateTime<Utc>,

    /// When the state was last updated (even if value didn't change)
    pub last_updated: DateTime<Utc>,
}

impl State {
    /// Create a new state with current timestamp
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    /// Create an updated state, preserving last_changed if state value is the same
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let state_changed = self.state != new_state;

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed: if state_changed {
                now
            } else {
                self.last_changed
            },
            last_updated: now,
        }
    }

    /// Check if the state value represents an unavailable entity
    pub fn is_unavailable(&self) -> bool {
        self.state == crate::STATE_UNAVAILABLE
    }

    /// Check if the state value represents an unknown state
    pub fn is_unknown(&self) -> bool {
        self.state == crate::STATE_UNKNOWN
    }

    /// Get an attribute value by key, deserialized into the requested type
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Parse the state value as a float, if possible
    pub fn as_f64(&self) -> Option<f64> {
        self.state.parse().ok()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps are not compared
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_state(value: &str) -> State {
        State::new(
            EntityId::new("sensor", "kitchen_illuminance").unwrap(),
            value,
            HashMap::new(),
        )
    }

    #[test]
    fn test_with_update_preserves_last_changed_on_same_value() {
        let s1 = make_state("12.5");
        let s2 = s1.with_update("12.5", HashMap::new());
        assert_eq!(s2.last_changed, s1.last_changed);
        assert!(s2.last_updated >= s1.last_updated);
    }

    #[test]
    fn test_with_update_bumps_last_changed_on_new_value() {
        let s1 = make_state("12.5");
        let s2 = s1.with_update("40.0", HashMap::new());
        assert!(s2.last_changed >= s1.last_changed);
        assert_eq!(s2.state, "40.0");
    }

    #[test]
    fn test_as_f64() {
        assert_eq!(make_state("21.5").as_f64(), Some(21.5));
        assert_eq!(make_state("on").as_f64(), None);
    }

    #[test]
    fn test_attribute() {
        let mut attrs = HashMap::new();
        attrs.insert("elevation".to_string(), serde_json::json!(-4.2));
        let state = State::new(
            EntityId::new("sun", "sun").unwrap(),
            "below_horizon",
            attrs,
        );
        assert_eq!(state.attribute::<f64>("elevation"), Some(-4.2));
        assert_eq!(state.attribute::<f64>("azimuth"), None);
    }
}
