//! Data model for activities, apps, and area assignments
//!
//! These types mirror the documents exchanged with the remote catalog and
//! persisted in the local storage cache.

use crate::condition::Condition;
use af_registries::Storable;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Combination logic for a list of conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// Definition of a detectable activity
///
/// Activities form a small per-area state machine: detection conditions
/// promote an area into an activity, `timeout_seconds` and `transition_to`
/// move it along the decay chain once conditions stop matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityDef {
    pub activity_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Conditions that detect this activity (combined with AND)
    #[serde(default)]
    pub detection_conditions: Vec<Condition>,

    /// Conditions must hold this long before the activity is reported
    #[serde(default)]
    pub duration_threshold_seconds: u64,

    /// Seconds after conditions stop matching before transitioning away
    #[serde(default)]
    pub timeout_seconds: u64,

    /// Activity to transition to when the timeout expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_to: Option<String>,

    /// Transition states are only entered via timeout, never detected directly
    #[serde(default)]
    pub is_transition_state: bool,

    /// System activities ship with the built-in fallback
    #[serde(default)]
    pub is_system: bool,
}

impl ActivityDef {
    /// A bare activity with no conditions, used as the baseline fallback
    pub fn empty(activity_id: impl Into<String>) -> Self {
        Self {
            activity_id: activity_id.into(),
            activity_name: None,
            description: None,
            detection_conditions: Vec::new(),
            duration_threshold_seconds: 0,
            timeout_seconds: 0,
            transition_to: None,
            is_transition_state: false,
            is_system: false,
        }
    }
}

/// Per-activity bundle of conditions and actions inside an app
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionBundle {
    /// Conditions gating the actions (empty means always run)
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Actions to execute when the conditions match
    #[serde(default)]
    pub actions: Vec<Action>,

    /// How the conditions combine
    #[serde(default)]
    pub logic: Logic,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An automation app: activity ids mapped to action bundles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub app_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Domains the app acts on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_domains: Vec<String>,

    /// Sensor device classes the app benefits from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommended_sensors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Activity id -> action bundle, in catalog order
    #[serde(default)]
    pub activity_actions: IndexMap<String, ActionBundle>,
}

/// A single service call action
///
/// Actions either name a concrete `entity_id` or carry a generic
/// `domain`/`area` pair that is resolved to entities at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Service in "domain.service" form, e.g. "light.turn_on"
    pub service: String,

    /// Target domain for generic actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Target area ("current" or an explicit area id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    /// Explicit target entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Extra target data merged into the call payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_json::Map<String, serde_json::Value>>,

    /// Service call payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,

    /// Only act on entities currently in this state; skip the action
    /// entirely when none match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_entities_by_state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Assignment of an app to an area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaAssignment {
    pub area_id: String,
    pub app_id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// True when created locally as a fallback rather than assigned remotely
    #[serde(default)]
    pub is_default: bool,
}

fn default_true() -> bool {
    true
}

/// The full persisted document: activities, apps, and assignments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppsData {
    /// Activity definitions in evaluation priority order
    #[serde(default)]
    pub activities: Vec<ActivityDef>,

    /// Apps by app id
    #[serde(default)]
    pub apps: IndexMap<String, App>,

    /// Assignments by area id
    #[serde(default)]
    pub assignments: IndexMap<String, AreaAssignment>,

    /// Last successful remote sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,

    /// True when the data came from the built-in fallback
    #[serde(default)]
    pub is_fallback: bool,
}

impl AppsData {
    /// True when there are no activities, apps, or assignments
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty() && self.apps.is_empty() && self.assignments.is_empty()
    }

    /// Look up an activity definition by id
    pub fn activity(&self, activity_id: &str) -> Option<&ActivityDef> {
        self.activities.iter().find(|a| a.activity_id == activity_id)
    }
}

impl Storable for AppsData {
    const KEY: &'static str = "autoflow.apps";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apps_data_is_empty() {
        let mut data = AppsData::default();
        assert!(data.is_empty());

        data.activities.push(ActivityDef::empty("empty"));
        assert!(!data.is_empty());
    }

    #[test]
    fn test_action_deserialize_generic() {
        let json = r#"{
            "service": "light.turn_on",
            "domain": "light",
            "area": "current",
            "data": {"brightness_pct": 100}
        }"#;
        let action: Action = serde_json::from_str(json).unwrap();

        assert_eq!(action.service, "light.turn_on");
        assert_eq!(action.domain.as_deref(), Some("light"));
        assert_eq!(action.area.as_deref(), Some("current"));
        assert!(action.entity_id.is_none());
        assert_eq!(
            action.data.unwrap().get("brightness_pct"),
            Some(&serde_json::json!(100))
        );
    }

    #[test]
    fn test_activity_def_defaults() {
        let json = r#"{"activity_id": "movement"}"#;
        let def: ActivityDef = serde_json::from_str(json).unwrap();

        assert_eq!(def.activity_id, "movement");
        assert_eq!(def.duration_threshold_seconds, 0);
        assert_eq!(def.timeout_seconds, 0);
        assert!(!def.is_transition_state);
        assert!(def.detection_conditions.is_empty());
    }

    #[test]
    fn test_logic_snake_case() {
        assert_eq!(serde_json::to_string(&Logic::And).unwrap(), "\"and\"");
        let logic: Logic = serde_json::from_str("\"or\"").unwrap();
        assert_eq!(logic, Logic::Or);
    }
}
