//! Built-in fallback catalog
//!
//! Used when both the remote catalog and the local cache are empty, so a
//! fresh install still gets working automatic lighting.

use crate::condition::{AreaStateCondition, Condition, StateCondition, Target};
use crate::model::{Action, ActionBundle, ActivityDef, App, Logic};
use indexmap::IndexMap;
use serde_json::json;

/// App id of the fallback lighting app
pub const AUTOLIGHT_APP_ID: &str = "autolight";

fn motion_detected() -> Condition {
    Condition::State(StateCondition {
        target: Target::Selector {
            domain: "binary_sensor".to_string(),
            device_class: Some("motion".to_string()),
            area: None,
        },
        state: "on".to_string(),
        for_seconds: None,
    })
}

fn area_is_dark() -> Condition {
    Condition::AreaState(AreaStateCondition {
        state: "is_dark".to_string(),
        area: Some("current".to_string()),
        area_id: None,
    })
}

/// Default activity definitions, in evaluation priority order
pub fn default_activities() -> Vec<ActivityDef> {
    vec![
        ActivityDef {
            activity_name: Some("No Activity".to_string()),
            description: Some("No presence detected in area".to_string()),
            is_system: true,
            ..ActivityDef::empty("empty")
        },
        ActivityDef {
            activity_name: Some("Movement Detected".to_string()),
            description: Some("Short-term presence in area (motion detected)".to_string()),
            detection_conditions: vec![motion_detected()],
            transition_to: Some("inactive".to_string()),
            is_system: true,
            ..ActivityDef::empty("movement")
        },
        ActivityDef {
            activity_name: Some("Inactive".to_string()),
            description: Some(
                "Transition state after movement stops, before area becomes empty".to_string(),
            ),
            timeout_seconds: 60,
            transition_to: Some("empty".to_string()),
            is_transition_state: true,
            is_system: true,
            ..ActivityDef::empty("inactive")
        },
        ActivityDef {
            activity_name: Some("Occupied".to_string()),
            description: Some("Long-term presence in area (person staying)".to_string()),
            detection_conditions: vec![motion_detected()],
            duration_threshold_seconds: 60,
            transition_to: Some("inactive".to_string()),
            is_system: true,
            ..ActivityDef::empty("occupied")
        },
    ]
}

/// The fallback automatic lighting app
///
/// Movement in a dark area turns lights on at full brightness, inactivity
/// dims the lights that are still on, and an empty area turns them off.
pub fn default_autolight_app() -> App {
    let mut activity_actions = IndexMap::new();

    activity_actions.insert(
        "movement".to_string(),
        ActionBundle {
            conditions: vec![area_is_dark()],
            actions: vec![Action {
                service: "light.turn_on".to_string(),
                domain: Some("light".to_string()),
                area: Some("current".to_string()),
                entity_id: None,
                target: None,
                data: json!({"brightness_pct": 100}).as_object().cloned(),
                filter_entities_by_state: None,
                description: Some("Turn on lights at full brightness".to_string()),
            }],
            logic: Logic::And,
            description: Some(
                "Turn on lights at full brightness when movement detected and area is dark"
                    .to_string(),
            ),
        },
    );

    activity_actions.insert(
        "inactive".to_string(),
        ActionBundle {
            conditions: vec![area_is_dark()],
            actions: vec![Action {
                service: "light.turn_on".to_string(),
                domain: Some("light".to_string()),
                area: Some("current".to_string()),
                entity_id: None,
                target: None,
                data: json!({"brightness_step_pct": -10}).as_object().cloned(),
                filter_entities_by_state: Some("on".to_string()),
                description: Some("Dim lights by 10% (only lights that are on)".to_string()),
            }],
            logic: Logic::And,
            description: Some("Dim lights by 10% when area becomes inactive".to_string()),
        },
    );

    activity_actions.insert(
        "empty".to_string(),
        ActionBundle {
            conditions: vec![],
            actions: vec![Action {
                service: "light.turn_off".to_string(),
                domain: Some("light".to_string()),
                area: Some("current".to_string()),
                entity_id: None,
                target: None,
                data: None,
                filter_entities_by_state: None,
                description: Some("Turn off lights".to_string()),
            }],
            logic: Logic::And,
            description: Some("Turn off lights when area is empty".to_string()),
        },
    );

    App {
        app_id: AUTOLIGHT_APP_ID.to_string(),
        app_name: Some("Automatic Lighting".to_string()),
        description: Some(
            "Turn lights on when movement detected in dark conditions, turn off when empty"
                .to_string(),
        ),
        required_domains: vec!["light".to_string()],
        recommended_sensors: vec!["motion".to_string(), "illuminance".to_string()],
        created_by: Some("system".to_string()),
        activity_actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_activities_order_and_chain() {
        let activities = default_activities();
        let ids: Vec<&str> = activities.iter().map(|a| a.activity_id.as_str()).collect();
        assert_eq!(ids, vec!["empty", "movement", "inactive", "occupied"]);

        let inactive = &activities[2];
        assert!(inactive.is_transition_state);
        assert_eq!(inactive.timeout_seconds, 60);
        assert_eq!(inactive.transition_to.as_deref(), Some("empty"));

        let occupied = &activities[3];
        assert_eq!(occupied.duration_threshold_seconds, 60);
    }

    #[test]
    fn test_autolight_app_bundles() {
        let app = default_autolight_app();
        assert_eq!(app.app_id, AUTOLIGHT_APP_ID);

        let bundles: Vec<&str> = app.activity_actions.keys().map(String::as_str).collect();
        assert_eq!(bundles, vec!["movement", "inactive", "empty"]);

        let movement = &app.activity_actions["movement"];
        assert_eq!(movement.conditions.len(), 1);
        assert_eq!(movement.actions[0].service, "light.turn_on");

        let inactive = &app.activity_actions["inactive"];
        assert_eq!(
            inactive.actions[0].filter_entities_by_state.as_deref(),
            Some("on")
        );

        let empty = &app.activity_actions["empty"];
        assert!(empty.conditions.is_empty());
        assert_eq!(empty.actions[0].service, "light.turn_off");
    }

    #[test]
    fn test_defaults_serialize_roundtrip() {
        let app = default_autolight_app();
        let json = serde_json::to_string(&app).unwrap();
        let back: App = serde_json::from_str(&json).unwrap();
        assert_eq!(back.activity_actions.len(), 3);
    }
}
