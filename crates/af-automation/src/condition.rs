//! Condition types
//!
//! Conditions are state-based tests attached to activity detection and
//! to per-activity action bundles. Leaf conditions either name an entity
//! directly or carry a selector (domain + optional device class + area)
//! that is resolved against the registries before evaluation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Condition errors
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("Invalid condition configuration: {0}")]
    InvalidConfig(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),
}

/// Result type for condition operations
pub type ConditionResult<T> = Result<T, ConditionError>;

/// Condition definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    /// Check entity state
    State(StateCondition),

    /// Check numeric value thresholds
    NumericState(NumericStateCondition),

    /// Evaluate a template
    Template(TemplateCondition),

    /// Check current time of day
    Time(TimeCondition),

    /// Check the tracked activity of an area
    Activity(ActivityCondition),

    /// Check a derived environmental flag of an area
    AreaState(AreaStateCondition),

    /// All conditions must be true (AND)
    And(NestedCondition),

    /// Any condition must be true (OR)
    Or(NestedCondition),
}

impl Condition {
    /// Create an AND condition
    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And(NestedCondition { conditions })
    }

    /// Create an OR condition
    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or(NestedCondition { conditions })
    }
}

/// Target of a leaf condition
///
/// Either a concrete entity id, or a selector that is expanded into
/// concrete entities by the [`EntityResolver`](crate::EntityResolver).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// A concrete entity
    Entity { entity_id: String },

    /// A selector resolved against the registries
    Selector {
        domain: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_class: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        area: Option<String>,
    },
}

impl Target {
    /// Create an entity target
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Target::Entity {
            entity_id: entity_id.into(),
        }
    }

    /// Returns the entity id if this target is already concrete
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Target::Entity { entity_id } => Some(entity_id),
            Target::Selector { .. } => None,
        }
    }
}

/// State condition - check entity state equality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCondition {
    #[serde(flatten)]
    pub target: Target,

    /// State to match
    pub state: String,

    /// Duration the state must have been held, in seconds.
    /// Currently accepted but not enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub for_seconds: Option<u64>,
}

/// Numeric state condition - check numeric thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStateCondition {
    #[serde(flatten)]
    pub target: Target,

    /// Value must be strictly above this threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,

    /// Value must be strictly below this threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
}

/// Template condition - evaluate a template to a boolean
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateCondition {
    pub value_template: String,
}

/// Time condition - check current local time against bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeCondition {
    /// Lower bound, "HH:MM" or "HH:MM:SS"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,

    /// Upper bound, "HH:MM" or "HH:MM:SS"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

/// Activity condition - check the tracked activity of an area
///
/// `area` may be an explicit area id or `"current"`; during resolution it
/// is replaced by a concrete `area_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityCondition {
    /// Activity id to match
    pub activity: String,

    /// Area spec before resolution ("current" or an explicit area id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    /// Concrete area id, filled in during resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
}

/// Area state condition - check a derived environmental flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaStateCondition {
    /// Flag to check: "is_dark" or "is_bright"
    #[serde(alias = "attribute")]
    pub state: String,

    /// Area spec before resolution ("current" or an explicit area id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    /// Concrete area id, filled in during resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
}

/// Nested condition list for AND/OR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedCondition {
    pub conditions: Vec<Condition>,
}
