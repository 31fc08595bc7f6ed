//! Condition evaluation
//!
//! Evaluates resolved condition trees against the state store, the
//! template engine, the environmental provider, and the activity tracker.
//! A leaf that errors counts as false rather than aborting the whole tree.

use crate::activity::ActivityTracker;
use crate::condition::{Condition, Target};
use crate::environment::EnvironmentProvider;
use crate::model::Logic;
use crate::resolver::{EntityResolver, ResolveStrategy};
use af_state_store::StateStore;
use af_template::TemplateEngine;
use chrono::NaiveTime;
use regex::Regex;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, warn};

/// Rendered template outputs that count as true
const TRUTHY_RESULTS: &[&str] = &["True", "true", "yes", "on", "1"];

fn states_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"states\(['"]([a-z_]+\.[a-z0-9_]+)['"]\)"#).unwrap_or_else(|_| unreachable!())
    })
}

fn states_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"states\.([a-z_]+)\.([a-z0-9_]+)").unwrap_or_else(|_| unreachable!())
    })
}

/// Evaluates condition trees for an area
pub struct ConditionEvaluator {
    store: Arc<StateStore>,
    templates: Arc<TemplateEngine>,
    resolver: Arc<EntityResolver>,
    environment: Arc<EnvironmentProvider>,
    /// Set after construction; weak to break the tracker/evaluator cycle
    tracker: OnceLock<Weak<ActivityTracker>>,
}

impl ConditionEvaluator {
    pub fn new(
        store: Arc<StateStore>,
        templates: Arc<TemplateEngine>,
        resolver: Arc<EntityResolver>,
        environment: Arc<EnvironmentProvider>,
    ) -> Self {
        Self {
            store,
            templates,
            resolver,
            environment,
            tracker: OnceLock::new(),
        }
    }

    /// Wire in the activity tracker; must be called once during setup
    pub fn set_activity_tracker(&self, tracker: &Arc<ActivityTracker>) {
        let _ = self.tracker.set(Arc::downgrade(tracker));
    }

    /// Resolve and evaluate a condition list for an area
    ///
    /// An empty list is vacuously true. With AND logic a failing or
    /// erroring leaf short-circuits to false; with OR logic the first
    /// passing leaf short-circuits to true.
    pub fn evaluate_conditions(
        &self,
        conditions: &[Condition],
        area_id: &str,
        logic: Logic,
    ) -> bool {
        if conditions.is_empty() {
            return true;
        }

        let resolved = self.resolver.resolve_conditions(conditions, area_id);
        if resolved.is_empty() {
            // Conditions that reference entities the area does not have
            // must fail, not pass vacuously
            return false;
        }

        match logic {
            Logic::And => resolved.iter().all(|c| self.evaluate(c, area_id)),
            Logic::Or => resolved.iter().any(|c| self.evaluate(c, area_id)),
        }
    }

    /// Evaluate a single resolved condition
    pub fn evaluate(&self, condition: &Condition, area_id: &str) -> bool {
        match condition {
            Condition::State(c) => {
                let Some(entity_id) = c.target.entity_id() else {
                    warn!(area_id, "State condition still has an unresolved selector");
                    return false;
                };

                if c.for_seconds.is_some() {
                    // TODO: track state age in the store so for_seconds can be enforced
                    warn!(entity_id, "for_seconds is not enforced yet, ignoring");
                }

                match self.store.get_state(entity_id) {
                    Some(state) => state == c.state,
                    None => {
                        debug!(entity_id, "Entity not found, condition is false");
                        false
                    }
                }
            }
            Condition::NumericState(c) => {
                let Some(entity_id) = c.target.entity_id() else {
                    return false;
                };

                let Some(value) = self.store.get(entity_id).and_then(|s| s.as_f64()) else {
                    debug!(entity_id, "No numeric value, condition is false");
                    return false;
                };

                if let Some(above) = c.above {
                    if value <= above {
                        return false;
                    }
                }
                if let Some(below) = c.below {
                    if value >= below {
                        return false;
                    }
                }
                true
            }
            Condition::Template(c) => match self.templates.render(&c.value_template) {
                Ok(rendered) => TRUTHY_RESULTS.contains(&rendered.trim()),
                Err(e) => {
                    warn!(error = %e, "Template condition failed to render");
                    false
                }
            },
            Condition::Time(c) => {
                let now = chrono::Local::now().time();

                if let Some(after) = c.after.as_deref().and_then(parse_time) {
                    if now < after {
                        return false;
                    }
                }
                if let Some(before) = c.before.as_deref().and_then(parse_time) {
                    if now > before {
                        return false;
                    }
                }
                true
            }
            Condition::Activity(c) => {
                let target_area = c.area_id.as_deref().unwrap_or(area_id);

                let Some(tracker) = self.tracker.get().and_then(Weak::upgrade) else {
                    warn!("No activity tracker wired in, activity condition is false");
                    return false;
                };

                tracker.get_activity(target_area) == c.activity
            }
            Condition::AreaState(c) => {
                let target_area = c.area_id.as_deref().unwrap_or(area_id);

                match c.state.as_str() {
                    "is_dark" => self.environment.is_dark(target_area),
                    "is_bright" => !self.environment.is_dark(target_area),
                    other => {
                        warn!(state = other, "Unknown area_state flag");
                        false
                    }
                }
            }
            Condition::And(nested) => nested.conditions.iter().all(|c| self.evaluate(c, area_id)),
            Condition::Or(nested) => nested.conditions.iter().any(|c| self.evaluate(c, area_id)),
        }
    }

    /// Entities a condition list depends on, for state-change tracking
    ///
    /// Activity and area_state conditions are excluded; their inputs are
    /// tracked separately. Template conditions contribute the entities their
    /// expressions reference.
    pub fn referenced_entities(&self, conditions: &[Condition], area_id: &str) -> Vec<String> {
        let mut entities = Vec::new();
        self.collect_referenced(conditions, area_id, &mut entities);
        entities.sort();
        entities.dedup();
        entities
    }

    fn collect_referenced(&self, conditions: &[Condition], area_id: &str, out: &mut Vec<String>) {
        for condition in conditions {
            match condition {
                Condition::State(c) => self.collect_target(&c.target, area_id, out),
                Condition::NumericState(c) => self.collect_target(&c.target, area_id, out),
                Condition::Template(c) => {
                    for captures in states_call_regex().captures_iter(&c.value_template) {
                        if let Some(m) = captures.get(1) {
                            out.push(m.as_str().to_string());
                        }
                    }
                    for captures in states_attr_regex().captures_iter(&c.value_template) {
                        if let (Some(domain), Some(object_id)) = (captures.get(1), captures.get(2))
                        {
                            out.push(format!("{}.{}", domain.as_str(), object_id.as_str()));
                        }
                    }
                }
                Condition::And(nested) | Condition::Or(nested) => {
                    self.collect_referenced(&nested.conditions, area_id, out);
                }
                Condition::Time(_) | Condition::Activity(_) | Condition::AreaState(_) => {}
            }
        }
    }

    fn collect_target(&self, target: &Target, area_id: &str, out: &mut Vec<String>) {
        match target {
            Target::Entity { entity_id } => out.push(entity_id.clone()),
            Target::Selector {
                domain,
                device_class,
                area,
            } => {
                let selector_area =
                    crate::resolver::resolve_area_spec(area.clone(), area_id);
                out.extend(self.resolver.resolve(
                    domain,
                    Some(&selector_area),
                    device_class.as_deref(),
                    ResolveStrategy::All,
                ));
            }
        }
    }
}

/// Parse "HH:MM" or "HH:MM:SS"; unparsable bounds are ignored
fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}
