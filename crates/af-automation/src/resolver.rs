//! Entity resolution for selector-based conditions and actions
//!
//! Selectors describe entities by domain, device class, and area. The
//! resolver expands them into concrete entity ids using the registries,
//! skipping disabled entities and entities without a state.

use crate::condition::{Condition, Target};
use af_registries::{EntityEntry, Registries};
use af_state_store::StateStore;
use std::sync::Arc;
use tracing::debug;

/// States that count as "active" for the Any strategy
const ACTIVE_STATES: &[&str] = &["on", "true", "active"];

/// How many of the matching entities to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// First matching entity only
    First,
    /// All matching entities
    All,
    /// Prefer the first entity in an active state, else the first match
    Any,
}

/// Resolves selectors into concrete entity ids
pub struct EntityResolver {
    store: Arc<StateStore>,
    registries: Arc<Registries>,
}

impl EntityResolver {
    pub fn new(store: Arc<StateStore>, registries: Arc<Registries>) -> Self {
        Self { store, registries }
    }

    /// Resolve a selector into entity ids, sorted by entity id
    ///
    /// Entities are skipped when disabled or when the state store has no
    /// state for them.
    pub fn resolve(
        &self,
        domain: &str,
        area_id: Option<&str>,
        device_class: Option<&str>,
        strategy: ResolveStrategy,
    ) -> Vec<String> {
        let candidates: Vec<Arc<EntityEntry>> = match area_id {
            Some(area_id) => self.registries.entities_in_area(area_id),
            None => {
                let mut all: Vec<Arc<EntityEntry>> = self
                    .registries
                    .entities
                    .iter()
                    .filter(|e| !e.is_disabled())
                    .collect();
                all.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
                all
            }
        };

        let matches: Vec<String> = candidates
            .into_iter()
            .filter(|entry| entry.domain() == domain)
            .filter(|entry| match device_class {
                Some(dc) => {
                    entry.device_class.as_deref() == Some(dc)
                        || entry.original_device_class.as_deref() == Some(dc)
                }
                None => true,
            })
            .filter(|entry| self.store.get_state(&entry.entity_id).is_some())
            .map(|entry| entry.entity_id.clone())
            .collect();

        debug!(
            domain,
            ?area_id,
            ?device_class,
            count = matches.len(),
            "Resolved selector"
        );

        match strategy {
            ResolveStrategy::All => matches,
            ResolveStrategy::First => matches.into_iter().take(1).collect(),
            ResolveStrategy::Any => {
                let active = matches.iter().find(|entity_id| {
                    self.store
                        .get_state(entity_id)
                        .map(|s| ACTIVE_STATES.contains(&s.as_str()))
                        .unwrap_or(false)
                });
                match active.or_else(|| matches.first()) {
                    Some(entity_id) => vec![entity_id.clone()],
                    None => Vec::new(),
                }
            }
        }
    }

    /// Resolve a list of conditions for an area
    ///
    /// Unresolvable conditions are dropped. AND/OR branches that end up
    /// empty are dropped too.
    pub fn resolve_conditions(&self, conditions: &[Condition], area_id: &str) -> Vec<Condition> {
        conditions
            .iter()
            .filter_map(|condition| self.resolve_condition(condition.clone(), area_id))
            .collect()
    }

    /// Resolve a single condition for an area
    ///
    /// Selector targets are expanded: a single match becomes a plain leaf,
    /// multiple matches become an OR over per-entity leaves, and zero
    /// matches drop the condition.
    pub fn resolve_condition(&self, condition: Condition, area_id: &str) -> Option<Condition> {
        match condition {
            Condition::State(mut c) => match self.expand_target(&c.target, area_id) {
                TargetExpansion::Keep => Some(Condition::State(c)),
                TargetExpansion::None => None,
                TargetExpansion::One(entity_id) => {
                    c.target = Target::entity(entity_id);
                    Some(Condition::State(c))
                }
                TargetExpansion::Many(entity_ids) => Some(Condition::or(
                    entity_ids
                        .into_iter()
                        .map(|entity_id| {
                            let mut leaf = c.clone();
                            leaf.target = Target::entity(entity_id);
                            Condition::State(leaf)
                        })
                        .collect(),
                )),
            },
            Condition::NumericState(mut c) => match self.expand_target(&c.target, area_id) {
                TargetExpansion::Keep => Some(Condition::NumericState(c)),
                TargetExpansion::None => None,
                TargetExpansion::One(entity_id) => {
                    c.target = Target::entity(entity_id);
                    Some(Condition::NumericState(c))
                }
                TargetExpansion::Many(entity_ids) => Some(Condition::or(
                    entity_ids
                        .into_iter()
                        .map(|entity_id| {
                            let mut leaf = c.clone();
                            leaf.target = Target::entity(entity_id);
                            Condition::NumericState(leaf)
                        })
                        .collect(),
                )),
            },
            Condition::Activity(mut c) => {
                let spec = c.area.take().or_else(|| c.area_id.take());
                c.area_id = Some(resolve_area_spec(spec, area_id));
                Some(Condition::Activity(c))
            }
            Condition::AreaState(mut c) => {
                let spec = c.area.take().or_else(|| c.area_id.take());
                c.area_id = Some(resolve_area_spec(spec, area_id));
                Some(Condition::AreaState(c))
            }
            Condition::And(nested) => {
                let resolved = self.resolve_conditions(&nested.conditions, area_id);
                if resolved.is_empty() {
                    None
                } else {
                    Some(Condition::and(resolved))
                }
            }
            Condition::Or(nested) => {
                let resolved = self.resolve_conditions(&nested.conditions, area_id);
                if resolved.is_empty() {
                    None
                } else {
                    Some(Condition::or(resolved))
                }
            }
            other @ (Condition::Template(_) | Condition::Time(_)) => Some(other),
        }
    }

    fn expand_target(&self, target: &Target, area_id: &str) -> TargetExpansion {
        match target {
            Target::Entity { .. } => TargetExpansion::Keep,
            Target::Selector {
                domain,
                device_class,
                area,
            } => {
                let selector_area = resolve_area_spec(area.clone(), area_id);
                let entity_ids = self.resolve(
                    domain,
                    Some(&selector_area),
                    device_class.as_deref(),
                    ResolveStrategy::All,
                );

                match entity_ids.len() {
                    0 => {
                        debug!(domain, area = %selector_area, "Selector matched no entities, dropping condition");
                        TargetExpansion::None
                    }
                    1 => TargetExpansion::One(entity_ids.into_iter().next().unwrap_or_default()),
                    _ => TargetExpansion::Many(entity_ids),
                }
            }
        }
    }
}

/// "current" and absent area specs resolve to the context area
pub(crate) fn resolve_area_spec(spec: Option<String>, context_area_id: &str) -> String {
    match spec {
        Some(area) if area != "current" => area,
        _ => context_area_id.to_string(),
    }
}

enum TargetExpansion {
    /// Target is already a concrete entity
    Keep,
    /// No matches, drop the condition
    None,
    One(String),
    Many(Vec<String>),
}
