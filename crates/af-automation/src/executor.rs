//! Action execution
//!
//! Turns the actions of an activity's action bundle into service calls.
//! Generic actions (domain + area) are resolved to concrete entities at
//! execution time; explicit entity targets pass through unchanged.

use crate::model::Action;
use crate::resolver::{resolve_area_spec, EntityResolver, ResolveStrategy};
use af_service_registry::ServiceRegistry;
use af_state_store::StateStore;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Context an action bundle executes in
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub area_id: String,
    pub current_activity: String,
    pub previous_activity: Option<String>,
}

/// Executes action lists; implemented by [`ActionExecutor`] and by test doubles
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Execute all actions, returning true only when every action succeeded
    async fn execute_actions(&self, actions: &[Action], ctx: &ActionContext) -> bool;
}

/// Default action runner dispatching through the service registry
pub struct ActionExecutor {
    resolver: Arc<EntityResolver>,
    services: Arc<ServiceRegistry>,
    store: Arc<StateStore>,
}

impl ActionExecutor {
    pub fn new(
        resolver: Arc<EntityResolver>,
        services: Arc<ServiceRegistry>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            resolver,
            services,
            store,
        }
    }

    /// Execute a single action; Ok(false) means the action was skipped
    /// because its state filter matched no entities
    async fn execute_action(&self, action: &Action, ctx: &ActionContext) -> Result<bool, String> {
        let (domain, service) = parse_service(&action.service)
            .ok_or_else(|| format!("Invalid service: {}", action.service))?;

        let mut data = action.data.clone().unwrap_or_default();

        if let Some(target) = &action.target {
            for (key, value) in target {
                data.insert(key.clone(), value.clone());
            }
        }

        let mut entity_ids: Vec<String> = if let Some(entity_id) = &action.entity_id {
            vec![entity_id.clone()]
        } else if let Some(target_domain) = &action.domain {
            let area = resolve_area_spec(action.area.clone(), &ctx.area_id);
            self.resolver
                .resolve(target_domain, Some(&area), None, ResolveStrategy::All)
        } else {
            Vec::new()
        };

        if let Some(required_state) = &action.filter_entities_by_state {
            entity_ids.retain(|entity_id| {
                self.store
                    .get_state(entity_id)
                    .map(|state| state == *required_state)
                    .unwrap_or(false)
            });

            if entity_ids.is_empty() {
                debug!(
                    service = %action.service,
                    state = %required_state,
                    "No entities in required state, skipping action"
                );
                return Ok(false);
            }
        }

        if !entity_ids.is_empty() {
            data.insert("entity_id".to_string(), json!(entity_ids));
        } else if action.domain.is_some() {
            debug!(
                service = %action.service,
                area = %ctx.area_id,
                "Generic action resolved no entities, skipping"
            );
            return Ok(false);
        }

        info!(
            service = %action.service,
            area = %ctx.area_id,
            activity = %ctx.current_activity,
            entities = ?entity_ids,
            "Executing action"
        );

        self.services
            .call(domain, service, Value::Object(data))
            .await
            .map_err(|e| e.to_string())?;

        Ok(true)
    }
}

#[async_trait]
impl ActionRunner for ActionExecutor {
    #[instrument(skip(self, actions), fields(area_id = %ctx.area_id, count = actions.len()))]
    async fn execute_actions(&self, actions: &[Action], ctx: &ActionContext) -> bool {
        let mut success_count = 0;

        for action in actions {
            match self.execute_action(action, ctx).await {
                Ok(executed) => {
                    if !executed {
                        debug!(service = %action.service, "Action skipped");
                    }
                    success_count += 1;
                }
                Err(e) => {
                    warn!(service = %action.service, error = %e, "Action failed");
                }
            }
        }

        success_count == actions.len()
    }
}

/// Split "domain.service" into its parts
fn parse_service(service: &str) -> Option<(&str, &str)> {
    service.split_once('.').filter(|(d, s)| !d.is_empty() && !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::EntityId;
    use af_registries::{AreaEntry, Registries};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn make_test_executor() -> (
        Arc<StateStore>,
        Arc<ServiceRegistry>,
        ActionExecutor,
        Arc<Mutex<Vec<Value>>>,
        TempDir,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new());
        let registries = Arc::new(Registries::new(temp_dir.path()));
        let services = Arc::new(ServiceRegistry::new());

        registries
            .areas
            .insert(AreaEntry::with_id("kitchen", "Kitchen"));

        for (entity_id, state) in [
            ("light.kitchen_ceiling", "on"),
            ("light.kitchen_counter", "off"),
        ] {
            registries.entities.get_or_create(entity_id, "demo", None);
            registries.entities.update(entity_id, |e| {
                e.area_id = Some("kitchen".to_string());
            });

            let (domain, object_id) = entity_id.split_once('.').unwrap();
            store.set(
                EntityId::new(domain, object_id).unwrap(),
                state,
                HashMap::new(),
            );
        }

        let calls: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        services.register("light", "turn_on", move |call| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(call.data);
                Ok(())
            }
        });

        let resolver = Arc::new(EntityResolver::new(store.clone(), registries));
        let executor = ActionExecutor::new(resolver, services.clone(), store.clone());

        (store, services, executor, calls, temp_dir)
    }

    fn ctx() -> ActionContext {
        ActionContext {
            area_id: "kitchen".to_string(),
            current_activity: "movement".to_string(),
            previous_activity: None,
        }
    }

    fn turn_on_action() -> Action {
        serde_json::from_value(json!({
            "service": "light.turn_on",
            "domain": "light",
            "area": "current",
            "data": {"brightness_pct": 100}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_generic_action_resolves_area_entities() {
        let (_store, _services, executor, calls, _dir) = make_test_executor();

        assert!(executor.execute_actions(&[turn_on_action()], &ctx()).await);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["brightness_pct"], 100);
        assert_eq!(
            calls[0]["entity_id"],
            json!(["light.kitchen_ceiling", "light.kitchen_counter"])
        );
    }

    #[tokio::test]
    async fn test_filter_entities_by_state() {
        let (_store, _services, executor, calls, _dir) = make_test_executor();

        let mut action = turn_on_action();
        action.filter_entities_by_state = Some("on".to_string());

        assert!(executor.execute_actions(&[action], &ctx()).await);

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0]["entity_id"], json!(["light.kitchen_ceiling"]));
    }

    #[tokio::test]
    async fn test_filter_with_no_matches_skips_but_succeeds() {
        let (_store, _services, executor, calls, _dir) = make_test_executor();

        let mut action = turn_on_action();
        action.filter_entities_by_state = Some("purple".to_string());

        assert!(executor.execute_actions(&[action], &ctx()).await);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_entity_id_passes_through() {
        let (_store, _services, executor, calls, _dir) = make_test_executor();

        let action: Action = serde_json::from_value(json!({
            "service": "light.turn_on",
            "entity_id": "light.hall"
        }))
        .unwrap();

        assert!(executor.execute_actions(&[action], &ctx()).await);
        assert_eq!(calls.lock().unwrap()[0]["entity_id"], json!(["light.hall"]));
    }

    #[tokio::test]
    async fn test_unregistered_service_fails() {
        let (_store, _services, executor, _calls, _dir) = make_test_executor();

        let action: Action = serde_json::from_value(json!({
            "service": "vacuum.start",
            "entity_id": "vacuum.robot"
        }))
        .unwrap();

        assert!(!executor.execute_actions(&[action], &ctx()).await);
    }

    #[tokio::test]
    async fn test_target_merged_into_data() {
        let (_store, _services, executor, calls, _dir) = make_test_executor();

        let action: Action = serde_json::from_value(json!({
            "service": "light.turn_on",
            "entity_id": "light.hall",
            "target": {"transition": 2},
            "data": {"brightness_pct": 50}
        }))
        .unwrap();

        assert!(executor.execute_actions(&[action], &ctx()).await);
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0]["transition"], 2);
        assert_eq!(calls[0]["brightness_pct"], 50);
    }

    #[test]
    fn test_parse_service() {
        assert_eq!(parse_service("light.turn_on"), Some(("light", "turn_on")));
        assert_eq!(parse_service("invalid"), None);
        assert_eq!(parse_service(".turn_on"), None);
    }
}
