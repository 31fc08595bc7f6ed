//! Rule engine
//!
//! Orchestrates the app-based automation pipeline per area: state changes
//! on tracked entities re-evaluate the area's activity, the activity picks
//! an action bundle from the assigned app, conditions gate the bundle, and
//! the action runner executes it. Debounce collapses bursts of changes;
//! cooldowns stop the same bundle from re-firing in a tight loop.

use crate::activity::{ActivityTracker, ACTIVITY_EMPTY};
use crate::condition::Condition;
use crate::defaults;
use crate::environment::EnvironmentProvider;
use crate::eval::ConditionEvaluator;
use crate::executor::{ActionContext, ActionRunner};
use crate::model::AreaAssignment;
use crate::remote::RemoteClient;
use crate::resolver::{EntityResolver, ResolveStrategy};
use crate::storage::AppStorage;
use af_registries::Registries;
use af_state_store::StateStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Seconds a trigger is held back to collapse bursts of state changes
pub const DEBOUNCE_SECONDS: u64 = 2;

/// Cooldown between executions of the same area/activity bundle
pub const COOLDOWN_SECONDS: u64 = 30;

/// Cooldown between environmentally triggered executions per area
pub const COOLDOWN_ENVIRONMENTAL_SECONDS: u64 = 300;

/// Domains (and device classes) whose entities count as presence inputs
const PRESENCE_DOMAINS: &[(&str, &[&str])] = &[
    ("binary_sensor", &["motion", "occupancy", "presence"]),
    ("media_player", &[]),
];

/// Decides whether an app may execute actions in an area
pub trait FeatureGate: Send + Sync {
    fn is_enabled(&self, app_id: &str, area_id: &str) -> bool;
}

/// Feature gate backed by per-area switch entities
///
/// An app is enabled in an area when `switch.autoflow_feature_{app}_{area}`
/// is "on". A missing switch means disabled.
pub struct SwitchFeatureGate {
    store: Arc<StateStore>,
}

impl SwitchFeatureGate {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Switch entity gating an app in an area
    pub fn switch_entity_id(app_id: &str, area_id: &str) -> String {
        format!("switch.autoflow_feature_{app_id}_{area_id}")
    }
}

impl FeatureGate for SwitchFeatureGate {
    fn is_enabled(&self, app_id: &str, area_id: &str) -> bool {
        let entity_id = Self::switch_entity_id(app_id, area_id);
        match self.store.get_state(&entity_id) {
            Some(state) => state == "on",
            None => {
                debug!(entity_id, "Feature switch not found, app disabled");
                false
            }
        }
    }
}

/// Feature gate that enables every app everywhere
pub struct AllowAllFeatures;

impl FeatureGate for AllowAllFeatures {
    fn is_enabled(&self, _app_id: &str, _area_id: &str) -> bool {
        true
    }
}

/// What caused a rule evaluation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TriggerSource {
    /// A tracked presence or condition entity changed
    Entity(String),
    /// The area's environmental state transitioned (became dark)
    Environmental,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DebounceKey {
    area_id: String,
    trigger: TriggerSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CooldownScope {
    Activity(String),
    Environmental,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CooldownKey {
    area_id: String,
    scope: CooldownScope,
}

/// Entities tracked for one enabled area
#[derive(Debug, Default)]
struct TrackedArea {
    presence: HashSet<String>,
    condition: HashSet<String>,
    environmental: HashSet<String>,
    /// Whether the assigned app gates on area_state conditions
    uses_area_state: bool,
}

impl TrackedArea {
    fn contains(&self, entity_id: &str) -> bool {
        self.presence.contains(entity_id)
            || self.condition.contains(entity_id)
            || self.environmental.contains(entity_id)
    }
}

/// Record of the last executed action bundle for an area
#[derive(Debug, Clone, Serialize)]
pub struct LastAction {
    pub activity: String,
    pub executed_at: DateTime<Utc>,
    pub action_count: usize,
}

/// Engine counters
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_assignments: usize,
    pub total_triggers: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub cooldown_blocks: u64,
}

#[derive(Default)]
struct Counters {
    total_triggers: AtomicU64,
    successful_executions: AtomicU64,
    failed_executions: AtomicU64,
    cooldown_blocks: AtomicU64,
}

/// App-based automation engine
pub struct RuleEngine {
    store: Arc<StateStore>,
    registries: Arc<Registries>,
    storage: Arc<AppStorage>,
    tracker: Arc<ActivityTracker>,
    evaluator: Arc<ConditionEvaluator>,
    resolver: Arc<EntityResolver>,
    environment: Arc<EnvironmentProvider>,
    actions: Arc<dyn ActionRunner>,
    features: Arc<dyn FeatureGate>,
    remote: Option<Arc<dyn RemoteClient>>,
    instance_id: String,

    tracked: DashMap<String, TrackedArea>,
    /// Last observed is_dark per area, for transition detection
    env_cache: DashMap<String, bool>,
    debounce_tasks: DashMap<DebounceKey, JoinHandle<()>>,
    last_triggered: DashMap<CooldownKey, Instant>,
    /// Per area: (current activity, previous activity)
    activity_history: DashMap<String, (String, Option<String>)>,
    last_actions: DashMap<String, LastAction>,
    counters: Counters,

    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl RuleEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<StateStore>,
        registries: Arc<Registries>,
        storage: Arc<AppStorage>,
        tracker: Arc<ActivityTracker>,
        evaluator: Arc<ConditionEvaluator>,
        resolver: Arc<EntityResolver>,
        environment: Arc<EnvironmentProvider>,
        actions: Arc<dyn ActionRunner>,
        features: Arc<dyn FeatureGate>,
        remote: Option<Arc<dyn RemoteClient>>,
        instance_id: impl Into<String>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            store,
            registries,
            storage,
            tracker,
            evaluator,
            resolver,
            environment,
            actions,
            features,
            remote,
            instance_id: instance_id.into(),
            tracked: DashMap::new(),
            env_cache: DashMap::new(),
            debounce_tasks: DashMap::new(),
            last_triggered: DashMap::new(),
            activity_history: DashMap::new(),
            last_actions: DashMap::new(),
            counters: Counters::default(),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Load the catalog into the tracker and enable assigned areas
    ///
    /// Creates default autolight assignments when no assignments exist.
    pub async fn initialize(self: &Arc<Self>) {
        info!("Initializing rule engine");

        if self.storage.assignments().await.is_empty() {
            info!("No assignments in catalog, creating defaults");
            self.ensure_default_assignments().await;
        }

        self.tracker
            .load_activities(self.storage.activities().await);

        let assignments = self.storage.assignments().await;
        for (area_id, assignment) in &assignments {
            if assignment.enabled {
                self.enable_area(area_id).await;
            }
        }

        info!(
            assignments = assignments.len(),
            enabled_areas = self.tracked.len(),
            "Rule engine initialized"
        );
    }

    /// Start processing state changes and activity transitions
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Rule engine already running");
            return;
        }

        info!("Starting rule engine");

        let mut changes = self.store.subscribe();
        let mut transitions = self.tracker.subscribe_transitions();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = changes.recv() => {
                        match result {
                            Ok(event) => {
                                engine.handle_state_change(&event.entity_id.to_string());
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(missed = n, "Rule engine lagged behind state changes");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("State store closed, stopping rule engine");
                                break;
                            }
                        }
                    }
                    result = transitions.recv() => {
                        match result {
                            Ok(area_id) => {
                                // Timer-driven transitions execute without debounce
                                let engine = Arc::clone(&engine);
                                tokio::spawn(async move {
                                    engine.evaluate_and_execute(&area_id, false).await;
                                });
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(missed = n, "Rule engine lagged behind transitions");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            engine.running.store(false, Ordering::SeqCst);
            info!("Rule engine stopped");
        });
    }

    /// Stop the engine and cancel pending debounce and activity timers
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        info!("Stopping rule engine");
        let _ = self.shutdown_tx.send(());

        for entry in self.debounce_tasks.iter() {
            entry.value().abort();
        }
        self.debounce_tasks.clear();

        self.tracker.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Track an area's presence, condition, and environmental entities
    pub async fn enable_area(&self, area_id: &str) {
        let Some(assignment) = self.storage.assignment(area_id).await else {
            warn!(area_id, "No assignment found for area");
            return;
        };

        let Some(app) = self.storage.app(&assignment.app_id).await else {
            warn!(area_id, app_id = %assignment.app_id, "Assigned app not found");
            return;
        };

        let presence = self.presence_entities(area_id);

        let mut condition: HashSet<String> = HashSet::new();
        let mut uses_area_state = false;

        for bundle in app.activity_actions.values() {
            if has_area_state_condition(&bundle.conditions) {
                uses_area_state = true;
            }
            condition.extend(
                self.evaluator
                    .referenced_entities(&bundle.conditions, area_id),
            );
        }

        for def in self.storage.activities().await {
            condition.extend(
                self.evaluator
                    .referenced_entities(&def.detection_conditions, area_id),
            );
        }

        let environmental: HashSet<String> = if uses_area_state {
            self.environment
                .environmental_entities(area_id)
                .into_iter()
                .collect()
        } else {
            HashSet::new()
        };

        if presence.is_empty() && condition.is_empty() && environmental.is_empty() {
            warn!(area_id, "No entities to track for area");
            return;
        }

        if uses_area_state {
            self.env_cache
                .insert(area_id.to_string(), self.environment.is_dark(area_id));
        }

        info!(
            area_id,
            app_id = %assignment.app_id,
            presence = presence.len(),
            condition = condition.len(),
            environmental = environmental.len(),
            "Enabled automation for area"
        );

        self.tracked.insert(
            area_id.to_string(),
            TrackedArea {
                presence,
                condition,
                environmental,
                uses_area_state,
            },
        );
    }

    /// Stop tracking an area
    pub async fn disable_area(&self, area_id: &str) {
        self.tracked.remove(area_id);
        self.env_cache.remove(area_id);

        let stale: Vec<DebounceKey> = self
            .debounce_tasks
            .iter()
            .filter(|entry| entry.key().area_id == area_id)
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            if let Some((_, handle)) = self.debounce_tasks.remove(&key) {
                handle.abort();
            }
        }

        info!(area_id, "Disabled automation for area");
    }

    /// Re-read assignments from the catalog and re-enable areas
    pub async fn reload_assignments(&self) -> usize {
        info!("Reloading assignments");

        let enabled: Vec<String> = self.tracked.iter().map(|e| e.key().clone()).collect();
        for area_id in enabled {
            self.disable_area(&area_id).await;
        }

        let assignments = self.storage.assignments().await;
        for (area_id, assignment) in &assignments {
            if assignment.enabled {
                self.enable_area(area_id).await;
            }
        }

        info!(count = assignments.len(), "Reloaded assignments");
        assignments.len()
    }

    /// Sync the catalog from the remote and apply the result
    pub async fn refresh(&self) -> bool {
        let Some(remote) = &self.remote else {
            debug!("No remote client configured, skipping refresh");
            return false;
        };

        let synced = self
            .storage
            .sync_from_remote(remote.as_ref(), &self.instance_id)
            .await;

        self.tracker
            .load_activities(self.storage.activities().await);
        self.reload_assignments().await;

        synced
    }

    /// Re-pull only the activity definitions and load them into the tracker
    ///
    /// Lighter than [`refresh`](Self::refresh): apps, assignments, and the
    /// tracked entity sets stay as they are, so this is what the periodic
    /// refresh loop runs.
    pub async fn refresh_activities(&self) -> bool {
        let Some(remote) = &self.remote else {
            debug!("No remote client configured, skipping activity refresh");
            return false;
        };

        if !self.storage.refresh_activities(remote.as_ref()).await {
            return false;
        }

        self.tracker
            .load_activities(self.storage.activities().await);
        true
    }

    /// Engine counters plus the current assignment count
    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            total_assignments: self.storage.assignments().await.len(),
            total_triggers: self.counters.total_triggers.load(Ordering::Relaxed),
            successful_executions: self
                .counters
                .successful_executions
                .load(Ordering::Relaxed),
            failed_executions: self.counters.failed_executions.load(Ordering::Relaxed),
            cooldown_blocks: self.counters.cooldown_blocks.load(Ordering::Relaxed),
        }
    }

    /// Last executed action bundle for an area
    pub fn last_action(&self, area_id: &str) -> Option<LastAction> {
        self.last_actions.get(area_id).map(|r| r.clone())
    }

    /// Route a state change to the areas tracking the entity
    fn handle_state_change(self: &Arc<Self>, entity_id: &str) {
        let mut affected: Vec<(String, bool)> = Vec::new();

        for entry in self.tracked.iter() {
            if entry.value().contains(entity_id) {
                let is_environmental = entry.value().environmental.contains(entity_id);
                affected.push((entry.key().clone(), is_environmental));
            }
        }

        // Tracked sets are computed when an area is enabled; an entity
        // registered afterwards is adopted on its first state change.
        if affected.is_empty() {
            if let Some(adopted) = self.adopt_entity(entity_id) {
                affected.push(adopted);
            }
        }

        for (area_id, is_environmental) in affected {
            let trigger = if is_environmental {
                let is_dark = self.environment.is_dark(&area_id);
                let was_dark = self.env_cache.insert(area_id.clone(), is_dark);

                // Only the dark transition matters; other environmental
                // noise must not re-trigger lighting rules.
                let became_dark = was_dark == Some(false) && is_dark;
                if !became_dark {
                    debug!(
                        area_id,
                        entity_id, "Environmental change without transition, skipping"
                    );
                    continue;
                }

                info!(area_id, entity_id, "Area became dark");
                TriggerSource::Environmental
            } else {
                TriggerSource::Entity(entity_id.to_string())
            };

            self.schedule_debounced(DebounceKey {
                area_id,
                trigger,
            });
        }
    }

    /// Classify an untracked entity against its registry area
    ///
    /// Returns the area id and whether the entity is environmental when the
    /// entity belongs to an enabled area and qualifies as an input there.
    fn adopt_entity(&self, entity_id: &str) -> Option<(String, bool)> {
        let entry = self.registries.entities.get(entity_id)?;
        let area_id = self.registries.entity_area(&entry)?;
        let mut tracked = self.tracked.get_mut(&area_id)?;

        let (domain, _) = entity_id.split_once('.')?;

        let is_presence = PRESENCE_DOMAINS.iter().any(|(d, classes)| {
            *d == domain
                && (classes.is_empty()
                    || entry
                        .effective_device_class()
                        .is_some_and(|c| classes.contains(&c)))
        });

        if is_presence {
            info!(entity_id, %area_id, "Tracking late-registered presence entity");
            tracked.presence.insert(entity_id.to_string());
            return Some((area_id, false));
        }

        if tracked.uses_area_state
            && self
                .environment
                .environmental_entities(&area_id)
                .iter()
                .any(|e| e == entity_id)
        {
            info!(
                entity_id,
                %area_id, "Tracking late-registered environmental entity"
            );
            tracked.environmental.insert(entity_id.to_string());
            return Some((area_id, true));
        }

        None
    }

    /// Queue an evaluation after the debounce window, replacing any
    /// pending evaluation for the same key
    fn schedule_debounced(self: &Arc<Self>, key: DebounceKey) {
        if let Some((_, handle)) = self.debounce_tasks.remove(&key) {
            if !handle.is_finished() {
                handle.abort();
            }
        }

        let engine = Arc::clone(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            sleep(Duration::from_secs(DEBOUNCE_SECONDS)).await;
            engine.debounce_tasks.remove(&task_key);

            let is_environmental = matches!(task_key.trigger, TriggerSource::Environmental);
            debug!(area_id = %task_key.area_id, ?task_key.trigger, "Debounce elapsed, evaluating");
            engine
                .evaluate_and_execute(&task_key.area_id, is_environmental)
                .await;
        });

        self.debounce_tasks.insert(key, handle);
    }

    /// Evaluate the area's activity and run the matching action bundle
    #[instrument(skip(self))]
    async fn evaluate_and_execute(self: &Arc<Self>, area_id: &str, is_environmental: bool) {
        self.counters.total_triggers.fetch_add(1, Ordering::Relaxed);

        let Some(assignment) = self.storage.assignment(area_id).await else {
            debug!(area_id, "No assignment for area");
            return;
        };

        let current_activity = self.tracker.evaluate_activity(area_id);

        let previous_activity = {
            let mut entry = self
                .activity_history
                .entry(area_id.to_string())
                .or_insert_with(|| (ACTIVITY_EMPTY.to_string(), None));
            if entry.0 != current_activity {
                entry.1 = Some(entry.0.clone());
                entry.0 = current_activity.clone();
            }
            entry.1.clone()
        };

        let Some(app) = self.storage.app(&assignment.app_id).await else {
            warn!(area_id, app_id = %assignment.app_id, "Assigned app not found");
            return;
        };

        if !self.features.is_enabled(&app.app_id, area_id) {
            debug!(area_id, app_id = %app.app_id, "App not enabled for area");
            return;
        }

        let Some(bundle) = app.activity_actions.get(&current_activity) else {
            debug!(
                area_id,
                activity = %current_activity,
                "No actions for activity"
            );
            return;
        };

        let cooldown_key = CooldownKey {
            area_id: area_id.to_string(),
            scope: if is_environmental {
                CooldownScope::Environmental
            } else {
                CooldownScope::Activity(current_activity.clone())
            },
        };

        if !self.cooldown_elapsed(&cooldown_key, is_environmental) {
            self.counters.cooldown_blocks.fetch_add(1, Ordering::Relaxed);
            debug!(
                area_id,
                activity = %current_activity,
                is_environmental,
                "In cooldown, skipping"
            );
            return;
        }

        let conditions_met =
            self.evaluator
                .evaluate_conditions(&bundle.conditions, area_id, bundle.logic);

        if !conditions_met {
            debug!(area_id, activity = %current_activity, "Conditions not met");
            return;
        }

        info!(
            area_id,
            activity = %current_activity,
            actions = bundle.actions.len(),
            "Conditions met, executing actions"
        );

        let ctx = ActionContext {
            area_id: area_id.to_string(),
            current_activity: current_activity.clone(),
            previous_activity,
        };

        if self.actions.execute_actions(&bundle.actions, &ctx).await {
            self.counters
                .successful_executions
                .fetch_add(1, Ordering::Relaxed);
            self.last_triggered.insert(cooldown_key, Instant::now());
            self.last_actions.insert(
                area_id.to_string(),
                LastAction {
                    activity: current_activity,
                    executed_at: Utc::now(),
                    action_count: bundle.actions.len(),
                },
            );
        } else {
            self.counters
                .failed_executions
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    fn cooldown_elapsed(&self, key: &CooldownKey, is_environmental: bool) -> bool {
        let Some(last) = self.last_triggered.get(key) else {
            return true;
        };

        let window = if is_environmental {
            COOLDOWN_ENVIRONMENTAL_SECONDS
        } else {
            COOLDOWN_SECONDS
        };

        last.elapsed() > Duration::from_secs(window)
    }

    /// Presence inputs of an area: motion, occupancy, and presence binary
    /// sensors plus any media players
    fn presence_entities(&self, area_id: &str) -> HashSet<String> {
        let mut entities = HashSet::new();

        for (domain, device_classes) in PRESENCE_DOMAINS {
            if device_classes.is_empty() {
                entities.extend(self.resolver.resolve(
                    domain,
                    Some(area_id),
                    None,
                    ResolveStrategy::All,
                ));
            } else {
                for device_class in *device_classes {
                    entities.extend(self.resolver.resolve(
                        domain,
                        Some(area_id),
                        Some(device_class),
                        ResolveStrategy::All,
                    ));
                }
            }
        }

        entities
    }

    /// Create default autolight assignments for areas without one
    ///
    /// Also installs the fallback app and its activities when missing, and
    /// writes new assignments back to the remote on a best-effort basis.
    async fn ensure_default_assignments(self: &Arc<Self>) {
        let area_ids = self.registries.areas.area_ids();
        if area_ids.is_empty() {
            info!("No areas found, skipping default assignment creation");
            return;
        }

        if self.storage.app(defaults::AUTOLIGHT_APP_ID).await.is_none() {
            info!("Installing fallback autolight app and activities");
            self.storage.set_app(defaults::default_autolight_app()).await;

            for def in defaults::default_activities() {
                if self.storage.activity(&def.activity_id).await.is_none() {
                    self.storage.set_activity(def).await;
                }
            }
        }

        let mut created = 0;
        for area_id in area_ids {
            if self.storage.assignment(&area_id).await.is_some() {
                continue;
            }

            let assignment = AreaAssignment {
                area_id: area_id.clone(),
                app_id: defaults::AUTOLIGHT_APP_ID.to_string(),
                enabled: true,
                created_at: Some(Utc::now()),
                is_default: true,
            };

            if let Some(remote) = &self.remote {
                if let Err(e) = remote
                    .save_area_assignment(&self.instance_id, &assignment)
                    .await
                {
                    warn!(area_id = %assignment.area_id, error = %e, "Failed to push assignment to remote");
                }
            }

            self.storage.set_assignment(assignment).await;
            created += 1;
        }

        if let Err(e) = self.storage.save().await {
            warn!(error = %e, "Failed to persist default assignments");
        }

        info!(created, "Created default autolight assignments");
    }
}

/// Recursively check for an area_state condition
fn has_area_state_condition(conditions: &[Condition]) -> bool {
    conditions.iter().any(|condition| match condition {
        Condition::AreaState(_) => true,
        Condition::And(nested) | Condition::Or(nested) => {
            has_area_state_condition(&nested.conditions)
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_area_state_condition_nested() {
        let conditions: Vec<Condition> = serde_json::from_str(
            r#"[
                {"condition": "and", "conditions": [
                    {"condition": "state", "entity_id": "light.a", "state": "on"},
                    {"condition": "or", "conditions": [
                        {"condition": "area_state", "state": "is_dark", "area": "current"}
                    ]}
                ]}
            ]"#,
        )
        .unwrap();

        assert!(has_area_state_condition(&conditions));
    }

    #[test]
    fn test_has_area_state_condition_absent() {
        let conditions: Vec<Condition> = serde_json::from_str(
            r#"[{"condition": "state", "entity_id": "light.a", "state": "on"}]"#,
        )
        .unwrap();

        assert!(!has_area_state_condition(&conditions));
    }

    #[test]
    fn test_switch_entity_id_format() {
        assert_eq!(
            SwitchFeatureGate::switch_entity_id("autolight", "kitchen"),
            "switch.autoflow_feature_autolight_kitchen"
        );
    }
}
