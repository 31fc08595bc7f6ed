//! Per-area activity tracking
//!
//! Maintains a small state machine per area. Detection conditions promote
//! an area into an activity; once conditions stop matching, timeouts move
//! it along the `transition_to` decay chain until it reaches the baseline
//! "empty" activity.
//!
//! Transitions driven by timers are announced on a broadcast channel so the
//! rule engine can run the actions bound to the new activity.

use crate::eval::ConditionEvaluator;
use crate::model::{ActivityDef, Logic};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Baseline activity reported when nothing is detected
pub const ACTIVITY_EMPTY: &str = "empty";

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Tracked state of one area
#[derive(Debug, Clone)]
struct AreaActivity {
    activity: String,
    activity_start: Option<Instant>,
    last_update: Option<Instant>,
    simulated: bool,
}

impl AreaActivity {
    fn empty() -> Self {
        Self {
            activity: ACTIVITY_EMPTY.to_string(),
            activity_start: None,
            last_update: None,
            simulated: false,
        }
    }
}

/// Tracks activity levels per area from dynamic activity definitions
pub struct ActivityTracker {
    evaluator: Arc<ConditionEvaluator>,
    /// Activity definitions in evaluation priority order
    activities: RwLock<Arc<Vec<ActivityDef>>>,
    areas: DashMap<String, AreaActivity>,
    /// When the current activity's conditions stopped matching
    false_since: DashMap<String, Instant>,
    timeout_tasks: DashMap<String, JoinHandle<()>>,
    transitions_tx: broadcast::Sender<String>,
}

impl ActivityTracker {
    pub fn new(evaluator: Arc<ConditionEvaluator>) -> Self {
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);

        Self {
            evaluator,
            activities: RwLock::new(Arc::new(vec![ActivityDef::empty(ACTIVITY_EMPTY)])),
            areas: DashMap::new(),
            false_since: DashMap::new(),
            timeout_tasks: DashMap::new(),
            transitions_tx,
        }
    }

    /// Subscribe to timer-driven activity transitions (payload is the area id)
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<String> {
        self.transitions_tx.subscribe()
    }

    /// Replace the activity definitions
    ///
    /// An empty list falls back to the bare "empty" activity. The current
    /// per-area states are preserved.
    pub fn load_activities(&self, defs: Vec<ActivityDef>) {
        let defs = if defs.is_empty() {
            warn!("No activities provided, using fallback 'empty' activity only");
            vec![ActivityDef::empty(ACTIVITY_EMPTY)]
        } else {
            info!(
                count = defs.len(),
                ids = ?defs.iter().map(|d| d.activity_id.as_str()).collect::<Vec<_>>(),
                "Loaded activities"
            );
            defs
        };

        if let Ok(mut guard) = self.activities.write() {
            *guard = Arc::new(defs);
        }
    }

    fn activity_defs(&self) -> Arc<Vec<ActivityDef>> {
        self.activities
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }

    fn find_def<'a>(defs: &'a [ActivityDef], activity_id: &str) -> Option<&'a ActivityDef> {
        defs.iter().find(|d| d.activity_id == activity_id)
    }

    /// Evaluate all activities for an area and return the reported activity
    ///
    /// Activities are checked in definition order; the first whose detection
    /// conditions match wins. Activities with a duration threshold report the
    /// baseline until the threshold has elapsed.
    #[instrument(skip(self))]
    pub fn evaluate_activity(self: &Arc<Self>, area_id: &str) -> String {
        let defs = self.activity_defs();

        // Timer task may not have fired yet; apply a stale timeout eagerly.
        if let Some(state) = self.areas.get(area_id).map(|r| r.clone()) {
            if state.activity != ACTIVITY_EMPTY {
                if let Some(def) = Self::find_def(&defs, &state.activity) {
                    let timed_out = def.timeout_seconds > 0
                        && self
                            .false_since
                            .get(area_id)
                            .map(|since| {
                                since.elapsed() >= Duration::from_secs(def.timeout_seconds)
                            })
                            .unwrap_or(false);

                    if timed_out {
                        info!(
                            area_id,
                            activity = %state.activity,
                            timeout = def.timeout_seconds,
                            "Activity timed out"
                        );
                        self.areas.insert(
                            area_id.to_string(),
                            AreaActivity {
                                activity: ACTIVITY_EMPTY.to_string(),
                                activity_start: None,
                                last_update: Some(Instant::now()),
                                simulated: false,
                            },
                        );
                        self.false_since.remove(area_id);
                        return ACTIVITY_EMPTY.to_string();
                    }
                }
            }
        }

        for def in defs.iter() {
            if def.activity_id == ACTIVITY_EMPTY
                || def.is_transition_state
                || def.detection_conditions.is_empty()
            {
                continue;
            }

            let matched =
                self.evaluator
                    .evaluate_conditions(&def.detection_conditions, area_id, Logic::And);
            if !matched {
                continue;
            }

            let now = Instant::now();

            if def.duration_threshold_seconds > 0 {
                let mut entry = self
                    .areas
                    .entry(area_id.to_string())
                    .or_insert_with(AreaActivity::empty);

                if entry.activity != def.activity_id {
                    entry.activity = def.activity_id.clone();
                    entry.activity_start = Some(now);
                    entry.last_update = Some(now);
                    debug!(
                        area_id,
                        activity = %def.activity_id,
                        threshold = def.duration_threshold_seconds,
                        "Activity pending duration threshold"
                    );
                    return ACTIVITY_EMPTY.to_string();
                }

                let held = entry
                    .activity_start
                    .map(|start| now.duration_since(start))
                    .unwrap_or_default();

                if held >= Duration::from_secs(def.duration_threshold_seconds) {
                    return def.activity_id.clone();
                }
                return ACTIVITY_EMPTY.to_string();
            }

            {
                let mut entry = self
                    .areas
                    .entry(area_id.to_string())
                    .or_insert_with(AreaActivity::empty);
                if entry.activity != def.activity_id {
                    entry.activity_start = Some(now);
                }
                entry.activity = def.activity_id.clone();
                entry.last_update = Some(now);
                entry.simulated = false;
            }

            self.false_since.remove(area_id);
            self.cancel_timeout(area_id);

            debug!(area_id, activity = %def.activity_id, "Activity detected");
            return def.activity_id.clone();
        }

        // Nothing matched; start or continue the decay of the current activity.
        if let Some(state) = self.areas.get(area_id).map(|r| r.clone()) {
            let now = Instant::now();

            if state.activity != ACTIVITY_EMPTY {
                let def = Self::find_def(&defs, &state.activity);
                let is_transition = def.map(|d| d.is_transition_state).unwrap_or(false);
                let transition_to = def.and_then(|d| d.transition_to.clone());
                let timeout = def.map(|d| d.timeout_seconds).unwrap_or(0);

                if is_transition {
                    // Transition states decay only via their running timer.
                    self.false_since.remove(area_id);
                } else if !self.false_since.contains_key(area_id) {
                    self.false_since.insert(area_id.to_string(), now);

                    match transition_to {
                        Some(next) if timeout > 0 => {
                            info!(
                                area_id,
                                activity = %state.activity,
                                next = %next,
                                timeout,
                                "Conditions no longer match, transition scheduled"
                            );
                            self.schedule_timeout(area_id, timeout);
                        }
                        Some(next) => {
                            info!(
                                area_id,
                                activity = %state.activity,
                                next = %next,
                                "Conditions no longer match, transitioning immediately"
                            );
                            {
                                let mut entry = self
                                    .areas
                                    .entry(area_id.to_string())
                                    .or_insert_with(AreaActivity::empty);
                                entry.activity = next.clone();
                                entry.activity_start = Some(now);
                                entry.last_update = Some(now);
                            }
                            self.false_since.remove(area_id);

                            if let Some(next_def) = Self::find_def(&defs, &next) {
                                if next_def.timeout_seconds > 0 {
                                    self.schedule_timeout(area_id, next_def.timeout_seconds);
                                }
                            }

                            // No announcement here: the caller sees the new
                            // activity in the return value. The transitions
                            // channel is only for timer-driven changes.
                        }
                        None => {
                            if timeout > 0 {
                                self.schedule_timeout(area_id, timeout);
                            }
                        }
                    }
                }
            } else {
                self.false_since.remove(area_id);
                self.cancel_timeout(area_id);
            }
        }

        self.get_activity(area_id)
    }

    /// Current activity of an area (the stored state, no re-evaluation)
    pub fn get_activity(&self, area_id: &str) -> String {
        self.areas
            .get(area_id)
            .map(|state| state.activity.clone())
            .unwrap_or_else(|| ACTIVITY_EMPTY.to_string())
    }

    /// How long the current activity has been held
    pub fn activity_duration(&self, area_id: &str) -> Option<Duration> {
        self.areas
            .get(area_id)
            .and_then(|state| state.activity_start)
            .map(|start| start.elapsed())
    }

    /// Time remaining before the current activity times out, if a timeout
    /// is configured
    pub fn time_until_state_loss(&self, area_id: &str) -> Option<Duration> {
        let state = self.areas.get(area_id)?.clone();

        if state.activity == ACTIVITY_EMPTY {
            return None;
        }

        let defs = self.activity_defs();
        let def = Self::find_def(&defs, &state.activity)?;
        if def.timeout_seconds == 0 {
            return None;
        }

        let last_update = state.last_update?;
        let timeout = Duration::from_secs(def.timeout_seconds);
        timeout.checked_sub(last_update.elapsed()).filter(|d| !d.is_zero())
    }

    /// Clear tracking for an area
    pub fn reset_area(&self, area_id: &str) {
        self.cancel_timeout(area_id);
        self.false_since.remove(area_id);
        if self.areas.remove(area_id).is_some() {
            debug!(area_id, "Reset activity tracking");
        }
    }

    /// Override the activity of an area, e.g. for testing automations
    ///
    /// The override resets automatically after `duration` when given.
    pub fn simulate_activity(
        self: &Arc<Self>,
        area_id: &str,
        activity: &str,
        duration: Option<Duration>,
    ) -> bool {
        let defs = self.activity_defs();
        if Self::find_def(&defs, activity).is_none() {
            error!(
                area_id,
                activity,
                available = ?defs.iter().map(|d| d.activity_id.as_str()).collect::<Vec<_>>(),
                "Cannot simulate unknown activity"
            );
            return false;
        }

        self.cancel_timeout(area_id);
        self.false_since.remove(area_id);

        let now = Instant::now();
        self.areas.insert(
            area_id.to_string(),
            AreaActivity {
                activity: activity.to_string(),
                activity_start: Some(now),
                last_update: Some(now),
                simulated: true,
            },
        );

        info!(area_id, activity, ?duration, "Simulated activity");

        if let Some(duration) = duration {
            let tracker = Arc::clone(self);
            let area = area_id.to_string();
            let handle = tokio::spawn(async move {
                sleep(duration).await;
                tracker.timeout_tasks.remove(&area);
                tracker.reset_area(&area);
                let _ = tracker.transitions_tx.send(area.clone());
                info!(area_id = %area, "Simulated activity expired");
            });
            // Kept in timeout_tasks so shutdown and re-simulation cancel it
            self.timeout_tasks.insert(area_id.to_string(), handle);
        }

        true
    }

    /// Whether the area's current activity is a simulation override
    pub fn is_simulated(&self, area_id: &str) -> bool {
        self.areas
            .get(area_id)
            .map(|state| state.simulated)
            .unwrap_or(false)
    }

    fn schedule_timeout(self: &Arc<Self>, area_id: &str, timeout_seconds: u64) {
        self.cancel_timeout(area_id);

        let tracker = Arc::clone(self);
        let area = area_id.to_string();
        let handle = tokio::spawn(async move {
            sleep(Duration::from_secs(timeout_seconds)).await;
            tracker.timeout_tasks.remove(&area);
            tracker.handle_timeout(&area);
        });

        debug!(area_id, timeout_seconds, "Scheduled activity timeout");
        self.timeout_tasks.insert(area_id.to_string(), handle);
    }

    /// Abort every pending timeout and simulation expiry task
    pub fn shutdown(&self) {
        let count = self.timeout_tasks.len();
        for entry in self.timeout_tasks.iter() {
            entry.value().abort();
        }
        self.timeout_tasks.clear();

        if count > 0 {
            debug!(count, "Cancelled pending activity timers");
        }
    }

    fn cancel_timeout(&self, area_id: &str) {
        if let Some((_, handle)) = self.timeout_tasks.remove(area_id) {
            if !handle.is_finished() {
                handle.abort();
                debug!(area_id, "Cancelled activity timeout");
            }
        }
    }

    /// Timeout expiry: follow the transition chain of the current activity
    fn handle_timeout(self: &Arc<Self>, area_id: &str) {
        let Some(state) = self.areas.get(area_id).map(|r| r.clone()) else {
            warn!(area_id, "Timeout expired but no state for area");
            return;
        };

        let defs = self.activity_defs();
        let next = Self::find_def(&defs, &state.activity).and_then(|d| d.transition_to.clone());

        match next {
            Some(next) => {
                info!(
                    area_id,
                    from = %state.activity,
                    to = %next,
                    "Timeout expired, transitioning"
                );

                let now = Instant::now();
                {
                    let mut entry = self
                        .areas
                        .entry(area_id.to_string())
                        .or_insert_with(AreaActivity::empty);
                    entry.activity = next.clone();
                    entry.activity_start = Some(now);
                    entry.last_update = Some(now);
                }
                self.false_since.remove(area_id);

                if let Some(next_def) = Self::find_def(&defs, &next) {
                    if next_def.timeout_seconds > 0 {
                        self.schedule_timeout(area_id, next_def.timeout_seconds);
                    }
                }
            }
            None => {
                info!(area_id, activity = %state.activity, "Timeout expired, no transition defined");
            }
        }

        let _ = self.transitions_tx.send(area_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, StateCondition, Target};
    use crate::environment::EnvironmentProvider;
    use crate::resolver::EntityResolver;
    use af_core::EntityId;
    use af_registries::Registries;
    use af_state_store::StateStore;
    use af_template::TemplateEngine;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn motion_condition() -> Condition {
        Condition::State(StateCondition {
            target: Target::entity("binary_sensor.kitchen_motion"),
            state: "on".to_string(),
            for_seconds: None,
        })
    }

    fn test_activities() -> Vec<ActivityDef> {
        vec![
            ActivityDef::empty(ACTIVITY_EMPTY),
            ActivityDef {
                activity_id: "movement".to_string(),
                detection_conditions: vec![motion_condition()],
                timeout_seconds: 0,
                transition_to: Some("inactive".to_string()),
                ..ActivityDef::empty("movement")
            },
            ActivityDef {
                activity_id: "inactive".to_string(),
                is_transition_state: true,
                timeout_seconds: 60,
                transition_to: Some(ACTIVITY_EMPTY.to_string()),
                ..ActivityDef::empty("inactive")
            },
        ]
    }

    fn make_test_tracker() -> (Arc<StateStore>, Arc<ActivityTracker>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new());
        let registries = Arc::new(Registries::new(temp_dir.path()));

        let templates = Arc::new(TemplateEngine::new(store.clone()));
        let resolver = Arc::new(EntityResolver::new(store.clone(), registries.clone()));
        let environment = Arc::new(EnvironmentProvider::new(store.clone(), registries));
        let evaluator = Arc::new(ConditionEvaluator::new(
            store.clone(),
            templates,
            resolver,
            environment,
        ));

        let tracker = Arc::new(ActivityTracker::new(evaluator.clone()));
        evaluator.set_activity_tracker(&tracker);
        tracker.load_activities(test_activities());

        (store, tracker, temp_dir)
    }

    fn set_motion(store: &StateStore, state: &str) {
        store.set(
            EntityId::new("binary_sensor", "kitchen_motion").unwrap(),
            state,
            HashMap::new(),
        );
    }

    #[tokio::test]
    async fn test_motion_detects_movement() {
        let (store, tracker, _dir) = make_test_tracker();
        set_motion(&store, "on");

        assert_eq!(tracker.evaluate_activity("kitchen"), "movement");
        assert_eq!(tracker.get_activity("kitchen"), "movement");
    }

    #[tokio::test]
    async fn test_unknown_area_is_empty() {
        let (_store, tracker, _dir) = make_test_tracker();
        assert_eq!(tracker.get_activity("attic"), ACTIVITY_EMPTY);
    }

    #[tokio::test]
    async fn test_immediate_transition_when_no_timeout() {
        let (store, tracker, _dir) = make_test_tracker();
        set_motion(&store, "on");
        assert_eq!(tracker.evaluate_activity("kitchen"), "movement");

        // movement has timeout 0, so losing its conditions transitions
        // straight to inactive
        set_motion(&store, "off");
        assert_eq!(tracker.evaluate_activity("kitchen"), "inactive");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_state_times_out_to_empty() {
        let (store, tracker, _dir) = make_test_tracker();
        let mut transitions = tracker.subscribe_transitions();

        set_motion(&store, "on");
        tracker.evaluate_activity("kitchen");
        set_motion(&store, "off");
        assert_eq!(tracker.evaluate_activity("kitchen"), "inactive");

        // Let the spawned timer task register its deadline before jumping
        tokio::task::yield_now().await;

        // inactive carries a 60s timeout chaining to empty
        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(tracker.get_activity("kitchen"), ACTIVITY_EMPTY);
        assert_eq!(transitions.recv().await.unwrap(), "kitchen");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reevaluation_does_not_cancel_transition_timer() {
        let (store, tracker, _dir) = make_test_tracker();

        set_motion(&store, "on");
        tracker.evaluate_activity("kitchen");
        set_motion(&store, "off");
        assert_eq!(tracker.evaluate_activity("kitchen"), "inactive");
        tokio::task::yield_now().await;

        // Re-evaluating while in a transition state must leave the timer alone
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(tracker.evaluate_activity("kitchen"), "inactive");

        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.get_activity("kitchen"), ACTIVITY_EMPTY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_threshold_reports_baseline_while_pending() {
        let (store, tracker, _dir) = make_test_tracker();
        let mut activities = test_activities();
        activities.push(ActivityDef {
            activity_id: "occupied".to_string(),
            detection_conditions: vec![motion_condition()],
            duration_threshold_seconds: 60,
            ..ActivityDef::empty("occupied")
        });
        // Put occupied ahead of movement so it gets first chance
        activities.swap(1, 3);
        tracker.load_activities(activities);

        set_motion(&store, "on");
        assert_eq!(tracker.evaluate_activity("kitchen"), ACTIVITY_EMPTY);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tracker.evaluate_activity("kitchen"), "occupied");
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_activity_with_expiry() {
        let (_store, tracker, _dir) = make_test_tracker();

        assert!(tracker.simulate_activity("kitchen", "movement", Some(Duration::from_secs(10))));
        assert_eq!(tracker.get_activity("kitchen"), "movement");
        assert!(tracker.is_simulated("kitchen"));
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.get_activity("kitchen"), ACTIVITY_EMPTY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_pending_timers() {
        let (store, tracker, _dir) = make_test_tracker();

        set_motion(&store, "on");
        tracker.evaluate_activity("kitchen");
        set_motion(&store, "off");
        assert_eq!(tracker.evaluate_activity("kitchen"), "inactive");
        tokio::task::yield_now().await;

        tracker.shutdown();

        // The 60s inactive timer must not fire after shutdown
        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.get_activity("kitchen"), "inactive");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_simulation_expiry() {
        let (_store, tracker, _dir) = make_test_tracker();

        assert!(tracker.simulate_activity("kitchen", "movement", Some(Duration::from_secs(10))));
        tokio::task::yield_now().await;

        tracker.shutdown();

        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.get_activity("kitchen"), "movement");
        assert!(tracker.is_simulated("kitchen"));
    }

    #[tokio::test]
    async fn test_simulate_unknown_activity_rejected() {
        let (_store, tracker, _dir) = make_test_tracker();
        assert!(!tracker.simulate_activity("kitchen", "party", None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_state_loss() {
        let (store, tracker, _dir) = make_test_tracker();

        set_motion(&store, "on");
        tracker.evaluate_activity("kitchen");
        set_motion(&store, "off");
        tracker.evaluate_activity("kitchen");

        // inactive has a 60s timeout
        let remaining = tracker.time_until_state_loss("kitchen").unwrap();
        assert!(remaining <= Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(30)).await;
        let remaining = tracker.time_until_state_loss("kitchen").unwrap();
        assert!(remaining <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_load_activities_empty_falls_back() {
        let (_store, tracker, _dir) = make_test_tracker();
        tracker.load_activities(Vec::new());

        let defs = tracker.activity_defs();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].activity_id, ACTIVITY_EMPTY);
    }
}
