//! App-based automation engine
//!
//! Converts presence and environmental signals into per-area activities and
//! executes the matching app actions. The pipeline:
//!
//! 1. [`ActivityTracker`] runs a small state machine per area (movement,
//!    occupied, inactive, empty) driven by detection conditions and timers.
//! 2. [`RuleEngine`] watches tracked entities, debounces bursts, picks the
//!    action bundle for the current activity from the assigned [`App`], and
//!    gates it with conditions and cooldowns.
//! 3. [`ActionExecutor`] resolves generic targets to concrete entities and
//!    calls the services.
//!
//! The catalog of activities, apps, and assignments lives in [`AppStorage`],
//! synced from a remote via [`RemoteClient`] with a built-in fallback.

pub mod activity;
pub mod condition;
pub mod defaults;
pub mod engine;
pub mod environment;
pub mod eval;
pub mod executor;
pub mod model;
pub mod remote;
pub mod resolver;
pub mod storage;

pub use activity::{ActivityTracker, ACTIVITY_EMPTY};
pub use condition::{Condition, ConditionError, ConditionResult, Target};
pub use defaults::{default_activities, default_autolight_app, AUTOLIGHT_APP_ID};
pub use engine::{
    AllowAllFeatures, EngineStats, FeatureGate, LastAction, RuleEngine, SwitchFeatureGate,
    COOLDOWN_ENVIRONMENTAL_SECONDS, COOLDOWN_SECONDS, DEBOUNCE_SECONDS,
};
pub use environment::{EnvSnapshot, EnvironmentProvider, DARK_LUX_THRESHOLD};
pub use eval::ConditionEvaluator;
pub use executor::{ActionContext, ActionExecutor, ActionRunner};
pub use model::{Action, ActionBundle, ActivityDef, App, AppsData, AreaAssignment, Logic};
pub use remote::{HttpRemoteClient, RemoteClient, RemoteError, RemoteResult};
pub use resolver::{EntityResolver, ResolveStrategy};
pub use storage::AppStorage;
