//! Autoflow server
//!
//! Wires the automation pipeline together: state store, registries,
//! templates, activity tracking, and the rule engine, with an optional
//! remote catalog sync.

mod config;

use af_automation::{
    ActionExecutor, ActivityTracker, AppStorage, ConditionEvaluator, EntityResolver,
    EnvironmentProvider, FeatureGate, HttpRemoteClient, RemoteClient, RuleEngine,
    SwitchFeatureGate,
};
use af_core::EntityId;
use af_registries::{Registries, Storable, Storage};
use af_service_registry::ServiceRegistry;
use af_state_store::StateStore;
use af_template::TemplateEngine;
use anyhow::{Context, Result};
use config::ServerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Persisted server identity, created on first start
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstanceInfo {
    instance_id: String,
}

impl Storable for InstanceInfo {
    const KEY: &'static str = "autoflow.instance";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Load the instance id, generating and persisting one when missing
async fn instance_id(storage: &Storage) -> Result<String> {
    if let Some(file) = storage.load::<InstanceInfo>(InstanceInfo::KEY).await? {
        return Ok(file.data.instance_id);
    }

    let info = InstanceInfo {
        instance_id: uuid::Uuid::new_v4().to_string(),
    };
    storage.save(&info.to_storage_file()).await?;
    info!(instance_id = %info.instance_id, "Generated new instance id");
    Ok(info.instance_id)
}

/// Register light services that reflect the call back into the state store
///
/// Stands in for real device integrations so the engine's actions have an
/// observable effect.
fn register_light_services(services: &ServiceRegistry, store: &Arc<StateStore>) {
    for (service, state) in [("turn_on", "on"), ("turn_off", "off")] {
        let store = Arc::clone(store);
        services.register("light", service, move |call| {
            let store = Arc::clone(&store);
            async move {
                for entity_id in call.entity_ids() {
                    match entity_id
                        .split_once('.')
                        .and_then(|(d, o)| EntityId::new(d, o).ok())
                    {
                        Some(id) => {
                            store.set(id, state, HashMap::new());
                        }
                        None => warn!(entity_id, "Ignoring invalid entity id in service call"),
                    }
                }
                Ok(())
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("autoflow.yaml"));
    let config = ServerConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(config = %config_path.display(), "Starting autoflow");

    let store = Arc::new(StateStore::new());
    let registries = Arc::new(Registries::new(&config.config_dir));
    registries
        .load_all()
        .await
        .context("loading registries")?;

    let instance_id = instance_id(&registries.storage).await?;

    let remote: Option<Arc<dyn RemoteClient>> = match &config.remote {
        Some(remote) => Some(Arc::new(
            HttpRemoteClient::new(&remote.url, &remote.api_key)
                .context("building remote client")?,
        )),
        None => {
            info!("No remote configured, running from local catalog only");
            None
        }
    };

    let templates = Arc::new(TemplateEngine::new(Arc::clone(&store)));
    let resolver = Arc::new(EntityResolver::new(
        Arc::clone(&store),
        Arc::clone(&registries),
    ));
    let environment = Arc::new(EnvironmentProvider::new(
        Arc::clone(&store),
        Arc::clone(&registries),
    ));
    let evaluator = Arc::new(ConditionEvaluator::new(
        Arc::clone(&store),
        templates,
        Arc::clone(&resolver),
        Arc::clone(&environment),
    ));
    let tracker = Arc::new(ActivityTracker::new(Arc::clone(&evaluator)));
    evaluator.set_activity_tracker(&tracker);

    let services = Arc::new(ServiceRegistry::new());
    register_light_services(&services, &store);

    let executor = Arc::new(ActionExecutor::new(
        Arc::clone(&resolver),
        Arc::clone(&services),
        Arc::clone(&store),
    ));

    let storage = Arc::new(AppStorage::new(Arc::clone(&registries.storage)));
    match &remote {
        Some(client) => storage.initialize(client.as_ref(), &instance_id).await,
        None => {
            storage.load().await;
            if storage.is_empty().await {
                info!("Local catalog empty, engine will install the fallback");
            }
        }
    }

    let features: Arc<dyn FeatureGate> = Arc::new(SwitchFeatureGate::new(Arc::clone(&store)));

    let engine = Arc::new(RuleEngine::new(
        Arc::clone(&store),
        Arc::clone(&registries),
        Arc::clone(&storage),
        tracker,
        evaluator,
        resolver,
        environment,
        executor,
        features,
        remote.clone(),
        instance_id,
    ));

    engine.initialize().await;
    engine.start();

    if remote.is_some() && config.refresh_interval_seconds > 0 {
        let engine = Arc::clone(&engine);
        let interval = config.refresh_interval_seconds;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !engine.refresh_activities().await {
                    warn!("Activity refresh failed, keeping current definitions");
                }
            }
        });
    }

    info!("Autoflow is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    engine.stop();
    if let Err(e) = storage.save().await {
        warn!(error = %e, "Failed to persist catalog on shutdown");
    }
    registries.save_all().await.context("saving registries")?;

    Ok(())
}
