//! App catalog storage
//!
//! Three-tier, remote-first persistence for activities, apps, and area
//! assignments:
//!
//! 1. Remote catalog, the source of truth. A successful sync always
//!    replaces the local data, even when the remote is empty.
//! 2. Local cache in `.storage/`, kept for offline starts. A failed or
//!    timed-out sync preserves whatever is cached.
//! 3. Built-in fallback, loaded only when remote and cache are both empty.

use crate::defaults;
use crate::model::{ActivityDef, App, AppsData, AreaAssignment};
use crate::remote::{RemoteClient, RemoteResult, HTTP_TIMEOUT};
use af_registries::{Storable, Storage, StorageResult};
use chrono::Utc;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Storage for the app catalog
pub struct AppStorage {
    storage: Arc<Storage>,
    data: RwLock<AppsData>,
}

impl AppStorage {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            data: RwLock::new(AppsData::default()),
        }
    }

    /// Full load sequence: local cache, then remote sync, then fallback
    /// if everything is still empty
    pub async fn initialize(&self, client: &dyn RemoteClient, instance_id: &str) {
        self.load().await;
        self.sync_from_remote(client, instance_id).await;

        let mut data = self.data.write().await;
        if data.is_empty() {
            warn!("Catalog still empty after sync, loading fallback");
            load_fallback(&mut data);
            drop(data);
            if let Err(e) = self.save().await {
                warn!(error = %e, "Failed to persist fallback catalog");
            }
        }
    }

    /// Load the catalog from the local cache
    ///
    /// A missing file or a major version mismatch leaves the current
    /// (empty) data in place.
    pub async fn load(&self) {
        match self.storage.load::<AppsData>(AppsData::KEY).await {
            Ok(Some(file)) => {
                if file.version != AppsData::VERSION {
                    warn!(
                        found = file.version,
                        expected = AppsData::VERSION,
                        "Cache version mismatch, discarding"
                    );
                    return;
                }

                info!(
                    activities = file.data.activities.len(),
                    apps = file.data.apps.len(),
                    assignments = file.data.assignments.len(),
                    "Loaded catalog from cache"
                );
                *self.data.write().await = file.data;
            }
            Ok(None) => debug!("No local catalog cache"),
            Err(e) => warn!(error = %e, "Failed to load catalog cache"),
        }
    }

    /// Persist the catalog to the local cache
    pub async fn save(&self) -> StorageResult<()> {
        let file = self.data.read().await.to_storage_file();
        self.storage.save(&file).await?;
        debug!("Saved catalog to cache");
        Ok(())
    }

    /// Sync the catalog from the remote, bounded by [`HTTP_TIMEOUT`]
    ///
    /// Success replaces the local data even when the remote is empty; an
    /// empty catalog is a valid remote state. Failure or timeout keeps the
    /// local data. In either case the fallback is loaded when the result
    /// would leave the catalog completely empty.
    pub async fn sync_from_remote(&self, client: &dyn RemoteClient, instance_id: &str) -> bool {
        info!("Syncing catalog from remote");

        match tokio::time::timeout(HTTP_TIMEOUT, fetch_catalog(client, instance_id)).await {
            Ok(Ok(fetched)) => {
                let mut data = self.data.write().await;
                *data = fetched;

                if data.is_empty() {
                    info!("Remote catalog empty, loading fallback");
                    load_fallback(&mut data);
                }

                info!(
                    activities = data.activities.len(),
                    apps = data.apps.len(),
                    assignments = data.assignments.len(),
                    "Remote sync succeeded"
                );
                drop(data);

                if let Err(e) = self.save().await {
                    warn!(error = %e, "Failed to persist synced catalog");
                }
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Remote sync failed");
                self.fallback_if_empty().await;
                false
            }
            Err(_) => {
                warn!(timeout = ?HTTP_TIMEOUT, "Remote sync timed out");
                self.fallback_if_empty().await;
                false
            }
        }
    }

    /// Re-fetch only the activity definitions the current apps reference,
    /// bounded by [`HTTP_TIMEOUT`]
    ///
    /// Apps and assignments are left untouched, so timeout and threshold
    /// tuning arrives without rewriting the rest of the catalog. Failure,
    /// timeout, or an empty response keeps the current definitions.
    pub async fn refresh_activities(&self, client: &dyn RemoteClient) -> bool {
        let activity_ids: Vec<String> = {
            let data = self.data.read().await;
            let mut ids: Vec<String> = Vec::new();
            for app in data.apps.values() {
                for activity_id in app.activity_actions.keys() {
                    if !ids.contains(activity_id) {
                        ids.push(activity_id.clone());
                    }
                }
            }
            ids
        };

        if activity_ids.is_empty() {
            debug!("No app-referenced activities to refresh");
            return false;
        }

        match tokio::time::timeout(HTTP_TIMEOUT, client.fetch_activity_types(&activity_ids)).await
        {
            Ok(Ok(activities)) if !activities.is_empty() => {
                {
                    let mut data = self.data.write().await;
                    data.activities = activities;
                    data.synced_at = Some(Utc::now());
                    info!(
                        activities = data.activities.len(),
                        "Refreshed activity definitions"
                    );
                }

                if let Err(e) = self.save().await {
                    warn!(error = %e, "Failed to persist refreshed activities");
                }
                true
            }
            Ok(Ok(_)) => {
                warn!("Remote returned no activities, keeping current definitions");
                false
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Activity refresh failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?HTTP_TIMEOUT, "Activity refresh timed out");
                false
            }
        }
    }

    async fn fallback_if_empty(&self) {
        let mut data = self.data.write().await;
        if data.is_empty() {
            info!("No local catalog, loading fallback");
            load_fallback(&mut data);
            drop(data);
            if let Err(e) = self.save().await {
                warn!(error = %e, "Failed to persist fallback catalog");
            }
        }
    }

    /// All activity definitions, in priority order
    pub async fn activities(&self) -> Vec<ActivityDef> {
        self.data.read().await.activities.clone()
    }

    /// Look up an activity definition
    pub async fn activity(&self, activity_id: &str) -> Option<ActivityDef> {
        self.data.read().await.activity(activity_id).cloned()
    }

    /// All apps by app id
    pub async fn apps(&self) -> IndexMap<String, App> {
        self.data.read().await.apps.clone()
    }

    /// Look up an app
    pub async fn app(&self, app_id: &str) -> Option<App> {
        self.data.read().await.apps.get(app_id).cloned()
    }

    /// All area assignments
    pub async fn assignments(&self) -> IndexMap<String, AreaAssignment> {
        self.data.read().await.assignments.clone()
    }

    /// Assignment of an area
    pub async fn assignment(&self, area_id: &str) -> Option<AreaAssignment> {
        self.data.read().await.assignments.get(area_id).cloned()
    }

    /// Insert or replace an activity definition, preserving its position
    pub async fn set_activity(&self, def: ActivityDef) {
        let mut data = self.data.write().await;
        match data
            .activities
            .iter_mut()
            .find(|a| a.activity_id == def.activity_id)
        {
            Some(existing) => *existing = def,
            None => data.activities.push(def),
        }
    }

    /// Insert or replace an app
    pub async fn set_app(&self, app: App) {
        self.data.write().await.apps.insert(app.app_id.clone(), app);
    }

    /// Insert or replace an area assignment
    pub async fn set_assignment(&self, assignment: AreaAssignment) {
        self.data
            .write()
            .await
            .assignments
            .insert(assignment.area_id.clone(), assignment);
    }

    /// Remove an area assignment
    pub async fn remove_assignment(&self, area_id: &str) -> bool {
        self.data
            .write()
            .await
            .assignments
            .shift_remove(area_id)
            .is_some()
    }

    /// True when there are no activities, apps, or assignments
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// True when the catalog came from the built-in fallback
    pub async fn is_fallback(&self) -> bool {
        self.data.read().await.is_fallback
    }

    /// Last successful remote sync time
    pub async fn synced_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.data.read().await.synced_at
    }
}

fn load_fallback(data: &mut AppsData) {
    let app = defaults::default_autolight_app();

    *data = AppsData {
        activities: defaults::default_activities(),
        apps: IndexMap::from([(app.app_id.clone(), app)]),
        assignments: IndexMap::new(),
        synced_at: None,
        is_fallback: true,
    };

    warn!(
        activities = data.activities.len(),
        "Using built-in fallback catalog"
    );
}

/// Fetch the instance-scoped catalog: its assignments, the apps those
/// assignments reference, and the activities those apps reference
async fn fetch_catalog(client: &dyn RemoteClient, instance_id: &str) -> RemoteResult<AppsData> {
    let assignments = client.fetch_area_assignments(instance_id).await?;

    let mut apps = IndexMap::new();
    let mut activity_ids: Vec<String> = Vec::new();

    for assignment in assignments.values() {
        if apps.contains_key(&assignment.app_id) {
            continue;
        }

        if let Some(app) = client.fetch_app_with_actions(&assignment.app_id).await? {
            for activity_id in app.activity_actions.keys() {
                if !activity_ids.contains(activity_id) {
                    activity_ids.push(activity_id.clone());
                }
            }
            apps.insert(assignment.app_id.clone(), app);
        }
    }

    let activities = if activity_ids.is_empty() {
        Vec::new()
    } else {
        client.fetch_activity_types(&activity_ids).await?
    };

    Ok(AppsData {
        activities,
        apps,
        assignments,
        synced_at: Some(Utc::now()),
        is_fallback: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Remote double: either fails every call or serves a fixed catalog
    struct MockRemote {
        fail: bool,
        assignments: IndexMap<String, AreaAssignment>,
        apps: IndexMap<String, App>,
        activities: Vec<ActivityDef>,
    }

    impl MockRemote {
        fn failing() -> Self {
            Self {
                fail: true,
                assignments: IndexMap::new(),
                apps: IndexMap::new(),
                activities: Vec::new(),
            }
        }

        fn empty() -> Self {
            Self {
                fail: false,
                assignments: IndexMap::new(),
                apps: IndexMap::new(),
                activities: Vec::new(),
            }
        }

        fn with_catalog() -> Self {
            let app = defaults::default_autolight_app();
            Self {
                fail: false,
                assignments: IndexMap::from([(
                    "kitchen".to_string(),
                    AreaAssignment {
                        area_id: "kitchen".to_string(),
                        app_id: app.app_id.clone(),
                        enabled: true,
                        created_at: Some(Utc::now()),
                        is_default: false,
                    },
                )]),
                apps: IndexMap::from([(app.app_id.clone(), app)]),
                activities: defaults::default_activities(),
            }
        }
    }

    #[async_trait]
    impl RemoteClient for MockRemote {
        async fn fetch_area_assignments(
            &self,
            _instance_id: &str,
        ) -> RemoteResult<IndexMap<String, AreaAssignment>> {
            if self.fail {
                return Err(RemoteError::UnexpectedResponse("mock failure".into()));
            }
            Ok(self.assignments.clone())
        }

        async fn fetch_app_with_actions(&self, app_id: &str) -> RemoteResult<Option<App>> {
            if self.fail {
                return Err(RemoteError::UnexpectedResponse("mock failure".into()));
            }
            Ok(self.apps.get(app_id).cloned())
        }

        async fn fetch_activity_types(
            &self,
            activity_ids: &[String],
        ) -> RemoteResult<Vec<ActivityDef>> {
            if self.fail {
                return Err(RemoteError::UnexpectedResponse("mock failure".into()));
            }
            Ok(self
                .activities
                .iter()
                .filter(|a| activity_ids.contains(&a.activity_id))
                .cloned()
                .collect())
        }

        async fn save_area_assignment(
            &self,
            _instance_id: &str,
            _assignment: &AreaAssignment,
        ) -> RemoteResult<()> {
            if self.fail {
                return Err(RemoteError::UnexpectedResponse("mock failure".into()));
            }
            Ok(())
        }
    }

    fn make_storage(dir: &TempDir) -> AppStorage {
        AppStorage::new(Arc::new(Storage::new(dir.path())))
    }

    #[tokio::test]
    async fn test_remote_catalog_replaces_local() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);

        storage.set_app(App {
            app_id: "stale".to_string(),
            app_name: None,
            description: None,
            required_domains: vec![],
            recommended_sensors: vec![],
            created_by: None,
            activity_actions: IndexMap::new(),
        }).await;

        assert!(storage.sync_from_remote(&MockRemote::with_catalog(), "inst-1").await);

        assert!(storage.app("stale").await.is_none());
        assert!(storage.app(defaults::AUTOLIGHT_APP_ID).await.is_some());
        assert!(!storage.is_fallback().await);
        assert_eq!(storage.activities().await.len(), 3);
        assert!(storage.assignment("kitchen").await.is_some());
    }

    #[tokio::test]
    async fn test_empty_remote_clears_local_and_loads_fallback() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);

        storage.set_assignment(AreaAssignment {
            area_id: "kitchen".to_string(),
            app_id: "stale".to_string(),
            enabled: true,
            created_at: None,
            is_default: false,
        }).await;

        assert!(storage.sync_from_remote(&MockRemote::empty(), "inst-1").await);

        // Local assignment was cleared by the (valid) empty remote state,
        // then the fallback filled the catalog back in
        assert!(storage.assignment("kitchen").await.is_none());
        assert!(storage.is_fallback().await);
        assert!(storage.app(defaults::AUTOLIGHT_APP_ID).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_sync_preserves_local() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);

        storage.set_assignment(AreaAssignment {
            area_id: "kitchen".to_string(),
            app_id: "autolight".to_string(),
            enabled: true,
            created_at: None,
            is_default: false,
        }).await;

        assert!(!storage.sync_from_remote(&MockRemote::failing(), "inst-1").await);

        assert!(storage.assignment("kitchen").await.is_some());
        assert!(!storage.is_fallback().await);
    }

    #[tokio::test]
    async fn test_failed_sync_with_no_local_loads_fallback() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);

        assert!(!storage.sync_from_remote(&MockRemote::failing(), "inst-1").await);

        assert!(storage.is_fallback().await);
        assert!(!storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();

        {
            let storage = make_storage(&dir);
            storage.initialize(&MockRemote::failing(), "inst-1").await;
            assert!(storage.is_fallback().await);
        }

        let storage = make_storage(&dir);
        storage.load().await;
        assert!(!storage.is_empty().await);
        assert_eq!(storage.activities().await.len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_activities_updates_definitions_only() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);
        storage
            .initialize(&MockRemote::with_catalog(), "inst-1")
            .await;

        // The catalog retunes a timeout; apps and assignments are unchanged
        let mut remote = MockRemote::with_catalog();
        for def in &mut remote.activities {
            if def.activity_id == "inactive" {
                def.timeout_seconds = 120;
            }
        }

        assert!(storage.refresh_activities(&remote).await);

        let inactive = storage.activity("inactive").await.unwrap();
        assert_eq!(inactive.timeout_seconds, 120);
        assert!(storage.assignment("kitchen").await.is_some());
        assert!(storage.app(defaults::AUTOLIGHT_APP_ID).await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_activities_failure_keeps_current() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);
        storage
            .initialize(&MockRemote::with_catalog(), "inst-1")
            .await;

        let before = storage.activities().await;
        assert!(!storage.refresh_activities(&MockRemote::failing()).await);
        assert_eq!(storage.activities().await.len(), before.len());
        assert!(storage.activity("inactive").await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_activities_without_apps_is_noop() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);

        assert!(!storage.refresh_activities(&MockRemote::with_catalog()).await);
        assert!(storage.activities().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_activity_preserves_order() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);

        for def in defaults::default_activities() {
            storage.set_activity(def).await;
        }

        let mut updated = defaults::default_activities().swap_remove(1);
        updated.timeout_seconds = 5;
        storage.set_activity(updated).await;

        let activities = storage.activities().await;
        assert_eq!(activities[1].activity_id, "movement");
        assert_eq!(activities[1].timeout_seconds, 5);
        assert_eq!(activities.len(), 4);
    }
}
