//! Entity Registry
//!
//! Tracks registered entities with device linking, area assignment and
//! device-class metadata. The engine resolves generic selectors like
//! "all motion sensors in the kitchen" against this registry.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageFile, StorageResult};

/// Storage key for entity registry
pub const STORAGE_KEY: &str = "autoflow.entity_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Reason an entity was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBy {
    /// Disabled by the integration
    Integration,
    /// Disabled by the user
    User,
}

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal id
    pub id: String,
    /// Full entity ID (domain.object_id)
    pub entity_id: String,
    /// Platform-specific unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Parent device ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Component/platform that provides this entity
    pub platform: String,

    /// Device class (e.g., "motion", "illuminance")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    /// Platform default device class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_device_class: Option<String>,

    /// Disable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<DisabledBy>,

    /// Assigned area (overrides the device's area)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last modified timestamp
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    /// Create a new entity entry with minimal required fields
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            unique_id,
            device_id: None,
            platform: platform.into(),
            device_class: None,
            original_device_class: None,
            disabled_by: None,
            area_id: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Get the domain from entity_id
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or(&self.entity_id)
    }

    /// Check if entity is disabled
    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    /// Effective device class: the user override, or the platform default
    pub fn effective_device_class(&self) -> Option<&str> {
        self.device_class
            .as_deref()
            .or(self.original_device_class.as_deref())
    }
}

/// Entity registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    /// All registered entities
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Entity Registry
///
/// Entries are stored as `Arc<EntityEntry>` to avoid cloning on reads.
pub struct EntityRegistry {
    /// Storage backend
    storage: Arc<Storage>,

    /// Primary index: entity_id -> EntityEntry (Arc-wrapped)
    by_entity_id: DashMap<String, Arc<EntityEntry>>,

    /// Index: area_id -> set of entity_ids
    by_area_id: DashMap<String, HashSet<String>>,

    /// Index: device_id -> set of entity_ids
    by_device_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    /// Create a new entity registry
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: DashMap::new(),
            by_area_id: DashMap::new(),
            by_device_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<EntityRegistryData>(STORAGE_KEY).await? {
            info!(
                "Loading {} entities from storage (v{}.{})",
                storage_file.data.entities.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = EntityRegistryData {
            entities: self
                .by_entity_id
                .iter()
                .map(|r| (**r.value()).clone())
                .collect(),
        };

        let storage_file =
            StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION, STORAGE_MINOR_VERSION);

        self.storage.save(&storage_file).await?;
        debug!("Saved {} entities to storage", self.by_entity_id.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        if let Some(ref area_id) = entry.area_id {
            self.by_area_id
                .entry(area_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Some(ref device_id) = entry.device_id {
            self.by_device_id
                .entry(device_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        self.by_entity_id.insert(entity_id, entry);
    }

    fn unindex_entry(&self, entry: &EntityEntry) {
        if let Some(ref area_id) = entry.area_id {
            if let Some(mut ids) = self.by_area_id.get_mut(area_id) {
                ids.remove(&entry.entity_id);
            }
        }

        if let Some(ref device_id) = entry.device_id {
            if let Some(mut ids) = self.by_device_id.get_mut(device_id) {
                ids.remove(&entry.entity_id);
            }
        }

        self.by_entity_id.remove(&entry.entity_id);
    }

    /// Get entity by entity_id
    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .get(entity_id)
            .map(|r| Arc::clone(r.value()))
    }

    /// Get all entities directly assigned to an area
    pub fn get_by_area_id(&self, area_id: &str) -> Vec<Arc<EntityEntry>> {
        self.by_area_id
            .get(area_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get all entities belonging to a device
    pub fn get_by_device_id(&self, device_id: &str) -> Vec<Arc<EntityEntry>> {
        self.by_device_id
            .get(device_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Register a new entity, or return the existing entry
    pub fn get_or_create(
        &self,
        entity_id: &str,
        platform: &str,
        unique_id: Option<String>,
    ) -> Arc<EntityEntry> {
        if let Some(existing) = self.get(entity_id) {
            return existing;
        }

        let entry = EntityEntry::new(entity_id, platform, unique_id);
        let arc_entry = Arc::new(entry);
        debug!("Registered entity: {}", entity_id);
        self.index_entry(Arc::clone(&arc_entry));
        arc_entry
    }

    /// Insert an externally built entry
    pub fn insert(&self, entry: EntityEntry) -> Arc<EntityEntry> {
        let arc_entry = Arc::new(entry);
        self.index_entry(Arc::clone(&arc_entry));
        arc_entry
    }

    /// Update an entity
    pub fn update<F>(&self, entity_id: &str, f: F) -> Option<Arc<EntityEntry>>
    where
        F: FnOnce(&mut EntityEntry),
    {
        // Remove first to avoid deadlock
        if let Some((_, arc_entry)) = self.by_entity_id.remove(entity_id) {
            let mut entry = (*arc_entry).clone();

            if let Some(ref area_id) = entry.area_id {
                if let Some(mut ids) = self.by_area_id.get_mut(area_id) {
                    ids.remove(&entry.entity_id);
                }
            }
            if let Some(ref device_id) = entry.device_id {
                if let Some(mut ids) = self.by_device_id.get_mut(device_id) {
                    ids.remove(&entry.entity_id);
                }
            }

            f(&mut entry);
            entry.modified_at = Utc::now();

            let new_arc = Arc::new(entry);
            self.index_entry(Arc::clone(&new_arc));

            Some(new_arc)
        } else {
            None
        }
    }

    /// Remove an entity
    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        if let Some(arc_entry) = self.get(entity_id) {
            self.unindex_entry(&arc_entry);
            info!("Removed entity: {}", entity_id);
            Some(arc_entry)
        } else {
            None
        }
    }

    /// Get count of entities
    pub fn len(&self) -> usize {
        self.by_entity_id.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_entity_id.is_empty()
    }

    /// Iterate over all entities
    pub fn iter(&self) -> impl Iterator<Item = Arc<EntityEntry>> + '_ {
        self.by_entity_id.iter().map(|r| Arc::clone(r.value()))
    }
}
