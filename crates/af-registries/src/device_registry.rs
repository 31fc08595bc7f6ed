//! Device Registry
//!
//! Tracks registered devices and their area assignments. Entities without a
//! direct area assignment inherit the area of their device.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageFile, StorageResult};

/// Storage key for device registry
pub const STORAGE_KEY: &str = "autoflow.device_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// A device identifier (domain, id) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }

    /// Create a key for indexing
    pub fn key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

/// A registered device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Internal id
    pub id: String,

    /// Unique identifiers by domain (e.g., [["zha", "00:11:22"]])
    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifier>,

    /// Device name
    pub name: String,

    /// Manufacturer name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Assigned area
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last modified timestamp
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    /// Create a new device entry
    pub fn new(name: impl Into<String>, identifiers: Vec<DeviceIdentifier>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            identifiers,
            name: name.into(),
            manufacturer: None,
            model: None,
            area_id: None,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Device registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    /// All registered devices
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Device Registry
///
/// Entries are stored as `Arc<DeviceEntry>` to avoid cloning on reads.
pub struct DeviceRegistry {
    /// Storage backend
    storage: Arc<Storage>,

    /// Primary index: device_id -> DeviceEntry (Arc-wrapped)
    by_id: DashMap<String, Arc<DeviceEntry>>,

    /// Index: identifier key -> device_id
    by_identifier: DashMap<String, String>,

    /// Index: area_id -> set of device_ids
    by_area_id: DashMap<String, HashSet<String>>,
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
            by_identifier: DashMap::new(),
            by_area_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<DeviceRegistryData>(STORAGE_KEY).await? {
            info!(
                "Loading {} devices from storage (v{}.{})",
                storage_file.data.devices.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.devices {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = DeviceRegistryData {
            devices: self.by_id.iter().map(|r| (**r.value()).clone()).collect(),
        };

        let storage_file =
            StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION, STORAGE_MINOR_VERSION);

        self.storage.save(&storage_file).await?;
        debug!("Saved {} devices to storage", self.by_id.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<DeviceEntry>) {
        let device_id = entry.id.clone();

        for identifier in &entry.identifiers {
            self.by_identifier
                .insert(identifier.key(), device_id.clone());
        }

        if let Some(ref area_id) = entry.area_id {
            self.by_area_id
                .entry(area_id.clone())
                .or_default()
                .insert(device_id.clone());
        }

        self.by_id.insert(device_id, entry);
    }

    fn unindex_entry(&self, entry: &DeviceEntry) {
        for identifier in &entry.identifiers {
            self.by_identifier.remove(&identifier.key());
        }

        if let Some(ref area_id) = entry.area_id {
            if let Some(mut ids) = self.by_area_id.get_mut(area_id) {
                ids.remove(&entry.id);
            }
        }

        self.by_id.remove(&entry.id);
    }

    /// Get device by ID
    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| Arc::clone(r.value()))
    }

    /// Get device by identifier
    pub fn get_by_identifier(&self, identifier: &DeviceIdentifier) -> Option<Arc<DeviceEntry>> {
        self.by_identifier
            .get(&identifier.key())
            .and_then(|device_id| self.get(&device_id))
    }

    /// Get all devices in an area
    pub fn get_by_area_id(&self, area_id: &str) -> Vec<Arc<DeviceEntry>> {
        self.by_area_id
            .get(area_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Register a new device
    pub fn create(&self, name: &str, identifiers: Vec<DeviceIdentifier>) -> Arc<DeviceEntry> {
        let entry = DeviceEntry::new(name, identifiers);
        let arc_entry = Arc::new(entry);
        info!("Created device: {} ({})", name, arc_entry.id);
        self.index_entry(Arc::clone(&arc_entry));
        arc_entry
    }

    /// Insert an externally built entry
    pub fn insert(&self, entry: DeviceEntry) -> Arc<DeviceEntry> {
        let arc_entry = Arc::new(entry);
        self.index_entry(Arc::clone(&arc_entry));
        arc_entry
    }

    /// Update a device
    pub fn update<F>(&self, device_id: &str, f: F) -> Option<Arc<DeviceEntry>>
    where
        F: FnOnce(&mut DeviceEntry),
    {
        // Remove first to avoid deadlock
        if let Some((_, arc_entry)) = self.by_id.remove(device_id) {
            let mut entry = (*arc_entry).clone();

            for identifier in &entry.identifiers {
                self.by_identifier.remove(&identifier.key());
            }
            if let Some(ref area_id) = entry.area_id {
                if let Some(mut ids) = self.by_area_id.get_mut(area_id) {
                    ids.remove(&entry.id);
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

    /// Remove a device
    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        if let Some(arc_entry) = self.get(device_id) {
            self.unindex_entry(&arc_entry);
            info!("Removed device: {}", device_id);
            Some(arc_entry)
        } else {
            None
        }
    }

    /// Get count of devices
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_identifier_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let registry = DeviceRegistry::new(Arc::new(Storage::new(temp_dir.path())));

        let ident = DeviceIdentifier::new("zha", "00:11:22:33");
        let device = registry.create("Hall Motion Sensor", vec![ident.clone()]);

        assert_eq!(registry.get_by_identifier(&ident).unwrap().id, device.id);
    }

    #[tokio::test]
    async fn test_area_index_follows_update() {
        let temp_dir = TempDir::new().unwrap();
        let registry = DeviceRegistry::new(Arc::new(Storage::new(temp_dir.path())));

        let device = registry.create("Lamp", vec![]);
        registry.update(&device.id, |d| d.area_id = Some("kitchen".to_string()));

        assert_eq!(registry.get_by_area_id("kitchen").len(), 1);

        registry.update(&device.id, |d| d.area_id = Some("hallway".to_string()));
        assert!(registry.get_by_area_id("kitchen").is_empty());
        assert_eq!(registry.get_by_area_id("hallway").len(), 1);
    }
}
