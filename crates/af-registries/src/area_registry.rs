//! Area Registry
//!
//! Tracks all registered areas (rooms, zones) in the home.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageFile, StorageResult};

/// Storage key for area registry
pub const STORAGE_KEY: &str = "autoflow.area_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// A registered area entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaEntry {
    /// Internal id
    pub id: String,

    /// Area name (e.g., "Living Room")
    pub name: String,

    /// Normalized name for searching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_name: Option<String>,

    /// Area icon (e.g., "mdi:sofa")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Alternative names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last modified timestamp
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl AreaEntry {
    /// Create a new area entry
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            normalized_name: Some(normalize_name(&name)),
            name,
            icon: None,
            aliases: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Create a new area entry with a caller-chosen id (slug)
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: id.into(),
            normalized_name: Some(normalize_name(&name)),
            name,
            icon: None,
            aliases: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }
}

/// Normalize a name for searching
fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .trim()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ', "")
}

/// Area registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaRegistryData {
    /// All registered areas
    pub areas: Vec<AreaEntry>,
}

impl Storable for AreaRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Area Registry
///
/// Entries are stored as `Arc<AreaEntry>` to avoid cloning on reads.
pub struct AreaRegistry {
    /// Storage backend
    storage: Arc<Storage>,

    /// Primary index: area_id -> AreaEntry (Arc-wrapped)
    by_id: DashMap<String, Arc<AreaEntry>>,

    /// Index: normalized_name -> area_id
    by_name: DashMap<String, String>,
}

impl AreaRegistry {
    /// Create a new area registry
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
            by_name: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<AreaRegistryData>(STORAGE_KEY).await? {
            info!(
                "Loading {} areas from storage (v{}.{})",
                storage_file.data.areas.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.areas {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = AreaRegistryData {
            areas: self.by_id.iter().map(|r| (**r.value()).clone()).collect(),
        };

        let storage_file =
            StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION, STORAGE_MINOR_VERSION);

        self.storage.save(&storage_file).await?;
        debug!("Saved {} areas to storage", self.by_id.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<AreaEntry>) {
        let area_id = entry.id.clone();

        if let Some(ref normalized) = entry.normalized_name {
            self.by_name.insert(normalized.clone(), area_id.clone());
        }

        self.by_id.insert(area_id, entry);
    }

    /// Get area by ID
    pub fn get(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        self.by_id.get(area_id).map(|r| Arc::clone(r.value()))
    }

    /// Get area by name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<AreaEntry>> {
        let normalized = normalize_name(name);
        self.by_name
            .get(&normalized)
            .and_then(|area_id| self.get(&area_id))
    }

    /// Create a new area
    pub fn create(&self, name: &str) -> Arc<AreaEntry> {
        let entry = AreaEntry::new(name);
        let arc_entry = Arc::new(entry);
        info!("Created area: {} ({})", name, arc_entry.id);
        self.index_entry(Arc::clone(&arc_entry));
        arc_entry
    }

    /// Insert an externally built entry (e.g., slug-keyed areas from config)
    pub fn insert(&self, entry: AreaEntry) -> Arc<AreaEntry> {
        let arc_entry = Arc::new(entry);
        self.index_entry(Arc::clone(&arc_entry));
        arc_entry
    }

    /// Update an area
    pub fn update<F>(&self, area_id: &str, f: F) -> Option<Arc<AreaEntry>>
    where
        F: FnOnce(&mut AreaEntry),
    {
        // Remove first to avoid deadlock
        if let Some((_, arc_entry)) = self.by_id.remove(area_id) {
            let mut entry = (*arc_entry).clone();

            if let Some(ref normalized) = entry.normalized_name {
                self.by_name.remove(normalized);
            }

            f(&mut entry);
            entry.normalized_name = Some(normalize_name(&entry.name));
            entry.modified_at = Utc::now();

            let new_arc = Arc::new(entry);
            self.index_entry(Arc::clone(&new_arc));

            Some(new_arc)
        } else {
            None
        }
    }

    /// Remove an area
    pub fn remove(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        if let Some((_, arc_entry)) = self.by_id.remove(area_id) {
            if let Some(ref normalized) = arc_entry.normalized_name {
                self.by_name.remove(normalized);
            }
            info!("Removed area: {}", area_id);
            Some(arc_entry)
        } else {
            None
        }
    }

    /// Get count of areas
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All area ids, sorted for deterministic iteration
    pub fn area_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_id.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Iterate over all areas
    pub fn iter(&self) -> impl Iterator<Item = Arc<AreaEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_get_by_name() {
        let temp_dir = TempDir::new().unwrap();
        let registry = AreaRegistry::new(Arc::new(Storage::new(temp_dir.path())));

        let area = registry.create("Living Room");
        assert_eq!(registry.get(&area.id).unwrap().name, "Living Room");
        assert_eq!(registry.get_by_name("living room").unwrap().id, area.id);
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        let registry = AreaRegistry::new(storage.clone());
        registry.insert(AreaEntry::with_id("kitchen", "Kitchen"));
        registry.insert(AreaEntry::with_id("hallway", "Hallway"));
        registry.save().await.unwrap();

        let registry2 = AreaRegistry::new(storage);
        registry2.load().await.unwrap();
        assert_eq!(registry2.len(), 2);
        assert_eq!(registry2.area_ids(), vec!["hallway", "kitchen"]);
    }

    #[tokio::test]
    async fn test_update_reindexes_name() {
        let temp_dir = TempDir::new().unwrap();
        let registry = AreaRegistry::new(Arc::new(Storage::new(temp_dir.path())));

        let area = registry.create("Office");
        registry.update(&area.id, |a| a.name = "Study".to_string());

        assert!(registry.get_by_name("Office").is_none());
        assert_eq!(registry.get_by_name("Study").unwrap().id, area.id);
    }
}
