//! Autoflow Registries
//!
//! This crate provides persistent registries for tracking:
//! - Entities (EntityRegistry)
//! - Devices (DeviceRegistry)
//! - Areas (AreaRegistry)
//!
//! All registries use JSON persistence in the `.storage/` directory
//! with versioning for migrations.

pub mod storage;

pub mod area_registry;
pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use area_registry::{AreaEntry, AreaRegistry, AreaRegistryData};
pub use device_registry::{DeviceEntry, DeviceIdentifier, DeviceRegistry, DeviceRegistryData};
pub use entity_registry::{DisabledBy, EntityEntry, EntityRegistry, EntityRegistryData};

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
    pub areas: AreaRegistry,
}

impl Registries {
    /// Create new registries with the given config directory
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));

        Self {
            entities: EntityRegistry::new(storage.clone()),
            devices: DeviceRegistry::new(storage.clone()),
            areas: AreaRegistry::new(storage.clone()),
            storage,
        }
    }

    /// Load all registries from storage
    pub async fn load_all(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        self.areas.load().await?;
        Ok(())
    }

    /// Save all registries to storage
    pub async fn save_all(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        self.areas.save().await?;
        Ok(())
    }

    /// Effective area of an entity: its own assignment, or its device's
    pub fn entity_area(&self, entry: &EntityEntry) -> Option<String> {
        if entry.area_id.is_some() {
            return entry.area_id.clone();
        }
        entry
            .device_id
            .as_deref()
            .and_then(|device_id| self.devices.get(device_id))
            .and_then(|device| device.area_id.clone())
    }

    /// All enabled entities whose effective area matches, sorted by entity_id
    ///
    /// Includes entities assigned directly to the area and entities inheriting
    /// the area through their device.
    pub fn entities_in_area(&self, area_id: &str) -> Vec<Arc<EntityEntry>> {
        let mut result: Vec<Arc<EntityEntry>> = self
            .entities
            .get_by_area_id(area_id)
            .into_iter()
            .filter(|e| !e.is_disabled())
            .collect();

        for device in self.devices.get_by_area_id(area_id) {
            for entry in self.entities.get_by_device_id(&device.id) {
                // Direct area assignment on the entity wins
                if entry.area_id.is_none() && !entry.is_disabled() {
                    result.push(entry);
                }
            }
        }

        result.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        result.dedup_by(|a, b| a.entity_id == b.entity_id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_registries_bundle_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());

        registries
            .areas
            .insert(AreaEntry::with_id("kitchen", "Kitchen"));
        let device = registries.devices.create(
            "Kitchen Motion Sensor",
            vec![DeviceIdentifier::new("zha", "abc123")],
        );
        registries
            .devices
            .update(&device.id, |d| d.area_id = Some("kitchen".to_string()));

        let entity =
            registries
                .entities
                .get_or_create("binary_sensor.kitchen_motion", "zha", None);
        registries.entities.update(&entity.entity_id, |e| {
            e.device_id = Some(device.id.clone());
            e.original_device_class = Some("motion".to_string());
        });

        registries.save_all().await.unwrap();

        let registries2 = Registries::new(temp_dir.path());
        registries2.load_all().await.unwrap();

        assert_eq!(registries2.entities.len(), 1);
        assert_eq!(registries2.devices.len(), 1);
        assert_eq!(registries2.areas.len(), 1);
    }

    #[tokio::test]
    async fn test_entities_in_area_device_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());

        registries
            .areas
            .insert(AreaEntry::with_id("kitchen", "Kitchen"));

        // Entity with a direct area assignment
        registries
            .entities
            .get_or_create("light.kitchen_ceiling", "demo", None);
        registries.entities.update("light.kitchen_ceiling", |e| {
            e.area_id = Some("kitchen".to_string());
        });

        // Entity inheriting the area from its device
        let device = registries.devices.create("Motion Sensor", vec![]);
        registries
            .devices
            .update(&device.id, |d| d.area_id = Some("kitchen".to_string()));
        registries
            .entities
            .get_or_create("binary_sensor.kitchen_motion", "demo", None);
        registries.entities.update("binary_sensor.kitchen_motion", |e| {
            e.device_id = Some(device.id.clone());
        });

        // Entity in a different area
        registries.entities.get_or_create("light.hall", "demo", None);
        registries.entities.update("light.hall", |e| {
            e.area_id = Some("hallway".to_string());
        });

        let ids: Vec<String> = registries
            .entities_in_area("kitchen")
            .iter()
            .map(|e| e.entity_id.clone())
            .collect();
        assert_eq!(ids, vec!["binary_sensor.kitchen_motion", "light.kitchen_ceiling"]);
    }

    #[tokio::test]
    async fn test_entity_area_direct_wins_over_device() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());

        let device = registries.devices.create("Sensor Hub", vec![]);
        registries
            .devices
            .update(&device.id, |d| d.area_id = Some("hallway".to_string()));

        registries
            .entities
            .get_or_create("sensor.hub_temperature", "demo", None);
        let entry = registries
            .entities
            .update("sensor.hub_temperature", |e| {
                e.device_id = Some(device.id.clone());
                e.area_id = Some("kitchen".to_string());
            })
            .unwrap();

        assert_eq!(registries.entity_area(&entry).as_deref(), Some("kitchen"));
    }
}
