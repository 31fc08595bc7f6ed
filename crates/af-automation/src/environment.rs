//! Per-area environmental state
//!
//! Derives `is_dark` / `is_bright` flags and sensor averages from the
//! illuminance, temperature, and humidity sensors assigned to an area,
//! plus the global sun entity.

use af_registries::Registries;
use af_state_store::StateStore;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Default illuminance threshold below which an area counts as dark (lux)
pub const DARK_LUX_THRESHOLD: f64 = 20.0;

/// Sun elevation below which an area counts as dark (degrees)
pub const SUN_ELEVATION_THRESHOLD: f64 = 3.0;

/// The global sun entity
pub const SUN_ENTITY_ID: &str = "sun.sun";

/// Snapshot of an area's environmental readings
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvSnapshot {
    pub illuminance: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub sun_elevation: Option<f64>,
    pub is_dark: bool,
    pub is_bright: bool,
}

/// Computes environmental state for areas
pub struct EnvironmentProvider {
    store: Arc<StateStore>,
    registries: Arc<Registries>,
    /// Per-area illuminance threshold overrides (lux)
    dark_thresholds: DashMap<String, f64>,
}

impl EnvironmentProvider {
    pub fn new(store: Arc<StateStore>, registries: Arc<Registries>) -> Self {
        Self {
            store,
            registries,
            dark_thresholds: DashMap::new(),
        }
    }

    /// Override the darkness threshold for an area
    pub fn set_dark_threshold(&self, area_id: &str, lux: f64) {
        self.dark_thresholds.insert(area_id.to_string(), lux);
    }

    /// Darkness threshold for an area (lux)
    pub fn dark_threshold(&self, area_id: &str) -> f64 {
        self.dark_thresholds
            .get(area_id)
            .map(|v| *v)
            .unwrap_or(DARK_LUX_THRESHOLD)
    }

    /// Average reading of all sensors with the given device class in an area
    ///
    /// Unavailable and non-numeric states are skipped. Returns None when the
    /// area has no usable sensor.
    pub fn average_sensor(&self, area_id: &str, device_class: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .registries
            .entities_in_area(area_id)
            .iter()
            .filter(|entry| entry.domain() == "sensor")
            .filter(|entry| entry.effective_device_class() == Some(device_class))
            .filter_map(|entry| self.store.get(&entry.entity_id))
            .filter_map(|state| state.as_f64())
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Current sun elevation in degrees, from the sun entity
    pub fn sun_elevation(&self) -> Option<f64> {
        self.store
            .get(SUN_ENTITY_ID)
            .and_then(|state| state.attribute::<f64>("elevation"))
    }

    /// Whether the area currently counts as dark
    ///
    /// Dark when measured illuminance is below the area threshold or the sun
    /// is below [`SUN_ELEVATION_THRESHOLD`]. When only one input is available
    /// that input decides alone; with neither, the area is not dark.
    pub fn is_dark(&self, area_id: &str) -> bool {
        let illuminance = self.average_sensor(area_id, "illuminance");
        let sun_elevation = self.sun_elevation();
        let threshold = self.dark_threshold(area_id);

        let is_dark = match (illuminance, sun_elevation) {
            (Some(lux), Some(elevation)) => {
                lux < threshold || elevation < SUN_ELEVATION_THRESHOLD
            }
            (Some(lux), None) => lux < threshold,
            (None, Some(elevation)) => elevation < SUN_ELEVATION_THRESHOLD,
            (None, None) => false,
        };

        debug!(
            area_id,
            ?illuminance,
            ?sun_elevation,
            is_dark,
            "Computed darkness"
        );

        is_dark
    }

    /// Full environmental snapshot for an area
    pub fn snapshot(&self, area_id: &str) -> EnvSnapshot {
        let is_dark = self.is_dark(area_id);

        EnvSnapshot {
            illuminance: self.average_sensor(area_id, "illuminance"),
            temperature: self.average_sensor(area_id, "temperature"),
            humidity: self.average_sensor(area_id, "humidity"),
            sun_elevation: self.sun_elevation(),
            is_dark,
            is_bright: !is_dark,
        }
    }

    /// Entities whose changes can flip the area's environmental flags
    ///
    /// All illuminance sensors in the area plus the sun entity when present.
    pub fn environmental_entities(&self, area_id: &str) -> Vec<String> {
        let mut entities: Vec<String> = self
            .registries
            .entities_in_area(area_id)
            .iter()
            .filter(|entry| entry.domain() == "sensor")
            .filter(|entry| entry.effective_device_class() == Some("illuminance"))
            .map(|entry| entry.entity_id.clone())
            .collect();

        if self.store.get_state(SUN_ENTITY_ID).is_some() {
            entities.push(SUN_ENTITY_ID.to_string());
        }

        entities
    }
}
