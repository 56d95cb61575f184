use crate::config::ZoneConfig;
use crate::error::Error;
use std::collections::HashMap;

/// A protected area watched by one data source
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRecord {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub zone_name: String,
}

impl ZoneRecord {
    /// `lat, lon` to 4 decimal places
    pub fn coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

impl From<&ZoneConfig> for ZoneRecord {
    fn from(config: &ZoneConfig) -> Self {
        Self {
            id: config.id.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
            zone_name: config.zone_name.clone(),
        }
    }
}

/// Immutable datasource → zone map, built once at startup
#[derive(Debug, Clone, Default)]
pub struct ZoneTable {
    zones: HashMap<String, ZoneRecord>,
}

impl ZoneTable {
    pub fn from_config(zones: &[ZoneConfig]) -> Self {
        Self {
            zones: zones
                .iter()
                .map(|zone| (zone.id.clone(), ZoneRecord::from(zone)))
                .collect(),
        }
    }

    pub fn key_for(datasource_id: u32) -> String {
        format!("S{}", datasource_id)
    }

    pub fn resolve(&self, datasource_id: u32) -> Result<&ZoneRecord, Error> {
        let key = Self::key_for(datasource_id);
        self.zones.get(&key).ok_or_else(|| {
            Error::ZoneResolution(format!("Invalid data source ID: {}", datasource_id))
        })
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
