use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::core::marker::MarkerRecord;
use crate::core::types::MarkerId;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to parse catalog CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid catalog: {0}")]
    InvalidFormat(String),
}

/// Catalog version for compatibility checking
pub const CATALOG_VERSION: &str = "1.0.0";

/// Serializable catalog format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    pub version: String,
    pub created_at: String,
    pub markers: Vec<MarkerRecord>,
}

/// The marker catalog.
///
/// Built once before a run and only read afterwards, so it can be shared by
/// reference across worker threads without synchronization.
#[derive(Debug, Clone, Default)]
pub struct MarkerCatalog {
    /// All markers in load order
    markers: Vec<MarkerRecord>,

    /// Index: marker ID -> index in markers vec
    id_to_index: HashMap<MarkerId, usize>,
}

impl MarkerCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from markers, later duplicates replacing earlier ones
    pub fn from_markers(markers: impl IntoIterator<Item = MarkerRecord>) -> Self {
        let mut catalog = Self::new();
        for marker in markers {
            catalog.add_marker(marker);
        }
        catalog
    }

    /// Load a catalog from a file, choosing the format by extension (`.json` or CSV)
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            let content = std::fs::read_to_string(path)?;
            Self::from_json(&content)
        } else {
            crate::parsing::catalog_csv::parse_catalog_file(path)
        }
    }

    /// Parse catalog from JSON string
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let data: CatalogData = serde_json::from_str(json)?;

        // Version check (warn but don't fail)
        if data.version != CATALOG_VERSION {
            warn!(
                "Catalog version mismatch (expected {}, found {})",
                CATALOG_VERSION, data.version
            );
        }

        let mut catalog = Self::new();
        for mut marker in data.markers {
            if marker.sequence.is_empty() {
                return Err(CatalogError::InvalidFormat(format!(
                    "Marker '{}' has an empty sequence",
                    marker.id
                )));
            }
            marker.length = marker.sequence.len();
            catalog.add_marker(marker);
        }

        Ok(catalog)
    }

    /// Add a marker to the catalog, replacing any marker with the same ID
    pub fn add_marker(&mut self, marker: MarkerRecord) {
        if let Some(&idx) = self.id_to_index.get(&marker.id) {
            warn!("Duplicate marker ID '{}', keeping the later definition", marker.id);
            self.markers[idx] = marker;
            return;
        }

        self.id_to_index.insert(marker.id.clone(), self.markers.len());
        self.markers.push(marker);
    }

    /// Get a marker by ID
    pub fn get(&self, id: &MarkerId) -> Option<&MarkerRecord> {
        self.id_to_index.get(id).map(|&idx| &self.markers[idx])
    }

    /// Iterate markers in load order
    pub fn iter(&self) -> std::slice::Iter<'_, MarkerRecord> {
        self.markers.iter()
    }

    /// Distinct serotypes present in the catalog, sorted
    pub fn serotypes(&self) -> Vec<&str> {
        let mut serotypes: Vec<&str> = self.markers.iter().map(|m| m.serotype.as_str()).collect();
        serotypes.sort_unstable();
        serotypes.dedup();
        serotypes
    }

    /// Export catalog to JSON
    pub fn to_json(&self) -> Result<String, CatalogError> {
        let data = CatalogData {
            version: CATALOG_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            markers: self.markers.clone(),
        };
        Ok(serde_json::to_string_pretty(&data)?)
    }

    /// Number of markers in catalog
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Check if catalog is empty
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl<'a> IntoIterator for &'a MarkerCatalog {
    type Item = &'a MarkerRecord;
    type IntoIter = std::slice::Iter<'a, MarkerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_catalog() -> MarkerCatalog {
        MarkerCatalog::from_markers([
            MarkerRecord::new("m1", "DENV-1", "ACGT"),
            MarkerRecord::new("m2", "DENV-2", "TTGCA"),
            MarkerRecord::new("m3", "DENV-1", "GGAT"),
        ])
    }

    #[test]
    fn test_catalog_get_by_id() {
        let catalog = make_catalog();
        let m2 = catalog.get(&MarkerId::new("m2")).unwrap();
        assert_eq!(m2.serotype, "DENV-2");
        assert!(catalog.get(&MarkerId::new("missing")).is_none());
    }

    #[test]
    fn test_catalog_preserves_load_order() {
        let catalog = make_catalog();
        let ids: Vec<&str> = catalog.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_duplicate_id_replaces() {
        let mut catalog = make_catalog();
        catalog.add_marker(MarkerRecord::new("m1", "DENV-3", "CCCC"));
        assert_eq!(catalog.len(), 3);
        let m1 = catalog.get(&MarkerId::new("m1")).unwrap();
        assert_eq!(m1.serotype, "DENV-3");
        assert_eq!(catalog.iter().next().unwrap().id.as_str(), "m1");
    }

    #[test]
    fn test_serotypes() {
        let catalog = make_catalog();
        assert_eq!(catalog.serotypes(), vec!["DENV-1", "DENV-2"]);
    }

    #[test]
    fn test_json_round_trip_preserves_markers() {
        let catalog = make_catalog();
        let json = catalog.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"markers\""));

        let reloaded = MarkerCatalog::from_json(&json).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.get(&MarkerId::new("m2")).unwrap().length, 5);
    }

    #[test]
    fn test_json_rejects_empty_sequence() {
        let json = r#"{"version":"1.0.0","created_at":"","markers":[
            {"id":"m1","serotype":"DENV-1","sequence":"","length":0}
        ]}"#;
        assert!(matches!(
            MarkerCatalog::from_json(json),
            Err(CatalogError::InvalidFormat(_))
        ));
    }
}
