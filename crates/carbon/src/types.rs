//! Types for carbon-intensity snapshots and provider errors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A single carbon-intensity reading for one zone.
///
/// This is both the wire shape returned by the provider and the cached
/// snapshot held by the monitor. Providers may return extra fields
/// (`fossilFreePercentage`, `updatedAt`, ...) which are carried opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarbonSnapshot {
    /// Zone code (e.g., "KR", "JP", "DE")
    pub zone: String,
    /// Carbon intensity in gCO2eq/kWh
    pub carbon_intensity: f64,
    /// Measurement timestamp as reported by the provider (RFC 3339)
    #[serde(default)]
    pub datetime: Option<String>,
    /// Unix seconds at which the hub fetched this reading
    #[serde(default)]
    pub fetched_at: f64,
    /// Any additional provider fields, passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The zone currently reporting the lowest carbon intensity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestZone {
    pub zone: String,
    pub carbon_intensity: f64,
    pub datetime: Option<String>,
    pub fetched_at: f64,
    /// Intensity of every zone that currently has a cached snapshot
    pub all_zones: BTreeMap<String, f64>,
}

/// Errors that can occur when fetching carbon-intensity data
#[derive(Debug, Error)]
pub enum CarbonApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status} for zone {zone}")]
    Status { zone: String, status: u16 },

    #[error("response parsing error: {0}")]
    Parse(String),

    #[error("all endpoints failed for zone {zone}: {last_error}")]
    AllEndpointsFailed { zone: String, last_error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_parses_provider_payload() {
        let json = r#"{
            "zone": "KR",
            "carbonIntensity": 352.0,
            "datetime": "2026-01-15T10:00:00.000Z",
            "updatedAt": "2026-01-15T10:05:23.145Z",
            "emissionFactorType": "lifecycle"
        }"#;

        let snap: CarbonSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.zone, "KR");
        assert_eq!(snap.carbon_intensity, 352.0);
        assert_eq!(snap.fetched_at, 0.0);
        assert!(snap.extra.contains_key("updatedAt"));
        assert!(snap.extra.contains_key("emissionFactorType"));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snap = CarbonSnapshot {
            zone: "JP".to_string(),
            carbon_intensity: 410.5,
            datetime: None,
            fetched_at: 1_700_000_000.0,
            extra: BTreeMap::new(),
        };

        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"carbonIntensity\":410.5"));
        assert!(json.contains("\"fetchedAt\""));
    }
}
