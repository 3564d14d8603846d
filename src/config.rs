use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, SyncError};

/// Takeoff in the reference flight, data-clock seconds.
pub const DEFAULT_TAKEOFF_SECONDS: f64 = 2643.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // ── Clock fallback ──
    /// Used only when no correspondence map is loaded:
    /// playback = max(0, data − offset), data = playback + offset.
    pub start_offset_seconds: f64,

    // ── Markers ──
    /// Named jump points, data-clock seconds.
    pub markers: BTreeMap<u32, f64>,
    pub takeoff_marker: u32,
    pub takeoff_fallback_seconds: f64,

    // ── Response limits ──
    pub max_path_points: usize,
    pub mapping_preview_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_offset_seconds: 0.0,
            markers: BTreeMap::new(),
            takeoff_marker: 0,
            takeoff_fallback_seconds: DEFAULT_TAKEOFF_SECONDS,
            max_path_points: 10_000,
            mapping_preview_len: 2_000,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| SyncError::unreadable(path, e))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start_offset_seconds.is_finite() {
            return Err(SyncError::Config("start_offset_seconds must be finite".into()));
        }
        if let Some((id, _)) = self.markers.iter().find(|(_, t)| !t.is_finite()) {
            return Err(SyncError::Config(format!("marker {} is not finite", id)));
        }
        if self.max_path_points == 0 {
            return Err(SyncError::Config("max_path_points must be positive".into()));
        }
        Ok(())
    }

    /// Data-clock seconds of takeoff: the takeoff marker when present,
    /// otherwise the configured fallback.
    pub fn takeoff_seconds(&self) -> f64 {
        self.markers
            .get(&self.takeoff_marker)
            .copied()
            .unwrap_or(self.takeoff_fallback_seconds)
    }

    pub fn marker(&self, id: u32) -> Option<f64> {
        self.markers.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.takeoff_seconds(), DEFAULT_TAKEOFF_SECONDS);
        assert_eq!(config.max_path_points, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{"start_offset_seconds": 2630.5, "markers": {"0": 2643.0, "3": 2900.0}}"#,
        )
        .unwrap();
        assert_eq!(config.start_offset_seconds, 2630.5);
        assert_eq!(config.marker(3), Some(2900.0));
        assert_eq!(config.marker(7), None);
        assert_eq!(config.mapping_preview_len, 2_000);
    }

    #[test]
    fn test_takeoff_marker_overrides_fallback() {
        let config =
            SessionConfig::from_json_str(r#"{"takeoff_marker": 1, "markers": {"1": 100.0}}"#)
                .unwrap();
        assert_eq!(config.takeoff_seconds(), 100.0);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            SessionConfig::from_json_str(r#"{"max_path_points": 0}"#),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_json_str("[1, 2]"),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let path = env::temp_dir().join("flight_sync_no_config.json");
        assert!(matches!(
            SessionConfig::load(&path),
            Err(SyncError::SourceUnreadable { .. })
        ));
    }
}
