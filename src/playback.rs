//! Session context for synchronized scrubbing.
//!
//! A [`PlaybackSession`] owns one telemetry index, one clock mapper and the
//! session configuration. Callers construct it once and pass it around;
//! every query is a read.

use geo::{BoundingRect, HaversineLength, LineString};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::clock_mapper::ClockMapper;
use crate::config::SessionConfig;
use crate::error::{Result, SyncError};
use crate::loader;
use crate::sample_cache::SampleCache;
use crate::series_index::TimeSeriesIndex;
use crate::types::{CorrespondencePoint, DerivedRecord, PathPoint};

/// A converted clock value and how it was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeConversion {
    pub value: f64,
    /// True when the correspondence map was unavailable and the fixed
    /// start offset was used instead.
    pub using_offset: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackFrame {
    pub record: DerivedRecord,
    pub index: usize,
    pub playback_time: f64,
    pub data_timestamp: f64,
    pub using_offset: bool,
    pub display: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerJump {
    pub marker: u32,
    pub index: usize,
    pub timestamp: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathRange {
    pub path: Vec<PathPoint>,
    pub start_index: usize,
    pub end_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub data_count: usize,
    pub data_columns: Vec<String>,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub duration_seconds: f64,
    pub bounds: Option<GeoBounds>,
    pub path_length_m: f64,
    pub takeoff_index: Option<usize>,
    pub mapping_available: bool,
    pub mapping_points: usize,
    pub mapping_preview: Vec<CorrespondencePoint>,
    pub start_offset_seconds: f64,
}

pub struct PlaybackSession {
    index: TimeSeriesIndex,
    mapper: ClockMapper,
    config: SessionConfig,
}

impl PlaybackSession {
    pub fn new(index: TimeSeriesIndex, mapper: ClockMapper, config: SessionConfig) -> Self {
        PlaybackSession {
            index,
            mapper,
            config,
        }
    }

    /// Load telemetry (through the cache when given) and the optional
    /// correspondence map.
    ///
    /// Telemetry failures abort; a missing or broken mapping file only
    /// leaves the mapper unavailable.
    pub fn open(
        data_path: &Path,
        mapping_path: Option<&Path>,
        config: SessionConfig,
        cache: Option<&SampleCache>,
    ) -> Result<Self> {
        config.validate()?;

        info!("Loading data from {}...", data_path.display());
        let bytes = loader::read_source(data_path)?;
        let build = |raw: &[u8]| loader::decode_csv(raw).map(TimeSeriesIndex::from_table);
        let index = match cache {
            Some(cache) => cache.load_or_build(&bytes, build)?,
            None => build(&bytes)?,
        };

        let mapper = match mapping_path {
            Some(path) => ClockMapper::load(path),
            None => ClockMapper::empty(),
        };
        if !mapper.is_available() {
            info!(
                "Timestamp mapping unavailable, falling back to offset {:.2}s",
                config.start_offset_seconds
            );
        }

        let session = Self::new(index, mapper, config);
        session.log_range();
        Ok(session)
    }

    fn log_range(&self) {
        if let (Some(first), Some(last)) = (self.index.first_timestamp(), self.index.last_timestamp()) {
            info!("Data range: {:.2}s to {:.2}s", first, last);
            info!("Total duration: {:.2}s", last - first);
        }
    }

    pub fn index(&self) -> &TimeSeriesIndex {
        &self.index
    }

    pub fn mapper(&self) -> &ClockMapper {
        &self.mapper
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Row nearest to the configured takeoff time.
    pub fn takeoff_index(&self) -> Option<usize> {
        self.index
            .find_index_for_timestamp(self.config.takeoff_seconds())
    }

    /// Data clock → playback clock, offset fallback when unmapped.
    pub fn playback_time_for(&self, data_timestamp: f64) -> TimeConversion {
        match self.mapper.data_to_playback_time(data_timestamp) {
            Some(value) => TimeConversion {
                value,
                using_offset: false,
            },
            None => TimeConversion {
                value: (data_timestamp - self.config.start_offset_seconds).max(0.0),
                using_offset: true,
            },
        }
    }

    /// Playback clock → data clock, offset fallback when unmapped.
    pub fn data_time_for(&self, playback_time: f64) -> TimeConversion {
        match self.mapper.playback_to_data_time(playback_time) {
            Some(value) => TimeConversion {
                value,
                using_offset: false,
            },
            None => TimeConversion {
                value: playback_time + self.config.start_offset_seconds,
                using_offset: true,
            },
        }
    }

    /// Video-driven sync: the telemetry row shown at a playback instant.
    pub fn data_for_playback_time(&self, playback_time: f64) -> Option<PlaybackFrame> {
        let data = self.data_time_for(playback_time);
        let index = self.index.find_index_for_timestamp(data.value)?;
        let record = self.index.data_at_index(index)?;
        Some(PlaybackFrame {
            record,
            index,
            playback_time,
            data_timestamp: data.value,
            using_offset: data.using_offset,
            display: format!(
                "Video: {:.2}s | Data: {:.2}s",
                playback_time, data.value
            ),
        })
    }

    /// Resolve a configured marker to a row.
    ///
    /// Unknown markers are a configuration error; an empty index is `None`.
    pub fn jump_to_marker(&self, marker: u32) -> Result<Option<MarkerJump>> {
        let timestamp = self
            .config
            .marker(marker)
            .ok_or_else(|| SyncError::Config(format!("Invalid timestamp marker {}", marker)))?;
        let jump = self
            .index
            .find_index_for_timestamp(timestamp)
            .map(|index| MarkerJump {
                marker,
                index,
                timestamp,
            });
        if let Some(j) = &jump {
            info!(
                "Jumped to marker {} (index {}, time {}s)",
                marker, j.index, timestamp
            );
        }
        Ok(jump)
    }

    /// Positions for rows `start..=end` (timestamp order), capped at
    /// `max_path_points` past `start` and clamped to the last row.
    pub fn path_range(&self, start: usize, end: usize) -> PathRange {
        let max_range = self.config.max_path_points;
        let end = if end.saturating_sub(start) > max_range {
            start + max_range
        } else {
            end
        };
        let stop = end.saturating_add(1).min(self.index.len());

        let path = (start..stop)
            .filter_map(|i| {
                self.index.row(i).map(|row| {
                    let (lat, lon, alt) = row.sample.position();
                    PathPoint {
                        index: i,
                        source_row: row.index,
                        lat,
                        lon,
                        alt,
                    }
                })
            })
            .collect();

        PathRange {
            path,
            start_index: start,
            end_index: end.min(self.index.len().saturating_sub(1)),
        }
    }

    /// Every position in insertion order. `index` is still the
    /// timestamp-order position, so it can be fed back to `data_at_index`.
    pub fn complete_path(&self) -> Vec<PathPoint> {
        self.index
            .insertion_positions()
            .iter()
            .enumerate()
            .filter_map(|(source_row, &position)| {
                self.index.row(position).map(|row| {
                    let (lat, lon, alt) = row.sample.position();
                    PathPoint {
                        index: position,
                        source_row,
                        lat,
                        lon,
                        alt,
                    }
                })
            })
            .collect()
    }

    pub fn summary(&self) -> SessionSummary {
        let path = self.index.path_data();
        // geo coordinates are (x = lon, y = lat)
        let line: LineString<f64> = path
            .lons
            .iter()
            .zip(&path.lats)
            .map(|(&lon, &lat)| (lon, lat))
            .collect::<Vec<_>>()
            .into();

        let bounds = line.bounding_rect().map(|rect| GeoBounds {
            min_lat: rect.min().y,
            max_lat: rect.max().y,
            min_lon: rect.min().x,
            max_lon: rect.max().x,
        });

        let takeoff_index = self.takeoff_index();
        if takeoff_index.is_none() {
            warn!("Could not find takeoff index");
        }

        let first = self.index.first_timestamp();
        let last = self.index.last_timestamp();

        SessionSummary {
            data_count: self.index.len(),
            data_columns: self.index.columns().to_vec(),
            first_timestamp: first,
            last_timestamp: last,
            duration_seconds: match (first, last) {
                (Some(a), Some(b)) => b - a,
                _ => 0.0,
            },
            bounds,
            path_length_m: line.haversine_length(),
            takeoff_index,
            mapping_available: self.mapper.is_available(),
            mapping_points: self.mapper.len(),
            mapping_preview: self
                .mapper
                .preview(self.config.mapping_preview_len)
                .to_vec(),
            start_offset_seconds: self.config.start_offset_seconds,
        }
    }
}
