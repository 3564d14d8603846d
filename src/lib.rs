//! Dual-clock synchronization core for flight telemetry and video playback.
//!
//! Telemetry rows are indexed by their data-clock timestamp
//! ([`TimeSeriesIndex`]), converted to and from the playback clock through a
//! correspondence map ([`ClockMapper`]), and expanded into per-row attitude
//! and speed values ([`telemetry`]).

pub mod clock_mapper;
pub mod config;
pub mod error;
pub mod loader;
pub mod playback;
pub mod sample_cache;
pub mod series_index;
pub mod telemetry;
pub mod timestamp;
pub mod types;

pub use clock_mapper::ClockMapper;
pub use config::SessionConfig;
pub use error::{Result, SyncError};
pub use playback::PlaybackSession;
pub use sample_cache::SampleCache;
pub use series_index::TimeSeriesIndex;
pub use types::{CorrespondencePoint, DerivedRecord, Sample};
