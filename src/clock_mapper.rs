use log::{info, warn};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::types::CorrespondencePoint;

/// Bidirectional data-clock ⇄ playback-clock conversion.
///
/// Holds two sorted projections of the same correspondence points, one
/// keyed by the data clock and one keyed by the playback clock, so both
/// directions are a single binary search.
///
/// # File Format
/// JSON array of `{"data_timestamp": <seconds>, "video_time": <seconds>}`.
/// Entries missing either field, or with a non-numeric value, are skipped.
#[derive(Clone, Debug, Default)]
pub struct ClockMapper {
    forward: Vec<CorrespondencePoint>,
    backward: Vec<CorrespondencePoint>,
}

impl ClockMapper {
    pub fn new(points: impl IntoIterator<Item = CorrespondencePoint>) -> Self {
        let mut forward: Vec<CorrespondencePoint> = points
            .into_iter()
            .filter(|p| p.data_clock_seconds.is_finite() && p.playback_clock_seconds.is_finite())
            .collect();
        // ties break on the other clock; backward inherits that order
        forward.sort_by(|a, b| {
            a.data_clock_seconds
                .total_cmp(&b.data_clock_seconds)
                .then(a.playback_clock_seconds.total_cmp(&b.playback_clock_seconds))
        });
        let mut backward = forward.clone();
        backward.sort_by(|a, b| {
            a.playback_clock_seconds
                .total_cmp(&b.playback_clock_seconds)
        });

        ClockMapper { forward, backward }
    }

    /// Mapper with no points; reports unavailable.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from decoded JSON entries, dropping malformed ones.
    pub fn from_entries(entries: &[Value]) -> Self {
        let points: Vec<CorrespondencePoint> = entries.iter().filter_map(parse_entry).collect();
        let skipped = entries.len() - points.len();
        if skipped > 0 {
            warn!("Skipped {} malformed timestamp mapping entries", skipped);
        }
        Self::new(points)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: Vec<Value> = serde_json::from_str(json)
            .map_err(|e| SyncError::DecodeMalformed(format!("timestamp mapping: {}", e)))?;
        Ok(Self::from_entries(&entries))
    }

    /// Load a mapping file, surfacing every failure.
    ///
    /// A missing file is still not an error: it yields an empty mapper.
    pub fn load_strict(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No timestamp mapping at {}", path.display());
            return Ok(Self::empty());
        }
        let file = File::open(path).map_err(|e| SyncError::unreadable(path, e))?;
        let entries: Vec<Value> = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            SyncError::DecodeMalformed(format!("timestamp mapping {}: {}", path.display(), e))
        })?;
        let mapper = Self::from_entries(&entries);
        info!(
            "Loaded {} timestamp mapping points from {}",
            mapper.len(),
            path.display()
        );
        Ok(mapper)
    }

    /// Load a mapping file; any failure is logged and leaves the mapper empty.
    pub fn load(path: &Path) -> Self {
        match Self::load_strict(path) {
            Ok(mapper) => mapper,
            Err(e) => {
                warn!("Error loading video timestamp mapping: {}", e);
                Self::empty()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        !self.forward.is_empty()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Points ordered by data clock.
    pub fn points(&self) -> &[CorrespondencePoint] {
        &self.forward
    }

    /// First `n` points by data clock (for handing to a client-side cache).
    pub fn preview(&self, n: usize) -> &[CorrespondencePoint] {
        &self.forward[..n.min(self.forward.len())]
    }

    /// Data clock → playback clock. `None` when no points are loaded.
    pub fn data_to_playback_time(&self, data_seconds: f64) -> Option<f64> {
        interpolate(
            &self.forward,
            data_seconds,
            |p| p.data_clock_seconds,
            |p| p.playback_clock_seconds,
        )
    }

    /// Playback clock → data clock. `None` when no points are loaded.
    pub fn playback_to_data_time(&self, playback_seconds: f64) -> Option<f64> {
        interpolate(
            &self.backward,
            playback_seconds,
            |p| p.playback_clock_seconds,
            |p| p.data_clock_seconds,
        )
    }
}

fn parse_entry(entry: &Value) -> Option<CorrespondencePoint> {
    let data = entry.get("data_timestamp")?.as_f64()?;
    let video = entry.get("video_time")?.as_f64()?;
    Some(CorrespondencePoint::new(data, video))
}

/// Piecewise-linear lookup over a projection sorted by `key`.
///
/// Clamps outside the key range, returns stored values exactly on key hits,
/// and falls back to the earlier value when two keys coincide.
fn interpolate<K, V>(points: &[CorrespondencePoint], t: f64, key: K, value: V) -> Option<f64>
where
    K: Fn(&CorrespondencePoint) -> f64,
    V: Fn(&CorrespondencePoint) -> f64,
{
    let first = points.first()?;
    let last = points.last()?;

    // bisect_left
    let idx = points.partition_point(|p| key(p) < t);
    if idx == 0 {
        return Some(value(first));
    }
    if idx >= points.len() {
        return Some(value(last));
    }

    let prev = &points[idx - 1];
    let next = &points[idx];
    let (prev_x, prev_y) = (key(prev), value(prev));
    let (next_x, next_y) = (key(next), value(next));

    if prev_x == t {
        return Some(prev_y);
    }
    if next_x == t {
        return Some(next_y);
    }
    if next_x == prev_x {
        return Some(prev_y);
    }

    let ratio = (t - prev_x) / (next_x - prev_x);
    Some(prev_y + ratio * (next_y - prev_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::env;
    use std::fs;

    fn mapper(pairs: &[(f64, f64)]) -> ClockMapper {
        ClockMapper::new(pairs.iter().map(|&(d, v)| CorrespondencePoint::new(d, v)))
    }

    #[test]
    fn test_two_point_interpolation_and_clamp() {
        let m = mapper(&[(0.0, 0.0), (10.0, 100.0)]);
        assert_eq!(m.data_to_playback_time(5.0), Some(50.0));
        assert_eq!(m.data_to_playback_time(-5.0), Some(0.0));
        assert_eq!(m.data_to_playback_time(15.0), Some(100.0));

        assert_eq!(m.playback_to_data_time(50.0), Some(5.0));
        assert_eq!(m.playback_to_data_time(-1.0), Some(0.0));
        assert_eq!(m.playback_to_data_time(1000.0), Some(10.0));
    }

    #[test]
    fn test_empty_mapper_is_unavailable() {
        let m = ClockMapper::empty();
        assert!(!m.is_available());
        assert_eq!(m.data_to_playback_time(1.0), None);
        assert_eq!(m.playback_to_data_time(1.0), None);
    }

    #[test]
    fn test_exact_keys_round_trip() {
        let pairs = [
            (2643.1, 0.1),
            (2650.37, 7.3),
            (2700.0 / 3.0 * 3.0, 57.0),
            (2810.123456789, 167.987654321),
        ];
        let m = mapper(&pairs);
        for &(d, v) in &pairs {
            assert_eq!(m.data_to_playback_time(d), Some(v));
            assert_eq!(m.playback_to_data_time(v), Some(d));
        }
    }

    #[test]
    fn test_unsorted_input_builds_both_projections() {
        let m = mapper(&[(30.0, 3.0), (10.0, 1.0), (20.0, 2.0)]);
        assert_eq!(m.points()[0].data_clock_seconds, 10.0);
        assert_relative_eq!(m.data_to_playback_time(15.0).unwrap(), 1.5);
        assert_relative_eq!(m.playback_to_data_time(2.5).unwrap(), 25.0);
    }

    #[test]
    fn test_duplicate_keys_do_not_divide_by_zero() {
        let m = mapper(&[(0.0, 0.0), (5.0, 10.0), (5.0, 20.0), (10.0, 30.0)]);
        // exact key hit returns the first stored point at that key
        assert_eq!(m.data_to_playback_time(5.0), Some(10.0));
        assert_relative_eq!(m.data_to_playback_time(7.5).unwrap(), 25.0);

        // backward projection with a repeated playback time
        let m = mapper(&[(0.0, 0.0), (4.0, 10.0), (6.0, 10.0), (10.0, 20.0)]);
        assert_eq!(m.playback_to_data_time(10.0), Some(4.0));
        assert_relative_eq!(m.playback_to_data_time(15.0).unwrap(), 8.0);
    }

    #[test]
    fn test_duplicate_data_key_in_descending_order() {
        let m = mapper(&[(0.0, 0.0), (5.0, 20.0), (5.0, 10.0), (10.0, 30.0)]);
        assert_eq!(m.data_to_playback_time(5.0), Some(10.0));
        let after = m.data_to_playback_time(5.001).unwrap();
        assert!(after >= 10.0, "5.001 mapped to {}", after);
        assert!(after >= m.data_to_playback_time(5.0).unwrap());
    }

    #[test]
    fn test_duplicate_playback_key_in_descending_order() {
        let m = mapper(&[(0.0, 0.0), (6.0, 10.0), (4.0, 10.0), (10.0, 20.0)]);
        assert_eq!(m.playback_to_data_time(10.0), Some(4.0));
        let after = m.playback_to_data_time(10.001).unwrap();
        assert!(after >= 6.0, "10.001 mapped to {}", after);
    }

    #[test]
    fn test_shuffled_monotonic_set_stays_monotonic() {
        let m = mapper(&[(10.0, 30.0), (5.0, 20.0), (6.0, 20.0), (5.0, 10.0), (0.0, 0.0)]);
        let mut prev_video = f64::NEG_INFINITY;
        let mut prev_data = f64::NEG_INFINITY;
        let mut t = 0.0;
        while t <= 30.0 {
            let v = m.data_to_playback_time(t / 3.0).unwrap();
            let d = m.playback_to_data_time(t).unwrap();
            assert!(v >= prev_video, "data {} gave {} after {}", t / 3.0, v, prev_video);
            assert!(d >= prev_data, "playback {} gave {} after {}", t, d, prev_data);
            prev_video = v;
            prev_data = d;
            t += 0.01;
        }
    }

    #[test]
    fn test_monotonic_input_gives_monotonic_output() {
        let m = mapper(&[(0.0, 0.0), (1.0, 0.5), (4.0, 0.5), (6.0, 10.0), (9.0, 11.0)]);
        let mut prev = f64::NEG_INFINITY;
        let mut t = 0.0;
        while t <= 9.0 {
            let v = m.data_to_playback_time(t).unwrap();
            assert!(v >= prev, "t={} gave {} after {}", t, v, prev);
            prev = v;
            t += 0.01;
        }
    }

    #[test]
    fn test_single_point_clamps_everywhere() {
        let m = mapper(&[(100.0, 7.0)]);
        assert_eq!(m.data_to_playback_time(0.0), Some(7.0));
        assert_eq!(m.data_to_playback_time(100.0), Some(7.0));
        assert_eq!(m.data_to_playback_time(1e9), Some(7.0));
        assert_eq!(m.playback_to_data_time(7.0), Some(100.0));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let json = r#"[
            {"data_timestamp": 0.0, "video_time": 0.0},
            {"data_timestamp": 5.0},
            {"video_time": 3.0},
            {"data_timestamp": "soon", "video_time": 1.0},
            {"data_timestamp": 10, "video_time": 100}
        ]"#;
        let m = ClockMapper::from_json_str(json).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.data_to_playback_time(5.0), Some(50.0));
    }

    #[test]
    fn test_preview_is_bounded() {
        let m = mapper(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        assert_eq!(m.preview(2).len(), 2);
        assert_eq!(m.preview(10).len(), 3);
    }

    #[test]
    fn test_missing_file_is_empty_not_error() {
        let path = env::temp_dir().join("flight_sync_no_such_mapping.json");
        let m = ClockMapper::load_strict(&path).unwrap();
        assert!(!m.is_available());
        assert!(!ClockMapper::load(&path).is_available());
    }

    #[test]
    fn test_garbage_file_strict_vs_lenient() {
        let dir = env::temp_dir().join("flight_sync_mapper_garbage");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("timestamp_map.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            ClockMapper::load_strict(&path),
            Err(SyncError::DecodeMalformed(_))
        ));
        assert!(!ClockMapper::load(&path).is_available());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = env::temp_dir().join("flight_sync_mapper_file");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("timestamp_map.json");
        fs::write(
            &path,
            r#"[{"data_timestamp": 2643.0, "video_time": 12.0},
                {"data_timestamp": 2653.0, "video_time": 22.0}]"#,
        )
        .unwrap();

        let m = ClockMapper::load(&path);
        assert!(m.is_available());
        assert_eq!(m.data_to_playback_time(2648.0), Some(17.0));

        fs::remove_dir_all(&dir).unwrap();
    }
}
