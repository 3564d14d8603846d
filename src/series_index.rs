//! Sorted, searchable view over the telemetry rows.
//!
//! Rows are kept once, in timestamp order. A permutation vector gives the
//! insertion-order view used by the bulk extractors, and a parallel array of
//! nanosecond keys drives the binary search. Nothing is mutated after
//! construction, so an index can be shared across threads as-is.

use log::{debug, info};

use crate::error::{Result, SyncError};
use crate::loader::DecodedTable;
use crate::telemetry;
use crate::timestamp::{is_searchable, seconds_to_nanos, timestamp_seconds};
use crate::types::{xyzw, AttitudeData, DerivedRecord, IndexedSample, PathData, Sample};

pub struct TimeSeriesIndex {
    rows: Vec<IndexedSample>,
    /// `insertion[k]` is the timestamp-order position of input row `k`.
    insertion: Vec<usize>,
    sorted_nanos: Vec<i64>,
    columns: Vec<String>,
}

impl TimeSeriesIndex {
    /// Build from rows in input order.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self::with_columns(samples, Vec::new())
    }

    pub fn from_table(table: DecodedTable) -> Self {
        Self::with_columns(table.samples, table.columns)
    }

    /// Rows built by hand are not range-checked; timestamps beyond
    /// [`MAX_TIMESTAMP_SECONDS`](crate::timestamp::MAX_TIMESTAMP_SECONDS)
    /// share a saturated search key.
    pub fn with_columns(samples: Vec<Sample>, columns: Vec<String>) -> Self {
        let mut rows: Vec<IndexedSample> = samples
            .into_iter()
            .enumerate()
            .map(|(index, sample)| {
                let seconds = timestamp_seconds(sample.timestamp.as_ref());
                IndexedSample {
                    index,
                    timestamp_seconds: seconds,
                    timestamp_nanos: seconds_to_nanos(seconds),
                    sample,
                }
            })
            .collect();

        // sort_by is stable: equal timestamps keep input order
        rows.sort_by(|a, b| a.timestamp_seconds.total_cmp(&b.timestamp_seconds));

        let index = Self::assemble(rows, columns);
        info!("Loaded {} data rows", index.len());
        index
    }

    /// Accept rows that were sorted earlier (e.g. from the sample cache).
    ///
    /// The ordering and the original row numbers are validated rather than
    /// trusted; nanosecond keys are recomputed from the seconds.
    pub fn from_sorted(rows: Vec<IndexedSample>, columns: Vec<String>) -> Result<Self> {
        let mut seen = vec![false; rows.len()];
        for (pos, row) in rows.iter().enumerate() {
            if !is_searchable(row.timestamp_seconds) {
                return Err(SyncError::DecodeMalformed(format!(
                    "row {} has an out-of-range timestamp",
                    pos
                )));
            }
            if pos > 0 && rows[pos - 1].timestamp_seconds > row.timestamp_seconds {
                return Err(SyncError::DecodeMalformed(format!(
                    "rows not in timestamp order at position {}",
                    pos
                )));
            }
            if pos > 0
                && rows[pos - 1].timestamp_seconds == row.timestamp_seconds
                && rows[pos - 1].index > row.index
            {
                return Err(SyncError::DecodeMalformed(format!(
                    "tie at position {} is not in input order",
                    pos
                )));
            }
            match seen.get_mut(row.index) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(SyncError::DecodeMalformed(format!(
                        "row index {} is duplicated or out of range",
                        row.index
                    )))
                }
            }
        }

        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.timestamp_nanos = seconds_to_nanos(row.timestamp_seconds);
                row
            })
            .collect();

        let index = Self::assemble(rows, columns);
        info!("Loaded {} pre-sorted data rows", index.len());
        Ok(index)
    }

    fn assemble(rows: Vec<IndexedSample>, columns: Vec<String>) -> Self {
        let sorted_nanos = rows.iter().map(|r| r.timestamp_nanos).collect();
        let mut insertion = vec![0; rows.len()];
        for (pos, row) in rows.iter().enumerate() {
            insertion[row.index] = pos;
        }
        TimeSeriesIndex {
            rows,
            insertion,
            sorted_nanos,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names seen at decode time, timestamp excluded.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in timestamp order.
    pub fn rows(&self) -> &[IndexedSample] {
        &self.rows
    }

    /// Rows in original input order.
    pub fn iter_insertion(&self) -> impl Iterator<Item = &IndexedSample> + '_ {
        self.insertion.iter().map(move |&pos| &self.rows[pos])
    }

    /// Timestamp-order position of each input row, indexed by input row.
    pub fn insertion_positions(&self) -> &[usize] {
        &self.insertion
    }

    pub fn row(&self, position: usize) -> Option<&IndexedSample> {
        self.rows.get(position)
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.rows.first().map(|r| r.timestamp_seconds)
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.rows.last().map(|r| r.timestamp_seconds)
    }

    /// Position of the row closest to `seconds`.
    ///
    /// Below the first row → 0, past the last → last. Between two rows the
    /// strictly closer one wins; an exact tie goes to the earlier row.
    /// `None` for an empty index or a non-finite query.
    pub fn find_index_for_timestamp(&self, seconds: f64) -> Option<usize> {
        if self.sorted_nanos.is_empty() || !seconds.is_finite() {
            return None;
        }
        let target = seconds_to_nanos(seconds);

        // bisect_left
        let idx = self.sorted_nanos.partition_point(|&ns| ns < target);
        if idx == 0 {
            return Some(0);
        }
        if idx >= self.sorted_nanos.len() {
            return Some(self.sorted_nanos.len() - 1);
        }

        let prev_diff = self.sorted_nanos[idx - 1].abs_diff(target);
        let next_diff = self.sorted_nanos[idx].abs_diff(target);
        if prev_diff <= next_diff {
            Some(idx - 1)
        } else {
            Some(idx)
        }
    }

    /// Derived record for the row at `position` (timestamp order).
    pub fn data_at_index(&self, position: usize) -> Option<DerivedRecord> {
        let row = self.rows.get(position)?;
        Some(build_record(position, row))
    }

    /// Nearest row to `seconds`, fully derived.
    pub fn data_at_timestamp(&self, seconds: f64) -> Option<DerivedRecord> {
        self.find_index_for_timestamp(seconds)
            .and_then(|pos| self.data_at_index(pos))
    }

    /// Positions of every row, insertion order.
    pub fn path_data(&self) -> PathData {
        let mut path = PathData {
            lats: Vec::with_capacity(self.len()),
            lons: Vec::with_capacity(self.len()),
            alts: Vec::with_capacity(self.len()),
        };
        for row in self.iter_insertion() {
            let (lat, lon, alt) = row.sample.position();
            path.lats.push(lat);
            path.lons.push(lon);
            path.alts.push(alt);
        }
        path
    }

    /// Vehicle attitude of every row in degrees, insertion order.
    pub fn attitude_data(&self) -> AttitudeData {
        self.attitude_range(0, self.len())
    }

    /// Same as [`attitude_data`](Self::attitude_data), split over scoped
    /// worker threads by insertion-order range.
    pub fn attitude_data_sharded(&self, shards: usize) -> AttitudeData {
        let shards = shards.clamp(1, self.len().max(1));
        if shards == 1 {
            return self.attitude_data();
        }
        let chunk = self.len().div_ceil(shards);
        debug!("Extracting attitude over {} shards of {} rows", shards, chunk);

        let result = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.len())
                .step_by(chunk)
                .map(|start| {
                    let end = (start + chunk).min(self.len());
                    scope.spawn(move |_| self.attitude_range(start, end))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join())
                .collect::<std::thread::Result<Vec<_>>>()
        });

        match result {
            Ok(Ok(parts)) => AttitudeData::concat(parts),
            // a worker panicked; the sequential pass reports the same rows
            _ => self.attitude_data(),
        }
    }

    fn attitude_range(&self, start: usize, end: usize) -> AttitudeData {
        let len = end.saturating_sub(start);
        let mut out = AttitudeData {
            yaws: Vec::with_capacity(len),
            pitches: Vec::with_capacity(len),
            rolls: Vec::with_capacity(len),
        };
        for &pos in &self.insertion[start..end] {
            let euler = telemetry::vehicle_attitude(&self.rows[pos].sample);
            out.yaws.push(euler.yaw);
            out.pitches.push(euler.pitch);
            out.rolls.push(euler.roll);
        }
        out
    }
}

fn build_record(position: usize, row: &IndexedSample) -> DerivedRecord {
    let derived = telemetry::derive(&row.sample);
    let [vqx, vqy, vqz, vqw] = xyzw(&derived.vehicle_world);
    let [hqx, hqy, hqz, hqw] = xyzw(&derived.helmet_world);
    let (vlat, vlon, valt) = row.sample.position();
    let (vvn, vve, vvd) = row.sample.velocity_ned();

    DerivedRecord {
        index: position,
        source_row: row.index,
        timestamp_seconds: row.timestamp_seconds,
        timestamp_ns: row.timestamp_nanos,
        vqx,
        vqy,
        vqz,
        vqw,
        hqx,
        hqy,
        hqz,
        hqw,
        vlat,
        vlon,
        valt,
        vvn,
        vve,
        vvd,
        vins: row.sample.mode.unwrap_or(0),
        gspeed: derived.ground_speed,
        roll: derived.vehicle_euler.roll,
        pitch: derived.vehicle_euler.pitch,
        yaw: derived.vehicle_euler.yaw,
        helmet_roll: derived.helmet_euler.roll,
        helmet_pitch: derived.helmet_euler.pitch,
        helmet_yaw: derived.helmet_euler.yaw,
    }
}
