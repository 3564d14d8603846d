pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One decoded cell: a number when it coerces, otherwise the raw text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Best-effort numeric coercion. Non-finite parses stay textual so
    /// they never reach the arithmetic.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => FieldValue::Number(v),
            _ => FieldValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }
}

/// One raw telemetry row.
///
/// Known columns get a typed slot; everything else lands in `extra`.
/// Missing quaternion components read as the identity, missing
/// position/velocity components read as zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Option<FieldValue>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub x_vehicle: Option<f64>,
    pub y_vehicle: Option<f64>,
    pub z_vehicle: Option<f64>,
    pub w_vehicle: Option<f64>,
    pub x_helmet: Option<f64>,
    pub y_helmet: Option<f64>,
    pub z_helmet: Option<f64>,
    pub w_helmet: Option<f64>,
    pub north: Option<f64>,
    pub east: Option<f64>,
    pub down: Option<f64>,
    pub mode: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, FieldValue>,
}

impl Sample {
    /// Row with only a textual timestamp, handy for building rows by hand.
    pub fn with_timestamp(raw: impl Into<String>) -> Self {
        Sample {
            timestamp: Some(FieldValue::Text(raw.into())),
            ..Default::default()
        }
    }

    /// Decode one cell into the matching slot.
    ///
    /// `timestamp` stays textual. Empty cells are treated as absent.
    pub fn set_field(&mut self, column: &str, raw: &str) {
        if column == "timestamp" {
            self.timestamp = Some(FieldValue::Text(raw.to_string()));
            return;
        }
        if raw.trim().is_empty() {
            return;
        }
        match FieldValue::coerce(raw) {
            FieldValue::Number(v) => self.set_number(column, v),
            text => {
                self.extra.insert(column.to_string(), text);
            }
        }
    }

    /// Store a numeric value for a column.
    pub fn set_number(&mut self, column: &str, value: f64) {
        let slot = match column {
            "lat" => &mut self.lat,
            "lon" => &mut self.lon,
            "alt" => &mut self.alt,
            "x_vehicle" => &mut self.x_vehicle,
            "y_vehicle" => &mut self.y_vehicle,
            "z_vehicle" => &mut self.z_vehicle,
            "w_vehicle" => &mut self.w_vehicle,
            "x_helmet" => &mut self.x_helmet,
            "y_helmet" => &mut self.y_helmet,
            "z_helmet" => &mut self.z_helmet,
            "w_helmet" => &mut self.w_helmet,
            "north" => &mut self.north,
            "east" => &mut self.east,
            "down" => &mut self.down,
            "mode" => {
                self.mode = Some(value as i64);
                return;
            }
            "timestamp" => {
                self.timestamp = Some(FieldValue::Number(value));
                return;
            }
            other => {
                self.extra.insert(other.to_string(), FieldValue::Number(value));
                return;
            }
        };
        *slot = Some(value);
    }

    /// Builder form of [`Sample::set_number`].
    pub fn with(mut self, column: &str, value: f64) -> Self {
        self.set_number(column, value);
        self
    }

    /// Vehicle orientation, world-relative, scalar-last components.
    pub fn vehicle_quat(&self) -> Quat {
        quat_xyzw(
            self.x_vehicle.unwrap_or(IDENTITY_X),
            self.y_vehicle.unwrap_or(IDENTITY_Y),
            self.z_vehicle.unwrap_or(IDENTITY_Z),
            self.w_vehicle.unwrap_or(IDENTITY_W),
        )
    }

    /// Helmet orientation relative to the vehicle frame.
    pub fn helmet_quat(&self) -> Quat {
        quat_xyzw(
            self.x_helmet.unwrap_or(IDENTITY_X),
            self.y_helmet.unwrap_or(IDENTITY_Y),
            self.z_helmet.unwrap_or(IDENTITY_Z),
            self.w_helmet.unwrap_or(IDENTITY_W),
        )
    }

    pub fn position(&self) -> (f64, f64, f64) {
        (
            self.lat.unwrap_or(0.0),
            self.lon.unwrap_or(0.0),
            self.alt.unwrap_or(0.0),
        )
    }

    /// (north, east, down) in m/s.
    pub fn velocity_ned(&self) -> (f64, f64, f64) {
        (
            self.north.unwrap_or(0.0),
            self.east.unwrap_or(0.0),
            self.down.unwrap_or(0.0),
        )
    }
}

/// A sample with its normalized timestamp and original row position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedSample {
    pub index: usize,
    pub timestamp_seconds: f64,
    pub timestamp_nanos: i64,
    pub sample: Sample,
}

/// Known equivalence between a data-clock and a playback-clock instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrespondencePoint {
    pub data_clock_seconds: f64,
    pub playback_clock_seconds: f64,
}

impl CorrespondencePoint {
    pub fn new(data_clock_seconds: f64, playback_clock_seconds: f64) -> Self {
        CorrespondencePoint {
            data_clock_seconds,
            playback_clock_seconds,
        }
    }
}

/// Flat per-row record handed to the playback layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedRecord {
    pub index: usize,
    pub source_row: usize,
    pub timestamp_seconds: f64,
    pub timestamp_ns: i64,

    #[serde(rename = "VQX")]
    pub vqx: f64,
    #[serde(rename = "VQY")]
    pub vqy: f64,
    #[serde(rename = "VQZ")]
    pub vqz: f64,
    #[serde(rename = "VQW")]
    pub vqw: f64,

    #[serde(rename = "HQX")]
    pub hqx: f64,
    #[serde(rename = "HQY")]
    pub hqy: f64,
    #[serde(rename = "HQZ")]
    pub hqz: f64,
    #[serde(rename = "HQW")]
    pub hqw: f64,

    #[serde(rename = "VLAT")]
    pub vlat: f64,
    #[serde(rename = "VLON")]
    pub vlon: f64,
    #[serde(rename = "VALT")]
    pub valt: f64,
    #[serde(rename = "VVN")]
    pub vvn: f64,
    #[serde(rename = "VVE")]
    pub vve: f64,
    #[serde(rename = "VVD")]
    pub vvd: f64,
    #[serde(rename = "VINS")]
    pub vins: i64,
    #[serde(rename = "GSPEED")]
    pub gspeed: f64,

    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub helmet_roll: f64,
    pub helmet_pitch: f64,
    pub helmet_yaw: f64,
}

/// Whole-trajectory positions, insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathData {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub alts: Vec<f64>,
}

/// Whole-trajectory vehicle attitude in degrees, insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeData {
    pub yaws: Vec<f64>,
    pub pitches: Vec<f64>,
    pub rolls: Vec<f64>,
}

impl AttitudeData {
    pub fn len(&self) -> usize {
        self.yaws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.yaws.is_empty()
    }

    fn extend(&mut self, other: AttitudeData) {
        self.yaws.extend(other.yaws);
        self.pitches.extend(other.pitches);
        self.rolls.extend(other.rolls);
    }

    /// Concatenate shards in order.
    pub fn concat(parts: impl IntoIterator<Item = AttitudeData>) -> Self {
        let mut out = AttitudeData::default();
        for part in parts {
            out.extend(part);
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    /// Timestamp-order position, the same key `data_at_index` takes.
    pub index: usize,
    pub source_row: usize,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}
