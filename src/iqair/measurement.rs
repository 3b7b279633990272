use std::{cmp::Ordering, fmt};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::iqair::Device;

/// Identifies this source in published payloads.
pub const DEVICE_TYPE: &str = "iqair";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Integer(i64),
    Float(f64),
}

impl fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementValue::Integer(v) => write!(f, "{v}"),
            MeasurementValue::Float(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub measured_at: DateTime<Utc>,

    pub name: String,

    pub value: MeasurementValue,

    pub unit: String,
}

/// Everything read from one export of the device.
///
/// Batches are ordered by `revision` alone, which is the device's own timestamp
/// for the export. Two batches with the same revision compare equal even when
/// their measurements differ.
#[derive(Debug, Clone)]
pub struct MeasurementBatch {
    revision: i64,
    device: Device,
    measurements: Vec<Measurement>,
}

impl MeasurementBatch {
    pub fn new(revision: i64, device: Device, measurements: Vec<Measurement>) -> Self {
        Self {
            revision,
            device,
            measurements,
        }
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Serializes the batch into the payload consumed downstream.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let payload = BatchPayload {
            location: &self.device.location,
            device_type: DEVICE_TYPE,
            device_name: &self.device.name,
            external: self.device.external,
            placement: &self.device.placement,
            measurements: self
                .measurements
                .iter()
                .map(|m| MeasurementPayload {
                    measered_at: m.measured_at.to_rfc3339_opts(SecondsFormat::AutoSi, false),
                    r#type: &m.name,
                    value: m.value,
                    unit: &m.unit,
                })
                .collect(),
        };

        serde_json::to_string(&payload)
    }
}

impl PartialEq for MeasurementBatch {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision
    }
}

impl Eq for MeasurementBatch {}

impl PartialOrd for MeasurementBatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MeasurementBatch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.revision.cmp(&other.revision)
    }
}

impl fmt::Display for MeasurementBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "revision {} from '{}' ({} measurements)",
            self.revision,
            self.device.name,
            self.measurements.len()
        )
    }
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    location: &'a str,
    device_type: &'static str,
    device_name: &'a str,
    external: bool,
    placement: &'a str,
    measurements: Vec<MeasurementPayload<'a>>,
}

// `measered_at` is the field name existing consumers read.
#[derive(Serialize)]
struct MeasurementPayload<'a> {
    measered_at: String,
    r#type: &'a str,
    value: MeasurementValue,
    unit: &'a str,
}
