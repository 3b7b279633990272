use chrono::{DateTime, LocalResult, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::iqair::{Device, DeviceMetadata, Measurement, MeasurementBatch, MeasurementValue};

const SETTINGS_SECTION: &str = "settings";
const MEASUREMENTS_SECTION: &str = "measurements";
const DATE_AND_TIME_SECTION: &str = "date_and_time";
const STATUS_SECTION: &str = "status";

const LOCAL_DATE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Where the revision and the per-measurement timestamp come from.
#[derive(Debug)]
enum TimestampSource<'a> {
    /// `date_and_time` with the device's local `date` and `time`.
    Localized {
        timestamp: &'a Value,
        date: &'a str,
        time: &'a str,
    },
    /// A Unix timestamp, either `date_and_time.timestamp` alone or `status.datetime`.
    Unix(&'a Value),
}

#[derive(Debug, thiserror::Error)]
enum SkipReason {
    #[error("key is not of the form <type>_<unit>")]
    MalformedKey,

    #[error("value {0} is not a number")]
    NotANumber(Value),
}

/// Builds a batch out of the measurements file exported by the device.
///
/// Local date and time found in the file are read in `timezone` and converted to
/// UTC. Entries that can't be parsed are logged and skipped; a missing section or
/// field fails the whole document with [`Error::DataCorrupted`].
pub fn parse_measurements(
    raw: &Value,
    metadata: &DeviceMetadata,
    timezone: Tz,
) -> Result<MeasurementBatch> {
    let settings = section(raw, SETTINGS_SECTION)?;
    let measurements_section = section(raw, MEASUREMENTS_SECTION)?;
    let timestamp_source = detect_timestamp_source(raw)?;

    let node_name = field(settings, "node_name")?
        .as_str()
        .ok_or_else(|| Error::DataCorrupted("'node_name' is not a string".to_string()))?;
    let is_indoor = field(settings, "is_indoor")?
        .as_bool()
        .ok_or_else(|| Error::DataCorrupted("'is_indoor' is not a boolean".to_string()))?;

    let (revision, measured_at) = match timestamp_source {
        TimestampSource::Localized {
            timestamp,
            date,
            time,
        } => (
            integer(timestamp, "timestamp")?,
            convert_to_utc(date, time, timezone)?,
        ),
        TimestampSource::Unix(timestamp) => {
            let revision = integer(timestamp, "timestamp")?;
            let measured_at = DateTime::<Utc>::from_timestamp(revision, 0).ok_or_else(|| {
                Error::DataCorrupted(format!("timestamp {revision} is out of range"))
            })?;
            (revision, measured_at)
        }
    };

    let device = Device::new(node_name, metadata, is_indoor);

    let entries = measurement_entries(measurements_section)?;
    let mut measurements = Vec::new();
    match entries {
        Some(entries) if !entries.is_empty() => {
            debug!(count = entries.len(), "parsing measurements");
            for (key, value) in entries {
                match parse_entry(key, value, measured_at) {
                    Ok(measurement) => {
                        debug!(
                            name = %measurement.name,
                            device = node_name,
                            measured_at = %measured_at.to_rfc3339(),
                            "parsed measurement"
                        );
                        measurements.push(measurement);
                    }
                    Err(reason) => {
                        warn!(
                            key = key.as_str(),
                            device = node_name,
                            %reason,
                            "can't parse measurement, will skip it"
                        );
                    }
                }
            }
        }
        _ => warn!(device = node_name, "measurements section is empty"),
    }

    Ok(MeasurementBatch::new(revision, device, measurements))
}

fn section<'a>(raw: &'a Value, name: &str) -> Result<&'a Value> {
    raw.get(name)
        .ok_or_else(|| Error::DataCorrupted(format!("data has no '{name}' section")))
}

fn field<'a>(section: &'a Value, key: &str) -> Result<&'a Value> {
    section
        .get(key)
        .ok_or_else(|| Error::DataCorrupted(format!("can't find key '{key}' in IQAir data")))
}

fn detect_timestamp_source(raw: &Value) -> Result<TimestampSource<'_>> {
    if let Some(date_and_time) = raw.get(DATE_AND_TIME_SECTION) {
        let timestamp = field(date_and_time, "timestamp")?;

        let date = date_and_time.get("date").and_then(Value::as_str);
        let time = date_and_time.get("time").and_then(Value::as_str);
        return match (date, time) {
            (Some(date), Some(time)) => Ok(TimestampSource::Localized {
                timestamp,
                date,
                time,
            }),
            (None, None) => Ok(TimestampSource::Unix(timestamp)),
            (Some(_), None) => Err(Error::DataCorrupted(
                "can't find key 'time' in IQAir data".to_string(),
            )),
            (None, Some(_)) => Err(Error::DataCorrupted(
                "can't find key 'date' in IQAir data".to_string(),
            )),
        };
    }

    if let Some(datetime) = raw.get(STATUS_SECTION).and_then(|s| s.get("datetime")) {
        return Ok(TimestampSource::Unix(datetime));
    }

    Err(Error::DataCorrupted(format!(
        "data has no '{DATE_AND_TIME_SECTION}' section"
    )))
}

fn integer(value: &Value, key: &str) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| Error::DataCorrupted(format!("'{key}' is not an integer: {value}")))
}

fn convert_to_utc(date: &str, time: &str, timezone: Tz) -> Result<DateTime<Utc>> {
    let local = format!("{date} {time}");
    let naive = NaiveDateTime::parse_from_str(&local, LOCAL_DATE_TIME_FORMAT)
        .map_err(|e| Error::DataCorrupted(format!("invalid local date and time '{local}': {e}")))?;

    let measured_at = match naive.and_local_timezone(timezone) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => {
            return Err(Error::DataCorrupted(format!(
                "local date and time '{local}' doesn't exist in {timezone}"
            )));
        }
    };

    Ok(measured_at.with_timezone(&Utc))
}

/// The section is either one mapping or a list whose first element is the mapping.
fn measurement_entries(section: &Value) -> Result<Option<&Map<String, Value>>> {
    match section {
        Value::Object(entries) => Ok(Some(entries)),
        Value::Array(items) => match items.first() {
            None => Ok(None),
            Some(Value::Object(entries)) => Ok(Some(entries)),
            Some(other) => Err(Error::DataCorrupted(format!(
                "unexpected item in '{MEASUREMENTS_SECTION}' section: {other}"
            ))),
        },
        Value::Null => Ok(None),
        other => Err(Error::DataCorrupted(format!(
            "unexpected '{MEASUREMENTS_SECTION}' section: {other}"
        ))),
    }
}

fn parse_entry(
    key: &str,
    value: &Value,
    measured_at: DateTime<Utc>,
) -> Result<Measurement, SkipReason> {
    let mut parts = key.split('_');
    let (Some(name), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SkipReason::MalformedKey);
    };

    let value = parse_value(value).ok_or_else(|| SkipReason::NotANumber(value.clone()))?;

    Ok(Measurement {
        measured_at,
        name: name.to_lowercase(),
        value,
        unit: unit.to_lowercase(),
    })
}

fn parse_value(value: &Value) -> Option<MeasurementValue> {
    match value {
        Value::String(s) if s.contains('.') => s.trim().parse().ok().map(MeasurementValue::Float),
        Value::String(s) => s.trim().parse().ok().map(MeasurementValue::Integer),
        Value::Number(n) if n.is_f64() => n.as_f64().map(MeasurementValue::Float),
        Value::Number(n) => n.as_i64().map(MeasurementValue::Integer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn metadata() -> DeviceMetadata {
        DeviceMetadata {
            placement: "test_placement".to_string(),
            location: "test_location".to_string(),
        }
    }

    fn iqair_data() -> Value {
        json!({
            "date_and_time": {
                "date": "2020/12/27",
                "time": "15:55:01",
                "timestamp": "1609084501"
            },
            "measurements": [
                {
                    "co2_ppm": "429",
                    "humidity_RH": "22",
                    "pm01_ugm3": "2.0",
                    "pm10_ugm3": "2",
                    "pm25_AQICN": "3",
                    "pm25_AQIUS": "8",
                    "pm25_ugm3": "2.0",
                    "temperature_C": "20.6",
                    "temperature_F": "69.0",
                    "voc_ppb": "-1"
                }
            ],
            "serial_number": "XXXXXXXXXX",
            "settings": {
                "follow_mode": "station",
                "is_indoor": true,
                "node_name": "test",
                "timezone": "America/New_York"
            },
            "status": {
                "datetime": 1609084501,
                "device_name": "AIRVISUAL-XXXXXXXXXX",
                "model": 30
            }
        })
    }

    fn parse(raw: &Value) -> Result<MeasurementBatch> {
        parse_measurements(raw, &metadata(), chrono_tz::America::New_York)
    }

    #[test]
    fn test_parse_localized_document() {
        let batch = parse(&iqair_data()).unwrap();

        let measured_at = Utc.with_ymd_and_hms(2020, 12, 27, 20, 55, 1).unwrap();
        let expected = [
            ("co2", MeasurementValue::Integer(429), "ppm"),
            ("humidity", MeasurementValue::Integer(22), "rh"),
            ("pm01", MeasurementValue::Float(2.0), "ugm3"),
            ("pm10", MeasurementValue::Integer(2), "ugm3"),
            ("pm25", MeasurementValue::Integer(3), "aqicn"),
            ("pm25", MeasurementValue::Integer(8), "aqius"),
            ("pm25", MeasurementValue::Float(2.0), "ugm3"),
            ("temperature", MeasurementValue::Float(20.6), "c"),
            ("temperature", MeasurementValue::Float(69.0), "f"),
            ("voc", MeasurementValue::Integer(-1), "ppb"),
        ]
        .map(|(name, value, unit)| Measurement {
            measured_at,
            name: name.to_string(),
            value,
            unit: unit.to_string(),
        });

        assert_eq!(batch.revision(), 1609084501);
        assert_eq!(
            batch.device(),
            &Device {
                name: "test".to_string(),
                placement: "test_placement".to_string(),
                location: "test_location".to_string(),
                external: false,
            }
        );
        assert_eq!(batch.measurements(), &expected);
    }

    #[test]
    fn test_parse_timestamp_only_document() {
        let raw = json!({
            "settings": {"node_name": "t", "is_indoor": true},
            "measurements": {"co2_ppm": "429"},
            "date_and_time": {"timestamp": "1000"}
        });

        let batch = parse(&raw).unwrap();

        assert_eq!(batch.revision(), 1000);
        assert_eq!(batch.device().name, "t");
        assert_eq!(batch.device().placement, "test_placement");
        assert_eq!(batch.device().location, "test_location");
        assert!(!batch.device().external);
        assert_eq!(
            batch.measurements(),
            &[Measurement {
                measured_at: Utc.timestamp_opt(1000, 0).unwrap(),
                name: "co2".to_string(),
                value: MeasurementValue::Integer(429),
                unit: "ppm".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_falls_back_to_status_datetime() {
        let raw = json!({
            "settings": {"node_name": "t", "is_indoor": false},
            "measurements": [{"pm25_ugm3": 4.5, "co2_ppm": 512}],
            "status": {"datetime": 1609084501}
        });

        let batch = parse(&raw).unwrap();

        assert_eq!(batch.revision(), 1609084501);
        assert!(batch.device().external);
        assert_eq!(batch.measurements()[0].value, MeasurementValue::Float(4.5));
        assert_eq!(batch.measurements()[1].value, MeasurementValue::Integer(512));
        assert_eq!(
            batch.measurements()[0].measured_at,
            Utc.with_ymd_and_hms(2020, 12, 27, 15, 55, 1).unwrap()
        );
    }

    #[test]
    fn test_parse_uses_reference_timezone() {
        let batch =
            parse_measurements(&iqair_data(), &metadata(), chrono_tz::Europe::Helsinki).unwrap();

        assert_eq!(
            batch.measurements()[0].measured_at,
            Utc.with_ymd_and_hms(2020, 12, 27, 13, 55, 1).unwrap()
        );
    }

    #[test]
    fn test_missing_sections() {
        for name in ["settings", "measurements", "date_and_time"] {
            let mut raw = iqair_data();
            raw.as_object_mut().unwrap().remove(name);
            if name == "date_and_time" {
                raw.as_object_mut().unwrap().remove("status");
            }

            match parse(&raw) {
                Err(Error::DataCorrupted(message)) => assert!(message.contains(name), "{message}"),
                other => panic!("expected DataCorrupted for '{name}', got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_fields() {
        for (section, key) in [
            ("settings", "node_name"),
            ("settings", "is_indoor"),
            ("date_and_time", "timestamp"),
            ("date_and_time", "time"),
        ] {
            let mut raw = iqair_data();
            raw[section].as_object_mut().unwrap().remove(key);

            match parse(&raw) {
                Err(Error::DataCorrupted(message)) => assert!(message.contains(key), "{message}"),
                other => panic!("expected DataCorrupted for '{key}', got {other:?}"),
            }
        }
    }

    #[test]
    fn test_non_integer_timestamp() {
        let mut raw = iqair_data();
        raw["date_and_time"]["timestamp"] = json!("16090845.01");

        assert!(matches!(parse(&raw), Err(Error::DataCorrupted(_))));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let raw = json!({
            "settings": {"node_name": "t", "is_indoor": true},
            "measurements": {
                "co2": "429",
                "pm25_ugm3_extra": "1",
                "humidity_RH": "n/a",
                "voc_ppb": null,
                "temperature_C": "20.6"
            },
            "date_and_time": {"timestamp": 1000}
        });

        let batch = parse(&raw).unwrap();

        assert_eq!(batch.measurements().len(), 1);
        assert_eq!(batch.measurements()[0].name, "temperature");
        assert_eq!(batch.measurements()[0].unit, "c");
        assert_eq!(batch.measurements()[0].value, MeasurementValue::Float(20.6));
    }

    #[test]
    fn test_values_with_surrounding_whitespace() {
        let raw = json!({
            "settings": {"node_name": "t", "is_indoor": true},
            "measurements": {"temperature_C": " 20.6", "co2_ppm": "429 "},
            "date_and_time": {"timestamp": "1000"}
        });

        let batch = parse(&raw).unwrap();

        assert_eq!(batch.measurements()[0].value, MeasurementValue::Float(20.6));
        assert_eq!(batch.measurements()[1].value, MeasurementValue::Integer(429));
    }

    #[test]
    fn test_empty_measurements_section() {
        for measurements in [json!([]), json!({}), json!([{}])] {
            let raw = json!({
                "settings": {"node_name": "t", "is_indoor": true},
                "measurements": measurements,
                "date_and_time": {"timestamp": "1000"}
            });

            let batch = parse(&raw).unwrap();

            assert_eq!(batch.revision(), 1000);
            assert!(batch.measurements().is_empty());
        }
    }

    #[test]
    fn test_nonexistent_local_time() {
        let mut raw = iqair_data();
        raw["date_and_time"]["date"] = json!("2021/03/14");
        raw["date_and_time"]["time"] = json!("02:30:00");

        assert!(matches!(parse(&raw), Err(Error::DataCorrupted(_))));
    }
}
