use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Measurement groups accepted from device payloads.
///
/// Matches the measurement schema of the solar sensor firmware. Top-level
/// keys outside this list are ignored during decoding.
pub const RECOGNIZED_GROUPS: [&str; 7] = [
    "temperature",
    "ldr",
    "current",
    "voltage",
    "power",
    "generated_power",
    "pzem",
];

/// A decoded telemetry reading from a single device.
///
/// Immutable after decoding. `groups` holds only recognized measurement
/// groups, each reduced to its numeric and string fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub device_id: String,
    pub country_code: String,
    pub wallet_address: Option<String>,
    pub integrity_hash: Option<String>,
    pub groups: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
    pub received_at: DateTime<Utc>,
}

impl Reading {
    /// Power produced in the current reading, if the device reported it.
    ///
    /// Ledger submissions are derived from this figure; readings without it
    /// only flow to the time-series store.
    pub fn power_produced(&self) -> Option<f64> {
        self.groups.get("power")?.get("power_produced")?.as_f64()
    }
}

/// Decode and validate a raw telemetry payload.
///
/// The payload must be a JSON object carrying a non-empty `device_id` and
/// `country_code`, plus at least one recognized measurement group with at
/// least one numeric or string field. `wallet_address` and `hash` are
/// carried through unmodified when present.
pub fn decode_reading(payload: &[u8]) -> DomainResult<Reading> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| DomainError::MalformedPayload(e.to_string()))?;

    let object = value.as_object().ok_or_else(|| {
        DomainError::MalformedPayload("telemetry payload must be a JSON object".to_string())
    })?;

    let device_id = object
        .get("device_id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let country_code = object
        .get("country_code")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if device_id.is_empty() || country_code.is_empty() {
        return Err(DomainError::MissingIdentity);
    }

    let wallet_address = object
        .get("wallet_address")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    let integrity_hash = object
        .get("hash")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    let mut groups = BTreeMap::new();
    for name in RECOGNIZED_GROUPS {
        if let Some(serde_json::Value::Object(raw)) = object.get(name) {
            let fields: serde_json::Map<String, serde_json::Value> = raw
                .iter()
                .filter(|(_, value)| value.is_number() || value.is_string())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if !fields.is_empty() {
                groups.insert(name.to_string(), fields);
            }
        }
    }

    if groups.is_empty() {
        return Err(DomainError::NoMeasurements);
    }

    Ok(Reading {
        device_id: device_id.to_string(),
        country_code: country_code.to_string(),
        wallet_address,
        integrity_hash,
        groups,
        received_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(value: serde_json::Value) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    #[test]
    fn test_decode_reading_full_payload() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "wallet_address": "0xAbC",
            "hash": "deadbeef",
            "power": { "power_produced": 8.8, "battery_storage": 4.2 },
            "temperature": { "sensor1": 31.5, "sensor2": 30.9 },
            "ldr": { "raw_value": 812, "intensity": "bright" },
        }));

        let reading = decode_reading(&raw).unwrap();

        assert_eq!(reading.device_id, "dev1");
        assert_eq!(reading.country_code, "KE");
        assert_eq!(reading.wallet_address.as_deref(), Some("0xAbC"));
        assert_eq!(reading.integrity_hash.as_deref(), Some("deadbeef"));
        assert_eq!(reading.groups.len(), 3);
        assert_eq!(
            reading.groups["power"]["power_produced"],
            serde_json::json!(8.8)
        );
        assert_eq!(
            reading.groups["ldr"]["intensity"],
            serde_json::json!("bright")
        );
    }

    #[test]
    fn test_decode_reading_ignores_unrecognized_groups() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "power": { "power_produced": 1.0 },
            "gps": { "lat": 1.29, "lon": 36.82 },
            "firmware": "v2.1.0",
        }));

        let reading = decode_reading(&raw).unwrap();

        assert_eq!(reading.groups.len(), 1);
        assert!(reading.groups.contains_key("power"));
    }

    #[test]
    fn test_decode_reading_filters_non_scalar_fields() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "country_code": "NG",
            "power": {
                "power_produced": 2.5,
                "calibrated": true,
                "window": [1, 2, 3],
                "meta": { "slot": 4 },
                "note": null,
            },
        }));

        let reading = decode_reading(&raw).unwrap();

        let power = &reading.groups["power"];
        assert_eq!(power.len(), 1);
        assert_eq!(power["power_produced"], serde_json::json!(2.5));
    }

    #[test]
    fn test_decode_reading_rejects_invalid_json() {
        let result = decode_reading(b"not json at all");
        assert!(matches!(result, Err(DomainError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_reading_rejects_non_object_payload() {
        let raw = payload(serde_json::json!([1, 2, 3]));
        let result = decode_reading(&raw);
        assert!(matches!(result, Err(DomainError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_reading_rejects_missing_device_id() {
        let raw = payload(serde_json::json!({
            "country_code": "KE",
            "power": { "power_produced": 8.8 },
        }));

        let result = decode_reading(&raw);
        assert!(matches!(result, Err(DomainError::MissingIdentity)));
    }

    #[test]
    fn test_decode_reading_rejects_empty_device_id() {
        let raw = payload(serde_json::json!({
            "device_id": "",
            "country_code": "KE",
            "power": { "power_produced": 8.8 },
        }));

        let result = decode_reading(&raw);
        assert!(matches!(result, Err(DomainError::MissingIdentity)));
    }

    #[test]
    fn test_decode_reading_rejects_missing_country_code() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "power": { "power_produced": 8.8 },
        }));

        let result = decode_reading(&raw);
        assert!(matches!(result, Err(DomainError::MissingIdentity)));
    }

    #[test]
    fn test_decode_reading_rejects_payload_without_measurements() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "gps": { "lat": 1.29 },
        }));

        let result = decode_reading(&raw);
        assert!(matches!(result, Err(DomainError::NoMeasurements)));
    }

    #[test]
    fn test_decode_reading_rejects_groups_with_only_filtered_fields() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "power": { "calibrated": true, "note": null },
        }));

        let result = decode_reading(&raw);
        assert!(matches!(result, Err(DomainError::NoMeasurements)));
    }

    #[test]
    fn test_power_produced_present() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "power": { "power_produced": 8.8 },
        }));

        let reading = decode_reading(&raw).unwrap();
        assert_eq!(reading.power_produced(), Some(8.8));
    }

    #[test]
    fn test_power_produced_absent_without_power_group() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "temperature": { "sensor1": 30.0 },
        }));

        let reading = decode_reading(&raw).unwrap();
        assert_eq!(reading.power_produced(), None);
    }

    #[test]
    fn test_power_produced_absent_when_field_is_not_numeric() {
        let raw = payload(serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "power": { "power_produced": "8.8", "battery_storage": 4.0 },
        }));

        let reading = decode_reading(&raw).unwrap();
        assert_eq!(reading.power_produced(), None);
    }
}
