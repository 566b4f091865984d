//! Payload normalization: flattens a structured [`Sample`] into the
//! single-level key/value body the prediction endpoint expects.
//!
//! The endpoint reads keys by name, so the key names and default values here
//! are part of its wire contract. [`normalize`] is pure: identical input always
//! yields identical output, with no clock or randomness involved.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{Readings, Sample};

// ---

/// Fallbacks for engine-derived fields missing from raw samples, plus the
/// synthetic constants sent with every payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadDefaults {
    // ---
    pub brand: String,
    pub throttle_pos_percent: f64,
    pub engine_load_percent: f64,
    pub engine_hours: f64,
    pub exhaust_gas_temp_c: f64,
    pub air_flow_rate_gps: f64,
    /// `"<lat>,<lon>"`
    pub gps_coordinates: String,
    pub vibration_level: f64,
}

impl Default for PayloadDefaults {
    fn default() -> Self {
        Self {
            brand: "toyota".to_string(),
            throttle_pos_percent: 20.0,
            engine_load_percent: 45.0,
            engine_hours: 1500.0,
            exhaust_gas_temp_c: 400.0,
            air_flow_rate_gps: 15.0,
            gps_coordinates: "12.9716,77.5946".to_string(),
            vibration_level: 0.2,
        }
    }
}

impl PayloadDefaults {
    /// The defaulted fields, in the order they are applied.
    fn fields(&self) -> [(&'static str, Value); 7] {
        [
            ("throttle_pos_percent", Value::from(self.throttle_pos_percent)),
            ("engine_load_percent", Value::from(self.engine_load_percent)),
            ("engine_hours", Value::from(self.engine_hours)),
            ("exhaust_gas_temp_c", Value::from(self.exhaust_gas_temp_c)),
            ("air_flow_rate_gps", Value::from(self.air_flow_rate_gps)),
            ("gps_coordinates", Value::from(self.gps_coordinates.clone())),
            ("vibration_level", Value::from(self.vibration_level)),
        ]
    }
}

/// Flat key/value body of a prediction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlattenedPayload(Map<String, Value>);

impl FlattenedPayload {
    // ---
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Flatten `sample` into a prediction payload.
///
/// Groups are merged engine, brake, battery; on a key collision the later
/// group wins. Defaults fill only absent or `null` fields, so a recorded `0`
/// survives. `id` and `label` are never part of the payload.
pub fn normalize(sample: &Sample, defaults: &PayloadDefaults) -> FlattenedPayload {
    // ---
    let mut payload = Map::new();
    merge_group(&mut payload, &sample.engine);
    merge_group(&mut payload, &sample.brake);
    merge_group(&mut payload, &sample.battery);

    for (key, value) in defaults.fields() {
        if payload.get(key).map_or(true, Value::is_null) {
            payload.insert(key.to_string(), value);
        }
    }

    payload.insert("brand".to_string(), Value::from(defaults.brand.clone()));
    payload.insert("engine_failure_imminent".to_string(), Value::from(0));
    payload.insert("battery_issue_imminent".to_string(), Value::from(0));

    FlattenedPayload(payload)
}

fn merge_group(payload: &mut Map<String, Value>, group: &Readings) {
    payload.extend(group.iter().map(|(k, v)| (k.clone(), v.clone())));
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    const DEFAULTED: [&str; 7] = [
        "throttle_pos_percent",
        "engine_load_percent",
        "engine_hours",
        "exhaust_gas_temp_c",
        "air_flow_rate_gps",
        "gps_coordinates",
        "vibration_level",
    ];

    fn create_test_sample() -> Sample {
        // ---
        serde_json::from_value(json!({
            "id": "sample-007",
            "label": "Overheating uphill",
            "engine": {
                "engine_temp_c": 128.0,
                "engine_rpm": 3600,
                "oil_pressure_psi": 22.0,
                "coolant_temp_c": 118.0,
                "fuel_level_percent": 35,
                "vehicle_speed_kph": 42.0,
                "ambient_temp_c": 34.0,
                "odometer_km": 88210
            },
            "brake": {
                "brake_fluid_level_percent": 71.0,
                "brake_pad_wear_percent": 64.0,
                "abs_fault": false,
                "wheel_speed_fl_kph": 41.8
            },
            "battery": {
                "battery_voltage_v": 12.1,
                "battery_health_percent": 58.0
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_normalize_is_deterministic() {
        // ---
        let sample = create_test_sample();
        let defaults = PayloadDefaults::default();

        let first = serde_json::to_string(&normalize(&sample, &defaults)).unwrap();
        let second = serde_json::to_string(&normalize(&sample, &defaults)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_is_not_overwritten_by_default() {
        // ---
        let mut sample = create_test_sample();
        sample.engine.insert("throttle_pos_percent", 0);

        let payload = normalize(&sample, &PayloadDefaults::default());
        assert_eq!(payload.get("throttle_pos_percent"), Some(&json!(0)));
    }

    #[test]
    fn test_null_extra_field_takes_default() {
        // ---
        let mut sample = create_test_sample();
        sample.engine.insert("vibration_level", Value::Null);

        let payload = normalize(&sample, &PayloadDefaults::default());
        assert_eq!(payload.get("vibration_level"), Some(&json!(0.2)));
    }

    #[test]
    fn test_synthetic_constants_and_raw_fields() {
        // ---
        let sample = create_test_sample();
        let payload = normalize(&sample, &PayloadDefaults::default());

        assert_eq!(payload.get("brand"), Some(&json!("toyota")));
        assert_eq!(payload.get("engine_failure_imminent"), Some(&json!(0)));
        assert_eq!(payload.get("battery_issue_imminent"), Some(&json!(0)));

        assert_eq!(payload.get("engine_temp_c"), Some(&json!(128.0)));
        assert_eq!(payload.get("engine_rpm"), Some(&json!(3600)));
        assert_eq!(payload.get("odometer_km"), Some(&json!(88210)));
        assert_eq!(payload.get("brake_pad_wear_percent"), Some(&json!(64.0)));
        assert_eq!(payload.get("abs_fault"), Some(&json!(false)));
        assert_eq!(payload.get("battery_voltage_v"), Some(&json!(12.1)));

        assert!(payload.get("id").is_none());
        assert!(payload.get("label").is_none());
    }

    #[test]
    fn test_exactly_seven_defaults_added() {
        // ---
        let sample = create_test_sample();
        let raw_fields = 8 + 4 + 2;
        let payload = normalize(&sample, &PayloadDefaults::default());

        assert_eq!(payload.len(), raw_fields + DEFAULTED.len() + 3);
        assert_eq!(payload.get("throttle_pos_percent"), Some(&json!(20.0)));
        assert_eq!(payload.get("gps_coordinates"), Some(&json!("12.9716,77.5946")));
        for key in DEFAULTED {
            assert!(payload.get(key).is_some(), "missing default for {key}");
        }
    }

    #[test]
    fn test_later_group_wins_on_collision() {
        // ---
        let mut sample = create_test_sample();
        sample.brake.insert("sensor_fw", "brake-1.2");
        sample.battery.insert("sensor_fw", "battery-3.0");

        let payload = normalize(&sample, &PayloadDefaults::default());
        assert_eq!(payload.get("sensor_fw"), Some(&json!("battery-3.0")));
    }

    #[test]
    fn test_custom_brand() {
        // ---
        let defaults = PayloadDefaults {
            brand: "lexus".to_string(),
            ..Default::default()
        };
        let payload = normalize(&create_test_sample(), &defaults);
        assert_eq!(payload.get("brand"), Some(&json!("lexus")));
    }

    #[test]
    fn test_integer_and_boolean_readings_pass_through() {
        // ---
        let mut sample = create_test_sample();
        sample.engine.insert("engine_hours", 4200);
        sample.brake.insert("abs_fault", true);

        let payload = normalize(&sample, &PayloadDefaults::default());
        let body = serde_json::to_value(&payload).unwrap();
        assert_eq!(body["engine_hours"], json!(4200));
        assert!(body["engine_hours"].is_u64());
        assert_eq!(body["abs_fault"], json!(true));
    }
}
