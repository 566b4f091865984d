//! Data models for OBD samples, prediction results and service bookings.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---

/// One sensor group of an OBD sample, kept as the JSON object it was stored as.
///
/// Values pass through untouched: an integer stays an integer, a boolean flag
/// stays a boolean, and keys this crate never reads still reach the prediction
/// payload. Sample documents are edited by hand, so the group is not narrowed
/// to a fixed schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Readings(Map<String, Value>);

/// Engine group: `engine_temp_c`, `engine_rpm`, `oil_pressure_psi`,
/// `coolant_temp_c`, `fuel_level_percent`, `vehicle_speed_kph`, ... plus the
/// engine-derived fields listed in `PayloadDefaults`.
pub type EngineReadings = Readings;

/// Brake group: `brake_fluid_level_percent`, `brake_pad_wear_percent`,
/// `abs_fault`, wheel speeds.
pub type BrakeReadings = Readings;

/// Battery group: `battery_voltage_v`, `battery_current_a`,
/// `battery_health_percent`, ...
pub type BatteryReadings = Readings;

impl Readings {
    // ---
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Numeric reading, `None` when absent, `null` or not a number.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.to_string(), value.into())
    }

    /// Builder form of [`Readings::insert`].
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// One pre-recorded OBD snapshot as stored in the document store.
///
/// A missing group deserializes to an empty group: absence is survivable and
/// is filled in by the normalizer, never treated as corruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    // ---
    pub id: String,
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub engine: EngineReadings,
    #[serde(default, deserialize_with = "null_as_default")]
    pub brake: BrakeReadings,
    #[serde(default, deserialize_with = "null_as_default")]
    pub battery: BatteryReadings,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Per-user profile document; carries the sample assignment pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    // ---
    pub uid: String,
    pub email: Option<String>,
    pub assigned_sample: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---

/// Health estimate for one component as returned by the prediction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    // ---
    /// Health in percent, 0–100.
    pub health_percent: f64,
    /// Status or recommendation text.
    #[serde(alias = "recommendation")]
    pub status: String,
    /// Remaining useful life in kilometres.
    pub rul_km: f64,
}

/// Coarse colour band used when rendering a health value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    Good,
    Fair,
    Poor,
}

impl HealthBand {
    pub fn from_percent(health: f64) -> Self {
        // ---
        if health >= 80.0 {
            HealthBand::Good
        } else if health >= 40.0 {
            HealthBand::Fair
        } else {
            HealthBand::Poor
        }
    }
}

impl ComponentHealth {
    // ---
    pub fn band(&self) -> HealthBand {
        HealthBand::from_percent(self.health_percent)
    }

    pub fn needs_service(&self, threshold: f64) -> bool {
        self.health_percent < threshold
    }
}

/// A complete prediction: all three components are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    // ---
    pub engine: ComponentHealth,
    pub battery: ComponentHealth,
    pub brake: ComponentHealth,
}

impl PredictionResult {
    /// Rounded mean of the three component healths.
    pub fn overall_health(&self) -> u8 {
        // ---
        let avg = (self.engine.health_percent
            + self.battery.health_percent
            + self.brake.health_percent)
            / 3.0;
        avg.round().clamp(0.0, 100.0) as u8
    }

    pub fn components(&self) -> [(&'static str, &ComponentHealth); 3] {
        [
            ("engine", &self.engine),
            ("battery", &self.battery),
            ("brake", &self.brake),
        ]
    }
}

// ---

/// Component a service booking is raised for.
pub const ISSUE_TYPES: [&str; 3] = ["engine", "battery", "brakes"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Booking form as submitted by the user.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    // ---
    pub customer_name: String,
    pub phone: String,
    pub preferred_date: String,
    pub preferred_time: String,
    pub centre_name: String,
    pub issue_type: String,
    pub location: Option<GeoPoint>,
    pub obd_data: Option<Value>,
}

/// Stored service booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    // ---
    pub id: Uuid,
    pub customer_name: String,
    pub phone: String,
    pub preferred_date: String,
    pub preferred_time: String,
    pub centre_name: String,
    pub issue_type: String,
    pub location: Option<GeoPoint>,
    pub obd_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl BookingRequest {
    /// Validate the form and stamp it with an id and creation time.
    pub fn into_booking(self) -> Result<Booking> {
        // ---
        let required = [
            ("customer_name", &self.customer_name),
            ("phone", &self.phone),
            ("preferred_date", &self.preferred_date),
            ("preferred_time", &self.preferred_time),
            ("centre_name", &self.centre_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                bail!("{} must not be empty", name);
            }
        }
        if !ISSUE_TYPES.contains(&self.issue_type.as_str()) {
            bail!(
                "issue_type must be one of {:?}, got {:?}",
                ISSUE_TYPES,
                self.issue_type
            );
        }

        Ok(Booking {
            id: Uuid::new_v4(),
            customer_name: self.customer_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            preferred_date: self.preferred_date,
            preferred_time: self.preferred_time,
            centre_name: self.centre_name,
            issue_type: self.issue_type,
            location: self.location,
            obd_data: self.obd_data,
            created_at: Utc::now(),
        })
    }
}
