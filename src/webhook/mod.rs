//! Device webhook ingress
//!
//! Payloads arrive as `{deviceType, rawPayload, deviceMeta}`. The shape of
//! `rawPayload` depends on the device type; [`DeviceReading::parse`] turns it
//! into a typed variant so the normalizer can match exhaustively.

pub mod normalizer;

pub use normalizer::{NormalizerConfig, WebhookNormalizer, WebhookOutcome};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MalformedPayload;

/// Inbound webhook envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub device_type: String,
    #[serde(default)]
    pub raw_payload: Value,
    #[serde(default)]
    pub device_meta: DeviceMeta,
}

impl WebhookPayload {
    /// Tenant carried inside the raw payload, if any
    pub fn tenant_id(&self) -> Option<&str> {
        self.raw_payload.get("tenantId").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMeta {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
}

impl DeviceMeta {
    /// Name, else location, else a generic label with the device id
    pub fn display_name(&self, fallback_kind: &str) -> String {
        self.name
            .clone()
            .or_else(|| self.location.clone())
            .unwrap_or_else(|| format!("{} {}", fallback_kind, self.device_id))
    }
}

/// Either bound may be absent, meaning unbounded on that side
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub target: Option<f64>,
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Strictly below `min` or strictly above `max`
    pub fn is_outside(&self, value: f64) -> bool {
        self.min.is_some_and(|min| value < min) || self.max.is_some_and(|max| value > max)
    }

    /// `target`, else the midpoint of the band, else whichever bound exists
    pub fn target_or_mid(&self) -> Option<f64> {
        self.target.or(match (self.min, self.max) {
            (Some(min), Some(max)) => Some((min + max) / 2.0),
            (min, max) => min.or(max),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GravityReading {
    pub specific_gravity: Option<f64>,
    pub temperature: Option<f64>,
    pub batch_id: Option<String>,
    pub batch_name: Option<String>,
    /// Fermentation monitors may carry their own temperature band
    pub temperature_thresholds: Option<Thresholds>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TankReading {
    pub level: f64,
    pub capacity: f64,
    pub tank_name: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhReading {
    pub ph: f64,
    pub temperature: Option<f64>,
}

/// One device reading, keyed by device type
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceReading {
    TemperatureSensor(TemperatureReading),
    FermentationMonitor(GravityReading),
    Hydrometer(GravityReading),
    TankLevelSensor(TankReading),
    PhMeter(PhReading),
}

impl DeviceReading {
    pub fn device_type(&self) -> &'static str {
        match self {
            DeviceReading::TemperatureSensor(_) => "temperature_sensor",
            DeviceReading::FermentationMonitor(_) => "fermentation_monitor",
            DeviceReading::Hydrometer(_) => "hydrometer",
            DeviceReading::TankLevelSensor(_) => "tank_level_sensor",
            DeviceReading::PhMeter(_) => "ph_meter",
        }
    }

    /// Accepts `temperature_sensor` or `TEMPERATURE_SENSOR`
    pub fn parse(device_type: &str, raw: &Value) -> Result<Self, MalformedPayload> {
        match device_type.trim().to_lowercase().as_str() {
            "temperature_sensor" => Ok(DeviceReading::TemperatureSensor(TemperatureReading {
                temperature: required(raw, "temperature_sensor", "temperature")?,
            })),
            "fermentation_monitor" => Ok(DeviceReading::FermentationMonitor(GravityReading {
                specific_gravity: optional(raw, "fermentation_monitor", "specificGravity")?,
                temperature: optional(raw, "fermentation_monitor", "temperature")?,
                batch_id: string(raw, "batchId"),
                batch_name: string(raw, "batchName"),
                temperature_thresholds: match raw.get("temperatureThresholds") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(serde_json::from_value(v.clone()).map_err(|_| {
                        MalformedPayload::InvalidField {
                            device_type: "fermentation_monitor",
                            field: "temperatureThresholds",
                        }
                    })?),
                },
            })),
            "hydrometer" => Ok(DeviceReading::Hydrometer(GravityReading {
                specific_gravity: Some(required(raw, "hydrometer", "specificGravity")?),
                temperature: optional(raw, "hydrometer", "temperature")?,
                batch_id: string(raw, "batchId"),
                batch_name: string(raw, "batchName"),
                temperature_thresholds: None,
            })),
            "tank_level_sensor" => {
                let level = required(raw, "tank_level_sensor", "level")?;
                let capacity = required(raw, "tank_level_sensor", "capacity")?;
                if capacity <= 0.0 {
                    return Err(MalformedPayload::InvalidField {
                        device_type: "tank_level_sensor",
                        field: "capacity",
                    });
                }
                Ok(DeviceReading::TankLevelSensor(TankReading {
                    level,
                    capacity,
                    tank_name: string(raw, "tankName"),
                    product: string(raw, "product"),
                }))
            }
            "ph_meter" => Ok(DeviceReading::PhMeter(PhReading {
                ph: match optional(raw, "ph_meter", "pH")? {
                    Some(ph) => ph,
                    None => required(raw, "ph_meter", "ph")?,
                },
                temperature: optional(raw, "ph_meter", "temperature")?,
            })),
            _ => Err(MalformedPayload::UnknownDeviceType(device_type.to_string())),
        }
    }
}

/// Present and finite; numeric strings are accepted
fn optional(raw: &Value, device_type: &'static str, field: &'static str) -> Result<Option<f64>, MalformedPayload> {
    let invalid = MalformedPayload::InvalidField { device_type, field };
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()).map(Some).ok_or(invalid),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or(invalid),
        Some(_) => Err(invalid),
    }
}

fn required(raw: &Value, device_type: &'static str, field: &'static str) -> Result<f64, MalformedPayload> {
    optional(raw, device_type, field)?.ok_or(MalformedPayload::InvalidField { device_type, field })
}

fn string(raw: &Value, field: &str) -> Option<String> {
    match raw.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_envelope() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "deviceType": "temperature_sensor",
            "rawPayload": {"temperature": 66.2, "tenantId": "t-1"},
            "deviceMeta": {"deviceId": "tilt-1", "location": "FV-3", "thresholds": {"min": 64, "max": 70}}
        }))
        .unwrap();
        assert_eq!(payload.tenant_id(), Some("t-1"));
        assert_eq!(payload.device_meta.display_name("Temperature Sensor"), "FV-3");
        let thresholds = payload.device_meta.thresholds.unwrap();
        assert_eq!(thresholds.target_or_mid(), Some(67.0));
    }

    #[test]
    fn test_parse_variants() {
        let reading = DeviceReading::parse("TEMPERATURE_SENSOR", &json!({"temperature": "68.5"})).unwrap();
        assert_eq!(reading, DeviceReading::TemperatureSensor(TemperatureReading { temperature: 68.5 }));

        let reading = DeviceReading::parse("ph_meter", &json!({"pH": 4.4})).unwrap();
        assert_eq!(reading.device_type(), "ph_meter");

        let reading = DeviceReading::parse("fermentation_monitor", &json!({"batchId": 12})).unwrap();
        match reading {
            DeviceReading::FermentationMonitor(r) => {
                assert_eq!(r.batch_id.as_deref(), Some("12"));
                assert!(r.specific_gravity.is_none());
            }
            other => panic!("unexpected reading {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            DeviceReading::parse("flux_capacitor", &json!({})),
            Err(MalformedPayload::UnknownDeviceType("flux_capacitor".to_string()))
        );
        assert_eq!(
            DeviceReading::parse("temperature_sensor", &json!({"temperature": "warm"})),
            Err(MalformedPayload::InvalidField {
                device_type: "temperature_sensor",
                field: "temperature"
            })
        );
        assert_eq!(
            DeviceReading::parse("tank_level_sensor", &json!({"level": 10, "capacity": 0})),
            Err(MalformedPayload::InvalidField {
                device_type: "tank_level_sensor",
                field: "capacity"
            })
        );
        assert!(DeviceReading::parse("hydrometer", &json!({})).is_err());
    }

    #[test]
    fn test_thresholds_bounds_are_inclusive() {
        let t = Thresholds {
            min: Some(60.0),
            max: Some(70.0),
            target: None,
        };
        assert!(!t.is_outside(70.0));
        assert!(!t.is_outside(60.0));
        assert!(t.is_outside(70.1));
        assert!(t.is_outside(59.9));
    }
}
