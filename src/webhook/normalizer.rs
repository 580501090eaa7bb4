//! Maps device readings to notification drafts or domain events
//!
//! Stateful per device: gravity stability streaks and the last tank band are
//! remembered between invocations. Malformed input is logged and dropped,
//! never returned as an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{DeviceMeta, DeviceReading, GravityReading, PhReading, TankReading, Thresholds, WebhookPayload};
use crate::error::{ConfigError, MalformedPayload};
use crate::event::{Event, EventType};
use crate::notification::classifier::{compose, Classified};
use crate::notification::{NotificationDraft, NotificationType};

/// Normalizer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizerConfig {
    /// Distance beyond min/max at which a temperature becomes critical
    pub critical_margin: f64,
    /// Gravity delta below which a reading counts as stable
    pub gravity_epsilon: f64,
    /// Consecutive stable readings before fermentation is considered ended
    pub stable_readings: u32,
    pub tank_low_ratio: f64,
    pub tank_high_ratio: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            critical_margin: 5.0,
            gravity_epsilon: 0.002,
            stable_readings: 3,
            tank_low_ratio: 0.20,
            tank_high_ratio: 0.95,
        }
    }
}

impl NormalizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.critical_margin >= 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "webhook.criticalMargin",
                reason: "must be non-negative".to_string(),
            });
        }
        if !(self.gravity_epsilon > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "webhook.gravityEpsilon",
                reason: "must be positive".to_string(),
            });
        }
        if self.stable_readings == 0 {
            return Err(ConfigError::InvalidValue {
                key: "webhook.stableReadings",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.tank_low_ratio < self.tank_high_ratio) {
            return Err(ConfigError::InvalidValue {
                key: "webhook.tankLowRatio",
                reason: "must be below tankHighRatio".to_string(),
            });
        }
        Ok(())
    }
}

/// Result of one webhook invocation; at most one draft or one event
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Dropped { reason: MalformedPayload },
    NoAction,
    Notification(NotificationDraft),
    Event(Event),
}

#[derive(Debug, Default)]
struct GravityTrack {
    last: Option<f64>,
    stable: u32,
    /// Set once the end event fired; cleared by an unstable reading
    ended: bool,
}

impl GravityTrack {
    /// Record a reading and report whether the end event is due
    fn observe(&mut self, gravity: f64, config: &NormalizerConfig) -> bool {
        if let Some(last) = self.last {
            if (gravity - last).abs() < config.gravity_epsilon {
                self.stable += 1;
            } else {
                self.stable = 0;
                self.ended = false;
            }
        }
        self.last = Some(gravity);
        self.stable >= config.stable_readings && !self.ended
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TankBand {
    Low,
    Normal,
    High,
}

#[derive(Debug, Default)]
pub struct WebhookNormalizer {
    config: NormalizerConfig,
    gravity: HashMap<String, GravityTrack>,
    tanks: HashMap<String, TankBand>,
}

impl WebhookNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Parse a raw JSON body and process it
    pub fn process_json(&mut self, body: &Value) -> WebhookOutcome {
        match serde_json::from_value::<WebhookPayload>(body.clone()) {
            Ok(payload) => self.process(&payload),
            Err(e) => drop_payload(MalformedPayload::Envelope(e.to_string())),
        }
    }

    pub fn process(&mut self, payload: &WebhookPayload) -> WebhookOutcome {
        let reading = match DeviceReading::parse(&payload.device_type, &payload.raw_payload) {
            Ok(reading) => reading,
            Err(reason) => return drop_payload(reason),
        };
        let meta = &payload.device_meta;
        let tenant_id = payload.tenant_id().unwrap_or_default();
        debug!(device_type = reading.device_type(), device_id = %meta.device_id, "Processing device reading");

        let outcome = match &reading {
            DeviceReading::TemperatureSensor(r) => {
                self.temperature(meta, meta.thresholds.as_ref(), r.temperature, tenant_id)
            }
            DeviceReading::FermentationMonitor(r) | DeviceReading::Hydrometer(r) => self.gravity(meta, r, tenant_id),
            DeviceReading::TankLevelSensor(r) => self.tank(meta, r, tenant_id),
            DeviceReading::PhMeter(r) => ph(meta, r, tenant_id),
        };

        match &outcome {
            WebhookOutcome::Notification(draft) => info!(
                device_id = %meta.device_id,
                notification_type = %draft.notification_type,
                priority = %draft.priority,
                "Device reading raised notification"
            ),
            WebhookOutcome::Event(event) => info!(
                device_id = %meta.device_id,
                event_type = %event.event_type,
                "Device reading raised event"
            ),
            _ => {}
        }
        outcome
    }

    fn temperature(
        &self,
        meta: &DeviceMeta,
        thresholds: Option<&Thresholds>,
        temperature: f64,
        tenant_id: &str,
    ) -> WebhookOutcome {
        let Some(thresholds) = thresholds.filter(|t| !t.is_empty()) else {
            return WebhookOutcome::NoAction;
        };
        if !thresholds.is_outside(temperature) {
            return WebhookOutcome::NoAction;
        }

        let margin = self.config.critical_margin;
        let critical = thresholds.min.is_some_and(|min| temperature < min - margin)
            || thresholds.max.is_some_and(|max| temperature > max + margin);
        let target = thresholds.target_or_mid().unwrap_or(temperature);
        let threshold = match (thresholds.min, thresholds.max) {
            (Some(min), Some(max)) => (target - min).max(max - target),
            (Some(min), None) => target - min,
            (None, Some(max)) => max - target,
            (None, None) => 0.0,
        };

        let context = json!({
            "equipment": {
                "id": meta.device_id,
                "name": meta.display_name("Temperature Sensor"),
                "location": meta.location,
            },
            "deviceId": meta.device_id,
            "currentTemp": temperature,
            "targetTemp": target,
            "threshold": threshold,
            "severity": if critical { "critical" } else { "warning" },
            "tenantId": tenant_id,
        });
        WebhookOutcome::Notification(crate::notification::classify(NotificationType::TemperatureAlert, &context))
    }

    fn gravity(&mut self, meta: &DeviceMeta, reading: &GravityReading, tenant_id: &str) -> WebhookOutcome {
        let temperature_alert = match (reading.temperature, reading.temperature_thresholds.as_ref()) {
            (Some(temperature), Some(thresholds)) => Some(self.temperature(meta, Some(thresholds), temperature, tenant_id)),
            _ => None,
        };

        let end_due = match reading.specific_gravity {
            Some(gravity) => self
                .gravity
                .entry(meta.device_id.clone())
                .or_default()
                .observe(gravity, &self.config),
            None => false,
        };

        // A temperature alert takes the single output slot; the end event
        // stays due and fires on the next stable reading.
        if let Some(outcome @ WebhookOutcome::Notification(_)) = temperature_alert {
            return outcome;
        }
        if !end_due {
            return WebhookOutcome::NoAction;
        }
        if let Some(track) = self.gravity.get_mut(&meta.device_id) {
            track.ended = true;
        }

        let batch_id = reading.batch_id.clone().unwrap_or_else(|| meta.device_id.clone());
        let batch_name = reading.batch_name.clone().unwrap_or_else(|| format!("Batch {}", batch_id));
        let payload = json!({
            "batch": {"id": batch_id, "name": batch_name},
            "fermentationData": {
                "finalGravity": reading.specific_gravity,
                "temperature": reading.temperature,
                "stableReadings": self.config.stable_readings,
            },
            "deviceId": meta.device_id,
            "tenantId": tenant_id,
        });
        WebhookOutcome::Event(
            Event::new(EventType::FermentationEnded, payload).with_source(format!("webhook:{}", meta.device_id)),
        )
    }

    fn tank(&mut self, meta: &DeviceMeta, reading: &TankReading, tenant_id: &str) -> WebhookOutcome {
        let (low, high) = match meta.thresholds {
            Some(t) => (
                t.min.unwrap_or(self.config.tank_low_ratio),
                t.max.unwrap_or(self.config.tank_high_ratio),
            ),
            None => (self.config.tank_low_ratio, self.config.tank_high_ratio),
        };
        let ratio = reading.level / reading.capacity;
        let band = if ratio < low {
            TankBand::Low
        } else if ratio > high {
            TankBand::High
        } else {
            TankBand::Normal
        };

        let previous = self.tanks.insert(meta.device_id.clone(), band);
        if previous == Some(band) || band == TankBand::Normal {
            return WebhookOutcome::NoAction;
        }

        let tank = reading
            .tank_name
            .clone()
            .unwrap_or_else(|| meta.display_name("Tank"));
        let percent = ratio * 100.0;
        let context = json!({
            "tankId": meta.device_id,
            "tankName": tank,
            "level": reading.level,
            "capacity": reading.capacity,
            "percentFull": percent,
            "product": reading.product,
            "tenantId": tenant_id,
        });
        let (notification_type, classified) = match band {
            TankBand::Low => (
                NotificationType::InventoryLowStock,
                Classified {
                    title: "Tank Level Low".to_string(),
                    message: format!(
                        "{} is {:.1}% full ({}/{} gallons)",
                        tank, percent, reading.level, reading.capacity
                    ),
                    action_url: Some(format!("/inventory/tanks/{}", meta.device_id)),
                    source: "tank-monitoring",
                },
            ),
            TankBand::High | TankBand::Normal => (
                NotificationType::EquipmentMaintenance,
                Classified {
                    title: "Tank Nearly Full".to_string(),
                    message: format!("{} is {:.1}% full - consider transferring", tank, percent),
                    action_url: Some(format!("/production/transfer?tank={}", meta.device_id)),
                    source: "tank-monitoring",
                },
            ),
        };
        WebhookOutcome::Notification(compose(notification_type, Some(classified), &context))
    }
}

fn ph(meta: &DeviceMeta, reading: &PhReading, tenant_id: &str) -> WebhookOutcome {
    let Some(thresholds) = meta.thresholds.filter(|t| !t.is_empty()) else {
        return WebhookOutcome::NoAction;
    };
    if !thresholds.is_outside(reading.ph) {
        return WebhookOutcome::NoAction;
    }

    let range = |bound: Option<f64>| bound.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string());
    let location = meta.location.clone().unwrap_or_else(|| meta.display_name("pH Meter"));
    let context = json!({
        "deviceId": meta.device_id,
        "pH": reading.ph,
        "temperature": reading.temperature,
        "location": location,
        "tenantId": tenant_id,
    });
    let classified = Classified {
        title: "pH Alert".to_string(),
        message: format!(
            "pH level {} is outside acceptable range ({}-{}) at {}",
            reading.ph,
            range(thresholds.min),
            range(thresholds.max),
            location
        ),
        action_url: Some(format!("/quality-control/ph-readings?device={}", meta.device_id)),
        source: "ph-monitoring",
    };
    WebhookOutcome::Notification(compose(NotificationType::QcCheckRequired, Some(classified), &context))
}

fn drop_payload(reason: MalformedPayload) -> WebhookOutcome {
    warn!(reason = %reason, "Dropping malformed webhook payload");
    WebhookOutcome::Dropped { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Priority;

    fn payload(device_type: &str, raw: Value, meta: Value) -> WebhookPayload {
        serde_json::from_value(json!({
            "deviceType": device_type,
            "rawPayload": raw,
            "deviceMeta": meta,
        }))
        .unwrap()
    }

    fn temperature(normalizer: &mut WebhookNormalizer, value: f64) -> WebhookOutcome {
        normalizer.process(&payload(
            "temperature_sensor",
            json!({"temperature": value}),
            json!({"deviceId": "t1", "name": "FV-1", "thresholds": {"min": 60, "max": 70, "target": 65}}),
        ))
    }

    fn draft(outcome: WebhookOutcome) -> NotificationDraft {
        match outcome {
            WebhookOutcome::Notification(draft) => draft,
            other => panic!("expected notification, got {:?}", other),
        }
    }

    #[test]
    fn test_temperature_boundaries() {
        let mut n = WebhookNormalizer::default();
        assert!(matches!(temperature(&mut n, 70.0), WebhookOutcome::NoAction));
        assert!(matches!(temperature(&mut n, 60.0), WebhookOutcome::NoAction));

        let warning = draft(temperature(&mut n, 70.1));
        assert_eq!(warning.priority, Priority::High);
        assert_eq!(warning.notification_type, NotificationType::TemperatureAlert);
        assert!(warning.message.contains("70.1"));

        // margin edge is still a warning
        assert_eq!(draft(temperature(&mut n, 75.0)).priority, Priority::High);
        assert_eq!(draft(temperature(&mut n, 75.1)).priority, Priority::Critical);
        assert_eq!(draft(temperature(&mut n, 54.0)).priority, Priority::Critical);
    }

    #[test]
    fn test_temperature_without_thresholds() {
        let mut n = WebhookNormalizer::default();
        let outcome = n.process(&payload("temperature_sensor", json!({"temperature": 99}), json!({"deviceId": "t1"})));
        assert!(matches!(outcome, WebhookOutcome::NoAction));
    }

    #[test]
    fn test_malformed_is_dropped() {
        let mut n = WebhookNormalizer::default();
        let outcome = n.process(&payload("laser", json!({}), json!({})));
        assert!(matches!(
            outcome,
            WebhookOutcome::Dropped {
                reason: MalformedPayload::UnknownDeviceType(_)
            }
        ));

        let outcome = n.process_json(&json!({"rawPayload": {}}));
        assert!(matches!(
            outcome,
            WebhookOutcome::Dropped {
                reason: MalformedPayload::Envelope(_)
            }
        ));
    }

    fn gravity(n: &mut WebhookNormalizer, device: &str, sg: f64) -> WebhookOutcome {
        n.process(&payload(
            "hydrometer",
            json!({"specificGravity": sg, "batchId": "b-7", "batchName": "Oatmeal Stout"}),
            json!({"deviceId": device}),
        ))
    }

    #[test]
    fn test_fermentation_end_after_stable_streak() {
        let mut n = WebhookNormalizer::default();
        let readings = [1.020, 1.012, 1.0115, 1.0112, 1.0110];
        let outcomes: Vec<_> = readings.iter().map(|sg| gravity(&mut n, "h1", *sg)).collect();

        for outcome in &outcomes[..4] {
            assert!(matches!(outcome, WebhookOutcome::NoAction));
        }
        match &outcomes[4] {
            WebhookOutcome::Event(event) => {
                assert_eq!(event.event_type, EventType::FermentationEnded);
                assert_eq!(event.payload["batch"]["name"], json!("Oatmeal Stout"));
                assert_eq!(event.source_component_id, "webhook:h1");
            }
            other => panic!("expected event, got {:?}", other),
        }

        // latched until an unstable reading
        assert!(matches!(gravity(&mut n, "h1", 1.0110), WebhookOutcome::NoAction));
        assert!(matches!(gravity(&mut n, "h1", 1.0050), WebhookOutcome::NoAction));
        for _ in 0..2 {
            assert!(matches!(gravity(&mut n, "h1", 1.0050), WebhookOutcome::NoAction));
        }
        assert!(matches!(gravity(&mut n, "h1", 1.0050), WebhookOutcome::Event(_)));
    }

    #[test]
    fn test_gravity_tracked_per_device() {
        let mut n = WebhookNormalizer::default();
        for _ in 0..3 {
            gravity(&mut n, "a", 1.010);
            gravity(&mut n, "b", 1.030);
        }
        assert!(matches!(gravity(&mut n, "a", 1.010), WebhookOutcome::Event(_)));
        assert!(matches!(gravity(&mut n, "b", 1.050), WebhookOutcome::NoAction));
    }

    #[test]
    fn test_fermentation_monitor_temperature_takes_precedence() {
        let mut n = WebhookNormalizer::default();
        let monitor = |sg: f64, temp: f64| {
            payload(
                "fermentation_monitor",
                json!({"specificGravity": sg, "temperature": temp,
                       "temperatureThresholds": {"min": 64, "max": 70}}),
                json!({"deviceId": "m1", "location": "FV-4"}),
            )
        };
        for _ in 0..3 {
            assert!(matches!(n.process(&monitor(1.010, 66.0)), WebhookOutcome::NoAction));
        }
        let alert = draft(n.process(&monitor(1.010, 80.0)));
        assert_eq!(alert.priority, Priority::Critical);
        // the end event was held back, not lost
        assert!(matches!(n.process(&monitor(1.010, 66.0)), WebhookOutcome::Event(_)));
    }

    #[test]
    fn test_tank_emits_on_band_crossing_only() {
        let mut n = WebhookNormalizer::default();
        let tank = |level: f64| {
            payload(
                "tank_level_sensor",
                json!({"level": level, "capacity": 100, "tankName": "BBT-2"}),
                json!({"deviceId": "tank-2"}),
            )
        };
        assert!(matches!(n.process(&tank(50.0)), WebhookOutcome::NoAction));

        let low = draft(n.process(&tank(15.0)));
        assert_eq!(low.notification_type, NotificationType::InventoryLowStock);
        assert_eq!(low.title, "Tank Level Low");
        assert_eq!(low.message, "BBT-2 is 15.0% full (15/100 gallons)");
        assert!(matches!(n.process(&tank(10.0)), WebhookOutcome::NoAction));

        let high = draft(n.process(&tank(97.0)));
        assert_eq!(high.notification_type, NotificationType::EquipmentMaintenance);
        assert_eq!(high.title, "Tank Nearly Full");
        assert!(matches!(n.process(&tank(99.0)), WebhookOutcome::NoAction));
        assert!(matches!(n.process(&tank(60.0)), WebhookOutcome::NoAction));
        assert!(matches!(n.process(&tank(5.0)), WebhookOutcome::Notification(_)));
    }

    #[test]
    fn test_tank_threshold_override() {
        let mut n = WebhookNormalizer::default();
        let outcome = n.process(&payload(
            "tank_level_sensor",
            json!({"level": 40, "capacity": 100}),
            json!({"deviceId": "tank-9", "thresholds": {"min": 0.5}}),
        ));
        assert!(matches!(outcome, WebhookOutcome::Notification(_)));
    }

    #[test]
    fn test_ph_out_of_range() {
        let mut n = WebhookNormalizer::default();
        let meta = json!({"deviceId": "ph-1", "location": "Mash Tun", "thresholds": {"min": 5.2, "max": 5.6}});
        assert!(matches!(
            n.process(&payload("ph_meter", json!({"pH": 5.4}), meta.clone())),
            WebhookOutcome::NoAction
        ));
        let alert = draft(n.process(&payload("ph_meter", json!({"pH": 5.9}), meta)));
        assert_eq!(alert.notification_type, NotificationType::QcCheckRequired);
        assert_eq!(alert.message, "pH level 5.9 is outside acceptable range (5.2-5.6) at Mash Tun");
        assert_eq!(alert.source, "ph-monitoring");
    }

    #[test]
    fn test_config_validation() {
        assert!(NormalizerConfig::default().validate().is_ok());
        let bad = NormalizerConfig {
            stable_readings: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = NormalizerConfig {
            tank_low_ratio: 0.9,
            tank_high_ratio: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
