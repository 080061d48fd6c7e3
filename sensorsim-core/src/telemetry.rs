use crate::kind::SensorKind;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Un échantillon publié, reconstruit à chaque émission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryMessage {
    pub sensor_id: u32,
    pub sensor_type: SensorKind,
    pub value: f64,
    #[serde(serialize_with = "iso_utc")]
    pub timestamp: DateTime<Utc>,
    pub unit: &'static str,
}

impl TelemetryMessage {
    pub fn new(sensor_id: u32, kind: SensorKind, value: f64) -> Self {
        Self {
            sensor_id,
            sensor_type: kind,
            value,
            timestamp: Utc::now(),
            unit: kind.unit(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn iso_utc<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_payload_shape() {
        let msg = TelemetryMessage::new(3, SensorKind::DissolvedOxygen, 7.42);
        let json: Value = serde_json::from_slice(&msg.to_payload().unwrap()).unwrap();

        assert_eq!(json["sensorId"], 3);
        assert_eq!(json["sensorType"], "DISSOLVED_OXYGEN");
        assert_eq!(json["value"], 7.42);
        assert_eq!(json["unit"], "mg/L");

        let ts = json["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }
}
