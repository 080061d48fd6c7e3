//! Protocole de contrôle sur `sensors/control`.
//!
//! Chaque capteur s'abonne au topic partagé et filtre sur son propre id. Un
//! broadcast (`start_all`, `stop_all`) est reçu par tous les capteurs attachés,
//! et chacun l'applique à lui-même dans l'ordre d'arrivée de ses messages.
//! Rien ici ne remonte d'erreur vers le bus : un payload invalide est loggé
//! puis ignoré.

use crate::error::ControlError;
use crate::sensor::Sensor;
use crate::transport::Inbox;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub const CONTROL_TOPIC: &str = "sensors/control";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    StartAll,
    StopAll,
    Start(u32),
    Stop(u32),
    SetValue(u32, f64),
    SetRange(u32, f64, f64),
    /// Messages par minute.
    SetRate(u32, f64),
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    command: Option<String>,
    #[serde(rename = "sensorId")]
    sensor_id: Option<Value>,
    value: Option<Value>,
    min: Option<Value>,
    max: Option<Value>,
    rate: Option<Value>,
}

impl ControlCommand {
    /// Capteur visé, `None` pour un broadcast.
    pub fn target(&self) -> Option<u32> {
        match *self {
            ControlCommand::StartAll | ControlCommand::StopAll => None,
            ControlCommand::Start(id)
            | ControlCommand::Stop(id)
            | ControlCommand::SetValue(id, _)
            | ControlCommand::SetRange(id, _, _)
            | ControlCommand::SetRate(id, _) => Some(id),
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, ControlError> {
        let env: Envelope =
            serde_json::from_slice(raw).map_err(|e| ControlError::Malformed(e.to_string()))?;

        match env.command.as_deref() {
            Some("start_all") => return Ok(ControlCommand::StartAll),
            Some("stop_all") => return Ok(ControlCommand::StopAll),
            _ => {}
        }

        let id = sensor_id(env.sensor_id.as_ref())?;
        match env.command.as_deref() {
            Some("start") => Ok(ControlCommand::Start(id)),
            Some("stop") => Ok(ControlCommand::Stop(id)),
            Some("set_range") => {
                let min = number(env.min.as_ref(), "min")?;
                let max = number(env.max.as_ref(), "max")?;
                Ok(ControlCommand::SetRange(id, min, max))
            }
            Some("set_value") => Ok(ControlCommand::SetValue(id, number(env.value.as_ref(), "value")?)),
            Some("set_rate") => Ok(ControlCommand::SetRate(id, number(env.rate.as_ref(), "rate")?)),
            // toute autre commande portant une value est un échantillon injecté
            other => match env.value.as_ref() {
                Some(_) => Ok(ControlCommand::SetValue(id, number(env.value.as_ref(), "value")?)),
                None => Err(match other {
                    Some(cmd) => ControlError::UnknownCommand(cmd.to_string()),
                    None => ControlError::MissingField("command"),
                }),
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match *self {
            ControlCommand::StartAll => json!({ "command": "start_all" }),
            ControlCommand::StopAll => json!({ "command": "stop_all" }),
            ControlCommand::Start(id) => json!({ "command": "start", "sensorId": id }),
            ControlCommand::Stop(id) => json!({ "command": "stop", "sensorId": id }),
            ControlCommand::SetValue(id, value) => {
                json!({ "command": "set_value", "sensorId": id, "value": value })
            }
            ControlCommand::SetRange(id, min, max) => {
                json!({ "command": "set_range", "sensorId": id, "min": min, "max": max })
            }
            ControlCommand::SetRate(id, rate) => {
                json!({ "command": "set_rate", "sensorId": id, "rate": rate })
            }
        }
    }

    pub fn to_payload(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

fn sensor_id(field: Option<&Value>) -> Result<u32, ControlError> {
    let field = field.ok_or(ControlError::MissingField("sensorId"))?;
    let id = match field {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    id.ok_or(ControlError::InvalidField("sensorId"))
}

/// Nombre JSON, ou string contenant un nombre.
fn number(field: Option<&Value>, name: &'static str) -> Result<f64, ControlError> {
    let field = field.ok_or(ControlError::MissingField(name))?;
    let value = match field {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or(ControlError::InvalidField(name))
}

/// Traite un payload reçu par `sensor` sur le topic de contrôle.
pub async fn handle(sensor: &Arc<Sensor>, raw: &[u8]) {
    let cmd = match ControlCommand::decode(raw) {
        Ok(cmd) => cmd,
        Err(e) => {
            debug!(sensor = sensor.id(), "dropping control message: {e}");
            return;
        }
    };

    match cmd.target() {
        Some(id) if id != sensor.id() => {
            trace!(sensor = sensor.id(), "ignoring {cmd:?} for sensor {id}")
        }
        _ => execute(sensor, cmd).await,
    }
}

type Pending<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Applique une commande à `sensor` ; un broadcast ne concerne que lui.
/// Les échecs sont loggés.
// boxé : start() spawn le listener qui rappelle cette fonction
pub fn execute(sensor: &Arc<Sensor>, cmd: ControlCommand) -> Pending<'_> {
    Box::pin(async move {
        let outcome = match cmd {
            ControlCommand::Start(_) | ControlCommand::StartAll => sensor.start().await,
            ControlCommand::Stop(_) | ControlCommand::StopAll => {
                sensor.stop().await;
                Ok(())
            }
            ControlCommand::SetValue(_, value) => sensor.generate_value(value).await.map(|_| ()),
            ControlCommand::SetRange(_, min, max) => sensor.set_range(min, max),
            ControlCommand::SetRate(_, rate) => sensor.set_rate(rate).map(|_| ()),
        };
        if let Err(e) = outcome {
            warn!(sensor = sensor.id(), "{cmd:?} rejected: {e}");
        }
    })
}

pub(crate) async fn listen(sensor: Arc<Sensor>, mut inbox: Inbox) {
    while let Some(payload) = inbox.recv().await {
        handle(&sensor, &payload).await;
    }
    debug!(sensor = sensor.id(), "control listener closed");
}
