//! Types d'erreur du runtime capteurs.
//!
//! Toute erreur du core est locale et récupérable : l'appelant la logge et
//! l'opérateur relance la commande.

use thiserror::Error;

/// Échecs remontés par un lien bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("broker {host}:{port} unreachable: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("no CONNACK from broker after {0}s")]
    Timeout(u64),

    #[error("link is not connected")]
    NotConnected,

    #[error(transparent)]
    Client(#[from] rumqttc::ClientError),
}

/// Échecs des opérations d'un capteur.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor {id}: {source}")]
    Bus {
        id: u32,
        #[source]
        source: BusError,
    },

    #[error("invalid range [{min}, {max}]: min must be lower than max")]
    InvalidRange { min: f64, max: f64 },

    #[error("invalid rate {0}: messages per minute must be positive")]
    InvalidRate(f64),

    #[error("invalid sleep bounds [{lower}, {upper}]: expected 0 < lower <= upper")]
    InvalidSleepBounds { lower: f64, upper: f64 },

    #[error("telemetry encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raisons pour lesquelles un payload de contrôle est ignoré.
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("payload is not a JSON object: {0}")]
    Malformed(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` is not numeric")]
    InvalidField(&'static str),

    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

/// Échecs de chargement de la configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}
