//! SensorSim core - runtime de la flotte de capteurs environnementaux simulés
//!
//! Chaque capteur publie de la télémétrie synthétique sur le topic de son kind
//! et écoute `sensors/control` pour être reconfiguré à distance :
//! - Génération de waveform et range mapping (`waveform`, `range`)
//! - Cycle de vie et boucle de production par capteur (`sensor`)
//! - Décodage et exécution du protocole de contrôle (`control`)
//! - Registre de la flotte et commandes console (`fleet`)
//! - Transport MQTT derrière les traits `Transport` / `BusLink` (`mqtt`, `transport`)

pub mod config;
pub mod control;
pub mod error;
pub mod fleet;
pub mod kind;
pub mod mqtt;
pub mod range;
pub mod sensor;
pub mod telemetry;
pub mod transport;
pub mod waveform;

pub use config::{BrokerConfig, FleetConfig};
pub use control::{ControlCommand, CONTROL_TOPIC};
pub use error::{BusError, ConfigError, ControlError, SensorError};
pub use fleet::{Fleet, FleetBuilder};
pub use kind::SensorKind;
pub use mqtt::MqttTransport;
pub use range::RangeWindow;
pub use sensor::{Sensor, SensorState, SleepBounds};
pub use telemetry::TelemetryMessage;
pub use transport::{BusLink, Inbox, Transport};
