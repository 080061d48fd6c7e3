/*!
# SensorSim DevKit - Stubs et Utilitaires pour les tests

Bibliothèque facilitant les tests de la flotte de capteurs avec:
- Bus MQTT mocké (implémente `Transport`) pour tester sans broker
- Builders de messages de contrôle
- Harness de test autour d'une `Fleet`
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{ControlMessageBuilder, MockBus, MockMessage};
pub use test_utils::TestHarness;
