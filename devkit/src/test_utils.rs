/*!
Test Harness pour la flotte de capteurs

Facilite l'écriture de tests avec:
- Fleet construite sur le bus mocké
- Envoi de messages de contrôle comme un client MQTT externe
- Attente bornée de la télémétrie et des transitions d'état
*/

use crate::mqtt_stub::MockBus;
use anyhow::Result;
use sensorsim_core::control::{ControlCommand, CONTROL_TOPIC};
use sensorsim_core::fleet::{Fleet, FleetBuilder};
use sensorsim_core::kind::SensorKind;
use sensorsim_core::sensor::{Sensor, SleepBounds};
use sensorsim_core::FleetConfig;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Harness de test: une flotte + le bus mocké qui la porte
pub struct TestHarness {
    pub bus: MockBus,
    pub fleet: Fleet,
}

impl TestHarness {
    /// Une flotte avec un capteur par entrée de `kinds` (ids 1..=n)
    pub fn new(kinds: &[SensorKind], sleep: SleepBounds) -> Self {
        init_logging();
        let bus = MockBus::new();
        let mut builder = FleetBuilder::new(&bus, "test");
        for kind in kinds {
            builder.add(*kind, sleep);
        }
        let fleet = builder.build();
        Self { bus, fleet }
    }

    /// Flotte construite comme en production, depuis une config
    pub fn from_config(cfg: &FleetConfig) -> Result<Self> {
        init_logging();
        let bus = MockBus::new();
        let fleet = Fleet::from_config(cfg, &bus)?;
        Ok(Self { bus, fleet })
    }

    /// Connecte tous les capteurs au bus (abonnement à sensors/control)
    pub async fn attached(self) -> Self {
        let attached = self.fleet.attach_all().await;
        log::info!("{} sensors attached", attached);
        self
    }

    pub fn sensor(&self, id: u32) -> Result<&Arc<Sensor>> {
        self.fleet
            .find(id)
            .ok_or_else(|| anyhow::anyhow!("no sensor with id {}", id))
    }

    /// Publie un message brut sur sensors/control; retourne le nombre d'abonnés servis
    pub fn send_control(&self, payload: &Value) -> Result<usize> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(self.bus.simulate_incoming(CONTROL_TOPIC, bytes))
    }

    pub fn send_command(&self, cmd: ControlCommand) -> usize {
        self.bus.simulate_incoming(CONTROL_TOPIC, cmd.to_payload())
    }

    pub fn telemetry_for(&self, sensor_id: u32) -> Vec<Value> {
        self.bus.telemetry_for(sensor_id)
    }

    /// Attend au moins `count` messages de télémétrie du capteur
    pub async fn wait_for_telemetry(&self, sensor_id: u32, count: usize, timeout_ms: u64) -> Result<Vec<Value>> {
        let bus = &self.bus;
        self.wait_until(timeout_ms, || bus.telemetry_for(sensor_id).len() >= count)
            .await
        .map_err(|_| {
            anyhow::anyhow!(
                "sensor {} published {} messages, expected {} within {}ms",
                sensor_id,
                self.telemetry_for(sensor_id).len(),
                count,
                timeout_ms
            )
        })?;
        Ok(self.telemetry_for(sensor_id))
    }

    /// Attend qu'une condition devienne vraie (poll toutes les 10ms)
    pub async fn wait_until<F>(&self, timeout_ms: u64, mut condition: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if condition() {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        if condition() {
            return Ok(());
        }
        log::warn!("timeout after {}ms", timeout_ms);
        anyhow::bail!("condition not met within {}ms", timeout_ms)
    }

    pub async fn shutdown(&self) {
        self.fleet.shutdown().await;
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> SleepBounds {
        SleepBounds::new(0.01, 0.02).unwrap()
    }

    #[tokio::test]
    async fn test_harness_builds_numbered_fleet() {
        let harness = TestHarness::new(&[SensorKind::Co2, SensorKind::Pressure], fast()).attached().await;
        assert_eq!(harness.fleet.len(), 2);
        assert_eq!(harness.sensor(1).unwrap().kind(), SensorKind::Co2);
        assert!(harness.sensor(3).is_err());
        assert_eq!(harness.bus.get_subscriptions().len(), 2);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_for_telemetry() {
        let harness = TestHarness::new(&[SensorKind::Temperature], fast()).attached().await;
        harness.fleet.start_all().await;

        let messages = harness.wait_for_telemetry(1, 3, 2000).await.unwrap();
        assert!(messages.len() >= 3);
        assert!(messages.iter().all(|m| m["sensorType"] == "TEMPERATURE"));

        harness.shutdown().await;
        assert!(harness.wait_for_telemetry(2, 1, 50).await.is_err());
    }
}
