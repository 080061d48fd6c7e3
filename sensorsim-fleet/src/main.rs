//! SensorSim Fleet - fait tourner la flotte de capteurs simulés contre un broker MQTT
//!
//! - Charge `sensorsim.yaml` (optionnel) puis les surcharges d'environnement
//! - Crée `sensors_per_kind` capteurs par kind et les attache au bus
//! - Démarre tout au boot (`AUTO_START=true`) ou lit le menu console

mod console;

use anyhow::{Context, Result};
use sensorsim_core::config::load_config;
use sensorsim_core::{Fleet, MqttTransport};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await.context("Failed to load configuration")?;
    info!(
        "initializing sensors (connecting to MQTT broker at {}:{})",
        cfg.broker.host, cfg.broker.port
    );

    let transport = MqttTransport::new(cfg.broker.clone());
    let fleet = Fleet::from_config(&cfg, &transport).context("Failed to build sensor fleet")?;

    let attached = fleet.attach_all().await;
    if attached < fleet.len() {
        warn!("{attached}/{} sensors attached, the rest retry on start", fleet.len());
    } else {
        info!("{attached} sensors listening on sensors/control");
    }

    if cfg.auto_start {
        info!("auto-start mode enabled, starting all sensors");
        fleet.start_all().await;
        info!("{} sensors running", fleet.running_count());
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    } else {
        tokio::select! {
            res = console::run(&fleet) => res?,
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl-C")?,
        }
    }

    info!("shutting down");
    fleet.shutdown().await;
    Ok(())
}
