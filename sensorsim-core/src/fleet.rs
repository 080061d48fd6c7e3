//! Registre de la flotte : tous les capteurs du process, dans l'ordre de création.

use crate::config::FleetConfig;
use crate::control::{self, ControlCommand};
use crate::error::SensorError;
use crate::kind::SensorKind;
use crate::sensor::{Sensor, SleepBounds};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Crée les capteurs et possède le compteur d'ids (à partir de 1, jamais réutilisés).
pub struct FleetBuilder<'a> {
    transport: &'a dyn Transport,
    client_prefix: String,
    next_id: u32,
    sensors: Vec<Arc<Sensor>>,
    commands_tx: mpsc::UnboundedSender<ControlCommand>,
    commands_rx: mpsc::UnboundedReceiver<ControlCommand>,
}

impl<'a> FleetBuilder<'a> {
    pub fn new(transport: &'a dyn Transport, client_prefix: impl Into<String>) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            client_prefix: client_prefix.into(),
            next_id: 1,
            sensors: Vec::new(),
            commands_tx,
            commands_rx,
        }
    }

    /// Ajoute un capteur et retourne son id.
    pub fn add(&mut self, kind: SensorKind, sleep: SleepBounds) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let link = self.transport.open(&format!("{}-{id}", self.client_prefix));
        self.sensors.push(Arc::new(Sensor::new(id, kind, sleep, link)));
        id
    }

    /// Fige la composition et spawn le dispatcher de commandes (runtime tokio requis).
    pub fn build(self) -> Fleet {
        let sensors: Arc<[Arc<Sensor>]> = self.sensors.into();
        let dispatcher = tokio::spawn(dispatch_loop(Arc::clone(&sensors), self.commands_rx));
        Fleet {
            sensors,
            commands: self.commands_tx,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }
}

pub struct Fleet {
    sensors: Arc<[Arc<Sensor>]>,
    commands: mpsc::UnboundedSender<ControlCommand>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Fleet {
    pub fn builder<'a>(transport: &'a dyn Transport, client_prefix: &str) -> FleetBuilder<'a> {
        FleetBuilder::new(transport, client_prefix)
    }

    /// `sensors_per_kind` capteurs par kind, dans l'ordre de [`SensorKind::ALL`].
    pub fn from_config(cfg: &FleetConfig, transport: &dyn Transport) -> Result<Self, SensorError> {
        let mut builder = FleetBuilder::new(transport, cfg.broker.client_prefix.clone());
        for kind in SensorKind::ALL {
            let spec = cfg.sleep.for_kind(kind);
            let sleep = SleepBounds::new(spec.lower, spec.upper)?;
            for _ in 0..cfg.sensors_per_kind {
                builder.add(kind, sleep);
            }
        }
        let fleet = builder.build();
        info!("initialized {} sensors", fleet.len());
        Ok(fleet)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Arc<Sensor>> {
        self.sensors.iter()
    }

    /// Accès par position, comme listé par la console.
    pub fn get(&self, ordinal: usize) -> Option<&Arc<Sensor>> {
        self.sensors.get(ordinal)
    }

    pub fn find(&self, id: u32) -> Option<&Arc<Sensor>> {
        self.sensors.iter().find(|s| s.id() == id)
    }

    pub fn running_count(&self) -> usize {
        self.sensors.iter().filter(|s| s.is_running()).count()
    }

    /// Connecte tous les capteurs au bus pour que les capteurs idle reçoivent
    /// les commandes. Retourne le nombre attachés ; un échec est retenté au start.
    pub async fn attach_all(&self) -> usize {
        let mut attached = 0;
        for sensor in self.sensors.iter() {
            match sensor.attach().await {
                Ok(()) => attached += 1,
                Err(e) => warn!("cannot attach {}: {e}", sensor.name()),
            }
        }
        attached
    }

    /// Exécute une commande sur la flotte jusqu'au bout.
    pub async fn dispatch(&self, cmd: ControlCommand) {
        apply(&self.sensors, cmd).await;
    }

    /// Met une commande en file pour le dispatcher. `false` après `shutdown`.
    pub fn submit(&self, cmd: ControlCommand) -> bool {
        self.commands.send(cmd).is_ok()
    }

    pub async fn start_all(&self) {
        self.dispatch(ControlCommand::StartAll).await;
    }

    pub async fn stop_all(&self) {
        self.dispatch(ControlCommand::StopAll).await;
    }

    /// Coupe d'abord toute source de commandes (dispatcher, listeners), puis
    /// arrête les capteurs et libère les liens.
    pub async fn shutdown(&self) {
        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
            let _ = dispatcher.await;
        }
        for sensor in self.sensors.iter() {
            sensor.stop_listening().await;
        }
        for sensor in self.sensors.iter() {
            sensor.stop().await;
        }
        for sensor in self.sensors.iter() {
            sensor.detach().await;
        }
        info!("fleet shut down ({} sensors)", self.len());
    }
}

async fn apply(sensors: &[Arc<Sensor>], cmd: ControlCommand) {
    match cmd {
        ControlCommand::StartAll => {
            for sensor in sensors {
                if let Err(e) = sensor.start().await {
                    warn!("cannot start {}: {e}", sensor.name());
                }
            }
        }
        ControlCommand::StopAll => {
            for sensor in sensors {
                sensor.stop().await;
            }
        }
        targeted => {
            let id = targeted.target().unwrap_or_default();
            match sensors.iter().find(|s| s.id() == id) {
                Some(sensor) => control::execute(sensor, targeted).await,
                None => warn!("no sensor with id {id}, dropping {targeted:?}"),
            }
        }
    }
}

async fn dispatch_loop(
    sensors: Arc<[Arc<Sensor>]>,
    mut commands: mpsc::UnboundedReceiver<ControlCommand>,
) {
    while let Some(cmd) = commands.recv().await {
        apply(&sensors, cmd).await;
    }
}
