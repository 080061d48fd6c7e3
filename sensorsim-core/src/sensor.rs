//! Machine d'états d'un capteur.
//!
//! Un capteur est `Idle` ou `Running`. En marche, une boucle de production
//! (task tokio) échantillonne la waveform, la passe dans la fenêtre de range,
//! publie un [`TelemetryMessage`] puis dort une durée tirée dans les sleep
//! bounds. Tout l'état mutable est derrière un seul mutex partagé entre la
//! boucle et le listener de contrôle.

use crate::control::{self, CONTROL_TOPIC};
use crate::error::SensorError;
use crate::kind::SensorKind;
use crate::range::{self, RangeWindow};
use crate::telemetry::TelemetryMessage;
use crate::transport::BusLink;
use crate::waveform;
use parking_lot::Mutex;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    Idle,
    Running,
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorState::Idle => f.write_str("idle"),
            SensorState::Running => f.write_str("running"),
        }
    }
}

/// Fenêtre du délai aléatoire entre deux publications, en secondes.
/// `0 < lower <= upper`, et `upper` tient dans une `Duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepBounds {
    lower: f64,
    upper: f64,
}

impl SleepBounds {
    pub fn new(lower: f64, upper: f64) -> Result<Self, SensorError> {
        let representable = Duration::try_from_secs_f64(upper).is_ok();
        if lower.is_finite() && representable && lower > 0.0 && lower <= upper {
            Ok(Self { lower, upper })
        } else {
            Err(SensorError::InvalidSleepBounds { lower, upper })
        }
    }

    /// Jitter de ±10% autour de `60 / per_minute` secondes.
    pub fn from_rate(per_minute: f64) -> Result<Self, SensorError> {
        if !(per_minute.is_finite() && per_minute > 0.0) {
            return Err(SensorError::InvalidRate(per_minute));
        }
        let interval = 60.0 / per_minute;
        Self::new(0.9 * interval, 1.1 * interval).map_err(|_| SensorError::InvalidRate(per_minute))
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = rng.gen_range(self.lower..=self.upper);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

struct Inner {
    state: SensorState,
    sleep: SleepBounds,
    range: Option<RangeWindow>,
    /// Incrémenté à chaque start : une boucle d'un run précédent ne lui survit pas.
    run: u64,
    worker: Option<JoinHandle<()>>,
}

pub struct Sensor {
    id: u32,
    kind: SensorKind,
    link: Arc<dyn BusLink>,
    inner: Mutex<Inner>,
    halt: Notify,
    attach_gate: tokio::sync::Mutex<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Sensor {
    pub(crate) fn new(id: u32, kind: SensorKind, sleep: SleepBounds, link: Arc<dyn BusLink>) -> Self {
        Self {
            id,
            kind,
            link,
            inner: Mutex::new(Inner {
                state: SensorState::Idle,
                sleep,
                range: None,
                run: 0,
                worker: None,
            }),
            halt: Notify::new(),
            attach_gate: tokio::sync::Mutex::new(()),
            listener: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn name(&self) -> String {
        format!("{} no.: {}", self.kind.label(), self.id)
    }

    pub fn state(&self) -> SensorState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SensorState::Running
    }

    pub fn sleep_bounds(&self) -> SleepBounds {
        self.inner.lock().sleep
    }

    pub fn range_window(&self) -> Option<RangeWindow> {
        self.inner.lock().range
    }

    pub fn is_attached(&self) -> bool {
        self.link.is_connected()
    }

    /// Connecte le lien et écoute le topic de contrôle. No-op si déjà connecté.
    pub async fn attach(self: &Arc<Self>) -> Result<(), SensorError> {
        let _gate = self.attach_gate.lock().await;
        if self.link.is_connected() {
            return Ok(());
        }
        self.link.connect().await.map_err(|e| self.bus_error(e))?;
        let inbox = self
            .link
            .subscribe(CONTROL_TOPIC)
            .await
            .map_err(|e| self.bus_error(e))?;

        // l'ancien listener s'arrête tout seul quand son inbox est fermée
        let listener = tokio::spawn(control::listen(Arc::clone(self), inbox));
        *self.listener.lock() = Some(listener);
        debug!(sensor = self.id, "listening on {CONTROL_TOPIC}");
        Ok(())
    }

    /// Arrête le listener de contrôle et attend sa fin : plus aucune commande
    /// du bus n'atteint ce capteur au retour.
    pub async fn stop_listening(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.abort();
            let _ = listener.await;
        }
    }

    /// Arrête le listener puis déconnecte le lien.
    pub async fn detach(&self) {
        self.stop_listening().await;
        if let Err(e) = self.link.disconnect().await {
            warn!(sensor = self.id, "disconnect failed: {e}");
        }
    }

    /// Idle → Running. Le capteur reste idle si le bus est injoignable.
    pub async fn start(self: &Arc<Self>) -> Result<(), SensorError> {
        if self.is_running() {
            return Ok(());
        }
        self.attach().await?;

        let mut inner = self.inner.lock();
        if inner.state == SensorState::Running {
            return Ok(());
        }
        inner.state = SensorState::Running;
        inner.run += 1;
        let run = inner.run;
        inner.worker = Some(tokio::spawn(Arc::clone(self).produce(run)));
        drop(inner);

        info!(sensor = self.id, "{} started", self.name());
        Ok(())
    }

    /// Running → Idle. Rend la main une fois la boucle de production terminée :
    /// aucune télémétrie de ce capteur ne suit.
    pub async fn stop(&self) {
        let worker = {
            let mut inner = self.inner.lock();
            if inner.state == SensorState::Idle && inner.worker.is_none() {
                return;
            }
            inner.state = SensorState::Idle;
            inner.worker.take()
        };
        self.halt.notify_waiters();

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(sensor = self.id, "production loop ended abnormally: {e}");
            }
        }
        info!(sensor = self.id, "{} stopped", self.name());
    }

    /// Publie une valeur fournie par l'opérateur, clampée dans la fenêtre.
    pub async fn generate_value(self: &Arc<Self>, value: f64) -> Result<TelemetryMessage, SensorError> {
        self.attach().await?;
        let window = self.inner.lock().range;
        let msg = self.emit(range::clamp(value, window)).await?;
        info!(sensor = self.id, value = msg.value, "generated value on {}", self.kind.topic());
        Ok(msg)
    }

    pub fn set_range(&self, min: f64, max: f64) -> Result<(), SensorError> {
        let window = RangeWindow::new(min, max)?;
        self.inner.lock().range = Some(window);
        info!(sensor = self.id, min, max, "range set");
        Ok(())
    }

    pub fn set_rate(&self, per_minute: f64) -> Result<SleepBounds, SensorError> {
        let bounds = SleepBounds::from_rate(per_minute)?;
        self.inner.lock().sleep = bounds;
        info!(
            sensor = self.id,
            rate = per_minute,
            "sleep bounds now [{:.3}s, {:.3}s]",
            bounds.lower,
            bounds.upper
        );
        Ok(bounds)
    }

    async fn produce(self: Arc<Self>, run: u64) {
        loop {
            let halted = self.halt.notified();
            tokio::pin!(halted);
            halted.as_mut().enable();

            let (window, pause) = {
                let inner = self.inner.lock();
                if inner.state != SensorState::Running || inner.run != run {
                    break;
                }
                (inner.range, inner.sleep.draw(&mut rand::thread_rng()))
            };

            let value = {
                let mut rng = rand::thread_rng();
                let signal = waveform::sample(self.kind, waveform::now_seconds(), &mut rng);
                range::map(self.kind, signal, window, &mut rng)
            };
            if let Err(e) = self.emit(value).await {
                warn!(sensor = self.id, "publish failed: {e}");
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = halted => {}
            }
        }
        debug!(sensor = self.id, run, "production loop exited");
    }

    async fn emit(&self, value: f64) -> Result<TelemetryMessage, SensorError> {
        let msg = TelemetryMessage::new(self.id, self.kind, value);
        let payload = msg.to_payload()?;
        self.link
            .publish(self.kind.topic(), payload)
            .await
            .map_err(|e| self.bus_error(e))?;
        debug!(sensor = self.id, value, "published to {}", self.kind.topic());
        Ok(msg)
    }

    fn bus_error(&self, source: crate::error::BusError) -> SensorError {
        SensorError::Bus { id: self.id, source }
    }
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}
