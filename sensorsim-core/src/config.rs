use crate::error::ConfigError;
use crate::kind::SensorKind;
use crate::sensor::SleepBounds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_PATH_VAR: &str = "SENSORSIM_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "sensorsim.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FleetConfig {
    pub broker: BrokerConfig,
    pub sensors_per_kind: usize,
    pub sleep: SleepDefaults,
    /// Démarre tous les capteurs au boot au lieu de lire la console.
    pub auto_start: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    /// Les client ids des capteurs sont `<prefix>-<id>`.
    pub client_prefix: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct SleepSpec {
    pub lower: f64,
    pub upper: f64,
}

/// Fenêtre de délai par défaut entre deux échantillons, par kind, en secondes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SleepDefaults {
    pub temperature: SleepSpec,
    pub pressure: SleepSpec,
    pub co2: SleepSpec,
    pub oxygen: SleepSpec,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            sensors_per_kind: 4,
            sleep: SleepDefaults::default(),
            auto_start: false,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            keep_alive_secs: 30,
            connect_timeout_secs: 5,
            client_prefix: "sensorsim".into(),
        }
    }
}

impl Default for SleepSpec {
    fn default() -> Self {
        Self { lower: 1.0, upper: 10.0 }
    }
}

impl Default for SleepDefaults {
    fn default() -> Self {
        Self {
            temperature: SleepSpec::default(),
            pressure: SleepSpec::default(),
            co2: SleepSpec::default(),
            oxygen: SleepSpec::default(),
        }
    }
}

impl SleepDefaults {
    pub fn for_kind(&self, kind: SensorKind) -> SleepSpec {
        match kind {
            SensorKind::Temperature => self.temperature,
            SensorKind::Pressure => self.pressure,
            SensorKind::Co2 => self.co2,
            SensorKind::DissolvedOxygen => self.oxygen,
        }
    }

    /// Même fenêtre pour tous les kinds.
    pub fn uniform(spec: SleepSpec) -> Self {
        Self { temperature: spec, pressure: spec, co2: spec, oxygen: spec }
    }
}

impl FleetConfig {
    pub fn from_yaml(txt: &str, path: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(txt).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Surcharges depuis `MQTT_BROKER`, `MQTT_PORT`, `AUTO_START` et `SENSORS_PER_KIND`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MQTT_BROKER") {
            self.broker.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.broker.port = port
                .parse()
                .map_err(|_| ConfigError::Env { var: "MQTT_PORT", value: port })?;
        }
        if let Some(flag) = lookup("AUTO_START") {
            self.auto_start = flag.eq_ignore_ascii_case("true");
        }
        if let Some(count) = lookup("SENSORS_PER_KIND") {
            self.sensors_per_kind = count
                .parse()
                .map_err(|_| ConfigError::Env { var: "SENSORS_PER_KIND", value: count })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors_per_kind == 0 {
            return Err(ConfigError::Invalid("sensors_per_kind must be at least 1".into()));
        }
        if self.broker.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("broker.connect_timeout_secs must be at least 1".into()));
        }
        for kind in SensorKind::ALL {
            let spec = self.sleep.for_kind(kind);
            SleepBounds::new(spec.lower, spec.upper)
                .map_err(|e| ConfigError::Invalid(format!("sleep bounds for {kind}: {e}")))?;
        }
        Ok(())
    }
}

/// Charge le YAML désigné par `SENSORSIM_CONFIG` (optionnel), puis l'environnement.
pub async fn load_config() -> Result<FleetConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        info!("loaded config from {path}");
        FleetConfig::from_yaml(&txt, &path)?
    } else {
        warn!("no {path}, using default config");
        FleetConfig::default()
    };
    cfg.apply_env(|var| std::env::var(var).ok())?;
    cfg.validate()?;
    Ok(cfg)
}
