use serde::{Deserialize, Serialize};
use std::fmt;

/// Famille de waveform d'un kind de capteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave {
    Sine,
    Cosine,
}

impl Wave {
    pub fn eval(self, x: f64) -> f64 {
        match self {
            Wave::Sine => x.sin(),
            Wave::Cosine => x.cos(),
        }
    }
}

/// Formule physique par défaut : `center + amplitude * raw + uniform(-noise, noise)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Formula {
    pub center: f64,
    pub amplitude: f64,
    pub noise: f64,
}

/// Constantes fixées par le kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindProfile {
    pub label: &'static str,
    pub topic: &'static str,
    pub unit: &'static str,
    pub wave: Wave,
    /// Secondes par radian de la waveform.
    pub divisor: f64,
    /// Borne du bruit ajouté au signal normalisé.
    pub signal_noise: f64,
    pub formula: Formula,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    #[serde(rename = "TEMPERATURE")]
    Temperature,
    #[serde(rename = "PRESSURE")]
    Pressure,
    #[serde(rename = "CO2")]
    Co2,
    #[serde(rename = "DISSOLVED_OXYGEN")]
    DissolvedOxygen,
}

const TEMPERATURE: KindProfile = KindProfile {
    label: "TEMPERATURE",
    topic: "sensors/temperature",
    unit: "°C",
    wave: Wave::Sine,
    divisor: 10.0,
    signal_noise: 0.05,
    formula: Formula { center: 22.5, amplitude: 7.5, noise: 2.0 },
};

const PRESSURE: KindProfile = KindProfile {
    label: "PRESSURE",
    topic: "sensors/pressure",
    unit: "hPa",
    wave: Wave::Cosine,
    divisor: 20.0,
    signal_noise: 0.02,
    formula: Formula { center: 1013.0, amplitude: 20.0, noise: 5.0 },
};

const CO2: KindProfile = KindProfile {
    label: "CO2",
    topic: "sensors/co2",
    unit: "ppm",
    wave: Wave::Sine,
    divisor: 15.0,
    signal_noise: 0.05,
    formula: Formula { center: 500.0, amplitude: 100.0, noise: 20.0 },
};

const DISSOLVED_OXYGEN: KindProfile = KindProfile {
    label: "DISSOLVED_OXYGEN",
    topic: "sensors/oxygen",
    unit: "mg/L",
    wave: Wave::Cosine,
    divisor: 12.0,
    signal_noise: 0.05,
    formula: Formula { center: 8.0, amplitude: 2.0, noise: 0.5 },
};

impl SensorKind {
    /// Ordre de création utilisé par la flotte.
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Pressure,
        SensorKind::Co2,
        SensorKind::DissolvedOxygen,
    ];

    pub fn profile(self) -> &'static KindProfile {
        match self {
            SensorKind::Temperature => &TEMPERATURE,
            SensorKind::Pressure => &PRESSURE,
            SensorKind::Co2 => &CO2,
            SensorKind::DissolvedOxygen => &DISSOLVED_OXYGEN,
        }
    }

    pub fn label(self) -> &'static str {
        self.profile().label
    }

    pub fn topic(self) -> &'static str {
        self.profile().topic
    }

    pub fn unit(self) -> &'static str {
        self.profile().unit
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
