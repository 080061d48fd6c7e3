//! Génération de waveform : temps écoulé vers un signal oscillant normalisé.

use crate::kind::SensorKind;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Un échantillon de waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    /// Sortie `sin`/`cos` non bruitée, dans [-1, 1].
    pub raw: f64,
    /// `(raw + 1) / 2` plus le bruit ; peut sortir légèrement de [0, 1].
    pub normalized: f64,
}

/// Échantillonne la waveform du kind à `t` secondes.
pub fn sample<R: Rng + ?Sized>(kind: SensorKind, t: f64, rng: &mut R) -> Signal {
    let profile = kind.profile();
    let raw = profile.wave.eval(t / profile.divisor);
    let noise = rng.gen_range(-profile.signal_noise..=profile.signal_noise);
    Signal {
        raw,
        normalized: (raw + 1.0) / 2.0 + noise,
    }
}

/// Secondes depuis l'epoch Unix, base de temps de toutes les waveforms.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_normalized_stays_near_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        for kind in SensorKind::ALL {
            let bound = kind.profile().signal_noise;
            for step in 0..500 {
                let s = sample(kind, step as f64 * 0.37, &mut rng);
                assert!(s.raw >= -1.0 && s.raw <= 1.0);
                assert!(s.normalized >= -bound && s.normalized <= 1.0 + bound);
            }
        }
    }

    #[test]
    fn test_noise_is_applied_around_raw() {
        let mut rng = StdRng::seed_from_u64(1);
        // cos(0) = 1, la valeur normalisée non bruitée vaut exactement 1
        let s = sample(SensorKind::Pressure, 0.0, &mut rng);
        assert_eq!(s.raw, 1.0);
        assert!((s.normalized - 1.0).abs() <= 0.02);
    }

    #[test]
    fn test_divisor_sets_period() {
        let mut rng = StdRng::seed_from_u64(3);
        // Temperature : sin(t / 10), un quart de période fait 5 * pi secondes
        let s = sample(SensorKind::Temperature, 5.0 * std::f64::consts::PI, &mut rng);
        assert!((s.raw - 1.0).abs() < 1e-9);
    }
}
