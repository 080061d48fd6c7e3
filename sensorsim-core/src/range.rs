//! Range mapping : signal normalisé vers valeur physique.

use crate::error::SensorError;
use crate::kind::SensorKind;
use crate::waveform::Signal;
use rand::Rng;

/// Fenêtre de sortie configurée par l'opérateur, `min < max` et `max - min` fini.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeWindow {
    min: f64,
    max: f64,
}

impl RangeWindow {
    pub fn new(min: f64, max: f64) -> Result<Self, SensorError> {
        // rejette aussi NaN et les fenêtres dont la largeur déborde
        if min < max && (max - min).is_finite() {
            Ok(Self { min, max })
        } else {
            Err(SensorError::InvalidRange { min, max })
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    fn scale(&self, normalized: f64) -> f64 {
        (self.min + normalized * (self.max - self.min)).clamp(self.min, self.max)
    }
}

/// Transforme un échantillon de waveform en valeur publiée.
///
/// Avec une fenêtre, le signal normalisé (bruité) y est mis à l'échelle. Sans
/// fenêtre, la formule par défaut du kind s'applique au signal brut non bruité,
/// avec son propre tirage de bruit.
pub fn map<R: Rng + ?Sized>(
    kind: SensorKind,
    signal: Signal,
    window: Option<RangeWindow>,
    rng: &mut R,
) -> f64 {
    let value = match window {
        Some(window) => window.scale(signal.normalized),
        None => {
            let f = kind.profile().formula;
            f.center + f.amplitude * signal.raw + rng.gen_range(-f.noise..=f.noise)
        }
    };
    round2(value)
}

/// Clampe une valeur injectée dans la fenêtre ; sans fenêtre, pas de clamp.
pub fn clamp(value: f64, window: Option<RangeWindow>) -> f64 {
    match window {
        Some(w) => value.clamp(w.min, w.max),
        None => value,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn signal(normalized: f64) -> Signal {
        Signal { raw: normalized * 2.0 - 1.0, normalized }
    }

    #[test]
    fn test_window_rejects_inverted_and_empty() {
        assert!(RangeWindow::new(10.0, 0.0).is_err());
        assert!(RangeWindow::new(5.0, 5.0).is_err());
        assert!(RangeWindow::new(f64::NAN, 1.0).is_err());
        assert!(RangeWindow::new(-10.0, 10.0).is_ok());
    }

    #[test]
    fn test_window_width_must_be_finite() {
        // min et max finis, mais max - min déborde en f64
        assert!(matches!(
            RangeWindow::new(-1e308, 1e308),
            Err(SensorError::InvalidRange { .. })
        ));
        assert!(RangeWindow::new(f64::NEG_INFINITY, 0.0).is_err());
        assert!(RangeWindow::new(-1e300, 1e300).is_ok());
    }

    #[test]
    fn test_window_boundaries() {
        let mut rng = StdRng::seed_from_u64(11);
        let w = RangeWindow::new(-10.0, 40.0).unwrap();
        assert_eq!(map(SensorKind::Co2, signal(0.0), Some(w), &mut rng), -10.0);
        assert_eq!(map(SensorKind::Co2, signal(1.0), Some(w), &mut rng), 40.0);
        assert_eq!(map(SensorKind::Co2, signal(0.5), Some(w), &mut rng), 15.0);
    }

    #[test]
    fn test_window_clamps_noise_overflow() {
        let mut rng = StdRng::seed_from_u64(11);
        let w = RangeWindow::new(0.0, 50.0).unwrap();
        assert_eq!(map(SensorKind::Temperature, signal(1.04), Some(w), &mut rng), 50.0);
        assert_eq!(map(SensorKind::Temperature, signal(-0.03), Some(w), &mut rng), 0.0);
    }

    #[test]
    fn test_default_formula_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        for kind in SensorKind::ALL {
            let f = kind.profile().formula;
            for raw in [-1.0, 0.0, 1.0] {
                let s = Signal { raw, normalized: 0.5 };
                let v = map(kind, s, None, &mut rng);
                let expected = f.center + f.amplitude * raw;
                assert!((v - expected).abs() <= f.noise + 0.005, "{kind}: {v}");
            }
        }
    }

    #[test]
    fn test_default_formula_ignores_normalized_noise() {
        let mut rng = StdRng::seed_from_u64(9);
        // même raw, normalized très différents : la formule ne voit que raw
        let a = Signal { raw: 0.0, normalized: -5.0 };
        let v = map(SensorKind::DissolvedOxygen, a, None, &mut rng);
        assert!((7.5..=8.5).contains(&v));
    }

    #[test]
    fn test_rounding_two_decimals() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            let v = map(SensorKind::Pressure, signal(0.3), None, &mut rng);
            assert_eq!(round2(v), v);
        }
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(-1.235001), -1.24);
    }

    #[test]
    fn test_clamp() {
        let w = RangeWindow::new(0.0, 50.0).unwrap();
        assert_eq!(clamp(100.0, Some(w)), 50.0);
        assert_eq!(clamp(-3.0, Some(w)), 0.0);
        assert_eq!(clamp(25.0, Some(w)), 25.0);
        assert_eq!(clamp(100.0, None), 100.0);
        assert_eq!(clamp(-1e9, None), -1e9);
    }
}
