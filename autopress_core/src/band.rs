//! Target band and the edge detector that decides when to save.
//!
//! The detector is edge-triggered: it emits exactly one `TriggerEvent` when
//! the pressure goes from outside the band to inside it, and re-arms only
//! once a reading lands outside again.

use std::time::Instant;

use crate::error::AutopressError;
use crate::reading::PressureReading;

/// Inclusive interval `[setpoint * (1 - tol), setpoint * (1 + tol)]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetBand {
    setpoint_mbar: f64,
    tolerance_pct: f64,
}

impl TargetBand {
    pub fn new(setpoint_mbar: f64, tolerance_pct: f64) -> Result<Self, AutopressError> {
        if !(setpoint_mbar.is_finite() && setpoint_mbar > 0.0) {
            return Err(AutopressError::Config(format!(
                "setpoint must be a positive pressure, got {setpoint_mbar}"
            )));
        }
        if !(tolerance_pct > 0.0 && tolerance_pct < 100.0) {
            return Err(AutopressError::Config(format!(
                "tolerance must be in (0, 100) percent, got {tolerance_pct}"
            )));
        }
        Ok(Self {
            setpoint_mbar,
            tolerance_pct,
        })
    }

    pub fn setpoint_mbar(&self) -> f64 {
        self.setpoint_mbar
    }

    pub fn tolerance_pct(&self) -> f64 {
        self.tolerance_pct
    }

    pub fn lower(&self) -> f64 {
        self.setpoint_mbar * (1.0 - self.tolerance_pct / 100.0)
    }

    pub fn upper(&self) -> f64 {
        self.setpoint_mbar * (1.0 + self.tolerance_pct / 100.0)
    }

    #[inline]
    pub fn contains(&self, pressure_mbar: f64) -> bool {
        pressure_mbar >= self.lower() && pressure_mbar <= self.upper()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorState {
    #[default]
    Outside,
    Inside,
}

/// Band entered at `at` with `pressure_mbar`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub at: Instant,
    pub pressure_mbar: f64,
    pub setpoint_mbar: f64,
}

#[derive(Debug, Clone)]
pub struct BandDetector {
    band: TargetBand,
    state: DetectorState,
}

impl BandDetector {
    pub fn new(band: TargetBand) -> Self {
        Self {
            band,
            state: DetectorState::Outside,
        }
    }

    pub fn band(&self) -> TargetBand {
        self.band
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Classify one reading; `Some` only on an Outside -> Inside edge.
    pub fn observe(&mut self, reading: &PressureReading) -> Option<TriggerEvent> {
        let inside = self.band.contains(reading.pressure_mbar);
        match (self.state, inside) {
            (DetectorState::Outside, true) => {
                self.state = DetectorState::Inside;
                Some(TriggerEvent {
                    at: reading.at,
                    pressure_mbar: reading.pressure_mbar,
                    setpoint_mbar: self.band.setpoint_mbar,
                })
            }
            (DetectorState::Inside, true) => None,
            (_, false) => {
                self.state = DetectorState::Outside;
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Outside;
    }

    /// Replace the band. Re-arms the detector when the band actually changed.
    pub fn set_band(&mut self, band: TargetBand) {
        if band != self.band {
            self.band = band;
            self.reset();
        }
    }
}

/// One independent edge detector per target pressure.
///
/// Each target fires once per entry into its own band, so a single
/// pump-down can capture every configured pressure on the way.
#[derive(Debug, Clone, Default)]
pub struct BandSet {
    detectors: Vec<BandDetector>,
}

impl BandSet {
    pub fn new(bands: &[TargetBand]) -> Self {
        Self {
            detectors: bands.iter().copied().map(BandDetector::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn bands(&self) -> Vec<TargetBand> {
        self.detectors.iter().map(BandDetector::band).collect()
    }

    pub fn states(&self) -> Vec<DetectorState> {
        self.detectors.iter().map(BandDetector::state).collect()
    }

    /// `Inside` while the pressure sits in at least one band.
    pub fn state(&self) -> DetectorState {
        if self
            .detectors
            .iter()
            .any(|d| d.state() == DetectorState::Inside)
        {
            DetectorState::Inside
        } else {
            DetectorState::Outside
        }
    }

    /// Feed one reading to every detector; returns the entries, lowest
    /// setpoint first when the targets are sorted.
    pub fn observe(&mut self, reading: &PressureReading) -> Vec<TriggerEvent> {
        self.detectors
            .iter_mut()
            .filter_map(|d| d.observe(reading))
            .collect()
    }

    pub fn reset(&mut self) {
        self.detectors.iter_mut().for_each(BandDetector::reset);
    }

    /// Replace the targets. Detectors whose band is unchanged keep their
    /// state; new or modified bands start `Outside`.
    pub fn set_bands(&mut self, bands: &[TargetBand]) {
        let mut previous = std::mem::take(&mut self.detectors);
        self.detectors = bands
            .iter()
            .map(|&band| match previous.iter().position(|d| d.band() == band) {
                Some(i) => previous.swap_remove(i),
                None => BandDetector::new(band),
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(p: f64) -> PressureReading {
        PressureReading {
            at: Instant::now(),
            voltage: 0.0,
            pressure_mbar: p,
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        let band = TargetBand::new(1.0, 5.0).expect("band");
        assert!(band.contains(band.lower()));
        assert!(band.contains(band.upper()));
        assert!(!band.contains(band.upper() * (1.0 + 1e-12)));
    }

    #[test]
    fn rejects_bad_band() {
        assert!(TargetBand::new(0.0, 5.0).is_err());
        assert!(TargetBand::new(f64::NAN, 5.0).is_err());
        assert!(TargetBand::new(1.0, 0.0).is_err());
        assert!(TargetBand::new(1.0, 100.0).is_err());
    }

    #[test]
    fn stays_inside_without_re_emitting() {
        let mut det = BandDetector::new(TargetBand::new(1.0, 5.0).expect("band"));
        assert!(det.observe(&reading(1.0)).is_some());
        for _ in 0..100 {
            assert!(det.observe(&reading(1.01)).is_none());
        }
        assert_eq!(det.state(), DetectorState::Inside);
    }

    #[test]
    fn set_band_rearms_only_on_change() {
        let band = TargetBand::new(1.0, 5.0).expect("band");
        let mut det = BandDetector::new(band);
        det.observe(&reading(1.0));
        det.set_band(band);
        assert_eq!(det.state(), DetectorState::Inside);
        det.set_band(TargetBand::new(1.0, 10.0).expect("band"));
        assert_eq!(det.state(), DetectorState::Outside);
        assert!(det.observe(&reading(1.0)).is_some());
    }

    #[test]
    fn set_bands_keeps_state_of_unchanged_targets() {
        let low = TargetBand::new(1e-3, 5.0).expect("band");
        let high = TargetBand::new(1.0, 5.0).expect("band");
        let mut set = BandSet::new(&[low, high]);
        assert_eq!(set.observe(&reading(1.0)).len(), 1);
        assert_eq!(set.state(), DetectorState::Inside);

        let extra = TargetBand::new(1e-2, 5.0).expect("band");
        set.set_bands(&[low, extra, high]);
        assert_eq!(
            set.states(),
            vec![
                DetectorState::Outside,
                DetectorState::Outside,
                DetectorState::Inside
            ]
        );
        // Still inside the old target: no repeat.
        assert!(set.observe(&reading(1.0)).is_empty());

        set.set_bands(&[low]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.state(), DetectorState::Outside);
    }
}
