use std::time::Instant;

use autopress_core::{BandDetector, DetectorState, PressureReading, TargetBand};
use proptest::prelude::*;
use rstest::rstest;

fn at(p: f64) -> PressureReading {
    PressureReading {
        at: Instant::now(),
        voltage: 0.0,
        pressure_mbar: p,
    }
}

fn events(band: TargetBand, trace: &[f64]) -> Vec<usize> {
    let mut det = BandDetector::new(band);
    trace
        .iter()
        .enumerate()
        .filter_map(|(i, &p)| det.observe(&at(p)).map(|_| i))
        .collect()
}

#[rstest]
fn scenario_enters_twice() {
    let band = TargetBand::new(1.0, 5.0).expect("band");
    let trace = [2.0, 1.5, 1.02, 1.00, 0.9, 1.03];
    assert_eq!(events(band, &trace), vec![2, 5]);
}

#[rstest]
#[case(0.95, true)]
#[case(1.05, true)]
#[case(0.949_999, false)]
#[case(1.050_001, false)]
fn bounds_are_inclusive(#[case] p: f64, #[case] fires: bool) {
    let band = TargetBand::new(1.0, 5.0).expect("band");
    assert_eq!(!events(band, &[p]).is_empty(), fires);
}

#[rstest]
fn event_carries_reading_and_setpoint() {
    let mut det = BandDetector::new(TargetBand::new(5e-3, 5.0).expect("band"));
    let ev = det.observe(&at(5.1e-3)).expect("entered");
    assert!((ev.pressure_mbar - 5.1e-3).abs() < 1e-15);
    assert!((ev.setpoint_mbar - 5e-3).abs() < 1e-15);
    assert_eq!(det.state(), DetectorState::Inside);
}

#[rstest]
fn reset_rearms() {
    let mut det = BandDetector::new(TargetBand::new(1.0, 5.0).expect("band"));
    assert!(det.observe(&at(1.0)).is_some());
    det.reset();
    assert!(det.observe(&at(1.0)).is_some());
}

/// Reference count of Outside -> Inside transitions.
fn rising_edges(band: &TargetBand, trace: &[f64]) -> usize {
    let mut prev_inside = false;
    let mut n = 0;
    for &p in trace {
        let inside = band.contains(p);
        if inside && !prev_inside {
            n += 1;
        }
        prev_inside = inside;
    }
    n
}

proptest! {
    #[test]
    fn one_event_per_rising_edge(
        setpoint in 1e-6f64..1e3,
        tol in 0.5f64..50.0,
        factors in prop::collection::vec(0.3f64..1.7, 1..300),
    ) {
        let band = TargetBand::new(setpoint, tol).expect("band");
        let trace: Vec<f64> = factors.iter().map(|f| f * setpoint).collect();
        prop_assert_eq!(events(band, &trace).len(), rising_edges(&band, &trace));
    }

    #[test]
    fn oversampling_does_not_add_events(
        factors in prop::collection::vec(0.5f64..1.5, 1..100),
        repeat in 1usize..20,
    ) {
        let band = TargetBand::new(1.0, 10.0).expect("band");
        let trace: Vec<f64> = factors.clone();
        let dense: Vec<f64> = factors
            .iter()
            .flat_map(|&f| std::iter::repeat_n(f, repeat))
            .collect();
        prop_assert_eq!(events(band, &trace).len(), events(band, &dense).len());
    }
}
