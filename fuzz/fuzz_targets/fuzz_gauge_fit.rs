#![no_main]
use autopress_config::{CalibrationRow, GaugeFit};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|points: Vec<(f64, f64)>| {
    let rows: Vec<CalibrationRow> = points
        .into_iter()
        .map(|(voltage, pressure_mbar)| CalibrationRow {
            voltage,
            pressure_mbar,
        })
        .collect();
    if let Ok(fit) = GaugeFit::from_rows(&rows) {
        assert!(fit.slope_v_per_decade.is_finite() && fit.slope_v_per_decade != 0.0);
    }
});
