//! Instrument-side file paths for saved waveforms.
//!
//! `{save_dir}{sep}{YYYYMMDD}{sep}{YYYYMMDD}_Particle{n}_Pr_order{oo}_magnitude{m_mm}_time{HHMMSS}.bin`

use autopress_traits::SaveRequest;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveNaming {
    pub save_dir: String,
    pub dated_subdir: bool,
    pub separator: String,
}

impl Default for SaveNaming {
    fn default() -> Self {
        Self {
            save_dir: r"C:\Users\Instrument\Desktop\waveforms".to_string(),
            dated_subdir: true,
            separator: "\\".to_string(),
        }
    }
}

/// Split a pressure into `magnitude * 10^order` with `1 <= magnitude < 10`.
/// Zero (and anything non-finite) maps to `(0.0, 0)`.
pub fn decompose(pressure_mbar: f64) -> (f64, i32) {
    if pressure_mbar == 0.0 || !pressure_mbar.is_finite() {
        return (0.0, 0);
    }
    let order = pressure_mbar.abs().log10().floor() as i32;
    (pressure_mbar / 10f64.powi(order), order)
}

fn order_str(order: i32) -> String {
    if order >= 0 {
        format!("{order:02}")
    } else {
        format!("-{:02}", order.unsigned_abs())
    }
}

impl SaveNaming {
    pub fn file_name(&self, particle: u32, pressure_mbar: f64, stamp: NaiveDateTime) -> String {
        let (magnitude, order) = decompose(pressure_mbar);
        let magnitude = format!("{magnitude:.2}").replace('.', "_");
        format!(
            "{}_Particle{}_Pr_order{}_magnitude{}_time{}.bin",
            stamp.format("%Y%m%d"),
            particle,
            order_str(order),
            magnitude,
            stamp.format("%H%M%S"),
        )
    }

    pub fn request(&self, particle: u32, pressure_mbar: f64, stamp: NaiveDateTime) -> SaveRequest {
        let sep = &self.separator;
        let dir = self.save_dir.trim_end_matches(sep.as_str());
        let name = self.file_name(particle, pressure_mbar, stamp);
        let file_path = if self.dated_subdir {
            format!("{dir}{sep}{}{sep}{name}", stamp.format("%Y%m%d"))
        } else {
            format!("{dir}{sep}{name}")
        };
        SaveRequest { file_path }
    }
}
