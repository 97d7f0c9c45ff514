#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and gauge calibration parsing for the pressure trigger.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section has defaults, so an empty file is a valid (simulated) setup
//!   once a setpoint and instrument address are supplied on the command line.
//! - The calibration CSV loader enforces headers and fits the gauge's
//!   log-linear transfer curve by least squares.
use serde::Deserialize;

/// Calibration CSV schema.
///
/// Expected headers:
/// voltage,pressure_mbar
///
/// `voltage` is the gauge output (after divider compensation), not the
/// voltage seen at the ADC pin.
///
/// Example:
/// voltage,pressure_mbar
/// 4.0,1e-5
/// 5.5,1e-3
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub voltage: f64,
    pub pressure_mbar: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    /// ADC Pi input channel, 1..=8
    pub channel: u8,
    /// Max wait for one conversion (ms)
    pub read_timeout_ms: u64,
    pub adc_address_1: u8,
    pub adc_address_2: u8,
    /// Conversion resolution: 12, 14, 16 or 18 bits
    pub adc_bits: u8,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            channel: 1,
            read_timeout_ms: 150,
            adc_address_1: 0x68,
            adc_address_2: 0x69,
            adc_bits: 12,
        }
    }
}

/// Gauge transfer curve: `p = 10^((V - offset_v) / slope_v_per_decade)`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GaugeCfg {
    /// Factor undoing the potential divider in front of the ADC
    pub divider_ratio: f64,
    pub offset_v: f64,
    pub slope_v_per_decade: f64,
}

impl Default for GaugeCfg {
    fn default() -> Self {
        Self {
            divider_ratio: 2.0,
            offset_v: 7.75,
            slope_v_per_decade: 0.75,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BandCfg {
    /// Target pressure; may also be given on the command line
    pub setpoint_mbar: Option<f64>,
    /// Further target pressures captured during the same pump-down
    pub setpoints_mbar: Vec<f64>,
    /// Half-width of every band as a percentage of its setpoint
    pub tolerance_pct: f64,
}

impl BandCfg {
    /// All configured targets, `setpoint_mbar` first.
    pub fn all_setpoints(&self) -> Vec<f64> {
        self.setpoint_mbar
            .iter()
            .chain(&self.setpoints_mbar)
            .copied()
            .collect()
    }
}

impl Default for BandCfg {
    fn default() -> Self {
        Self {
            setpoint_mbar: None,
            setpoints_mbar: Vec::new(),
            tolerance_pct: 5.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoopCfg {
    /// Sampling period (ms)
    pub interval_ms: u64,
    /// Consecutive failed cycles before the loop reports a persistent fault
    pub persistent_error_threshold: u32,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            interval_ms: 20,
            persistent_error_threshold: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentBackend {
    #[default]
    Scpi,
    Sim,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InstrumentCfg {
    pub backend: InstrumentBackend,
    /// Host name or IP of the oscilloscope; may also be given on the command line
    pub address: Option<String>,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Bound on a single save command, including the completion query
    pub command_timeout_ms: u64,
    /// Directory on the instrument's disk that receives the waveform files
    pub save_dir: String,
    /// Append a YYYYMMDD subdirectory to `save_dir`
    pub dated_subdir: bool,
    pub path_separator: String,
    /// SCPI commands sent once per session to prepare the export. Defaults to
    /// the R&S RTO fast raw export of C1W1 when absent.
    pub export_setup: Option<Vec<String>>,
}

impl Default for InstrumentCfg {
    fn default() -> Self {
        Self {
            backend: InstrumentBackend::Scpi,
            address: None,
            port: 5025,
            connect_timeout_ms: 2_000,
            command_timeout_ms: 10_000,
            save_dir: r"C:\Users\Instrument\Desktop\waveforms".to_string(),
            dated_subdir: true,
            path_separator: "\\".to_string(),
            export_setup: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunCfg {
    /// Particle (sample) number used in saved file names
    pub particle: u32,
}

impl Default for RunCfg {
    fn default() -> Self {
        Self { particle: 1 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorCfg,
    pub gauge: GaugeCfg,
    pub band: BandCfg,
    #[serde(rename = "loop")]
    pub cadence: LoopCfg,
    pub instrument: InstrumentCfg,
    pub run: RunCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Least-squares fit of the gauge transfer curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeFit {
    pub offset_v: f64,
    pub slope_v_per_decade: f64,
}

impl GaugeFit {
    /// Fit `V = offset_v + slope * log10(p)` over the calibration points.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        for (i, r) in rows.iter().enumerate() {
            if !r.voltage.is_finite() {
                eyre::bail!("calibration row {} has a non-finite voltage", i + 1);
            }
            if !(r.pressure_mbar.is_finite() && r.pressure_mbar > 0.0) {
                eyre::bail!(
                    "calibration row {} pressure must be a positive number, got {}",
                    i + 1,
                    r.pressure_mbar
                );
            }
        }

        let n = rows.len() as f64;
        let xs: Vec<f64> = rows.iter().map(|r| r.pressure_mbar.log10()).collect();
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_v = rows.iter().map(|r| r.voltage).sum::<f64>() / n;
        let (mut sxx, mut sxv) = (0.0f64, 0.0f64);
        for (x, r) in xs.iter().zip(rows) {
            let dx = x - mean_x;
            sxx += dx * dx;
            sxv += dx * (r.voltage - mean_v);
        }
        if !sxx.is_finite() || sxx == 0.0 {
            eyre::bail!("calibration cannot determine slope (all pressures identical)");
        }
        let slope = sxv / sxx;
        if !slope.is_finite() || slope == 0.0 {
            eyre::bail!("calibration produced an invalid slope");
        }
        Ok(Self {
            offset_v: mean_v - slope * mean_x,
            slope_v_per_decade: slope,
        })
    }
}

impl TryFrom<&[CalibrationRow]> for GaugeFit {
    type Error = eyre::Report;
    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<GaugeFit> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["voltage", "pressure_mbar"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'voltage,pressure_mbar', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    GaugeFit::from_rows(&rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        if !(1..=8).contains(&self.sensor.channel) {
            eyre::bail!("sensor.channel must be in 1..=8");
        }
        if self.sensor.read_timeout_ms == 0 {
            eyre::bail!("sensor.read_timeout_ms must be >= 1");
        }
        if self.sensor.read_timeout_ms > 10_000 {
            eyre::bail!("sensor.read_timeout_ms is unreasonably large (>10s)");
        }
        if ![12, 14, 16, 18].contains(&self.sensor.adc_bits) {
            eyre::bail!("sensor.adc_bits must be one of 12, 14, 16, 18");
        }

        // Gauge
        if !(self.gauge.divider_ratio.is_finite() && self.gauge.divider_ratio > 0.0) {
            eyre::bail!("gauge.divider_ratio must be > 0");
        }
        if !self.gauge.offset_v.is_finite() {
            eyre::bail!("gauge.offset_v must be finite");
        }
        if !self.gauge.slope_v_per_decade.is_finite() || self.gauge.slope_v_per_decade == 0.0 {
            eyre::bail!("gauge.slope_v_per_decade must be finite and non-zero");
        }

        // Band
        if let Some(sp) = self.band.setpoint_mbar
            && !(sp.is_finite() && sp > 0.0)
        {
            eyre::bail!("band.setpoint_mbar must be > 0");
        }
        if self
            .band
            .setpoints_mbar
            .iter()
            .any(|sp| !(sp.is_finite() && *sp > 0.0))
        {
            eyre::bail!("band.setpoints_mbar entries must be > 0");
        }
        let mut all = self.band.all_setpoints();
        all.sort_by(f64::total_cmp);
        if all.windows(2).any(|w| w[0] == w[1]) {
            eyre::bail!("band setpoints must be distinct");
        }
        if !(self.band.tolerance_pct > 0.0 && self.band.tolerance_pct < 100.0) {
            eyre::bail!("band.tolerance_pct must be in (0, 100)");
        }

        // Loop
        if self.cadence.interval_ms == 0 {
            eyre::bail!("loop.interval_ms must be >= 1");
        }
        if self.cadence.interval_ms > 60_000 {
            eyre::bail!("loop.interval_ms is unreasonably large (>60s)");
        }
        if self.cadence.persistent_error_threshold == 0 {
            eyre::bail!("loop.persistent_error_threshold must be >= 1");
        }

        // Instrument
        if let Some(addr) = &self.instrument.address
            && addr.trim().is_empty()
        {
            eyre::bail!("instrument.address must not be empty");
        }
        if self.instrument.port == 0 {
            eyre::bail!("instrument.port must be > 0");
        }
        if self.instrument.connect_timeout_ms == 0 {
            eyre::bail!("instrument.connect_timeout_ms must be >= 1");
        }
        if self.instrument.command_timeout_ms == 0 {
            eyre::bail!("instrument.command_timeout_ms must be >= 1");
        }
        if self.instrument.path_separator.is_empty() {
            eyre::bail!("instrument.path_separator must not be empty");
        }

        // Run
        if self.run.particle == 0 {
            eyre::bail!("run.particle must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
