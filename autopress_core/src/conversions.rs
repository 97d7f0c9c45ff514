//! Conversions from `autopress_config` types to `autopress_core` types.

use std::time::Duration;

use crate::calibration::CalibrationParameters;
use crate::config::RunConfig;
use crate::error::AutopressError;
use crate::naming::SaveNaming;

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<&autopress_config::GaugeCfg> for CalibrationParameters {
    fn from(c: &autopress_config::GaugeCfg) -> Self {
        Self {
            divider_ratio: c.divider_ratio,
            offset_v: c.offset_v,
            slope_v_per_decade: c.slope_v_per_decade,
        }
    }
}

// ── Save naming ──────────────────────────────────────────────────────────────

impl From<&autopress_config::InstrumentCfg> for SaveNaming {
    fn from(c: &autopress_config::InstrumentCfg) -> Self {
        Self {
            save_dir: c.save_dir.clone(),
            dated_subdir: c.dated_subdir,
            separator: c.path_separator.clone(),
        }
    }
}

// ── RunConfig ────────────────────────────────────────────────────────────────

impl TryFrom<&autopress_config::Config> for RunConfig {
    type Error = AutopressError;

    fn try_from(c: &autopress_config::Config) -> Result<Self, Self::Error> {
        let setpoints = c.band.all_setpoints();
        if setpoints.is_empty() {
            return Err(AutopressError::Config("band.setpoint_mbar is required".into()));
        }
        let address = c
            .instrument
            .address
            .clone()
            .ok_or_else(|| AutopressError::Config("instrument.address is required".into()))?;
        let mut config = Self {
            calibration: CalibrationParameters::from(&c.gauge),
            targets: Vec::new(),
            tolerance_pct: c.band.tolerance_pct,
            interval: Duration::from_millis(c.cadence.interval_ms),
            channel: c.sensor.channel,
            sensor_timeout: Duration::from_millis(c.sensor.read_timeout_ms),
            address,
            connect_timeout: Duration::from_millis(c.instrument.connect_timeout_ms),
            command_timeout: Duration::from_millis(c.instrument.command_timeout_ms),
            naming: SaveNaming::from(&c.instrument),
            particle: c.run.particle,
            persistent_error_threshold: c.cadence.persistent_error_threshold,
        };
        config.set_setpoints(&setpoints)?;
        config.validate()?;
        Ok(config)
    }
}
