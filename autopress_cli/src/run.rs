//! Hardware assembly and command execution.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use autopress_config::{Config, InstrumentBackend};
use autopress_core::error::Result as CoreResult;
use autopress_core::{
    AutopressError, ControlLoop, RemoteTriggerClient, RunConfig, RunSummary, SensorReader,
    voltage_to_pressure,
};
use autopress_hardware::{ScpiConnector, SimulatedConnector};
use autopress_traits::{InstrumentConnector, MonotonicClock, Sensor};

use crate::cli::RunArgs;

/// Fold command-line overrides into the file config.
pub fn apply_overrides(cfg: &mut Config, args: &RunArgs) {
    if let Some((first, rest)) = args.setpoint.split_first() {
        cfg.band.setpoint_mbar = Some(*first);
        cfg.band.setpoints_mbar = rest.to_vec();
    }
    if let Some(tol) = args.tolerance_pct {
        cfg.band.tolerance_pct = tol;
    }
    if let Some(ms) = args.interval_ms {
        cfg.cadence.interval_ms = ms;
    }
    if let Some(ch) = args.channel {
        cfg.sensor.channel = ch;
    }
    if let Some(addr) = &args.address {
        cfg.instrument.address = Some(addr.clone());
    }
    if let Some(n) = args.particle {
        cfg.run.particle = n;
    }
    if cfg.instrument.backend == InstrumentBackend::Sim && cfg.instrument.address.is_none() {
        cfg.instrument.address = Some("sim".to_string());
    }
}

/// Open the ADC front end (or the simulator when built without `hardware`).
#[cfg(feature = "hardware")]
pub fn make_sensor(cfg: &Config) -> CoreResult<Box<dyn Sensor + Send>> {
    use eyre::WrapErr;
    let sensor = autopress_hardware::HardwareSensor::try_new(
        cfg.sensor.adc_address_1,
        cfg.sensor.adc_address_2,
        cfg.sensor.adc_bits,
    )
    .wrap_err("open ADC Pi")?;
    Ok(Box::new(sensor))
}

#[cfg(not(feature = "hardware"))]
pub fn make_sensor(cfg: &Config) -> CoreResult<Box<dyn Sensor + Send>> {
    use autopress_hardware::{SimProfile, SimulatedSensor};
    let profile = SimProfile {
        base_mbar: cfg.band.setpoint_mbar.unwrap_or(SimProfile::default().base_mbar),
        offset_v: cfg.gauge.offset_v,
        slope_v_per_decade: cfg.gauge.slope_v_per_decade,
        divider_ratio: cfg.gauge.divider_ratio,
        ..SimProfile::default()
    };
    tracing::info!(base_mbar = profile.base_mbar, "using simulated sensor");
    Ok(Box::new(SimulatedSensor::new(profile)))
}

fn scpi_connector(cfg: &Config) -> ScpiConnector {
    let connector = ScpiConnector::new(cfg.instrument.port);
    match &cfg.instrument.export_setup {
        Some(cmds) => connector.with_export_setup(cmds.clone()),
        None => connector,
    }
}

fn drive<K: InstrumentConnector>(
    sensor: Box<dyn Sensor + Send>,
    connector: K,
    run_cfg: RunConfig,
    max_cycles: Option<u64>,
    stop: &AtomicBool,
) -> CoreResult<RunSummary> {
    let mut builder = ControlLoop::builder()
        .sensor(sensor)
        .connector(connector)
        .config(run_cfg)
        .clock(MonotonicClock::new());
    if let Some(n) = max_cycles {
        builder = builder.max_cycles(n);
    }
    let mut lp = builder.build()?;
    Ok(lp.run(stop))
}

pub fn run_loop(
    cfg: &Config,
    sensor: Box<dyn Sensor + Send>,
    max_cycles: Option<u64>,
    stop: Arc<AtomicBool>,
) -> CoreResult<RunSummary> {
    let run_cfg = RunConfig::try_from(cfg).map_err(eyre::Report::new)?;
    match cfg.instrument.backend {
        InstrumentBackend::Scpi => drive(sensor, scpi_connector(cfg), run_cfg, max_cycles, &stop),
        InstrumentBackend::Sim => {
            drive(sensor, SimulatedConnector::new(), run_cfg, max_cycles, &stop)
        }
    }
}

/// One line per sample: raw pin voltage, gauge voltage and pressure.
#[derive(Debug, Clone, Copy)]
pub struct ReadSample {
    pub raw_v: f32,
    pub voltage: f32,
    pub pressure_mbar: Option<f64>,
}

pub fn read_samples(
    cfg: &Config,
    sensor: Box<dyn Sensor + Send>,
    channel: u8,
    samples: u32,
) -> CoreResult<Vec<ReadSample>> {
    let cal = autopress_core::CalibrationParameters::from(&cfg.gauge);
    let mut reader = SensorReader::new(
        sensor,
        cal.divider_ratio,
        std::time::Duration::from_millis(cfg.sensor.read_timeout_ms),
        Arc::new(MonotonicClock::new()),
    );
    let mut out = Vec::with_capacity(samples as usize);
    for _ in 0..samples {
        let s = reader
            .read_voltage(channel)
            .map_err(|e| eyre::Report::new(AutopressError::from(e)))?;
        let pressure_mbar = match voltage_to_pressure(s.voltage, &cal) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "conversion failed");
                None
            }
        };
        out.push(ReadSample {
            raw_v: s.raw_v,
            voltage: s.voltage,
            pressure_mbar,
        });
        std::thread::sleep(std::time::Duration::from_millis(cfg.cadence.interval_ms));
    }
    Ok(out)
}

fn check_with<K: InstrumentConnector>(cfg: &Config, connector: K, address: &str) -> CoreResult<String> {
    let mut client = RemoteTriggerClient::new(
        connector,
        address,
        std::time::Duration::from_millis(cfg.instrument.connect_timeout_ms),
        std::time::Duration::from_millis(cfg.instrument.command_timeout_ms),
    );
    client
        .check_connection(address)
        .map_err(|e| eyre::Report::new(AutopressError::from(e)))
}

/// Identify the instrument at the configured address.
pub fn check_instrument(cfg: &Config) -> CoreResult<String> {
    let address = cfg
        .instrument
        .address
        .clone()
        .ok_or_else(|| eyre::Report::new(AutopressError::Config("instrument.address is required".into())))?;
    match cfg.instrument.backend {
        InstrumentBackend::Scpi => check_with(cfg, scpi_connector(cfg), &address),
        InstrumentBackend::Sim => check_with(cfg, SimulatedConnector::new(), &address),
    }
}
