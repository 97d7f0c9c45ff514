//! Runtime configuration snapshot and the cell that publishes it.
//!
//! A `RunConfig` is immutable once published. Changes are made on a copy,
//! validated, and swapped in as a whole; the loop notices the new generation
//! at its next cycle boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::band::TargetBand;
use crate::calibration::CalibrationParameters;
use crate::error::AutopressError;
use crate::naming::SaveNaming;

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub calibration: CalibrationParameters,
    /// Target pressures, sorted by setpoint, all sharing `tolerance_pct`.
    /// Empty means monitor only.
    pub targets: Vec<TargetBand>,
    pub tolerance_pct: f64,
    pub interval: Duration,
    pub channel: u8,
    pub sensor_timeout: Duration,
    pub address: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub naming: SaveNaming,
    pub particle: u32,
    /// Consecutive failed cycles before a persistent fault is flagged.
    pub persistent_error_threshold: u32,
}

impl RunConfig {
    /// Defaults for everything except the two values an operator must give.
    pub fn new(band: TargetBand, address: impl Into<String>) -> Self {
        Self {
            calibration: CalibrationParameters::default(),
            targets: vec![band],
            tolerance_pct: band.tolerance_pct(),
            interval: Duration::from_millis(20),
            channel: 1,
            sensor_timeout: Duration::from_millis(150),
            address: address.into(),
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(10),
            naming: SaveNaming::default(),
            particle: 1,
            persistent_error_threshold: 50,
        }
    }

    /// Setpoints of all targets, ascending.
    pub fn setpoints_mbar(&self) -> Vec<f64> {
        self.targets.iter().map(TargetBand::setpoint_mbar).collect()
    }

    /// Replace the targets with `setpoints_mbar` at the current tolerance.
    pub fn set_setpoints(&mut self, setpoints_mbar: &[f64]) -> Result<(), AutopressError> {
        let mut targets = setpoints_mbar
            .iter()
            .map(|&sp| TargetBand::new(sp, self.tolerance_pct))
            .collect::<Result<Vec<_>, _>>()?;
        targets.sort_by(|a, b| a.setpoint_mbar().total_cmp(&b.setpoint_mbar()));
        self.targets = targets;
        Ok(())
    }

    /// Rebuild every target with a new tolerance.
    pub fn set_tolerance_pct(&mut self, tolerance_pct: f64) -> Result<(), AutopressError> {
        self.targets = self
            .targets
            .iter()
            .map(|b| TargetBand::new(b.setpoint_mbar(), tolerance_pct))
            .collect::<Result<Vec<_>, _>>()?;
        self.tolerance_pct = tolerance_pct;
        Ok(())
    }

    /// Insert a target, keeping the list sorted.
    pub fn add_target(&mut self, setpoint_mbar: f64) -> Result<(), AutopressError> {
        let mut setpoints = self.setpoints_mbar();
        setpoints.push(setpoint_mbar);
        self.set_setpoints(&setpoints)
    }

    /// Drop the highest target, if any.
    pub fn remove_last_target(&mut self) -> Option<TargetBand> {
        self.targets.pop()
    }

    pub fn validate(&self) -> Result<(), AutopressError> {
        self.calibration
            .validate()
            .map_err(|e| AutopressError::Config(e.to_string()))?;
        if !(self.tolerance_pct > 0.0 && self.tolerance_pct < 100.0) {
            return Err(AutopressError::Config(format!(
                "tolerance must be in (0, 100) percent, got {}",
                self.tolerance_pct
            )));
        }
        for pair in self.targets.windows(2) {
            if pair[0].setpoint_mbar() >= pair[1].setpoint_mbar() {
                return Err(AutopressError::Config(format!(
                    "targets must be distinct and ascending, got {} then {}",
                    pair[0].setpoint_mbar(),
                    pair[1].setpoint_mbar()
                )));
            }
        }
        if let Some(b) = self
            .targets
            .iter()
            .find(|b| b.tolerance_pct() != self.tolerance_pct)
        {
            return Err(AutopressError::Config(format!(
                "target {} mbar uses tolerance {} instead of {}",
                b.setpoint_mbar(),
                b.tolerance_pct(),
                self.tolerance_pct
            )));
        }
        if self.interval.is_zero() {
            return Err(AutopressError::Config("interval must be > 0".into()));
        }
        if !(1..=8).contains(&self.channel) {
            return Err(AutopressError::Config(format!(
                "channel must be in 1..=8, got {}",
                self.channel
            )));
        }
        if self.sensor_timeout.is_zero() {
            return Err(AutopressError::Config("sensor timeout must be > 0".into()));
        }
        if self.address.trim().is_empty() {
            return Err(AutopressError::Config(
                "instrument address must not be empty".into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(AutopressError::Config(
                "instrument timeouts must be > 0".into(),
            ));
        }
        if self.particle == 0 {
            return Err(AutopressError::Config("particle number must be >= 1".into()));
        }
        if self.persistent_error_threshold == 0 {
            return Err(AutopressError::Config(
                "persistent error threshold must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Copy-on-write holder for the current `RunConfig`.
#[derive(Debug)]
pub struct SharedConfig {
    current: RwLock<Arc<RunConfig>>,
    generation: AtomicU64,
}

impl SharedConfig {
    pub fn new(config: RunConfig) -> Result<Self, AutopressError> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            generation: AtomicU64::new(0),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Arc<RunConfig> {
        match self.current.read() {
            Ok(g) => Arc::clone(&*g),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Generation and snapshot read under the same lock.
    pub fn versioned(&self) -> (u64, Arc<RunConfig>) {
        let guard = match self.current.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        (self.generation(), Arc::clone(&*guard))
    }

    /// Apply `edit` to a copy of the current config; publish it only if it
    /// validates.
    pub fn update(&self, edit: impl FnOnce(&mut RunConfig)) -> Result<(), AutopressError> {
        self.try_update(|c| {
            edit(c);
            Ok(())
        })
    }

    /// Like `update`, for edits that can fail. The edit reads and writes the
    /// config under one write lock, so concurrent edits never overwrite
    /// each other.
    pub fn try_update(
        &self,
        edit: impl FnOnce(&mut RunConfig) -> Result<(), AutopressError>,
    ) -> Result<(), AutopressError> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| AutopressError::State("config lock poisoned".into()))?;
        let mut next = RunConfig::clone(&**guard);
        edit(&mut next)?;
        next.validate()?;
        if next != **guard {
            *guard = Arc::new(next);
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}
