//! Configuration and status interface around a control loop running on a
//! worker thread.
//!
//! Setters edit, validate and publish a whole new `RunConfig` under the
//! config write lock; the loop adopts it at its next cycle boundary.
//! `stop()` joins the worker and takes the hardware back so the run can be
//! restarted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use autopress_traits::{Clock, InstrumentConnector, MonotonicClock, Sensor};
use crossbeam_channel as xch;

use crate::band::TargetBand;
use crate::calibration::CalibrationParameters;
use crate::config::{RunConfig, SharedConfig};
use crate::error::AutopressError;
use crate::runner::{ControlLoop, RunSummary};
use crate::status::{EventBus, LoopEvent, LoopStatus, StatusBoard, TriggerRecord};

struct Worker<S, K> {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<(S, K, RunSummary)>,
}

pub struct Controller<S, K> {
    config: Arc<SharedConfig>,
    status: StatusBoard,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock + Send + Sync>,
    idle: Option<(S, K)>,
    worker: Option<Worker<S, K>>,
}

impl<S, K> Controller<S, K>
where
    S: Sensor + Send + 'static,
    K: InstrumentConnector + Send + 'static,
{
    pub fn new(sensor: S, connector: K, config: RunConfig) -> Result<Self, AutopressError> {
        Ok(Self {
            config: Arc::new(SharedConfig::new(config)?),
            status: StatusBoard::new(),
            events: Arc::new(EventBus::new()),
            clock: Arc::new(MonotonicClock::new()),
            idle: Some((sensor, connector)),
            worker: None,
        })
    }

    /// Replace the clock used by subsequent runs.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    // ── Configuration ────────────────────────────────────────────────────────

    pub fn config(&self) -> Arc<RunConfig> {
        self.config.snapshot()
    }

    pub fn update(&self, edit: impl FnOnce(&mut RunConfig)) -> Result<(), AutopressError> {
        self.config.update(edit)
    }

    /// Like `update`, for edits that build values which can be rejected.
    pub fn try_update(
        &self,
        edit: impl FnOnce(&mut RunConfig) -> Result<(), AutopressError>,
    ) -> Result<(), AutopressError> {
        self.config.try_update(edit)
    }

    /// Lowest target pressure, or `None` when no target is set.
    pub fn setpoint_mbar(&self) -> Option<f64> {
        self.config().targets.first().map(TargetBand::setpoint_mbar)
    }

    /// Replace every target with a single one.
    pub fn set_setpoint_mbar(&self, setpoint_mbar: f64) -> Result<(), AutopressError> {
        self.try_update(|c| c.set_setpoints(&[setpoint_mbar]))
    }

    pub fn targets(&self) -> Vec<TargetBand> {
        self.config().targets.clone()
    }

    pub fn setpoints_mbar(&self) -> Vec<f64> {
        self.config().setpoints_mbar()
    }

    pub fn set_setpoints_mbar(&self, setpoints_mbar: &[f64]) -> Result<(), AutopressError> {
        self.try_update(|c| c.set_setpoints(setpoints_mbar))
    }

    /// Add a target at the shared tolerance. Duplicates are rejected.
    pub fn add_target(&self, setpoint_mbar: f64) -> Result<(), AutopressError> {
        self.try_update(|c| c.add_target(setpoint_mbar))
    }

    /// Remove the highest target and return its setpoint.
    pub fn remove_last_target(&self) -> Result<Option<f64>, AutopressError> {
        let mut removed = None;
        self.update(|c| removed = c.remove_last_target().map(|b| b.setpoint_mbar()))?;
        Ok(removed)
    }

    pub fn tolerance_pct(&self) -> f64 {
        self.config().tolerance_pct
    }

    pub fn set_tolerance_pct(&self, tolerance_pct: f64) -> Result<(), AutopressError> {
        self.try_update(|c| c.set_tolerance_pct(tolerance_pct))
    }

    /// Make `band` the only target and adopt its tolerance.
    pub fn set_band(&self, band: TargetBand) -> Result<(), AutopressError> {
        self.update(|c| {
            c.tolerance_pct = band.tolerance_pct();
            c.targets = vec![band];
        })
    }

    pub fn interval(&self) -> Duration {
        self.config().interval
    }

    pub fn set_interval(&self, interval: Duration) -> Result<(), AutopressError> {
        self.update(|c| c.interval = interval)
    }

    pub fn channel(&self) -> u8 {
        self.config().channel
    }

    pub fn set_channel(&self, channel: u8) -> Result<(), AutopressError> {
        self.update(|c| c.channel = channel)
    }

    pub fn address(&self) -> String {
        self.config().address.clone()
    }

    pub fn set_address(&self, address: &str) -> Result<(), AutopressError> {
        self.update(|c| c.address = address.trim().to_string())
    }

    pub fn particle(&self) -> u32 {
        self.config().particle
    }

    pub fn set_particle(&self, particle: u32) -> Result<(), AutopressError> {
        self.update(|c| c.particle = particle)
    }

    pub fn calibration(&self) -> CalibrationParameters {
        self.config().calibration
    }

    pub fn set_calibration(&self, cal: CalibrationParameters) -> Result<(), AutopressError> {
        self.update(|c| c.calibration = cal)
    }

    // ── Status ───────────────────────────────────────────────────────────────

    pub fn status(&self) -> LoopStatus {
        self.status.snapshot()
    }

    /// Saves and drops of the current or last run, oldest first.
    pub fn history(&self) -> Vec<TriggerRecord> {
        self.status.snapshot().history.into_iter().collect()
    }

    pub fn subscribe(&self) -> xch::Receiver<LoopEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<(), AutopressError> {
        if self.worker.is_some() {
            return Err(AutopressError::State("control loop already running".into()));
        }
        let (sensor, connector) = self.idle.take().ok_or_else(|| {
            AutopressError::State("hardware lost after a failed run; rebuild the controller".into())
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let shared = Arc::clone(&self.config);
        let clock = Arc::clone(&self.clock);
        let status = self.status.clone();
        let events = Arc::clone(&self.events);

        let spawned = std::thread::Builder::new()
            .name("autopress-loop".into())
            .spawn(move || {
                let mut lp =
                    ControlLoop::from_parts(sensor, connector, shared, clock, status, Some(events), None);
                let summary = lp.run(&stop_flag);
                let (sensor, connector) = lp.into_parts();
                (sensor, connector, summary)
            });
        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker { stop, handle });
                Ok(())
            }
            Err(e) => Err(AutopressError::State(format!(
                "failed to spawn control loop: {e}"
            ))),
        }
    }

    /// Stop the loop, wait for an in-flight trigger to finish, and advance
    /// the particle number for the next run.
    pub fn stop(&mut self) -> Result<RunSummary, AutopressError> {
        let Some(worker) = self.worker.take() else {
            return Err(AutopressError::State("control loop not running".into()));
        };
        worker.stop.store(true, Ordering::Relaxed);
        let (sensor, connector, summary) = worker.handle.join().map_err(|_| {
            self.status.update(|s| s.running = false);
            AutopressError::State("control loop thread panicked".into())
        })?;
        self.idle = Some((sensor, connector));
        let mut next = 0;
        self.update(|c| {
            c.particle = c.particle.saturating_add(1);
            next = c.particle;
        })?;
        tracing::info!(particle = next, "next particle");
        Ok(summary)
    }
}

impl<S, K> Drop for Controller<S, K> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Relaxed);
            if worker.handle.join().is_err() {
                tracing::warn!("control loop thread panicked during shutdown");
            }
        }
    }
}
