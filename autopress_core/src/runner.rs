//! The control loop: read -> convert -> detect -> (maybe) trigger, on a
//! fixed, drift-compensated cadence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use autopress_traits::{Clock, InstrumentConnector, Sensor};

use crate::band::BandSet;
use crate::calibration::voltage_to_pressure;
use crate::config::{RunConfig, SharedConfig};
use crate::error::AutopressError;
use crate::reading::PressureReading;
use crate::sensor::SensorReader;
use crate::status::{EventBus, LoopEvent, StatusBoard, TriggerRecord};
use crate::trigger::{RemoteTriggerClient, TriggerOutcome};
use crate::util::{STOP_POLL, millis_u64};

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// Reading taken; no band entry.
    Observed(PressureReading),
    /// One or more bands entered; one save attempted per band, lowest
    /// setpoint first.
    Triggered {
        reading: PressureReading,
        outcomes: Vec<TriggerOutcome>,
    },
    /// Sensor or conversion failed; detector state untouched.
    Skipped { error: AutopressError },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub saves: u64,
    pub dropped: u64,
    pub errors: u64,
    pub overruns: u64,
}

pub struct ControlLoop<S: Sensor, K: InstrumentConnector> {
    pub(crate) reader: SensorReader<S>,
    pub(crate) client: RemoteTriggerClient<K>,
    pub(crate) detector: BandSet,
    pub(crate) shared: Arc<SharedConfig>,
    pub(crate) snapshot: Arc<RunConfig>,
    pub(crate) generation: u64,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) status: StatusBoard,
    pub(crate) events: Option<Arc<EventBus>>,
    pub(crate) max_cycles: Option<u64>,
    pub(crate) summary: RunSummary,
    pub(crate) consecutive_errors: u32,
}

impl<S: Sensor, K: InstrumentConnector> ControlLoop<S, K> {
    pub(crate) fn from_parts(
        sensor: S,
        connector: K,
        shared: Arc<SharedConfig>,
        clock: Arc<dyn Clock + Send + Sync>,
        status: StatusBoard,
        events: Option<Arc<EventBus>>,
        max_cycles: Option<u64>,
    ) -> Self {
        let (generation, snapshot) = shared.versioned();
        let reader = SensorReader::new(
            sensor,
            snapshot.calibration.divider_ratio,
            snapshot.sensor_timeout,
            Arc::clone(&clock),
        );
        let client = RemoteTriggerClient::new(
            connector,
            snapshot.address.clone(),
            snapshot.connect_timeout,
            snapshot.command_timeout,
        );
        let detector = BandSet::new(&snapshot.targets);
        Self {
            reader,
            client,
            detector,
            shared,
            snapshot,
            generation,
            clock,
            status,
            events,
            max_cycles,
            summary: RunSummary::default(),
            consecutive_errors: 0,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.snapshot
    }

    pub fn detector(&self) -> &BandSet {
        &self.detector
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Pick up a newly published config at a cycle boundary.
    fn refresh_config(&mut self) {
        if self.shared.generation() == self.generation {
            return;
        }
        let (generation, next) = self.shared.versioned();
        let prev = std::mem::replace(&mut self.snapshot, next);
        self.generation = generation;
        let next = &self.snapshot;

        if next.calibration != prev.calibration {
            self.reader.set_divider_ratio(next.calibration.divider_ratio);
            self.detector.reset();
        }
        self.detector.set_bands(&next.targets);
        self.reader.set_timeout(next.sensor_timeout);
        self.client
            .set_timeouts(next.connect_timeout, next.command_timeout);
        self.client.set_address(&next.address);
        tracing::info!(
            generation,
            setpoints_mbar = ?next.setpoints_mbar(),
            tolerance_pct = next.tolerance_pct,
            channel = next.channel,
            "config updated"
        );
    }

    fn record_error(&mut self, error: AutopressError) -> CycleReport {
        self.summary.errors += 1;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        let consecutive = self.consecutive_errors;
        let threshold = self.snapshot.persistent_error_threshold;
        let newly_persistent = consecutive == threshold;
        tracing::warn!(error = %error, consecutive, "cycle skipped");
        self.status.update(|s| {
            s.errors += 1;
            s.consecutive_errors = consecutive;
            s.persistent_fault = consecutive >= threshold;
            s.last_error = Some(error.clone());
        });
        self.emit(LoopEvent::Error(error.clone()));
        if newly_persistent {
            tracing::error!(consecutive, "persistent sensor fault");
            self.emit(LoopEvent::PersistentFault { consecutive });
        }
        CycleReport::Skipped { error }
    }

    /// Run exactly one cycle.
    pub fn cycle(&mut self) -> CycleReport {
        self.refresh_config();
        self.summary.cycles += 1;
        self.status.update(|s| s.cycles += 1);

        let sample = match self.reader.read_voltage(self.snapshot.channel) {
            Ok(s) => s,
            Err(e) => return self.record_error(e.into()),
        };
        let pressure_mbar = match voltage_to_pressure(sample.voltage, &self.snapshot.calibration)
        {
            Ok(p) => p,
            Err(e) => return self.record_error(e.into()),
        };
        let reading = PressureReading {
            at: sample.at,
            voltage: sample.voltage,
            pressure_mbar,
        };
        tracing::trace!(volts = reading.voltage, pressure_mbar, "sample");

        self.consecutive_errors = 0;
        let events = self.detector.observe(&reading);
        let detector = self.detector.state();
        self.status.update(|s| {
            s.last_voltage = Some(reading.voltage);
            s.last_pressure_mbar = Some(pressure_mbar);
            s.consecutive_errors = 0;
            s.persistent_fault = false;
            s.detector = detector;
        });
        self.emit(LoopEvent::Reading(reading));

        if events.is_empty() {
            return CycleReport::Observed(reading);
        }

        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            tracing::info!(
                pressure_mbar,
                setpoint_mbar = event.setpoint_mbar,
                "band entered"
            );
            self.emit(LoopEvent::BandEntered(event));
            let stamp = chrono::Local::now();
            let particle = self.snapshot.particle;
            let request =
                self.snapshot
                    .naming
                    .request(particle, event.setpoint_mbar, stamp.naive_local());
            let outcome = self.client.fire(&event, &request);
            if outcome.is_saved() {
                self.summary.saves += 1;
            } else {
                self.summary.dropped += 1;
            }
            let record = TriggerRecord {
                outcome: outcome.clone(),
                setpoint_mbar: event.setpoint_mbar,
                pressure_mbar,
                particle,
                at: stamp,
            };
            self.status.update(|s| s.record_trigger(record.clone()));
            self.emit(LoopEvent::Triggered(record));
            outcomes.push(outcome);
        }
        CycleReport::Triggered { reading, outcomes }
    }

    /// Sleep until `deadline`, waking early if `stop` is raised.
    fn wait_until(&self, deadline: Instant, stop: &AtomicBool) {
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let now = self.clock.now();
            if now >= deadline {
                return;
            }
            self.clock.sleep((deadline - now).min(STOP_POLL));
        }
    }

    /// Drive cycles until `stop` is raised or `max_cycles` is reached.
    ///
    /// Each deadline is exactly one interval after the previous one. A cycle
    /// that finishes past its deadline counts as an overrun and the schedule
    /// restarts from now instead of bursting to catch up.
    pub fn run(&mut self, stop: &AtomicBool) -> RunSummary {
        self.status.update(|s| {
            s.running = true;
            s.history.clear();
            s.last_trigger = None;
        });
        self.emit(LoopEvent::Started);
        tracing::info!(
            setpoints_mbar = ?self.snapshot.setpoints_mbar(),
            tolerance_pct = self.snapshot.tolerance_pct,
            interval_ms = millis_u64(self.snapshot.interval),
            address = %self.snapshot.address,
            particle = self.snapshot.particle,
            "control loop start"
        );

        let mut deadline = self.clock.now() + self.snapshot.interval;
        let mut ran: u64 = 0;
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if self.max_cycles.is_some_and(|max| ran >= max) {
                break;
            }
            self.cycle();
            ran += 1;

            let interval = self.snapshot.interval;
            let now = self.clock.now();
            if now > deadline {
                let late_ms = millis_u64(now - deadline);
                self.summary.overruns += 1;
                self.status.update(|s| s.overruns += 1);
                tracing::debug!(late_ms, "cycle overran its deadline");
                self.emit(LoopEvent::Overrun { late_ms });
                deadline = now + interval;
                continue;
            }
            if self.max_cycles.is_some_and(|max| ran >= max) {
                break;
            }
            self.wait_until(deadline, stop);
            deadline += interval;
        }

        self.client.shutdown();
        self.status.update(|s| s.running = false);
        self.emit(LoopEvent::Stopped);
        tracing::info!(
            cycles = self.summary.cycles,
            saves = self.summary.saves,
            dropped = self.summary.dropped,
            errors = self.summary.errors,
            overruns = self.summary.overruns,
            "control loop stopped"
        );
        self.summary
    }

    /// Tear down the session and hand back the hardware.
    pub fn into_parts(self) -> (S, K) {
        let Self { reader, client, .. } = self;
        (reader.into_inner(), client.into_connector())
    }
}
