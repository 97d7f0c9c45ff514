//! Scripted sensor and instrument doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autopress_core::{CalibrationParameters, RunConfig, TargetBand};
use autopress_traits::{
    BoxError, Clock, Instrument, InstrumentConnector, ManualClock, SaveRequest, Sensor,
};

/// One scripted ADC outcome.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Pressure(f64),
    /// Raw ADC pin voltage, bypassing the default gauge curve.
    Volts(f32),
    Fail,
}

/// Replays pressures as the ADC pin voltage the default gauge and divider
/// would produce. Repeats the last step once the script runs out.
pub struct ScriptedSensor {
    steps: VecDeque<Step>,
    last: Step,
    cal: CalibrationParameters,
    /// Simulated time each read takes.
    read_cost: Option<(ManualClock, Duration)>,
    pub reads: Arc<AtomicUsize>,
}

impl ScriptedSensor {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            last: Step::Fail,
            cal: CalibrationParameters::default(),
            read_cost: None,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pressures(ps: &[f64]) -> Self {
        Self::new(ps.iter().map(|&p| Step::Pressure(p)))
    }

    pub fn with_read_cost(mut self, clock: ManualClock, cost: Duration) -> Self {
        self.read_cost = Some((clock, cost));
        self
    }
}

impl Sensor for ScriptedSensor {
    fn read_voltage(&mut self, _channel: u8, _timeout: Duration) -> Result<f32, BoxError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some((clock, cost)) = &self.read_cost {
            clock.sleep(*cost);
        }
        let step = self.steps.pop_front().unwrap_or(self.last);
        self.last = step;
        match step {
            Step::Pressure(p) => {
                Ok((self.cal.pressure_to_voltage(p) / self.cal.divider_ratio) as f32)
            }
            Step::Volts(v) => Ok(v),
            Step::Fail => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "adc conversion timeout",
            ))),
        }
    }
}

#[derive(Debug)]
struct Flaky(&'static str);
impl std::fmt::Display for Flaky {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}
impl std::error::Error for Flaky {}

/// Counters shared between a connector, its sessions and the test.
#[derive(Default, Clone)]
pub struct Ledger {
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub attempts: Arc<AtomicUsize>,
    pub saved: Arc<Mutex<Vec<SaveRequest>>>,
    pub addresses: Arc<Mutex<Vec<String>>>,
}

impl Ledger {
    pub fn saved(&self) -> Vec<SaveRequest> {
        self.saved.lock().expect("lock").clone()
    }
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Connector whose sessions fail saves according to a script
/// (`true` = save succeeds). Defaults to success once the script runs out.
pub struct ScriptedConnector {
    pub ledger: Ledger,
    save_plan: Arc<Mutex<VecDeque<bool>>>,
    refuse_connect: bool,
}

impl ScriptedConnector {
    pub fn new(plan: impl IntoIterator<Item = bool>) -> Self {
        Self {
            ledger: Ledger::default(),
            save_plan: Arc::new(Mutex::new(plan.into_iter().collect())),
            refuse_connect: false,
        }
    }

    /// Every save succeeds.
    pub fn healthy() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn refusing() -> Self {
        Self {
            refuse_connect: true,
            ..Self::healthy()
        }
    }
}

pub struct ScriptedSession {
    ledger: Ledger,
    save_plan: Arc<Mutex<VecDeque<bool>>>,
}

impl Instrument for ScriptedSession {
    fn identify(&mut self, _timeout: Duration) -> Result<String, BoxError> {
        Ok("Rohde&Schwarz,RTO,1329.7002k04/100938,4.70.1.0\n".into())
    }

    fn save_buffer(&mut self, request: &SaveRequest, _timeout: Duration) -> Result<(), BoxError> {
        self.ledger.attempts.fetch_add(1, Ordering::SeqCst);
        let ok = self
            .save_plan
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(true);
        if ok {
            self.ledger.saved.lock().expect("lock").push(request.clone());
            Ok(())
        } else {
            Err(Box::new(Flaky("save rejected: -200 execution error")))
        }
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.ledger.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl InstrumentConnector for ScriptedConnector {
    type Session = ScriptedSession;

    fn connect(&mut self, address: &str, _timeout: Duration) -> Result<ScriptedSession, BoxError> {
        self.ledger
            .addresses
            .lock()
            .expect("lock")
            .push(address.to_string());
        if self.refuse_connect {
            return Err(Box::new(Flaky("connection refused")));
        }
        self.ledger.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            ledger: self.ledger.clone(),
            save_plan: Arc::clone(&self.save_plan),
        })
    }
}

pub fn run_config(setpoint: f64, tolerance_pct: f64) -> RunConfig {
    RunConfig::new(
        TargetBand::new(setpoint, tolerance_pct).expect("band"),
        "192.168.0.10",
    )
}
