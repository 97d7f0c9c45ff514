//! Type-state builder for `ControlLoop`.
//!
//! `build()` only exists once both a sensor and an instrument connector have
//! been supplied. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use autopress_traits::{Clock, InstrumentConnector, MonotonicClock, Sensor};

use crate::config::{RunConfig, SharedConfig};
use crate::error::{BuildError, Result};
use crate::runner::ControlLoop;
use crate::status::{EventBus, StatusBoard};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct ControlLoopBuilder<S, K, SS = Missing, KS = Missing> {
    sensor: Option<S>,
    connector: Option<K>,
    config: Option<RunConfig>,
    shared: Option<Arc<SharedConfig>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    status: Option<StatusBoard>,
    events: Option<Arc<EventBus>>,
    max_cycles: Option<u64>,
    _s: PhantomData<SS>,
    _k: PhantomData<KS>,
}

impl<S, K> Default for ControlLoopBuilder<S, K, Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            connector: None,
            config: None,
            shared: None,
            clock: None,
            status: None,
            events: None,
            max_cycles: None,
            _s: PhantomData,
            _k: PhantomData,
        }
    }
}

impl<S: Sensor, K: InstrumentConnector> ControlLoop<S, K> {
    /// Start building a control loop.
    pub fn builder() -> ControlLoopBuilder<S, K, Missing, Missing> {
        ControlLoopBuilder::default()
    }
}

impl<S, K, SS, KS> ControlLoopBuilder<S, K, SS, KS> {
    fn retag<SS2, KS2>(self) -> ControlLoopBuilder<S, K, SS2, KS2> {
        ControlLoopBuilder {
            sensor: self.sensor,
            connector: self.connector,
            config: self.config,
            shared: self.shared,
            clock: self.clock,
            status: self.status,
            events: self.events,
            max_cycles: self.max_cycles,
            _s: PhantomData,
            _k: PhantomData,
        }
    }

    pub fn sensor(mut self, sensor: S) -> ControlLoopBuilder<S, K, Set, KS> {
        self.sensor = Some(sensor);
        self.retag()
    }

    pub fn connector(mut self, connector: K) -> ControlLoopBuilder<S, K, SS, Set> {
        self.connector = Some(connector);
        self.retag()
    }

    /// Use a private config cell built from `config`.
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share a config cell with a controller; takes precedence over `config`.
    pub fn shared_config(mut self, shared: Arc<SharedConfig>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn status(mut self, status: StatusBoard) -> Self {
        self.status = Some(status);
        self
    }

    pub fn events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Stop `run` after this many cycles.
    pub fn max_cycles(mut self, n: u64) -> Self {
        self.max_cycles = Some(n);
        self
    }
}

impl<S: Sensor, K: InstrumentConnector, SS, KS> ControlLoopBuilder<S, K, SS, KS> {
    /// Validate and build without compile-time guarantees.
    pub fn try_build(self) -> Result<ControlLoop<S, K>> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let connector = self
            .connector
            .ok_or_else(|| eyre::Report::new(BuildError::MissingConnector))?;
        let shared = match (self.shared, self.config) {
            (Some(shared), _) => shared,
            (None, Some(config)) => Arc::new(
                SharedConfig::new(config)
                    .map_err(|e| eyre::Report::new(BuildError::InvalidConfig(e.to_string())))?,
            ),
            (None, None) => return Err(eyre::Report::new(BuildError::MissingConfig)),
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        Ok(ControlLoop::from_parts(
            sensor,
            connector,
            shared,
            clock,
            self.status.unwrap_or_default(),
            self.events,
            self.max_cycles,
        ))
    }
}

impl<S: Sensor, K: InstrumentConnector> ControlLoopBuilder<S, K, Set, Set> {
    pub fn build(self) -> Result<ControlLoop<S, K>> {
        self.try_build()
    }
}
