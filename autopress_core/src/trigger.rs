//! Remote trigger client: owns the instrument session and turns a band
//! entry into exactly one save.
//!
//! The session is long-lived and reused across triggers. Any failure closes
//! and discards it; the next command reconnects first.

use std::time::Duration;

use autopress_traits::{Instrument, InstrumentConnector, SaveRequest};

use crate::band::TriggerEvent;
use crate::error::{AutopressError, ConnectionError, TriggerError};
use crate::hw_error::{map_connect_error, map_trigger_error};

/// Saves attempted per event: the first try plus one retry through a fresh
/// session.
pub const MAX_ATTEMPTS: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Saved { attempts: u8, file: String },
    Dropped { attempts: u8, error: AutopressError },
}

impl TriggerOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, TriggerOutcome::Saved { .. })
    }

    pub fn attempts(&self) -> u8 {
        match self {
            TriggerOutcome::Saved { attempts, .. } | TriggerOutcome::Dropped { attempts, .. } => {
                *attempts
            }
        }
    }
}

pub struct RemoteTriggerClient<K: InstrumentConnector> {
    connector: K,
    session: Option<K::Session>,
    address: String,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl<K: InstrumentConnector> RemoteTriggerClient<K> {
    pub fn new(
        connector: K,
        address: impl Into<String>,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            session: None,
            address: address.into(),
            connect_timeout,
            command_timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Point the client at another instrument. An open session to the old
    /// address is torn down.
    pub fn set_address(&mut self, address: &str) {
        if address != self.address {
            self.shutdown();
            self.address = address.to_string();
        }
    }

    pub fn set_timeouts(&mut self, connect: Duration, command: Duration) {
        self.connect_timeout = connect;
        self.command_timeout = command;
    }

    /// Open a session to `address` and confirm the instrument answers its
    /// identification query.
    pub fn connect(&mut self, address: &str) -> Result<K::Session, ConnectionError> {
        let mut session = self
            .connector
            .connect(address, self.connect_timeout)
            .map_err(|e| map_connect_error(&*e))?;
        match session.identify(self.connect_timeout) {
            Ok(idn) => {
                tracing::info!(address, idn = %idn.trim(), "instrument connected");
                Ok(session)
            }
            Err(e) => {
                let _ = session.close();
                Err(ConnectionError::Identify(e.to_string()))
            }
        }
    }

    /// Ask an open session to persist its buffer, bounded by the command
    /// timeout.
    pub fn trigger_save(
        session: &mut K::Session,
        request: &SaveRequest,
        timeout: Duration,
    ) -> Result<(), TriggerError> {
        session
            .save_buffer(request, timeout)
            .map_err(|e| map_trigger_error(&*e))
    }

    /// Connect, identify and disconnect. Leaves any live session untouched.
    pub fn check_connection(&mut self, address: &str) -> Result<String, ConnectionError> {
        let mut session = self
            .connector
            .connect(address, self.connect_timeout)
            .map_err(|e| map_connect_error(&*e))?;
        let idn = session
            .identify(self.connect_timeout)
            .map_err(|e| ConnectionError::Identify(e.to_string()));
        let _ = session.close();
        idn.map(|s| s.trim().to_string())
    }

    fn attempt(&mut self, request: &SaveRequest) -> Result<(), AutopressError> {
        if self.session.is_none() {
            let address = self.address.clone();
            self.session = Some(self.connect(&address)?);
        }
        let timeout = self.command_timeout;
        match self.session.as_mut() {
            Some(session) => Self::trigger_save(session, request, timeout).map_err(Into::into),
            None => Err(AutopressError::State("no instrument session".into())),
        }
    }

    /// Save once for `event`, retrying through a fresh session at most once.
    pub fn fire(&mut self, event: &TriggerEvent, request: &SaveRequest) -> TriggerOutcome {
        let mut last_error = AutopressError::State("no attempt made".into());
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(request) {
                Ok(()) => {
                    tracing::info!(
                        pressure_mbar = event.pressure_mbar,
                        file = %request.file_path,
                        attempt,
                        "waveform saved"
                    );
                    return TriggerOutcome::Saved {
                        attempts: attempt,
                        file: request.file_path.clone(),
                    };
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "save failed; discarding session");
                    self.shutdown();
                    last_error = e;
                }
            }
        }
        tracing::error!(
            pressure_mbar = event.pressure_mbar,
            error = %last_error,
            "trigger dropped"
        );
        TriggerOutcome::Dropped {
            attempts: MAX_ATTEMPTS,
            error: last_error,
        }
    }

    /// Close the session, if any. Close errors are logged and swallowed.
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Err(e) = session.close()
        {
            tracing::debug!(error = %e, "instrument close failed");
        }
    }

    pub fn into_connector(mut self) -> K {
        self.shutdown();
        let Self { connector, .. } = self;
        connector
    }
}
