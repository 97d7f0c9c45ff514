//! Loop status snapshot and the event stream UIs subscribe to.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Local};
use crossbeam_channel as xch;

use crate::band::{DetectorState, TriggerEvent};
use crate::error::AutopressError;
use crate::reading::PressureReading;
use crate::trigger::TriggerOutcome;

/// Capacity of each subscriber's channel. Events beyond it are dropped.
pub const EVENT_CAPACITY: usize = 256;

/// Trigger records kept in `LoopStatus::history`; the oldest go first.
pub const HISTORY_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRecord {
    pub outcome: TriggerOutcome,
    /// Target whose band was entered.
    pub setpoint_mbar: f64,
    /// Measured pressure at the entry.
    pub pressure_mbar: f64,
    pub particle: u32,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopStatus {
    pub running: bool,
    pub detector: DetectorState,
    pub last_voltage: Option<f32>,
    pub last_pressure_mbar: Option<f64>,
    pub last_trigger: Option<TriggerRecord>,
    /// Triggers of the current run, oldest first, at most `HISTORY_CAPACITY`.
    pub history: VecDeque<TriggerRecord>,
    pub last_error: Option<AutopressError>,
    pub consecutive_errors: u32,
    pub persistent_fault: bool,
    pub cycles: u64,
    pub saves: u64,
    pub dropped: u64,
    pub errors: u64,
    pub overruns: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    Started,
    Reading(PressureReading),
    BandEntered(TriggerEvent),
    Triggered(TriggerRecord),
    Error(AutopressError),
    PersistentFault { consecutive: u32 },
    Overrun { late_ms: u64 },
    Stopped,
}

impl LoopStatus {
    pub fn record_trigger(&mut self, record: TriggerRecord) {
        if record.outcome.is_saved() {
            self.saves += 1;
        } else {
            self.dropped += 1;
        }
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        self.last_trigger = Some(record);
    }
}

/// Shared status; written by the loop, read by everyone else.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<LoopStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LoopStatus {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut LoopStatus)) {
        match self.inner.write() {
            Ok(mut g) => f(&mut *g),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }
}

/// Fan-out of loop events to any number of bounded subscribers.
///
/// Publishing never blocks: a full subscriber misses the event, a
/// disconnected one is forgotten.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<xch::Sender<LoopEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> xch::Receiver<LoopEvent> {
        let (tx, rx) = xch::bounded(EVENT_CAPACITY);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: LoopEvent) {
        let Ok(mut subs) = self.subscribers.lock() else {
            return;
        };
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(xch::TrySendError::Full(_)) => true,
            Err(xch::TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lagging_subscriber_does_not_block() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        for _ in 0..(EVENT_CAPACITY + 10) {
            bus.publish(LoopEvent::Started);
        }
        assert_eq!(rx.len(), EVENT_CAPACITY);
    }

    #[test]
    fn disconnected_subscribers_are_dropped() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        drop(rx);
        bus.publish(LoopEvent::Stopped);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let mut status = LoopStatus::default();
        for i in 0..(HISTORY_CAPACITY + 3) {
            status.record_trigger(TriggerRecord {
                outcome: TriggerOutcome::Saved {
                    attempts: 1,
                    file: format!("f{i}.bin"),
                },
                setpoint_mbar: 1.0,
                pressure_mbar: 1.0,
                particle: 1,
                at: Local::now(),
            });
        }
        assert_eq!(status.history.len(), HISTORY_CAPACITY);
        assert_eq!(status.saves, (HISTORY_CAPACITY + 3) as u64);
        assert_eq!(
            status.history.front().map(|r| r.outcome.clone()),
            Some(TriggerOutcome::Saved {
                attempts: 1,
                file: "f3.bin".into()
            })
        );
    }

    #[test]
    fn board_updates_are_visible_to_clones() {
        let board = StatusBoard::new();
        let view = board.clone();
        board.update(|s| s.cycles = 7);
        assert_eq!(view.snapshot().cycles, 7);
    }
}
