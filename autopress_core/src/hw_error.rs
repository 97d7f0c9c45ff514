//! Maps `Box<dyn Error>` from trait boundaries to typed errors.
//!
//! The traits in `autopress_traits` use `Box<dyn Error + Send + Sync>` so any
//! adapter can plug in; this module converts those to the typed enums the
//! loop reports, with an optional feature-gated path for
//! `autopress_hardware::HwError` downcasting.

use crate::error::{ConnectionError, SensorError, TriggerError};

fn looks_like_timeout(s: &str) -> bool {
    let s = s.to_lowercase();
    s.contains("timeout") || s.contains("timed out")
}

/// Map a sensor read failure.
pub fn map_sensor_error(e: &(dyn std::error::Error + 'static)) -> SensorError {
    #[cfg(feature = "hardware-errors")]
    {
        use autopress_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => SensorError::Timeout,
                HwError::InvalidChannel(ch) => SensorError::InvalidChannel(*ch),
                other => SensorError::Bus(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if looks_like_timeout(&s) {
        SensorError::Timeout
    } else {
        SensorError::Bus(s)
    }
}

/// Map a failure to open a session.
pub fn map_connect_error(e: &(dyn std::error::Error + 'static)) -> ConnectionError {
    #[cfg(feature = "hardware-errors")]
    {
        use autopress_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => ConnectionError::Timeout,
                HwError::Rejected { .. } | HwError::Protocol(_) => {
                    ConnectionError::Identify(hw.to_string())
                }
                other => ConnectionError::Unreachable(other.to_string()),
            };
        }
    }
    if let Some(io) = e.downcast_ref::<std::io::Error>()
        && io.kind() == std::io::ErrorKind::TimedOut
    {
        return ConnectionError::Timeout;
    }

    let s = e.to_string();
    if looks_like_timeout(&s) {
        ConnectionError::Timeout
    } else {
        ConnectionError::Unreachable(s)
    }
}

/// Map a failed save command.
pub fn map_trigger_error(e: &(dyn std::error::Error + 'static)) -> TriggerError {
    #[cfg(feature = "hardware-errors")]
    {
        use autopress_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => TriggerError::Timeout,
                HwError::Rejected { .. } | HwError::Protocol(_) => {
                    TriggerError::Rejected(hw.to_string())
                }
                other => TriggerError::Io(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if looks_like_timeout(&s) {
        TriggerError::Timeout
    } else if s.to_lowercase().contains("reject") {
        TriggerError::Rejected(s)
    } else {
        TriggerError::Io(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Opaque(&'static str);
    impl std::fmt::Display for Opaque {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }
    impl std::error::Error for Opaque {}

    #[test]
    fn string_fallback_detects_timeouts() {
        assert_eq!(
            map_sensor_error(&Opaque("read Timeout on ch1")),
            SensorError::Timeout
        );
        assert_eq!(
            map_trigger_error(&Opaque("operation timed out")),
            TriggerError::Timeout
        );
        assert_eq!(
            map_connect_error(&Opaque("no route to host")),
            ConnectionError::Unreachable("no route to host".into())
        );
    }

    #[test]
    fn string_fallback_detects_rejection() {
        assert!(matches!(
            map_trigger_error(&Opaque("save rejected by scope")),
            TriggerError::Rejected(_)
        ));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_errors_are_downcast() {
        use autopress_hardware::error::HwError;
        assert_eq!(
            map_sensor_error(&HwError::InvalidChannel(9)),
            SensorError::InvalidChannel(9)
        );
        assert_eq!(
            map_sensor_error(&HwError::DataReadyTimeout),
            SensorError::Timeout
        );
        assert!(matches!(
            map_trigger_error(&HwError::Rejected {
                code: -221,
                message: "Settings conflict".into()
            }),
            TriggerError::Rejected(m) if m.contains("-221")
        ));
        assert_eq!(map_connect_error(&HwError::Timeout), ConnectionError::Timeout);
    }
}
