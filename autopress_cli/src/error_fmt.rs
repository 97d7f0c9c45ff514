//! Human-readable error descriptions and structured JSON error formatting.

use autopress_core::error::{
    AutopressError, BuildError, ConnectionError, SensorError, TriggerError,
};

fn describe(e: &AutopressError) -> String {
    match e {
        AutopressError::Sensor(SensorError::Timeout) => {
            "What happened: ADC read timed out.\nLikely causes: ADC Pi not powered, wrong I2C address, or read timeout too low.\nHow to fix: Check sensor.adc_address_1/2 against `i2cdetect -y 1` and consider raising sensor.read_timeout_ms.".to_string()
        }
        AutopressError::Sensor(SensorError::InvalidChannel(ch)) => format!(
            "What happened: ADC channel {ch} does not exist.\nLikely causes: sensor.channel or --channel outside 1..=8.\nHow to fix: Pick the input the gauge is wired to (1..=8)."
        ),
        AutopressError::Sensor(SensorError::Bus(msg)) => format!(
            "What happened: I2C bus error ({msg}).\nLikely causes: Loose wiring, I2C disabled, or missing permissions on /dev/i2c-1.\nHow to fix: Enable I2C (raspi-config), check wiring, and run as a user in the i2c group."
        ),
        AutopressError::Connection(ConnectionError::Timeout) => {
            "What happened: The oscilloscope did not answer in time.\nLikely causes: Wrong address, instrument busy, or a firewall dropping packets.\nHow to fix: Verify instrument.address, ping the instrument, and raise instrument.connect_timeout_ms if the link is slow.".to_string()
        }
        AutopressError::Connection(ConnectionError::Unreachable(msg)) => format!(
            "What happened: Could not reach the oscilloscope ({msg}).\nLikely causes: Instrument off, wrong address/port, or remote control over LAN disabled.\nHow to fix: Check instrument.address and instrument.port (raw SCPI socket, 5025 by default)."
        ),
        AutopressError::Connection(ConnectionError::Identify(msg)) => format!(
            "What happened: The instrument did not identify itself ({msg}).\nLikely causes: Another service is listening on that port.\nHow to fix: Point instrument.port at the SCPI raw socket."
        ),
        AutopressError::Trigger(TriggerError::Rejected(msg)) => format!(
            "What happened: The oscilloscope rejected the save ({msg}).\nLikely causes: Save directory does not exist or export settings are unsupported.\nHow to fix: Create instrument.save_dir on the instrument, or adjust instrument.export_setup."
        ),
        AutopressError::Config(msg) => format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or on the command line.\nHow to fix: Edit the config file or pass the value as a flag (e.g. --setpoint, --address), then rerun."
        ),
        other => format!(
            "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        ),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor | BuildError::MissingConnector => format!(
                "What happened: {be}.\nLikely causes: Hardware failed to initialize before the loop was assembled.\nHow to fix: Check the earlier log lines for the hardware error."
            ),
            BuildError::MissingConfig => "What happened: No run configuration was provided.\nLikely causes: Internal wiring error.\nHow to fix: Report a bug.".to_string(),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ae) = err.downcast_ref::<AutopressError>() {
        return describe(ae);
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open adc pi") {
        return "What happened: Failed to open the ADC Pi on the I2C bus.\nLikely causes: I2C disabled, wrong addresses, or insufficient permissions.\nHow to fix: Enable I2C, confirm addresses with `i2cdetect -y 1`, and check sensor.adc_address_1/2.".to_string();
    }

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'voltage,pressure_mbar'.".to_string();
    }

    if lower.contains("parse config") || lower.contains("must be") {
        let cause = err.root_cause().to_string();
        return format!(
            "What happened: Configuration is invalid ({cause}).\nLikely causes: A typo or out-of-range value in the TOML.\nHow to fix: Edit the config file and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 when the instrument cannot be reached, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(AutopressError::Connection(_)) = err.downcast_ref::<AutopressError>() {
        return 3;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<AutopressError>() {
        Some(AutopressError::Sensor(_)) => "Sensor",
        Some(AutopressError::Conversion(_)) => "Conversion",
        Some(AutopressError::Connection(_)) => "Connection",
        Some(AutopressError::Trigger(_)) => "Trigger",
        Some(AutopressError::Config(_)) => "Config",
        Some(AutopressError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": reason_name(err),
        "error": err.to_string(),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_exit_with_three() {
        let err = eyre::Report::new(AutopressError::Connection(ConnectionError::Unreachable(
            "refused".into(),
        )));
        assert_eq!(exit_code_for_error(&err), 3);
        assert!(humanize(&err).contains("instrument.port"));
    }

    #[test]
    fn json_carries_reason() {
        let err = eyre::Report::new(AutopressError::Config("band.setpoint_mbar is required".into()));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).expect("json");
        assert_eq!(v["reason"], "Config");
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
