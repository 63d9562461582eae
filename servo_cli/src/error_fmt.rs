//! Human-readable error descriptions and structured JSON error formatting.

use servo_core::error::{BuildError, ContractViolation, ServoError};

fn find_servo_error(err: &eyre::Report) -> Option<&ServoError> {
    err.chain().find_map(|e| e.downcast_ref::<ServoError>())
}

fn find_build_error(err: &eyre::Report) -> Option<&BuildError> {
    err.chain().find_map(|e| e.downcast_ref::<BuildError>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = find_build_error(err) {
        return match be {
            BuildError::MissingSource | BuildError::MissingLink | BuildError::MissingGainSink => {
                format!(
                    "What happened: The servo was built without a front-end ({be}).\nLikely causes: A simulator failed to initialize or was not passed to the builder.\nHow to fix: Report this; the CLI always wires the simulated front-ends."
                )
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Inconsistent widths or timing values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/servo_config.toml for a sample."
            ),
        };
    }

    if let Some(se) = find_servo_error(err) {
        return match se {
            ServoError::CycleLimit(limit) => format!(
                "What happened: The run exceeded its cycle limit of {limit} cycles.\nLikely causes: --max-cycles or servo.cycle_limit is lower than the pass length.\nHow to fix: Check `servo timing` and raise the limit above the reported pass cycles."
            ),
            ServoError::HardwareFault(msg) | ServoError::Hardware(msg) => format!(
                "What happened: A front-end reported an error ({msg}).\nLikely causes: The output link framing does not match the receiver, or a channel group exceeded the ADC.\nHow to fix: Check output.word_width, filter.output_word and acquisition.channel_count."
            ),
            ServoError::Contract(v) => {
                let hint = match v {
                    ContractViolation::InjectWhileRunning
                    | ContractViolation::ReconfigureWhileRunning
                    | ContractViolation::StartWhileRunning => {
                        "Only change state, coefficients, profiles or gains between passes."
                    }
                    _ => "This is a sequencing bug in the servo; re-run with --log-level=trace and report it.",
                };
                format!(
                    "What happened: Contract violation ({v}).\nLikely causes: An operation was issued while the loop or a component was busy.\nHow to fix: {hint}"
                )
            }
            ServoError::OutOfRange { what, index, limit } => format!(
                "What happened: {what} {index} is out of range (limit {limit}).\nLikely causes: A [[channel]], [[coefficients]] or [[state]] entry, or a --set-state argument, names a channel or profile that does not exist.\nHow to fix: Keep channels below acquisition.channel_count and profiles below filter.profile_count."
            ),
            ServoError::ValueWidth { what, value, width } => format!(
                "What happened: {what} value {value} does not fit in {width} signed bits.\nLikely causes: A coefficient or seeded state is wider than its bus.\nHow to fix: Reduce the value or widen the matching [filter] width."
            ),
            ServoError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: A malformed value in the TOML or on the command line.\nHow to fix: Correct the value and rerun."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = format!("{err:#}").to_ascii_lowercase();

    if lower.contains("coefficient csv must have headers") {
        return format!(
            "Invalid headers in coefficient CSV. Expected '{}'.",
            servo_config::COEFFICIENT_HEADERS.join(",")
        );
    }

    if lower.contains("read config file") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config pointing at a readable TOML file. Original: {err:#}"
        );
    }

    if lower.contains("parse config toml") {
        return format!(
            "What happened: The config file is not valid TOML for this servo.\nLikely causes: A typo in a section or key, or a value of the wrong type.\nHow to fix: Compare with etc/servo_config.toml. Original: {err:#}"
        );
    }

    if lower.contains(" must ") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: {msg}.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.chain().nth(1) {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind; anything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match find_servo_error(err) {
        Some(ServoError::CycleLimit(_)) => 3,
        Some(ServoError::Hardware(_) | ServoError::HardwareFault(_)) => 4,
        Some(ServoError::Contract(_)) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if find_build_error(err).is_some() {
        return "InvalidConfig";
    }
    match find_servo_error(err) {
        Some(ServoError::CycleLimit(_)) => "CycleLimit",
        Some(ServoError::Hardware(_)) => "Hardware",
        Some(ServoError::HardwareFault(_)) => "HardwareFault",
        Some(ServoError::Contract(_)) => "ContractViolation",
        Some(ServoError::OutOfRange { .. }) => "OutOfRange",
        Some(ServoError::ValueWidth { .. }) => "ValueWidth",
        Some(ServoError::Config(_)) => "InvalidConfig",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let reason = reason_name(err);
    let v = match find_servo_error(err) {
        Some(ServoError::CycleLimit(limit)) => {
            json!({ "reason": reason, "details": { "cycle_limit": limit }, "message": msg })
        }
        Some(ServoError::OutOfRange { what, index, limit }) => json!({
            "reason": reason,
            "details": { "what": what, "index": index, "limit": limit },
            "message": msg,
        }),
        _ => json!({ "reason": reason, "message": msg }),
    };
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn cycle_limit_is_explained_and_coded() {
        let err = Err::<(), _>(ServoError::CycleLimit(500))
            .wrap_err("running servo")
            .unwrap_err();
        assert!(humanize(&err).contains("cycle limit of 500"));
        assert_eq!(exit_code_for_error(&err), 3);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "CycleLimit");
        assert_eq!(v["details"]["cycle_limit"], 500);
    }

    #[test]
    fn build_errors_map_to_invalid_config() {
        let err = eyre::Report::new(BuildError::InvalidConfig("lane_count must be >= 1"));
        assert!(humanize(&err).contains("lane_count must be >= 1"));
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(format_error_json(&err).contains("InvalidConfig"));
    }

    #[test]
    fn contract_violations_get_their_own_code() {
        let err = eyre::Report::new(ServoError::Contract(ContractViolation::InjectWhileRunning));
        assert_eq!(exit_code_for_error(&err), 5);
        assert!(humanize(&err).contains("between passes"));
    }

    #[test]
    fn untyped_errors_fall_back() {
        let err = eyre::eyre!("acquisition.lane_count must be >= 1");
        assert!(humanize(&err).contains("Configuration is invalid"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Error");
        assert!(v.get("details").is_none());
    }
}
