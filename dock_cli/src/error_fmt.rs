//! Human-readable error descriptions and structured JSON error formatting.

use dock_core::{DockError, QueueError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!(
            "What happened: The config file is not valid TOML ({}).\nLikely causes: A typo, a missing quote, or a value of the wrong type.\nHow to fix: Edit the config file, then rerun. See etc/dock_config.toml for a sample.",
            te.message()
        );
    }

    if let Some(qe) = err.downcast_ref::<QueueError>() {
        return format!(
            "What happened: The upload queue could not be used ({qe}).\nLikely causes: queue.dir is not writable or the flash is full.\nHow to fix: Check permissions and free space under queue.dir."
        );
    }

    if let Some(de) = err.downcast_ref::<DockError>() {
        return match de {
            DockError::HardwareFault(msg) => format!(
                "What happened: The station hardware rejected a request ({msg}).\nLikely causes: A port number outside the manifold or a miswired pin.\nHow to fix: Check station.port_count and the [pins] table."
            ),
            DockError::Hardware(msg) => format!(
                "What happened: A switch or output could not be read or driven ({msg}).\nLikely causes: Loose cable, missing GPIO permissions, or a transient bus glitch.\nHow to fix: Verify wiring and that the process may access GPIO, then rerun self-check."
            ),
            DockError::Timeout => "What happened: Services did not go quiet within the drain budget.\nLikely causes: A long upload or a stuck hardware read.\nHow to fix: Raise drain.retries or drain.retry_ms and check the logs for the busy service.".to_string(),
            DockError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("catalog csv must have headers") {
        return "Invalid headers in cylinder catalog CSV. Expected 'part_number,factory_id,gas_code,concentration_ppm'.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML. Original: {msg}"
        );
    }

    if lower.contains("must") && (lower.contains("station.") || lower.contains("pins.")) {
        return format!(
            "What happened: Configuration is invalid or incomplete ({msg}).\nLikely causes: Missing [station] values or per-port [pins] lists of the wrong length.\nHow to fix: Edit the TOML config and try again."
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

/// Stable exit codes per failure class; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<toml::de::Error>().is_some() {
        return 2;
    }
    if err.downcast_ref::<QueueError>().is_some() {
        return 4;
    }
    match err.downcast_ref::<DockError>() {
        Some(DockError::Config(_)) => 2,
        Some(DockError::Hardware(_) | DockError::HardwareFault(_)) => 3,
        Some(DockError::Queue(_)) => 4,
        Some(DockError::Timeout) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<toml::de::Error>().is_some() {
        return "Config";
    }
    if err.downcast_ref::<QueueError>().is_some() {
        return "Queue";
    }
    err.downcast_ref::<DockError>()
        .map_or("Error", DockError::kind)
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
