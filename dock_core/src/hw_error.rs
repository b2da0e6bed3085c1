//! Maps `Box<dyn Error>` from trait boundaries to typed `DockError`.
//!
//! The traits in `dock_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `dock_hardware::HwError` downcasting, and
//! classifies a failed sample as retryable or fatal.

use crate::error::DockError;

/// Result of one hardware sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome<T> {
    Ok(T),
    /// Transient glitch; sample again on the next cycle.
    Retryable(DockError),
    /// The device is not usable; escalate.
    Fatal(DockError),
}

impl<T> SampleOutcome<T> {
    pub fn from_result(r: Result<T, Box<dyn std::error::Error + Send + Sync>>) -> Self {
        match r {
            Ok(v) => SampleOutcome::Ok(v),
            Err(e) => {
                let mapped = map_hw_error(e.as_ref());
                if is_retryable(&mapped) {
                    SampleOutcome::Retryable(mapped)
                } else {
                    SampleOutcome::Fatal(mapped)
                }
            }
        }
    }
}

/// Timeouts and generic read glitches are expected under CPU load.
pub fn is_retryable(e: &DockError) -> bool {
    matches!(e, DockError::Timeout | DockError::Hardware(_))
}

/// Map a trait-boundary error to a typed `DockError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DockError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<dock_hardware::error::HwError>() {
            return match hw {
                dock_hardware::error::HwError::Timeout => DockError::Timeout,
                dock_hardware::error::HwError::Simulated(msg) => DockError::Hardware(msg.clone()),
                other => DockError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        DockError::Timeout
    } else {
        DockError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_retryable() {
        let r: Result<bool, Box<dyn std::error::Error + Send + Sync>> =
            Err("switch read timeout".into());
        assert!(matches!(
            SampleOutcome::from_result(r),
            SampleOutcome::Retryable(DockError::Timeout)
        ));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn invalid_port_is_fatal() {
        let r: Result<bool, Box<dyn std::error::Error + Send + Sync>> =
            Err(Box::new(dock_hardware::error::HwError::InvalidPort(9)));
        assert!(matches!(
            SampleOutcome::from_result(r),
            SampleOutcome::Fatal(DockError::HardwareFault(_))
        ));
    }
}
