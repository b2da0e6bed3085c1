use std::time::Duration;

use crate::Clock;

/// Two-sample debounce of a binary input.
///
/// A first sample that agrees with `previous` is trusted as-is. A disagreeing
/// sample is only trusted when a second sample taken after `settle` agrees with
/// it; otherwise the glitch is discarded and `previous` is kept.
pub fn debounced_sample<E>(
    mut sample: impl FnMut() -> Result<bool, E>,
    previous: bool,
    settle: Duration,
    clock: &impl Clock,
) -> Result<bool, E> {
    let first = sample()?;
    if first == previous {
        return Ok(previous);
    }
    clock.sleep(settle);
    let second = sample()?;
    Ok(if second == first { first } else { previous })
}
