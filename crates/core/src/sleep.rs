use std::thread;
use std::time::{Duration, Instant};

use crate::state::SharedState;

const STOP_POLL: Duration = Duration::from_millis(50);

/// What is left of `period` after `elapsed`; zero once the period is used up.
pub fn remainder(elapsed: Duration, period: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Sleep out the rest of a tick that began at `started`. Returns the time slept.
pub fn sleep_remainder(started: Instant, period: Duration) -> Duration {
    let rest = remainder(started.elapsed(), period);
    if !rest.is_zero() {
        thread::sleep(rest);
    }
    rest
}

/// Sleep for `d` in short slices, returning early (false) once a stop is requested.
pub fn sleep_unless_stopped(d: Duration, state: &SharedState) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if state.stop_requested() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_never_negative() {
        let period = Duration::from_millis(33);
        assert_eq!(remainder(Duration::from_millis(10), period), Duration::from_millis(23));
        assert_eq!(remainder(Duration::from_millis(50), period), Duration::ZERO);
    }

    #[test]
    fn stopped_sleep_returns_early() {
        let (state, _w) = SharedState::new();
        state.request_stop();
        let started = Instant::now();
        assert!(!sleep_unless_stopped(Duration::from_secs(5), &state));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
