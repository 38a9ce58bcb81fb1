//! Human-readable elapsed-time labels for progress rendering.

use std::time::Duration;

/// Render elapsed time as `Time: Ns` below a minute and `Time: Mmin Ss` above.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("Time: {secs}s")
    } else {
        format!("Time: {}min {}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_a_minute_shows_seconds_only() {
        assert_eq!(format_elapsed(Duration::from_secs(59)), "Time: 59s");
        assert_eq!(format_elapsed(Duration::from_millis(900)), "Time: 0s");
    }

    #[test]
    fn over_a_minute_shows_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(65)), "Time: 1min 5s");
        assert_eq!(format_elapsed(Duration::from_secs(60)), "Time: 1min 0s");
        assert_eq!(format_elapsed(Duration::from_secs(3_725)), "Time: 62min 5s");
    }
}
