//! Wall-clock helpers

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in seconds, as a float.
///
/// Timestamps stored on AppWrappers and carbon snapshots are plain Unix
/// seconds so they serialize as numbers on the wire.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_recent() {
        // Anything after 2020-01-01 counts as sane here.
        assert!(unix_now() > 1_577_836_800.0);
    }

    #[test]
    fn test_unix_now_monotone_enough() {
        let a = unix_now();
        let b = unix_now();
        assert!(b >= a);
    }
}
