use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tprofile_protocol::Timestamp;

/// Wall-clock timestamps that never go backwards.
///
/// The wall-clock time is read once, at construction; every later reading is
/// that origin plus monotonic elapsed time. History ordering is therefore
/// immune to system clock adjustments while timestamps remain comparable with
/// UNIX-epoch times supplied by callers.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin_wall: Timestamp,
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        let origin_wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        Self {
            origin_wall,
            origin: Instant::now(),
        }
    }

    /// Seconds since the UNIX epoch.
    pub fn now(&self) -> Timestamp {
        self.origin_wall + self.origin.elapsed().as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_and_close_to_wall_clock() {
        let clock = Clock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);

        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        assert!((wall - b).abs() < 5.0);
    }
}
