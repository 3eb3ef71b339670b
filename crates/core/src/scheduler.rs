//! The background housekeeping loop that drives sampling and cycling.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

/// Fixed-period deadline tracker.
///
/// A tick that fires late schedules the next one a full period after the
/// late tick rather than replaying the missed ones back to back.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub(crate) fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next: now + period,
        }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.next
    }

    /// Whether the tick is due at `now`; advances the deadline if so.
    pub(crate) fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.period;
        if self.next <= now {
            self.next = now + self.period;
        }
        true
    }
}

/// Work run by the loop. Both callbacks execute on the loop's thread, one at
/// a time, so they never race each other.
pub(crate) trait Housekeeping {
    fn sample(&self);
    fn cycle(&self);
}

/// Run until `stop` receives a message or its sender is dropped.
pub(crate) fn run<H: Housekeeping>(
    work: &H,
    trigger_interval: Duration,
    cycle_interval: Duration,
    stop: &Receiver<()>,
) {
    let now = Instant::now();
    let mut trigger = Ticker::new(trigger_interval, now);
    let mut cycle = Ticker::new(cycle_interval, now);

    loop {
        let now = Instant::now();
        if trigger.poll(now) {
            work.sample();
        }
        if cycle.poll(now) {
            work.cycle();
        }

        let deadline = trigger.deadline().min(cycle.deadline());
        match stop.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
