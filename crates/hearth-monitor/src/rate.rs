//! Incremental throughput calculation from cumulative byte counters.

use std::time::Instant;

/// Send/receive rates in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rates {
    pub sent_bps: u64,
    pub recv_bps: u64,
}

/// Converts monotonically increasing byte counters into throughput.
///
/// Keeps the previous reading and its wall-clock instant; rates use the
/// actually elapsed time between invocations, not an assumed interval.
/// Must have exactly one caller at a time.
pub struct RateTracker {
    prev: Option<Reading>,
}

struct Reading {
    sent: u64,
    recv: u64,
    at: Instant,
}

impl RateTracker {
    /// Creates a tracker with no previous reading.
    pub fn new() -> Self {
        Self { prev: None }
    }

    /// Records a counter reading and returns the rates since the previous one.
    ///
    /// The first call yields zero rates by definition. A counter that moved
    /// backwards (reset, wrap) contributes a zero delta for that reading.
    pub fn update(&mut self, sent: u64, recv: u64, at: Instant) -> Rates {
        let rates = match &self.prev {
            None => Rates::default(),
            Some(prev) => {
                let elapsed = at.saturating_duration_since(prev.at).as_secs_f64();
                if elapsed > 0.0 {
                    Rates {
                        sent_bps: (sent.saturating_sub(prev.sent) as f64 / elapsed) as u64,
                        recv_bps: (recv.saturating_sub(prev.recv) as f64 / elapsed) as u64,
                    }
                } else {
                    Rates::default()
                }
            }
        };

        self.prev = Some(Reading { sent, recv, at });
        rates
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}
