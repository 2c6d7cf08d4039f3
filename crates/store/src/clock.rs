//! Server-side commit clock.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Hands out strictly increasing commit times in microseconds since the epoch.
///
/// Wall-clock time is used when it moves forward; otherwise the previous value
/// is bumped by one so two writes never share a timestamp.
#[derive(Debug, Default)]
pub struct ServerClock {
    last: AtomicI64,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_micros(&self) -> i64 {
        let wall = Utc::now().timestamp_micros();
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(previous + 1);
            match self
                .last
                .compare_exchange(previous, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }
}
