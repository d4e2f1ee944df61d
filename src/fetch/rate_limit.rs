use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct WindowState {
    window_start: Instant,
    issued: u32,
}

/// Fixed-window request throttle shared by all fetch workers.
///
/// At most `limit` acquisitions succeed per window; further callers suspend
/// until the window rolls over. Window boundaries advance on the clock, not
/// on request arrival, so unevenly spaced calls cannot drift the window.
pub struct RateLimiter {
    limit: u32,
    period: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_period(requests_per_minute, Duration::from_secs(60))
    }

    /// Custom window length, mainly for tests.
    pub fn with_period(limit: u32, period: Duration) -> Self {
        Self {
            limit: limit.max(1),
            period,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                issued: 0,
            }),
        }
    }

    /// Suspends until issuing one more request stays within the ceiling for
    /// the current window, then consumes a slot.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                while now.duration_since(state.window_start) >= self.period {
                    state.window_start += self.period;
                    state.issued = 0;
                }

                if state.issued < self.limit {
                    state.issued += 1;
                    return;
                }

                // Window is full; sleep outside the lock until it rolls over.
                self.period - now.duration_since(state.window_start)
            };

            tokio::time::sleep(wait).await;
        }
    }
}
