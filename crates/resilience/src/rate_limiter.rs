use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter. `acquire` sleeps until a slot opens up
/// instead of rejecting.
pub struct RateLimiter {
    max_calls: usize,
    time_window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, time_window: Duration) -> Self {
        Self {
            max_calls,
            time_window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until a call slot is available and records the call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while let Some(&front) = calls.front() {
                    if now.duration_since(front) >= self.time_window {
                        calls.pop_front();
                    } else {
                        break;
                    }
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                // Oldest call ages out of the window first.
                let front = *calls.front().unwrap_or(&now);
                self.time_window
                    .saturating_sub(now.duration_since(front))
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// How many call slots are currently recorded within the window.
    pub async fn in_flight(&self) -> usize {
        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        while let Some(&front) = calls.front() {
            if now.duration_since(front) >= self.time_window {
                calls.pop_front();
            } else {
                break;
            }
        }
        calls.len()
    }
}
