use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;

pub const MAX_SENDS: usize = 3;
pub const SEND_WINDOW: Duration = Duration::from_secs(5);

/// Sliding-window limit on how many sends fit in the trailing window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max: usize,
    window: Duration,
    sent: VecDeque<Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MAX_SENDS, SEND_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            sent: VecDeque::with_capacity(max),
        }
    }

    /// Records a send at `now` unless the window is already full.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.sent.front() {
            if now.duration_since(oldest) < self.window {
                break;
            }
            self.sent.pop_front();
        }

        if self.sent.len() >= self.max {
            return false;
        }
        self.sent.push_back(now);
        true
    }
}

/// One [`RateLimiter`] per sender, for the server side.
#[derive(Debug, Clone, Default)]
pub struct KeyedRateLimiter {
    senders: Arc<Mutex<HashMap<String, RateLimiter>>>,
}

impl KeyedRateLimiter {
    pub fn try_acquire(&self, key: &str, now: Instant) -> bool {
        let mut senders = match self.senders.lock() {
            Ok(senders) => senders,
            Err(poisoned) => poisoned.into_inner(),
        };

        // drop senders whose whole window has passed
        if senders.len() > 1024 {
            senders.retain(|_, limiter| {
                limiter
                    .sent
                    .back()
                    .is_some_and(|last| now.duration_since(*last) < limiter.window)
            });
        }

        senders.entry(key.to_owned()).or_default().try_acquire(now)
    }
}
