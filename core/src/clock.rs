//! Engine clock: the single source of "now".
//!
//! RULE: Nothing in the engine reads wall-clock time directly.
//! Due dates, review dates and filing deadlines are all derived
//! from the instant returned by the injected clock.

use crate::types::Timestamp;
use chrono::{Duration, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time. Used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A manually advanced clock. Used in tests and batch replays.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(start: Timestamp) -> Self {
        Self { current: Mutex::new(start) }
    }

    pub fn set(&self, at: Timestamp) {
        if let Ok(mut current) = self.current.lock() {
            *current = at;
        }
    }

    /// Move the clock forward. Returns the new instant.
    pub fn advance(&self, by: Duration) -> Timestamp {
        match self.current.lock() {
            Ok(mut current) => {
                *current += by;
                *current
            }
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
