//! Debounced persistence of reading progress.
//!
//! The tracker owns at most one pending deadline. Every change pushes the
//! deadline out, so a burst of scroll events produces a single write once the
//! reader pauses. `flush` is the only way a payload leaves the tracker and is
//! safe to call from both the timer path and teardown: a second call with
//! nothing new to write returns `None`.

use std::time::{Duration, Instant};

use log::trace;

use crate::progress::{ProgressPayload, ReadingProgress};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub struct ProgressTracker {
    debounce: Duration,
    current: Option<ProgressPayload>,
    last_written: Option<ProgressPayload>,
    deadline: Option<Instant>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl ProgressTracker {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            current: None,
            last_written: None,
            deadline: None,
        }
    }

    /// Seeds the tracker with what the store already holds.
    pub fn seed(&mut self, payload: ProgressPayload) {
        self.current = Some(payload.clone());
        self.last_written = Some(payload);
        self.deadline = None;
    }

    pub fn update(&mut self, progress: &ReadingProgress, now: Instant) -> bool {
        self.update_payload(progress.to_payload(), now)
    }

    /// Records a new position. Returns true when it differs from the last
    /// recorded one.
    pub fn update_payload(&mut self, payload: ProgressPayload, now: Instant) -> bool {
        if self.current.as_ref() == Some(&payload) {
            return false;
        }
        trace!("Progress now {} ({:.4})", payload.position, payload.progress);
        self.current = Some(payload);
        if self.is_dirty() {
            self.deadline = Some(now + self.debounce);
        } else {
            self.deadline = None;
        }
        true
    }

    /// Returns a payload to write once the debounce deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<ProgressPayload> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.flush(),
            _ => None,
        }
    }

    pub fn flush(&mut self) -> Option<ProgressPayload> {
        self.deadline = None;
        if !self.is_dirty() {
            return None;
        }
        self.last_written = self.current.clone();
        self.current.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.current.is_some() && self.current != self.last_written
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn current(&self) -> Option<&ProgressPayload> {
        self.current.as_ref()
    }
}
