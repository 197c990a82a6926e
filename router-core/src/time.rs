//! Monotonic time as seen by the data plane.
//!
//! `now()` is one of the external collaborator primitives ([PURPOSE & SCOPE]): the core
//! only ever asks "how many seconds have elapsed", never the wall clock. Abstracting it
//! behind a trait lets tests fast-forward time instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> u64;
}

/// The real clock: monotonic seconds since the clock was constructed.
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.epoch.elapsed().as_secs()
    }
}

/// A clock a test can advance deterministically without sleeping.
#[derive(Debug, Default)]
pub struct TestClock {
    seconds: AtomicU64,
}

impl TestClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, secs: u64) {
        self.seconds.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.seconds.store(secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> u64 {
        self.seconds.load(Ordering::SeqCst)
    }
}
