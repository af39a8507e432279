// Copyright 2026 the Kestrel authors. MIT license.

use std::sync::Arc;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic seconds since an unspecified process-local epoch.
pub fn monotonic_seconds() -> f64 {
  PROCESS_EPOCH.elapsed().as_secs_f64()
}

/// Wall-clock milliseconds since the unix epoch.
pub fn wall_clock_millis() -> f64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs_f64() * 1000.0)
    .unwrap_or(0.0)
}

/// Cloneable handle to a monotonic-seconds source. Queues and runners take
/// one at construction so tests can drive time explicitly instead of
/// sleeping.
#[derive(Clone)]
pub struct Clock {
  source: Arc<dyn Fn() -> f64 + Send + Sync>,
}

impl Clock {
  /// The production clock, backed by [`monotonic_seconds`].
  pub fn monotonic() -> Clock {
    Clock {
      source: Arc::new(monotonic_seconds),
    }
  }

  pub fn new<F>(source: F) -> Clock
  where
    F: Fn() -> f64 + Send + Sync + 'static,
  {
    Clock {
      source: Arc::new(source),
    }
  }

  pub fn now_seconds(&self) -> f64 {
    (*self.source)()
  }
}

impl Default for Clock {
  fn default() -> Clock {
    Clock::monotonic()
  }
}

/// A clock tests advance by hand.
#[derive(Clone, Default)]
pub struct ManualClock {
  now: Arc<Mutex<f64>>,
}

impl ManualClock {
  pub fn new(start: f64) -> ManualClock {
    ManualClock {
      now: Arc::new(Mutex::new(start)),
    }
  }

  pub fn set(&self, seconds: f64) {
    *self.now.lock() = seconds;
  }

  pub fn advance(&self, seconds: f64) {
    *self.now.lock() += seconds;
  }

  pub fn clock(&self) -> Clock {
    let now = self.now.clone();
    Clock::new(move || *now.lock())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn monotonic_never_decreases() {
    let a = monotonic_seconds();
    let b = monotonic_seconds();
    assert!(b >= a);
  }

  #[test]
  fn manual_clock_drives_a_clock_handle() {
    let manual = ManualClock::new(0.0);
    let clock = manual.clock();
    assert_eq!(clock.now_seconds(), 0.0);
    manual.advance(4.5);
    assert_eq!(clock.now_seconds(), 4.5);
    manual.set(2.0);
    assert_eq!(clock.now_seconds(), 2.0);
  }
}
