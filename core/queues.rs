// Copyright 2026 the Kestrel authors. MIT license.

//! Thread-safe FIFO queues, plain and time-delayed.
//!
//! Shutdown is one-way: a shut-down queue rejects pushes and yields no
//! more items, but keeps whatever it already holds so the owner can still
//! [`drain`](ThreadSafeQueue::drain) and decide what to do with the
//! leftovers.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::clock::Clock;

/// Mutex-guarded FIFO of `T`.
pub struct ThreadSafeQueue<T> {
  items: Mutex<VecDeque<T>>,
  // len shadow so may_have_items stays an unsynchronized hint
  len_hint: AtomicUsize,
  shutdown: AtomicBool,
}

impl<T> Default for ThreadSafeQueue<T> {
  fn default() -> ThreadSafeQueue<T> {
    ThreadSafeQueue::new()
  }
}

impl<T> ThreadSafeQueue<T> {
  pub fn new() -> ThreadSafeQueue<T> {
    ThreadSafeQueue {
      items: Mutex::new(VecDeque::new()),
      len_hint: AtomicUsize::new(0),
      shutdown: AtomicBool::new(false),
    }
  }

  /// Appends an item. Returns false (dropping the item) once shut down.
  pub fn push(&self, item: T) -> bool {
    let mut items = self.items.lock();
    if self.is_shutdown() {
      return false;
    }
    items.push_back(item);
    self.len_hint.fetch_add(1, Ordering::Relaxed);
    true
  }

  /// Pops the head. Empty and shut-down queues both yield `None`; another
  /// consumer may also have raced the item away after a hint.
  pub fn get_next(&self) -> Option<T> {
    let mut items = self.items.lock();
    if self.is_shutdown() {
      return None;
    }
    let item = items.pop_front()?;
    self.len_hint.fetch_sub(1, Ordering::Relaxed);
    Some(item)
  }

  /// Removes and returns the first item matching the predicate, leaving
  /// everything before it in place. Used by depth-filtered consumers.
  pub fn take_first<F>(&self, mut predicate: F) -> Option<T>
  where
    F: FnMut(&T) -> bool,
  {
    let mut items = self.items.lock();
    if self.is_shutdown() {
      return None;
    }
    let index = items.iter().position(|item| predicate(item))?;
    let item = items.remove(index)?;
    self.len_hint.fetch_sub(1, Ordering::Relaxed);
    Some(item)
  }

  /// Unsynchronized hint that a dequeue may succeed.
  pub fn may_have_items(&self) -> bool {
    self.len_hint.load(Ordering::Relaxed) != 0
  }

  pub fn is_shutdown(&self) -> bool {
    self.shutdown.load(Ordering::Relaxed)
  }

  /// Stops all further pushes and dequeues. Contents are retained.
  pub fn shutdown(&self) {
    let _items = self.items.lock();
    self.shutdown.store(true, Ordering::Relaxed);
  }

  /// Removes and returns everything held, shut down or not.
  pub fn drain(&self) -> Vec<T> {
    let mut items = self.items.lock();
    self.len_hint.store(0, Ordering::Relaxed);
    items.drain(..).collect()
  }
}

// f64 deadlines keyed into an ordered map; deadlines are finite and
// non-negative so total_cmp gives the order we want.
#[derive(PartialEq, Clone, Copy)]
struct Deadline(f64);

impl Eq for Deadline {}

impl PartialOrd for Deadline {
  fn partial_cmp(&self, other: &Deadline) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Deadline {
  fn cmp(&self, other: &Deadline) -> std::cmp::Ordering {
    self.0.total_cmp(&other.0)
  }
}

type JobsReadyCallback = Arc<dyn Fn() + Send + Sync>;

/// FIFO plus a deadline-ordered side table. Items pushed with a delay stay
/// invisible until a [`process_delayed_queue`] observes their deadline,
/// at which point they are promoted to the FIFO tail in deadline order.
///
/// [`process_delayed_queue`]: DelayedQueue::process_delayed_queue
pub struct DelayedQueue<T> {
  queue: ThreadSafeQueue<T>,
  delayed: Mutex<BTreeMap<Deadline, VecDeque<T>>>,
  jobs_ready: Mutex<Option<JobsReadyCallback>>,
  clock: Clock,
}

impl<T> Default for DelayedQueue<T> {
  fn default() -> DelayedQueue<T> {
    DelayedQueue::new(Clock::monotonic())
  }
}

impl<T> DelayedQueue<T> {
  pub fn new(clock: Clock) -> DelayedQueue<T> {
    DelayedQueue {
      queue: ThreadSafeQueue::new(),
      delayed: Mutex::new(BTreeMap::new()),
      jobs_ready: Mutex::new(None),
      clock,
    }
  }

  /// Registers a callback invoked (with no locks held) after any drain
  /// cycle that promoted at least one delayed item.
  pub fn set_jobs_ready_callback(&self, callback: Option<JobsReadyCallback>) {
    *self.jobs_ready.lock() = callback;
  }

  pub fn push(&self, item: T) -> bool {
    self.queue.push(item)
  }

  /// Schedules an item to surface `delay_seconds` from now. Negative
  /// delays are a usage error: fatal in debug builds, clamped to zero
  /// (immediately ready) in release builds.
  pub fn push_delayed(&self, delay_seconds: f64, item: T) -> bool {
    debug_assert!(
      delay_seconds >= 0.0,
      "push_delayed called with negative delay {delay_seconds}"
    );
    let delay_seconds = if delay_seconds < 0.0 {
      log::warn!("clamping negative queue delay {delay_seconds} to 0");
      0.0
    } else {
      delay_seconds
    };
    let mut delayed = self.delayed.lock();
    if self.queue.is_shutdown() {
      return false;
    }
    let deadline = Deadline(self.clock.now_seconds() + delay_seconds);
    delayed.entry(deadline).or_default().push_back(item);
    true
  }

  /// Promotes every delayed item whose deadline has passed into the FIFO.
  /// The FIFO lock is taken per push, never while also holding the delayed
  /// lock's critical work, and the jobs-ready callback runs after both are
  /// released.
  pub fn process_delayed_queue(&self) {
    let mut promoted = false;
    {
      let mut delayed = self.delayed.lock();
      if self.queue.is_shutdown() {
        return;
      }
      let now = Deadline(self.clock.now_seconds());
      while let Some(entry) = delayed.first_entry() {
        if *entry.key() > now {
          break;
        }
        for item in entry.remove() {
          promoted = true;
          self.queue.push(item);
        }
      }
    }
    if promoted {
      let callback = self.jobs_ready.lock().clone();
      if let Some(callback) = callback {
        (*callback)();
      }
    }
  }

  pub fn get_next(&self) -> Option<T> {
    self.process_delayed_queue();
    self.queue.get_next()
  }

  /// See [`ThreadSafeQueue::take_first`]; ready delayed items are promoted
  /// first so they participate in the scan.
  pub fn take_first<F>(&self, predicate: F) -> Option<T>
  where
    F: FnMut(&T) -> bool,
  {
    self.process_delayed_queue();
    self.queue.take_first(predicate)
  }

  pub fn may_have_items(&self) -> bool {
    self.process_delayed_queue();
    self.queue.may_have_items()
  }

  /// Like [`may_have_items`](DelayedQueue::may_have_items) but without a
  /// promotion sweep. For consumers that leave promotion to a pump and
  /// must not re-enter the jobs-ready callback.
  pub fn may_have_ready_items(&self) -> bool {
    self.queue.may_have_items()
  }

  pub fn is_shutdown(&self) -> bool {
    self.queue.is_shutdown()
  }

  pub fn shutdown(&self) {
    let _delayed = self.delayed.lock();
    self.queue.shutdown();
  }

  /// Removes and returns everything held, ready and delayed alike.
  pub fn drain(&self) -> Vec<T> {
    // delayed lock first, matching the promotion path's lock order
    let mut delayed = self.delayed.lock();
    let mut items = self.queue.drain();
    for (_, mut bucket) in std::mem::take(&mut *delayed) {
      items.extend(bucket.drain(..));
    }
    items
  }

  pub fn clock(&self) -> &Clock {
    &self.clock
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;
  use crate::clock::ManualClock;

  #[test]
  fn fifo_preserves_order() {
    let queue = ThreadSafeQueue::new();
    for i in 0..5 {
      assert!(queue.push(i));
    }
    assert!(queue.may_have_items());
    for i in 0..5 {
      assert_eq!(queue.get_next(), Some(i));
    }
    assert_eq!(queue.get_next(), None);
    assert!(!queue.may_have_items());
  }

  #[test]
  fn interleaved_producers_keep_per_origin_order() {
    let queue = Arc::new(ThreadSafeQueue::new());
    let q1 = queue.clone();
    let q2 = queue.clone();
    let t1 = std::thread::spawn(move || {
      for item in ["A", "B", "C"] {
        q1.push(item);
      }
    });
    let t2 = std::thread::spawn(move || {
      for item in ["X", "Y", "Z"] {
        q2.push(item);
      }
    });
    t1.join().unwrap();
    t2.join().unwrap();

    let mut popped = Vec::new();
    while let Some(item) = queue.get_next() {
      popped.push(item);
    }
    assert_eq!(popped.len(), 6);
    let order_of = |wanted: [&str; 3]| -> Vec<usize> {
      wanted
        .iter()
        .map(|w| popped.iter().position(|p| p == w).unwrap())
        .collect()
    };
    let abc = order_of(["A", "B", "C"]);
    let xyz = order_of(["X", "Y", "Z"]);
    assert!(abc.windows(2).all(|w| w[0] < w[1]), "{popped:?}");
    assert!(xyz.windows(2).all(|w| w[0] < w[1]), "{popped:?}");
  }

  #[test]
  fn shutdown_rejects_pushes_but_retains_contents() {
    let queue = ThreadSafeQueue::new();
    queue.push(1);
    queue.push(2);
    queue.shutdown();
    assert!(!queue.push(3));
    assert_eq!(queue.get_next(), None);
    assert_eq!(queue.drain(), vec![1, 2]);
  }

  #[test]
  fn take_first_skips_without_reordering() {
    let queue = ThreadSafeQueue::new();
    for i in 1..=4 {
      queue.push(i);
    }
    assert_eq!(queue.take_first(|&i| i % 2 == 0), Some(2));
    assert_eq!(queue.get_next(), Some(1));
    assert_eq!(queue.get_next(), Some(3));
    assert_eq!(queue.get_next(), Some(4));
  }

  #[test]
  fn delayed_items_surface_in_deadline_order() {
    let manual = ManualClock::new(0.0);
    let queue = DelayedQueue::new(manual.clock());
    queue.push_delayed(4.0, "A");
    queue.push_delayed(6.0, "B");

    manual.set(3.0);
    assert_eq!(queue.get_next(), None);
    manual.set(5.0);
    assert_eq!(queue.get_next(), Some("A"));
    assert_eq!(queue.get_next(), None);
    manual.set(7.0);
    assert_eq!(queue.get_next(), Some("B"));
  }

  #[test]
  fn jobs_ready_fires_once_per_promoting_cycle() {
    let manual = ManualClock::new(0.0);
    let queue = DelayedQueue::new(manual.clock());
    let fired = Arc::new(AtomicUsize::new(0));
    let observed = fired.clone();
    queue.set_jobs_ready_callback(Some(Arc::new(move || {
      observed.fetch_add(1, Ordering::SeqCst);
    })));

    queue.push_delayed(1.0, 1);
    queue.push_delayed(1.5, 2);
    queue.process_delayed_queue();
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    manual.set(2.0);
    queue.process_delayed_queue();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // nothing left to promote, the callback stays quiet
    queue.process_delayed_queue();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn promoted_items_append_after_immediate_items() {
    let manual = ManualClock::new(0.0);
    let queue = DelayedQueue::new(manual.clock());
    queue.push_delayed(1.0, "delayed");
    queue.push("first");
    manual.set(2.0);
    queue.push("second");
    assert_eq!(queue.get_next(), Some("first"));
    assert_eq!(queue.get_next(), Some("second"));
    assert_eq!(queue.get_next(), Some("delayed"));
  }

  #[test]
  fn shutdown_freezes_delayed_side_too() {
    let manual = ManualClock::new(0.0);
    let queue = DelayedQueue::new(manual.clock());
    queue.push_delayed(1.0, 1);
    queue.shutdown();
    assert!(!queue.push_delayed(0.0, 2));
    manual.set(5.0);
    assert_eq!(queue.get_next(), None);
    assert_eq!(queue.drain(), vec![1]);
  }
}
