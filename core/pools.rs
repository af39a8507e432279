// Copyright 2026 the Kestrel authors. MIT license.

//! Worker thread pools draining the thread-safe queues.
//!
//! Both pools spin their workers up eagerly; workers sleep on a condvar
//! until shut down or work may be available. The delayed pool adds a pump
//! thread that owns promotion of due items and a `paused` switch that
//! gates dequeueing without blocking posters.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::queues::DelayedQueue;
use crate::queues::ThreadSafeQueue;
use crate::threads;
use crate::threads::ThreadPriority;

/// Unit of pool work.
pub type PoolTask = Box<dyn FnOnce() + Send + 'static>;

// How long the pump thread sleeps between promotion sweeps when nothing
// wakes it sooner.
const PUMP_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn clamp_worker_count(requested: i32) -> usize {
  let cores = threads::hardware_cores();
  if requested < 0 {
    cores
  } else {
    (requested as usize).clamp(1, cores)
  }
}

struct PoolShared {
  queue: ThreadSafeQueue<PoolTask>,
  exit: AtomicBool,
  lock: Mutex<()>,
  waiter: Condvar,
}

impl PoolShared {
  fn process_tasks(&self) {
    loop {
      {
        let mut guard = self.lock.lock();
        self.waiter.wait_while(&mut guard, |_| {
          !self.exit.load(Ordering::Acquire) && !self.queue.may_have_items()
        });
      }
      if self.exit.load(Ordering::Acquire) {
        return;
      }
      // run the task outside the condvar lock; a false wake just re-waits
      if let Some(task) = self.queue.get_next() {
        task();
      }
    }
  }
}

/// Fixed-size pool of workers running posted tasks in FIFO order.
pub struct WorkerPool {
  shared: Arc<PoolShared>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  num_workers: usize,
  priority: ThreadPriority,
}

impl WorkerPool {
  /// A negative worker count requests one worker per hardware core; other
  /// values are clamped to `1..=hardware_cores()`.
  pub fn new(requested_workers: i32, priority: ThreadPriority) -> WorkerPool {
    let num_workers = clamp_worker_count(requested_workers);
    let shared = Arc::new(PoolShared {
      queue: ThreadSafeQueue::new(),
      exit: AtomicBool::new(false),
      lock: Mutex::new(()),
      waiter: Condvar::new(),
    });
    let mut workers = Vec::with_capacity(num_workers);
    for index in 0..num_workers {
      let shared = shared.clone();
      let handle = threads::spawn_named(
        &format!("kestrel-wkr-{index}"),
        priority,
        move || shared.process_tasks(),
      )
      .expect("failed to spawn pool worker");
      workers.push(handle);
    }
    WorkerPool {
      shared,
      workers: Mutex::new(workers),
      num_workers,
      priority,
    }
  }

  pub fn number_of_workers(&self) -> usize {
    self.num_workers
  }

  pub fn priority(&self) -> ThreadPriority {
    self.priority
  }

  pub fn is_exiting(&self) -> bool {
    self.shared.exit.load(Ordering::Acquire)
  }

  /// Posts a task. Returns false (dropping the task) once shut down.
  pub fn post_task(&self, task: PoolTask) -> bool {
    if self.is_exiting() {
      return false;
    }
    if !self.shared.queue.push(task) {
      return false;
    }
    // taking the condvar mutex fences out workers mid-way into a wait
    drop(self.shared.lock.lock());
    self.shared.waiter.notify_one();
    true
  }

  /// Stops accepting work, drops queued tasks, and joins every worker.
  /// A running task finishes before its worker exits.
  pub fn shutdown(&self) {
    if self.shared.exit.swap(true, Ordering::AcqRel) {
      return;
    }
    self.shared.queue.shutdown();
    drop(self.shared.queue.drain());
    drop(self.shared.lock.lock());
    self.shared.waiter.notify_all();
    for worker in self.workers.lock().drain(..) {
      let _ = worker.join();
    }
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    self.shutdown();
  }
}

struct DelayedPoolShared {
  queue: DelayedQueue<PoolTask>,
  exit: AtomicBool,
  paused: AtomicBool,
  lock: Mutex<()>,
  waiter: Condvar,
  pump_lock: Mutex<()>,
  pump_waiter: Condvar,
}

impl DelayedPoolShared {
  fn process_tasks(&self) {
    loop {
      {
        let mut guard = self.lock.lock();
        // promotion belongs to the pump; peeking at the ready lane here
        // keeps the jobs-ready callback from re-entering this mutex
        self.waiter.wait_while(&mut guard, |_| {
          !self.exit.load(Ordering::Acquire)
            && (self.paused.load(Ordering::Acquire)
              || !self.queue.may_have_ready_items())
        });
      }
      if self.exit.load(Ordering::Acquire) {
        return;
      }
      if self.paused.load(Ordering::Acquire) {
        continue;
      }
      if let Some(task) = self.queue.get_next() {
        task();
      }
    }
  }

  fn pump_queue(&self) {
    loop {
      {
        let mut guard = self.pump_lock.lock();
        let _ = self
          .pump_waiter
          .wait_for(&mut guard, PUMP_POLL_INTERVAL);
      }
      if self.exit.load(Ordering::Acquire) {
        return;
      }
      self.queue.process_delayed_queue();
      drop(self.lock.lock());
      self.waiter.notify_all();
    }
  }
}

/// [`WorkerPool`] variant whose queue understands delays. A dedicated pump
/// thread promotes due items; `paused` gates the workers while leaving the
/// posting side open.
pub struct DelayedWorkerPool {
  shared: Arc<DelayedPoolShared>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  num_workers: usize,
  priority: ThreadPriority,
}

impl DelayedWorkerPool {
  pub fn new(
    requested_workers: i32,
    priority: ThreadPriority,
  ) -> DelayedWorkerPool {
    DelayedWorkerPool::with_clock(
      requested_workers,
      priority,
      Clock::monotonic(),
    )
  }

  pub fn with_clock(
    requested_workers: i32,
    priority: ThreadPriority,
    clock: Clock,
  ) -> DelayedWorkerPool {
    let num_workers = clamp_worker_count(requested_workers);
    let shared = Arc::new(DelayedPoolShared {
      queue: DelayedQueue::new(clock),
      exit: AtomicBool::new(false),
      paused: AtomicBool::new(false),
      lock: Mutex::new(()),
      waiter: Condvar::new(),
      pump_lock: Mutex::new(()),
      pump_waiter: Condvar::new(),
    });
    {
      let ready_target = Arc::downgrade(&shared);
      shared.queue.set_jobs_ready_callback(Some(Arc::new(move || {
        if let Some(shared) = ready_target.upgrade() {
          drop(shared.lock.lock());
          shared.waiter.notify_all();
        }
      })));
    }
    let mut workers = Vec::with_capacity(num_workers + 1);
    for index in 0..num_workers {
      let shared = shared.clone();
      let handle = threads::spawn_named(
        &format!("kestrel-dwkr-{index}"),
        priority,
        move || shared.process_tasks(),
      )
      .expect("failed to spawn pool worker");
      workers.push(handle);
    }
    {
      let shared = shared.clone();
      let handle =
        threads::spawn_named("kestrel-pump", priority, move || {
          shared.pump_queue()
        })
        .expect("failed to spawn pump thread");
      workers.push(handle);
    }
    DelayedWorkerPool {
      shared,
      workers: Mutex::new(workers),
      num_workers,
      priority,
    }
  }

  pub fn number_of_workers(&self) -> usize {
    self.num_workers
  }

  pub fn priority(&self) -> ThreadPriority {
    self.priority
  }

  pub fn is_exiting(&self) -> bool {
    self.shared.exit.load(Ordering::Acquire)
  }

  pub fn post_task(&self, task: PoolTask) -> bool {
    if self.is_exiting() {
      return false;
    }
    if !self.shared.queue.push(task) {
      return false;
    }
    drop(self.shared.lock.lock());
    self.shared.waiter.notify_one();
    true
  }

  /// Posts a task that surfaces after `delay_seconds`. Negative delays are
  /// a usage error, handled as in [`DelayedQueue::push_delayed`].
  pub fn post_delayed_task(&self, delay_seconds: f64, task: PoolTask) -> bool {
    if self.is_exiting() {
      return false;
    }
    if !self.shared.queue.push_delayed(delay_seconds, task) {
      return false;
    }
    drop(self.shared.pump_lock.lock());
    self.shared.pump_waiter.notify_one();
    true
  }

  /// Gates worker dequeueing. Posting continues regardless. Returns the
  /// previous state.
  pub fn set_paused(&self, paused: bool) -> bool {
    let previous = self.shared.paused.swap(paused, Ordering::AcqRel);
    if !paused {
      drop(self.shared.lock.lock());
      self.shared.waiter.notify_all();
    }
    previous
  }

  pub fn shutdown(&self) {
    if self.shared.exit.swap(true, Ordering::AcqRel) {
      return;
    }
    self.shared.queue.shutdown();
    drop(self.shared.queue.drain());
    drop(self.shared.lock.lock());
    drop(self.shared.pump_lock.lock());
    self.shared.waiter.notify_all();
    self.shared.pump_waiter.notify_all();
    for worker in self.workers.lock().drain(..) {
      let _ = worker.join();
    }
  }
}

impl Drop for DelayedWorkerPool {
  fn drop(&mut self) {
    self.shutdown();
  }
}

// Process-wide pool for host work that is not tied to the platform
// adapter. Re-initialization after shutdown is permitted.
static GLOBAL_POOL: Lazy<RwLock<Option<Arc<WorkerPool>>>> =
  Lazy::new(|| RwLock::new(None));

/// Creates the global pool if it does not exist and returns it; an already
/// initialized pool is returned untouched.
pub fn initialize_global_pool(requested_workers: i32) -> Arc<WorkerPool> {
  let mut slot = GLOBAL_POOL.write();
  if let Some(pool) = slot.as_ref() {
    return pool.clone();
  }
  let pool = Arc::new(WorkerPool::new(
    requested_workers,
    ThreadPriority::BestEffort,
  ));
  *slot = Some(pool.clone());
  pool
}

pub fn global_pool() -> Option<Arc<WorkerPool>> {
  GLOBAL_POOL.read().clone()
}

/// Shuts the global pool down and releases it. Outstanding `Arc`s keep the
/// (now inert) pool alive until they drop.
pub fn shutdown_global_pool() {
  let pool = GLOBAL_POOL.write().take();
  if let Some(pool) = pool {
    pool.shutdown();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;
  use std::sync::mpsc;
  use std::time::Instant;

  use super::*;
  use crate::clock::ManualClock;

  fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
      assert!(Instant::now() < deadline, "timed out waiting for {what}");
      std::thread::sleep(Duration::from_millis(5));
    }
  }

  #[test]
  fn clamps_worker_counts() {
    let cores = threads::hardware_cores();
    assert_eq!(
      WorkerPool::new(-1, ThreadPriority::Default).number_of_workers(),
      cores
    );
    assert_eq!(
      WorkerPool::new(0, ThreadPriority::Default).number_of_workers(),
      1
    );
    assert_eq!(
      WorkerPool::new(i32::MAX, ThreadPriority::Default).number_of_workers(),
      cores
    );
  }

  #[test]
  fn runs_posted_tasks() {
    let pool = WorkerPool::new(2, ThreadPriority::BestEffort);
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..16 {
      let counter = counter.clone();
      assert!(pool.post_task(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
      })));
    }
    wait_for("all tasks", || counter.load(Ordering::SeqCst) == 16);
  }

  #[test]
  fn shutdown_joins_workers_and_drops_late_posts() {
    let pool = WorkerPool::new(2, ThreadPriority::Default);
    let started = Arc::new(AtomicUsize::new(0));
    let observed = started.clone();
    let (tx, rx) = mpsc::channel();
    assert!(pool.post_task(Box::new(move || {
      observed.fetch_add(1, Ordering::SeqCst);
      std::thread::sleep(Duration::from_millis(50));
      tx.send(()).unwrap();
    })));
    wait_for("task start", || started.load(Ordering::SeqCst) == 1);

    pool.shutdown();
    // the running task completed before shutdown returned
    rx.try_recv().expect("task should have finished during shutdown");
    assert!(pool.is_exiting());
    assert!(!pool.post_task(Box::new(|| panic!("must not run"))));
    // second shutdown is a no-op
    pool.shutdown();
  }

  #[test]
  fn delayed_pool_waits_for_the_deadline() {
    let manual = ManualClock::new(0.0);
    let pool =
      DelayedWorkerPool::with_clock(2, ThreadPriority::Default, manual.clock());
    let ran = Arc::new(AtomicUsize::new(0));

    let immediate = ran.clone();
    pool.post_task(Box::new(move || {
      immediate.fetch_add(1, Ordering::SeqCst);
    }));
    let delayed = ran.clone();
    pool.post_delayed_task(
      4.0,
      Box::new(move || {
        delayed.fetch_add(100, Ordering::SeqCst);
      }),
    );

    wait_for("immediate task", || ran.load(Ordering::SeqCst) == 1);
    // pump has had cycles but time has not advanced
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    manual.set(6.0);
    wait_for("delayed task", || ran.load(Ordering::SeqCst) == 101);
    pool.shutdown();
  }

  #[test]
  fn paused_pool_keeps_accepting_but_not_running() {
    let pool = DelayedWorkerPool::new(1, ThreadPriority::Default);
    assert!(!pool.set_paused(true));
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    assert!(pool.post_task(Box::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    })));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(pool.set_paused(false));
    wait_for("unpaused task", || ran.load(Ordering::SeqCst) == 1);
    pool.shutdown();
  }

  #[test]
  fn global_pool_lifecycle_allows_reinit() {
    let first = initialize_global_pool(1);
    let again = initialize_global_pool(4);
    assert!(Arc::ptr_eq(&first, &again));
    assert!(global_pool().is_some());

    shutdown_global_pool();
    assert!(global_pool().is_none());
    assert!(first.is_exiting());

    let second = initialize_global_pool(1);
    assert!(!Arc::ptr_eq(&first, &second));
    shutdown_global_pool();
  }
}
