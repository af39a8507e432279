// Copyright 2026 the Kestrel authors. MIT license.

//! Per-isolate foreground task runner and the worker-backed variant.
//!
//! The foreground runner only stores tasks; the isolate's thread drives
//! it by popping and running them, bracketing each run in a
//! [`TaskRunScope`] so nesting depth is tracked across re-entrant pumps.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use kestrel_core::clock::Clock;
use kestrel_core::pools::DelayedWorkerPool;
use kestrel_core::queues::ThreadSafeQueue;
use kestrel_core::threads::ThreadPriority;

use crate::engine::BoxedIdleTask;
use crate::engine::BoxedTask;
use crate::engine::ForegroundRunner;
use crate::nestable_queue::NestableQueue;

/// Task queues for one isolate's foreground thread: a nestable lane for
/// general tasks, a delayed lane inside it, and a separate idle lane.
pub struct TaskRunner {
  tasks: NestableQueue,
  idle_tasks: ThreadSafeQueue<BoxedIdleTask>,
  nesting_depth: AtomicI32,
  stopped: AtomicBool,
}

impl Default for TaskRunner {
  fn default() -> TaskRunner {
    TaskRunner::new(Clock::monotonic())
  }
}

impl TaskRunner {
  pub fn new(clock: Clock) -> TaskRunner {
    TaskRunner {
      tasks: NestableQueue::new(clock),
      idle_tasks: ThreadSafeQueue::new(),
      nesting_depth: AtomicI32::new(0),
      stopped: AtomicBool::new(false),
    }
  }

  pub fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::Acquire)
  }

  pub fn nesting_depth(&self) -> i32 {
    self.nesting_depth.load(Ordering::Acquire)
  }

  /// Pops the next task eligible at the current nesting depth. Ready
  /// delayed tasks are promoted first.
  pub fn pop_task(&self) -> Option<BoxedTask> {
    if self.is_stopped() {
      return None;
    }
    self.tasks.get_next(self.nesting_depth())
  }

  /// Pops an idle task; the caller picks the deadline it runs with.
  pub fn pop_idle_task(&self) -> Option<BoxedIdleTask> {
    if self.is_stopped() {
      return None;
    }
    self.idle_tasks.get_next()
  }

  /// Promotes delayed tasks whose deadline has passed into the general
  /// lane.
  pub fn process_delayed_tasks(&self) {
    if self.is_stopped() {
      return;
    }
    self.tasks.process_delayed_queue();
  }

  /// Latches the stopped flag and drains all three lanes. Posts and pops
  /// after this are dropped.
  pub fn shutdown(&self) {
    self.stopped.store(true, Ordering::Release);
    self.tasks.shutdown();
    self.tasks.drain();
    self.idle_tasks.shutdown();
    drop(self.idle_tasks.drain());
  }
}

impl ForegroundRunner for TaskRunner {
  fn post_task(&self, task: BoxedTask) {
    if self.is_stopped() {
      return;
    }
    self.tasks.push_item(task);
  }

  fn post_non_nestable_task(&self, task: BoxedTask) {
    if self.is_stopped() {
      return;
    }
    self.tasks.push_non_nestable_item(task);
  }

  fn post_delayed_task(&self, task: BoxedTask, delay_seconds: f64) {
    if self.is_stopped() {
      return;
    }
    self.tasks.push_item_delayed(delay_seconds, task);
  }

  fn post_non_nestable_delayed_task(
    &self,
    task: BoxedTask,
    delay_seconds: f64,
  ) {
    if self.is_stopped() {
      return;
    }
    self.tasks.push_non_nestable_item_delayed(delay_seconds, task);
  }

  fn post_idle_task(&self, task: BoxedIdleTask) {
    if self.is_stopped() {
      return;
    }
    self.idle_tasks.push(task);
  }

  fn idle_tasks_enabled(&self) -> bool {
    true
  }

  fn non_nestable_tasks_enabled(&self) -> bool {
    true
  }

  fn non_nestable_delayed_tasks_enabled(&self) -> bool {
    true
  }
}

/// Stack-scoped nesting marker. Depth goes up when the scope is entered
/// and back down when it is dropped, on every exit path including
/// unwinds. Depth must never go negative; an underflow is a bug in the
/// pump loop.
pub struct TaskRunScope {
  runner: Arc<TaskRunner>,
}

impl TaskRunScope {
  pub fn new(runner: Arc<TaskRunner>) -> TaskRunScope {
    let previous = runner.nesting_depth.fetch_add(1, Ordering::AcqRel);
    debug_assert!(previous >= 0, "nesting depth was negative");
    TaskRunScope { runner }
  }
}

impl Drop for TaskRunScope {
  fn drop(&mut self) {
    let previous = self.runner.nesting_depth.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(previous > 0, "nesting depth underflow");
  }
}

/// Task-runner surface over a delayed worker pool, for engine work that
/// does not need the isolate's thread. Only the plain and delayed post
/// shapes exist here; non-nestable and idle posts are a usage error and
/// are dropped in release builds.
pub struct WorkerTaskRunner {
  pool: DelayedWorkerPool,
}

impl WorkerTaskRunner {
  pub fn new(workers: i32, priority: ThreadPriority) -> WorkerTaskRunner {
    WorkerTaskRunner {
      pool: DelayedWorkerPool::new(workers, priority),
    }
  }

  pub fn with_clock(
    workers: i32,
    priority: ThreadPriority,
    clock: Clock,
  ) -> WorkerTaskRunner {
    WorkerTaskRunner {
      pool: DelayedWorkerPool::with_clock(workers, priority, clock),
    }
  }

  pub fn is_terminated(&self) -> bool {
    self.pool.is_exiting()
  }

  pub fn shutdown(&self) {
    self.pool.shutdown();
  }
}

impl ForegroundRunner for WorkerTaskRunner {
  fn post_task(&self, mut task: BoxedTask) {
    self.pool.post_task(Box::new(move || task.run()));
  }

  fn post_non_nestable_task(&self, _task: BoxedTask) {
    debug_assert!(false, "worker runners do not support non-nestable tasks");
    log::error!("dropping non-nestable task posted to a worker runner");
  }

  fn post_delayed_task(&self, mut task: BoxedTask, delay_seconds: f64) {
    self
      .pool
      .post_delayed_task(delay_seconds, Box::new(move || task.run()));
  }

  fn post_non_nestable_delayed_task(
    &self,
    _task: BoxedTask,
    _delay_seconds: f64,
  ) {
    debug_assert!(false, "worker runners do not support non-nestable tasks");
    log::error!("dropping non-nestable task posted to a worker runner");
  }

  fn post_idle_task(&self, _task: BoxedIdleTask) {
    debug_assert!(false, "worker runners do not support idle tasks");
    log::error!("dropping idle task posted to a worker runner");
  }

  fn idle_tasks_enabled(&self) -> bool {
    false
  }

  fn non_nestable_tasks_enabled(&self) -> bool {
    false
  }

  fn non_nestable_delayed_tasks_enabled(&self) -> bool {
    false
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicI32;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;
  use std::time::Instant;

  use kestrel_core::clock::ManualClock;
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::engine::IdleTask;
  use crate::engine::Task;

  struct MarkerTask {
    slot: Arc<AtomicI32>,
    value: i32,
  }

  impl Task for MarkerTask {
    fn run(&mut self) {
      self.slot.store(self.value, Ordering::SeqCst);
    }
  }

  struct MarkerIdleTask {
    slot: Arc<AtomicI32>,
    deadline_seen: Arc<AtomicI32>,
  }

  impl IdleTask for MarkerIdleTask {
    fn run(&mut self, deadline_seconds: f64) {
      self.slot.store(1, Ordering::SeqCst);
      self
        .deadline_seen
        .store(deadline_seconds as i32, Ordering::SeqCst);
    }
  }

  fn marker(slot: &Arc<AtomicI32>, value: i32) -> BoxedTask {
    Box::new(MarkerTask {
      slot: slot.clone(),
      value,
    })
  }

  #[test]
  fn reports_engine_facing_flags() {
    let runner = TaskRunner::default();
    assert!(runner.idle_tasks_enabled());
    assert!(runner.non_nestable_tasks_enabled());
    assert!(runner.non_nestable_delayed_tasks_enabled());
    assert!(!runner.is_stopped());
    assert_eq!(runner.nesting_depth(), 0);
  }

  #[test]
  fn posts_pop_in_fifo_order() {
    let runner = TaskRunner::default();
    let slot = Arc::new(AtomicI32::new(0));
    runner.post_task(marker(&slot, 1));
    runner.post_task(marker(&slot, 2));

    runner.pop_task().unwrap().run();
    assert_eq!(slot.load(Ordering::SeqCst), 1);
    runner.pop_task().unwrap().run();
    assert_eq!(slot.load(Ordering::SeqCst), 2);
    assert!(runner.pop_task().is_none());
  }

  #[test]
  fn nesting_depth_gates_non_nestable_tasks() {
    let runner = Arc::new(TaskRunner::default());
    let slot = Arc::new(AtomicI32::new(0));
    runner.post_non_nestable_task(marker(&slot, 1));
    runner.post_task(marker(&slot, 2));

    {
      let _scope = TaskRunScope::new(runner.clone());
      assert_eq!(runner.nesting_depth(), 1);
      // nested: the non-nestable head is skipped
      runner.pop_task().unwrap().run();
      assert_eq!(slot.load(Ordering::SeqCst), 2);
      assert!(runner.pop_task().is_none());
    }
    assert_eq!(runner.nesting_depth(), 0);
    runner.pop_task().unwrap().run();
    assert_eq!(slot.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn scope_restores_depth_across_unwinds() {
    let runner = Arc::new(TaskRunner::default());
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
      let _scope = TaskRunScope::new(runner.clone());
      assert_eq!(runner.nesting_depth(), 1);
      panic!("task blew up");
    }));
    assert!(result.is_err());
    assert_eq!(runner.nesting_depth(), 0);
  }

  #[test]
  fn delayed_tasks_promote_on_the_test_clock() {
    let manual = ManualClock::new(0.0);
    let runner = TaskRunner::new(manual.clock());
    let slot = Arc::new(AtomicI32::new(0));
    runner.post_delayed_task(marker(&slot, 1), 4.0);
    runner.post_non_nestable_delayed_task(marker(&slot, 2), 6.0);

    runner.process_delayed_tasks();
    assert!(runner.pop_task().is_none());

    manual.set(5.0);
    runner.process_delayed_tasks();
    runner.pop_task().unwrap().run();
    assert_eq!(slot.load(Ordering::SeqCst), 1);

    manual.set(7.0);
    runner.pop_task().unwrap().run();
    assert_eq!(slot.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn idle_tasks_use_their_own_lane() {
    let runner = TaskRunner::default();
    let slot = Arc::new(AtomicI32::new(0));
    let deadline_seen = Arc::new(AtomicI32::new(0));
    runner.post_idle_task(Box::new(MarkerIdleTask {
      slot: slot.clone(),
      deadline_seen: deadline_seen.clone(),
    }));

    assert!(runner.pop_task().is_none());
    let mut idle = runner.pop_idle_task().unwrap();
    idle.run(12.0);
    assert_eq!(slot.load(Ordering::SeqCst), 1);
    assert_eq!(deadline_seen.load(Ordering::SeqCst), 12);
  }

  #[test]
  fn shutdown_drains_every_lane_and_drops_late_posts() {
    let runner = TaskRunner::default();
    let slot = Arc::new(AtomicI32::new(0));
    runner.post_task(marker(&slot, 1));
    runner.post_delayed_task(marker(&slot, 2), 60.0);
    runner.post_idle_task(Box::new(MarkerIdleTask {
      slot: slot.clone(),
      deadline_seen: Arc::new(AtomicI32::new(0)),
    }));

    runner.shutdown();
    assert!(runner.is_stopped());
    assert!(runner.pop_task().is_none());
    assert!(runner.pop_idle_task().is_none());

    runner.post_task(marker(&slot, 3));
    assert!(runner.pop_task().is_none());
    assert_eq!(slot.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn worker_runner_executes_on_the_pool() {
    let manual = ManualClock::new(0.0);
    let runner =
      WorkerTaskRunner::with_clock(2, ThreadPriority::Default, manual.clock());
    assert!(!runner.is_terminated());
    assert!(!runner.idle_tasks_enabled());
    assert!(!runner.non_nestable_tasks_enabled());
    assert!(!runner.non_nestable_delayed_tasks_enabled());

    let ran = Arc::new(AtomicUsize::new(0));
    struct CountTask {
      ran: Arc<AtomicUsize>,
      amount: usize,
    }
    impl Task for CountTask {
      fn run(&mut self) {
        self.ran.fetch_add(self.amount, Ordering::SeqCst);
      }
    }

    runner.post_task(Box::new(CountTask {
      ran: ran.clone(),
      amount: 1,
    }));
    runner.post_delayed_task(
      Box::new(CountTask {
        ran: ran.clone(),
        amount: 100,
      }),
      4.0,
    );

    let deadline = Instant::now() + Duration::from_secs(5);
    while ran.load(Ordering::SeqCst) != 1 {
      assert!(Instant::now() < deadline, "immediate task never ran");
      std::thread::sleep(Duration::from_millis(5));
    }
    manual.set(6.0);
    while ran.load(Ordering::SeqCst) != 101 {
      assert!(Instant::now() < deadline, "delayed task never ran");
      std::thread::sleep(Duration::from_millis(5));
    }

    runner.shutdown();
    assert!(runner.is_terminated());
    // dropped silently after shutdown
    runner.post_task(Box::new(CountTask {
      ran: ran.clone(),
      amount: 1,
    }));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ran.load(Ordering::SeqCst), 101);
  }
}
