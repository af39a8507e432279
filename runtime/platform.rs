// Copyright 2026 the Kestrel authors. MIT license.

//! The platform adapter: the singleton through which the engine schedules
//! work on the host.
//!
//! Lifecycle is initialize/shutdown with re-initialization permitted; a
//! second initialize while live returns the existing adapter. The
//! allocator and tracing setters only accept writes while the platform is
//! initialized, and never accept a `None`, so the engine cannot observe
//! platform state mutating mid-run.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use kestrel_core::clock;
use kestrel_core::clock::Clock;
use kestrel_core::pools::DelayedWorkerPool;
use kestrel_core::pools::WorkerPool;
use kestrel_core::threads;
use kestrel_core::threads::ThreadPriority;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::engine::BlockingType;
use crate::engine::BoxedTask;
use crate::engine::DefaultTracingController;
use crate::engine::DefaultZoneBackingAllocator;
use crate::engine::ForegroundRunner;
use crate::engine::HighAllocationThroughputObserver;
use crate::engine::IsolateHelper;
use crate::engine::IsolateId;
use crate::engine::JobTask;
use crate::engine::PageAllocator;
use crate::engine::TaskPriority;
use crate::engine::ThreadIsolatedAllocator;
use crate::engine::TracingController;
use crate::engine::ZoneBackingAllocator;
use crate::jobs::JobHandle;

static PLATFORM: Lazy<RwLock<Option<Arc<Platform>>>> =
  Lazy::new(|| RwLock::new(None));
static PLATFORM_INITED: AtomicBool = AtomicBool::new(false);

/// Scope the engine enters around operations that may block the thread.
/// The host has no special handling for these, so none is ever returned.
pub struct BlockingScope;

pub struct Platform {
  worker_pool: Arc<WorkerPool>,
  delayed_pool: DelayedWorkerPool,
  isolate_helper: Arc<dyn IsolateHelper>,
  clock: Clock,
  tracing_controller: RwLock<Arc<dyn TracingController>>,
  page_allocator: RwLock<Option<Arc<dyn PageAllocator>>>,
  thread_isolated_allocator: RwLock<Option<Arc<dyn ThreadIsolatedAllocator>>>,
  zone_backing_allocator: RwLock<Arc<dyn ZoneBackingAllocator>>,
  high_allocation_observer:
    RwLock<Option<Arc<dyn HighAllocationThroughputObserver>>>,
}

impl Platform {
  /// Builds an adapter that is not installed as the singleton. The
  /// singleton path is [`initialize`]; standalone construction exists for
  /// embedders running more than one engine build in-process and for
  /// tests.
  pub fn new(isolate_helper: Arc<dyn IsolateHelper>) -> Platform {
    Platform::with_clock(isolate_helper, Clock::monotonic())
  }

  pub fn with_clock(
    isolate_helper: Arc<dyn IsolateHelper>,
    clock: Clock,
  ) -> Platform {
    Platform {
      worker_pool: Arc::new(WorkerPool::new(-1, ThreadPriority::Default)),
      delayed_pool: DelayedWorkerPool::with_clock(
        -1,
        ThreadPriority::Default,
        clock.clone(),
      ),
      isolate_helper,
      clock,
      tracing_controller: RwLock::new(Arc::new(DefaultTracingController)),
      page_allocator: RwLock::new(None),
      thread_isolated_allocator: RwLock::new(None),
      zone_backing_allocator: RwLock::new(Arc::new(
        DefaultZoneBackingAllocator,
      )),
      high_allocation_observer: RwLock::new(None),
    }
  }

  // scheduling surface

  pub fn number_of_worker_threads(&self) -> usize {
    threads::hardware_cores()
  }

  pub fn get_foreground_task_runner(
    &self,
    isolate: IsolateId,
    priority: TaskPriority,
  ) -> Arc<dyn ForegroundRunner> {
    self.isolate_helper.foreground_runner(isolate, priority)
  }

  pub fn idle_tasks_enabled(&self, isolate: IsolateId) -> bool {
    self.isolate_helper.idle_tasks_enabled(isolate)
  }

  pub fn call_on_worker_thread(&self, mut task: BoxedTask) -> bool {
    self.worker_pool.post_task(Box::new(move || task.run()))
  }

  pub fn call_blocking_task_on_worker_thread(&self, task: BoxedTask) -> bool {
    self.call_on_worker_thread(task)
  }

  pub fn call_low_priority_task_on_worker_thread(
    &self,
    task: BoxedTask,
  ) -> bool {
    self.call_on_worker_thread(task)
  }

  pub fn call_delayed_on_worker_thread(
    &self,
    mut task: BoxedTask,
    delay_seconds: f64,
  ) -> bool {
    self
      .delayed_pool
      .post_delayed_task(delay_seconds, Box::new(move || task.run()))
  }

  /// Creates a job and immediately allows it to run. Job contributions
  /// share the worker pool regardless of the requested priority.
  pub fn post_job(
    &self,
    _priority: TaskPriority,
    job_task: Arc<dyn JobTask>,
  ) -> JobHandle {
    JobHandle::new(job_task, self.job_post_fn(), false)
  }

  /// Creates a job in the paused state; it runs nothing until its
  /// handle's `notify_concurrency_increase` is called.
  pub fn create_job(
    &self,
    _priority: TaskPriority,
    job_task: Arc<dyn JobTask>,
  ) -> JobHandle {
    JobHandle::new(job_task, self.job_post_fn(), true)
  }

  fn job_post_fn(
    &self,
  ) -> Arc<dyn Fn(kestrel_core::pools::PoolTask) -> bool + Send + Sync> {
    let pool = self.worker_pool.clone();
    Arc::new(move |task| pool.post_task(task))
  }

  pub fn monotonically_increasing_time(&self) -> f64 {
    self.clock.now_seconds()
  }

  pub fn current_clock_time_milliseconds(&self) -> f64 {
    clock::wall_clock_millis()
  }

  pub fn create_blocking_scope(
    &self,
    _blocking_type: BlockingType,
  ) -> Option<BlockingScope> {
    None
  }

  pub fn stack_trace_printer(&self) -> Option<fn()> {
    None
  }

  // priority mapping

  pub fn task_priority_to_thread_priority(
    priority: TaskPriority,
  ) -> ThreadPriority {
    match priority {
      TaskPriority::BestEffort => ThreadPriority::BestEffort,
      TaskPriority::UserVisible => ThreadPriority::UserVisible,
      TaskPriority::UserBlocking => ThreadPriority::UserBlocking,
    }
  }

  pub fn int_to_priority(value: i32) -> ThreadPriority {
    match value {
      0 => ThreadPriority::Default,
      1 => ThreadPriority::BestEffort,
      2 => ThreadPriority::UserVisible,
      3 => ThreadPriority::UserBlocking,
      _ => ThreadPriority::BestEffort,
    }
  }

  pub fn priority_to_int(priority: TaskPriority) -> i32 {
    match priority {
      TaskPriority::BestEffort => 1,
      TaskPriority::UserVisible => 2,
      TaskPriority::UserBlocking => 3,
    }
  }

  // allocator and tracing seams; writes only land on an inited platform
  // and a None never lands at all

  pub fn tracing_controller(&self) -> Arc<dyn TracingController> {
    self.tracing_controller.read().clone()
  }

  pub fn set_tracing_controller(
    &self,
    controller: Option<Arc<dyn TracingController>>,
  ) {
    let Some(controller) = controller else {
      return;
    };
    if !is_initialized() {
      return;
    }
    *self.tracing_controller.write() = controller;
  }

  pub fn page_allocator(&self) -> Option<Arc<dyn PageAllocator>> {
    self.page_allocator.read().clone()
  }

  pub fn set_page_allocator(
    &self,
    allocator: Option<Arc<dyn PageAllocator>>,
  ) {
    let Some(allocator) = allocator else {
      return;
    };
    if !is_initialized() {
      return;
    }
    *self.page_allocator.write() = Some(allocator);
  }

  pub fn thread_isolated_allocator(
    &self,
  ) -> Option<Arc<dyn ThreadIsolatedAllocator>> {
    self.thread_isolated_allocator.read().clone()
  }

  pub fn set_thread_isolated_allocator(
    &self,
    allocator: Option<Arc<dyn ThreadIsolatedAllocator>>,
  ) {
    let Some(allocator) = allocator else {
      return;
    };
    if !is_initialized() {
      return;
    }
    *self.thread_isolated_allocator.write() = Some(allocator);
  }

  pub fn zone_backing_allocator(&self) -> Arc<dyn ZoneBackingAllocator> {
    self.zone_backing_allocator.read().clone()
  }

  pub fn set_zone_backing_allocator(
    &self,
    allocator: Option<Arc<dyn ZoneBackingAllocator>>,
  ) {
    let Some(allocator) = allocator else {
      return;
    };
    if !is_initialized() {
      return;
    }
    *self.zone_backing_allocator.write() = allocator;
  }

  pub fn high_allocation_throughput_observer(
    &self,
  ) -> Option<Arc<dyn HighAllocationThroughputObserver>> {
    self.high_allocation_observer.read().clone()
  }

  pub fn set_high_allocation_throughput_observer(
    &self,
    observer: Option<Arc<dyn HighAllocationThroughputObserver>>,
  ) {
    let Some(observer) = observer else {
      return;
    };
    if !is_initialized() {
      return;
    }
    *self.high_allocation_observer.write() = Some(observer);
  }

  fn shutdown_pools(&self) {
    self.worker_pool.shutdown();
    self.delayed_pool.shutdown();
  }
}

/// Creates the platform singleton, or returns the existing one on a
/// double initialize. Re-initialization after [`shutdown`] builds a fresh
/// adapter.
pub fn initialize(isolate_helper: Arc<dyn IsolateHelper>) -> Arc<Platform> {
  let mut slot = PLATFORM.write();
  if let Some(platform) = slot.as_ref() {
    return platform.clone();
  }
  let platform = Arc::new(Platform::new(isolate_helper));
  *slot = Some(platform.clone());
  PLATFORM_INITED.store(true, Ordering::Release);
  platform
}

pub fn get() -> Option<Arc<Platform>> {
  PLATFORM.read().clone()
}

pub fn is_initialized() -> bool {
  PLATFORM_INITED.load(Ordering::Acquire)
}

/// Tears the singleton down, joining its pool workers. Tasks posted after
/// this are dropped by whoever still holds the old `Arc`.
pub fn shutdown() {
  let platform = PLATFORM.write().take();
  PLATFORM_INITED.store(false, Ordering::Release);
  if let Some(platform) = platform {
    platform.shutdown_pools();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;
  use std::time::Instant;

  use kestrel_core::clock::ManualClock;
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::engine::Task;
  use crate::task_runner::TaskRunner;

  struct TestHelper {
    runner: Arc<TaskRunner>,
  }

  impl IsolateHelper for TestHelper {
    fn foreground_runner(
      &self,
      _isolate: IsolateId,
      _priority: TaskPriority,
    ) -> Arc<dyn ForegroundRunner> {
      self.runner.clone()
    }

    fn idle_tasks_enabled(&self, _isolate: IsolateId) -> bool {
      true
    }
  }

  fn test_helper() -> Arc<TestHelper> {
    Arc::new(TestHelper {
      runner: Arc::new(TaskRunner::default()),
    })
  }

  struct CountTask {
    counter: Arc<AtomicUsize>,
    amount: usize,
  }

  impl Task for CountTask {
    fn run(&mut self) {
      self.counter.fetch_add(self.amount, Ordering::SeqCst);
    }
  }

  fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
      assert!(Instant::now() < deadline, "timed out waiting for {what}");
      std::thread::sleep(Duration::from_millis(5));
    }
  }

  #[test]
  fn priority_mappings() {
    assert_eq!(Platform::int_to_priority(0), ThreadPriority::Default);
    assert_eq!(Platform::int_to_priority(1), ThreadPriority::BestEffort);
    assert_eq!(Platform::int_to_priority(2), ThreadPriority::UserVisible);
    assert_eq!(Platform::int_to_priority(3), ThreadPriority::UserBlocking);
    assert_eq!(Platform::int_to_priority(42), ThreadPriority::BestEffort);
    assert_eq!(Platform::int_to_priority(-1), ThreadPriority::BestEffort);

    assert_eq!(Platform::priority_to_int(TaskPriority::BestEffort), 1);
    assert_eq!(Platform::priority_to_int(TaskPriority::UserVisible), 2);
    assert_eq!(Platform::priority_to_int(TaskPriority::UserBlocking), 3);

    assert_eq!(
      Platform::task_priority_to_thread_priority(TaskPriority::UserBlocking),
      ThreadPriority::UserBlocking
    );
  }

  #[test]
  fn adapter_surface_without_the_singleton() {
    let platform = Platform::new(test_helper());
    assert_eq!(
      platform.number_of_worker_threads(),
      threads::hardware_cores()
    );
    assert!(platform.create_blocking_scope(BlockingType::MayBlock).is_none());
    assert!(platform.stack_trace_printer().is_none());
    assert!(platform.page_allocator().is_none());
    assert!(platform.idle_tasks_enabled(IsolateId(1)));

    let before = platform.monotonically_increasing_time();
    let after = platform.monotonically_increasing_time();
    assert!(after >= before);
    assert!(platform.current_clock_time_milliseconds() > 0.0);
    platform.shutdown_pools();
  }

  #[test]
  fn worker_dispatch_runs_engine_tasks() {
    let manual = ManualClock::new(0.0);
    let platform = Platform::with_clock(test_helper(), manual.clock());
    let counter = Arc::new(AtomicUsize::new(0));

    assert!(platform.call_on_worker_thread(Box::new(CountTask {
      counter: counter.clone(),
      amount: 1,
    })));
    assert!(platform.call_blocking_task_on_worker_thread(Box::new(
      CountTask {
        counter: counter.clone(),
        amount: 10,
      }
    )));
    assert!(platform.call_low_priority_task_on_worker_thread(Box::new(
      CountTask {
        counter: counter.clone(),
        amount: 100,
      }
    )));
    wait_until("immediate tasks", || counter.load(Ordering::SeqCst) == 111);

    assert!(platform.call_delayed_on_worker_thread(
      Box::new(CountTask {
        counter: counter.clone(),
        amount: 1000,
      }),
      5.0,
    ));
    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(counter.load(Ordering::SeqCst), 111);
    manual.set(6.0);
    wait_until("delayed task", || counter.load(Ordering::SeqCst) == 1111);
    platform.shutdown_pools();
  }

  // the singleton lifecycle and the inited-gated setters share global
  // state, so they live in one test
  #[test]
  fn singleton_lifecycle_and_setter_gating() {
    struct TestController;
    impl TracingController for TestController {}

    // before any initialize: writes are dropped
    let standalone = Platform::new(test_helper());
    assert!(!is_initialized());
    let controller: Arc<dyn TracingController> = Arc::new(TestController);
    standalone.set_tracing_controller(Some(controller.clone()));
    let default = standalone.tracing_controller();
    assert!(!Arc::ptr_eq(&default, &controller));

    let first = initialize(test_helper());
    assert!(is_initialized());
    let again = initialize(test_helper());
    assert!(Arc::ptr_eq(&first, &again));
    assert!(get().is_some());

    // inited: a real write lands, a None write is dropped
    first.set_tracing_controller(Some(controller.clone()));
    assert!(Arc::ptr_eq(&first.tracing_controller(), &controller));
    first.set_tracing_controller(None);
    assert!(Arc::ptr_eq(&first.tracing_controller(), &controller));

    struct TestZoneAllocator;
    impl ZoneBackingAllocator for TestZoneAllocator {}
    let zone: Arc<dyn ZoneBackingAllocator> = Arc::new(TestZoneAllocator);
    first.set_zone_backing_allocator(Some(zone.clone()));
    assert!(Arc::ptr_eq(&first.zone_backing_allocator(), &zone));

    shutdown();
    assert!(!is_initialized());
    assert!(get().is_none());

    // writes are dropped again after shutdown
    let held = first.clone();
    struct OtherController;
    impl TracingController for OtherController {}
    held.set_tracing_controller(Some(Arc::new(OtherController)));
    assert!(Arc::ptr_eq(&held.tracing_controller(), &controller));

    // re-initialization builds a fresh platform
    let second = initialize(test_helper());
    assert!(!Arc::ptr_eq(&first, &second));
    shutdown();
  }
}
