// Copyright 2026 the Kestrel authors. MIT license.

//! The embedding contract between the runtime and the engine.
//!
//! The engine itself is out of scope; these traits are the hooks it is
//! driven through. Handles are opaque ids rather than pointers so the
//! binding layer can keep its own arenas and nothing here depends on the
//! engine's memory layout.

use std::sync::Arc;

/// A unit of work posted by the engine or the host. Always runs to
/// completion; there is no per-task cancellation.
pub trait Task: Send {
  fn run(&mut self);
}

pub type BoxedTask = Box<dyn Task>;

/// A task that runs when the isolate's thread is otherwise idle. The
/// deadline is the monotonic second count it should try not to run past.
pub trait IdleTask: Send {
  fn run(&mut self, deadline_seconds: f64);
}

pub type BoxedIdleTask = Box<dyn IdleTask>;

/// Priority the engine attaches to posted work.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskPriority {
  BestEffort,
  UserVisible,
  UserBlocking,
}

/// How long a blocking scope expects to block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockingType {
  MayBlock,
  WillBlock,
}

/// Passed to every [`JobTask::run`] call so job workers can cooperate.
pub trait JobDelegate {
  /// True when the worker should return from `run` as soon as possible.
  fn should_yield(&self) -> bool;
  /// Stable id of the worker slot this call occupies.
  fn worker_id(&self) -> u8;
}

/// A parallelizable chunk of engine work with dynamic concurrency.
pub trait JobTask: Send + Sync {
  fn run(&self, delegate: &dyn JobDelegate);
  /// How many workers the job could use right now, given how many are
  /// already running it. Zero means the job is finished.
  fn max_concurrency(&self, worker_count: usize) -> usize;
}

/// Identifies an isolate to the platform adapter without exposing any
/// engine state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IsolateId(pub u64);

/// An engine-side object handle (module, unbound script, parsed JSON)
/// owned by the binding layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

/// The posting surface the engine expects from a per-isolate foreground
/// runner. Foreground tasks must run on the isolate's own thread.
pub trait ForegroundRunner: Send + Sync {
  fn post_task(&self, task: BoxedTask);
  fn post_non_nestable_task(&self, task: BoxedTask);
  fn post_delayed_task(&self, task: BoxedTask, delay_seconds: f64);
  fn post_non_nestable_delayed_task(&self, task: BoxedTask, delay_seconds: f64);
  fn post_idle_task(&self, task: BoxedIdleTask);
  fn idle_tasks_enabled(&self) -> bool;
  fn non_nestable_tasks_enabled(&self) -> bool;
  fn non_nestable_delayed_tasks_enabled(&self) -> bool;
}

/// Supplied by the embedder at platform initialization; maps isolates to
/// their foreground runners so the adapter itself stays policy-free.
pub trait IsolateHelper: Send + Sync {
  fn foreground_runner(
    &self,
    isolate: IsolateId,
    priority: TaskPriority,
  ) -> Arc<dyn ForegroundRunner>;
  fn idle_tasks_enabled(&self, isolate: IsolateId) -> bool;
}

// Allocator and observability seams of the platform adapter. The adapter
// only stores and hands these back; defaults exist where the engine
// expects a non-null answer.

pub trait TracingController: Send + Sync {}

/// Tracing controller used until the embedder installs one.
#[derive(Default)]
pub struct DefaultTracingController;

impl TracingController for DefaultTracingController {}

pub trait PageAllocator: Send + Sync {}

pub trait ThreadIsolatedAllocator: Send + Sync {}

pub trait ZoneBackingAllocator: Send + Sync {}

/// Zone backing allocator used until the embedder installs one.
#[derive(Default)]
pub struct DefaultZoneBackingAllocator;

impl ZoneBackingAllocator for DefaultZoneBackingAllocator {}

pub trait HighAllocationThroughputObserver: Send + Sync {}
