// Copyright 2026 the Kestrel authors. MIT license.

//! Job tasks: engine work items that scale across pool workers up to a
//! concurrency limit the task itself reports.
//!
//! A handle created with [`Platform::create_job`] starts paused;
//! [`JobHandle::notify_concurrency_increase`] un-pauses it and tops the
//! worker count up to [`JobTask::max_concurrency`]. Workers re-invoke the
//! task until it reports that enough workers are already running, so a
//! task whose `max_concurrency` shrinks as work completes winds the job
//! down by itself.
//!
//! [`Platform::create_job`]: crate::platform::Platform::create_job

use std::sync::Arc;

use kestrel_core::pools::PoolTask;
use parking_lot::Condvar;
use parking_lot::Mutex;

use crate::engine::JobDelegate;
use crate::engine::JobTask;

type PostFn = Arc<dyn Fn(PoolTask) -> bool + Send + Sync>;

struct JobInner {
  active: usize,
  paused: bool,
  cancelled: bool,
  next_worker_id: u8,
}

struct JobState {
  task: Arc<dyn JobTask>,
  post: PostFn,
  inner: Mutex<JobInner>,
  quiescent: Condvar,
}

// Tops active workers up to the task's reported concurrency. Callers
// hold the inner lock.
fn ramp_locked(state: &Arc<JobState>, inner: &mut JobInner) {
  if inner.cancelled || inner.paused {
    return;
  }
  loop {
    let desired = state.task.max_concurrency(inner.active);
    if inner.active >= desired {
      break;
    }
    inner.active += 1;
    let worker_id = inner.next_worker_id;
    inner.next_worker_id = inner.next_worker_id.wrapping_add(1);
    let worker_state = state.clone();
    let posted =
      (*state.post)(Box::new(move || worker_state.worker(worker_id)));
    if !posted {
      // pool is shutting down; nobody will run the contribution
      inner.active -= 1;
      break;
    }
  }
}

impl JobState {
  fn worker(self: Arc<JobState>, worker_id: u8) {
    loop {
      {
        let inner = self.inner.lock();
        if inner.cancelled || inner.paused {
          break;
        }
        // counting every worker but this one; a shrinking answer tells
        // extra workers to retire
        let desired = self.task.max_concurrency(inner.active - 1);
        if desired < inner.active {
          break;
        }
      }
      let delegate = Delegate {
        state: &self,
        worker_id,
      };
      self.task.run(&delegate);
    }
    let mut inner = self.inner.lock();
    inner.active -= 1;
    self.quiescent.notify_all();
  }
}

struct Delegate<'a> {
  state: &'a JobState,
  worker_id: u8,
}

impl JobDelegate for Delegate<'_> {
  fn should_yield(&self) -> bool {
    let inner = self.state.inner.lock();
    inner.cancelled || inner.paused
  }

  fn worker_id(&self) -> u8 {
    self.worker_id
  }
}

/// Owner's handle to a running (or paused) job.
pub struct JobHandle {
  state: Arc<JobState>,
}

impl JobHandle {
  pub(crate) fn new(
    task: Arc<dyn JobTask>,
    post: PostFn,
    paused: bool,
  ) -> JobHandle {
    let state = Arc::new(JobState {
      task,
      post,
      inner: Mutex::new(JobInner {
        active: 0,
        paused,
        cancelled: false,
        next_worker_id: 0,
      }),
      quiescent: Condvar::new(),
    });
    if !paused {
      let mut inner = state.inner.lock();
      ramp_locked(&state, &mut inner);
    }
    JobHandle { state }
  }

  /// Un-pauses the job and schedules workers up to the task's current
  /// `max_concurrency`.
  pub fn notify_concurrency_increase(&self) {
    let mut inner = self.state.inner.lock();
    if inner.cancelled {
      return;
    }
    inner.paused = false;
    ramp_locked(&self.state, &mut inner);
  }

  /// Blocks until the task has wound down: no active workers and a
  /// `max_concurrency` of zero. Keeps topping up workers while the task
  /// still wants them.
  pub fn join(&self) {
    let mut inner = self.state.inner.lock();
    inner.paused = false;
    loop {
      ramp_locked(&self.state, &mut inner);
      if inner.active == 0 {
        if self.state.task.max_concurrency(0) == 0 {
          return;
        }
        // the task wants workers but none could be posted, so the pool
        // is gone and waiting would hang forever
        log::warn!("joining a job whose worker pool has shut down");
        return;
      }
      self.state.quiescent.wait(&mut inner);
    }
  }

  /// Stops scheduling new contributions and blocks until running ones
  /// have returned.
  pub fn cancel(&self) {
    let mut inner = self.state.inner.lock();
    inner.cancelled = true;
    while inner.active != 0 {
      self.state.quiescent.wait(&mut inner);
    }
  }

  /// True while workers are running or the task still reports capacity
  /// for more.
  pub fn is_active(&self) -> bool {
    let inner = self.state.inner.lock();
    if inner.cancelled {
      return inner.active != 0;
    }
    inner.active != 0 || self.state.task.max_concurrency(inner.active) != 0
  }
}
