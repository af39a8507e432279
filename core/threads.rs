// Copyright 2026 the Kestrel authors. MIT license.

use std::thread;
use std::thread::JoinHandle;

/// Scheduling class for pool workers, mirroring the priorities the engine
/// hands out with its tasks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadPriority {
  Default,
  BestEffort,
  UserVisible,
  UserBlocking,
}

// Linux truncates thread names past this many bytes.
const MAX_THREAD_NAME: usize = 15;

/// Number of hardware cores, never less than 1.
pub fn hardware_cores() -> usize {
  thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Spawns a named OS thread at the given priority. The priority is applied
/// best-effort from inside the new thread; platforms or processes that
/// refuse the request still run the thread at the default priority.
pub fn spawn_named<F>(
  name: &str,
  priority: ThreadPriority,
  body: F,
) -> std::io::Result<JoinHandle<()>>
where
  F: FnOnce() + Send + 'static,
{
  let name: String = name.chars().take(MAX_THREAD_NAME).collect();
  thread::Builder::new().name(name).spawn(move || {
    apply_priority(priority);
    body();
  })
}

#[cfg(unix)]
fn apply_priority(priority: ThreadPriority) {
  let nice = match priority {
    ThreadPriority::Default | ThreadPriority::UserBlocking => 0,
    ThreadPriority::UserVisible => 5,
    ThreadPriority::BestEffort => 10,
  };
  if nice != 0 {
    // affects only the calling thread on Linux
    unsafe {
      libc::nice(nice);
    }
  }
}

#[cfg(not(unix))]
fn apply_priority(_priority: ThreadPriority) {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reports_at_least_one_core() {
    assert!(hardware_cores() >= 1);
  }

  #[test]
  fn spawned_thread_carries_truncated_name() {
    let handle = spawn_named(
      "kestrel-worker-with-a-long-name",
      ThreadPriority::BestEffort,
      || {
        let name = thread::current().name().unwrap().to_string();
        assert_eq!(name, "kestrel-worker-");
      },
    )
    .unwrap();
    handle.join().unwrap();
  }

  #[test]
  fn spawned_thread_runs_body() {
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = spawn_named("kestrel-test", ThreadPriority::Default, move || {
      tx.send(7).unwrap();
    })
    .unwrap();
    assert_eq!(rx.recv().unwrap(), 7);
    handle.join().unwrap();
  }
}
