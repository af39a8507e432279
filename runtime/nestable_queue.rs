// Copyright 2026 the Kestrel authors. MIT license.

use kestrel_core::clock::Clock;
use kestrel_core::queues::DelayedQueue;

use crate::engine::BoxedTask;

/// Whether a task may run while another task is already on the stack.
/// Non-nestable tasks wait until the call stack unwinds to the outermost
/// task.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Nestability {
  Nestable,
  NonNestable,
}

struct Entry {
  nestability: Nestability,
  task: BoxedTask,
}

/// Delayed queue of `(nestability, task)` pairs with a depth-aware
/// dequeue: at a non-zero nesting depth, non-nestable entries are skipped
/// in place and later entries are considered without reordering the lane.
pub struct NestableQueue {
  queue: DelayedQueue<Entry>,
}

impl Default for NestableQueue {
  fn default() -> NestableQueue {
    NestableQueue::new(Clock::monotonic())
  }
}

impl NestableQueue {
  pub fn new(clock: Clock) -> NestableQueue {
    NestableQueue {
      queue: DelayedQueue::new(clock),
    }
  }

  pub fn push_item(&self, task: BoxedTask) -> bool {
    self.queue.push(Entry {
      nestability: Nestability::Nestable,
      task,
    })
  }

  pub fn push_non_nestable_item(&self, task: BoxedTask) -> bool {
    self.queue.push(Entry {
      nestability: Nestability::NonNestable,
      task,
    })
  }

  pub fn push_item_delayed(&self, delay_seconds: f64, task: BoxedTask) -> bool {
    self.queue.push_delayed(
      delay_seconds,
      Entry {
        nestability: Nestability::Nestable,
        task,
      },
    )
  }

  pub fn push_non_nestable_item_delayed(
    &self,
    delay_seconds: f64,
    task: BoxedTask,
  ) -> bool {
    self.queue.push_delayed(
      delay_seconds,
      Entry {
        nestability: Nestability::NonNestable,
        task,
      },
    )
  }

  /// Dequeues the first entry eligible at the given nesting depth: any
  /// entry at depth zero, only nestable entries otherwise.
  pub fn get_next(&self, nesting_depth: i32) -> Option<BoxedTask> {
    self
      .queue
      .take_first(|entry| {
        nesting_depth == 0 || entry.nestability == Nestability::Nestable
      })
      .map(|entry| entry.task)
  }

  pub fn may_have_items(&self) -> bool {
    self.queue.may_have_items()
  }

  pub fn process_delayed_queue(&self) {
    self.queue.process_delayed_queue();
  }

  pub fn is_shutdown(&self) -> bool {
    self.queue.is_shutdown()
  }

  pub fn shutdown(&self) {
    self.queue.shutdown();
  }

  /// Removes and drops everything held, both lanes.
  pub fn drain(&self) {
    drop(self.queue.drain());
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::AtomicI32;
  use std::sync::atomic::Ordering;

  use kestrel_core::clock::ManualClock;
  use pretty_assertions::assert_eq;

  use super::*;
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

  fn marker(slot: &Arc<AtomicI32>, value: i32) -> BoxedTask {
    Box::new(MarkerTask {
      slot: slot.clone(),
      value,
    })
  }

  fn run_next(queue: &NestableQueue, depth: i32, slot: &Arc<AtomicI32>) -> i32 {
    match queue.get_next(depth) {
      Some(mut task) => {
        task.run();
        slot.load(Ordering::SeqCst)
      }
      None => -1,
    }
  }

  #[test]
  fn depth_filters_non_nestable_entries_in_place() {
    let queue = NestableQueue::default();
    let slot = Arc::new(AtomicI32::new(0));
    queue.push_non_nestable_item(marker(&slot, 1));
    queue.push_item(marker(&slot, 2));
    queue.push_non_nestable_item(marker(&slot, 3));
    queue.push_item(marker(&slot, 4));

    // nested: only the nestable entries surface, in order
    assert_eq!(run_next(&queue, 2, &slot), 2);
    assert_eq!(run_next(&queue, 2, &slot), 4);
    assert_eq!(run_next(&queue, 2, &slot), -1);

    // unwound to the top: the skipped entries, still in order
    assert_eq!(run_next(&queue, 0, &slot), 1);
    assert_eq!(run_next(&queue, 0, &slot), 3);
    assert_eq!(run_next(&queue, 0, &slot), -1);
  }

  #[test]
  fn delayed_entries_keep_their_nestability() {
    let manual = ManualClock::new(0.0);
    let queue = NestableQueue::new(manual.clock());
    let slot = Arc::new(AtomicI32::new(0));
    queue.push_non_nestable_item_delayed(1.0, marker(&slot, 1));
    queue.push_item_delayed(2.0, marker(&slot, 2));

    assert_eq!(run_next(&queue, 0, &slot), -1);
    manual.set(3.0);
    // at depth the delayed non-nestable entry is still filtered
    assert_eq!(run_next(&queue, 1, &slot), 2);
    assert_eq!(run_next(&queue, 0, &slot), 1);
  }

  #[test]
  fn shutdown_stops_both_push_shapes() {
    let queue = NestableQueue::default();
    let slot = Arc::new(AtomicI32::new(0));
    queue.shutdown();
    assert!(!queue.push_item(marker(&slot, 1)));
    assert!(!queue.push_non_nestable_item_delayed(0.0, marker(&slot, 2)));
    assert_eq!(run_next(&queue, 0, &slot), -1);
  }
}
