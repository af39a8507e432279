// Copyright 2026 the Kestrel authors. MIT license.

//! A uniform value type over the callable shapes the runtime hands
//! around: free functions, methods bound to a strong or weak receiver,
//! closures, and shared function objects.
//!
//! Every wrapper carries a stable identity so callbacks can be compared
//! and deduplicated: the function address for free functions and methods,
//! a hash of the closure's type identity for closures, and the allocation
//! address for shared function objects. Cloning preserves identity.
//!
//! `A` is the argument the callable receives; use a tuple for more than
//! one. Invocation returns `None` only when a weakly bound receiver has
//! already been dropped; the call is skipped in that case.

use std::any::TypeId;
use std::sync::Arc;
use std::sync::Weak;

use twox_hash::XxHash64;

const IDENTITY_SEED: u64 = 0x6b65_7374;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallbackKind {
  Free,
  Member,
  Closure,
  FunctionObject,
}

pub struct Callback<A, R = ()> {
  invoke: Arc<dyn Fn(A) -> Option<R> + Send + Sync>,
  kind: CallbackKind,
  identity: u64,
}

impl<A, R> Clone for Callback<A, R> {
  fn clone(&self) -> Callback<A, R> {
    Callback {
      invoke: self.invoke.clone(),
      kind: self.kind,
      identity: self.identity,
    }
  }
}

impl<A, R> std::fmt::Debug for Callback<A, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Callback")
      .field("kind", &self.kind)
      .field("identity", &self.identity)
      .finish()
  }
}

impl<A, R> PartialEq for Callback<A, R> {
  fn eq(&self, other: &Callback<A, R>) -> bool {
    self.kind == other.kind && self.identity == other.identity
  }
}

impl<A, R> Eq for Callback<A, R> {}

impl<A: 'static, R: 'static> Callback<A, R> {
  /// Wraps a free function or a static method.
  pub fn from_fn(callable: fn(A) -> R) -> Callback<A, R> {
    Callback {
      invoke: Arc::new(move |args| Some(callable(args))),
      kind: CallbackKind::Free,
      identity: callable as usize as u64,
    }
  }

  /// Wraps a method bound to a strong receiver.
  pub fn bound<T>(receiver: Arc<T>, method: fn(&T, A) -> R) -> Callback<A, R>
  where
    T: Send + Sync + 'static,
  {
    Callback {
      invoke: Arc::new(move |args| Some(method(&receiver, args))),
      kind: CallbackKind::Member,
      identity: method as usize as u64,
    }
  }

  /// Wraps a method bound to a weak receiver. The receiver is upgraded at
  /// each invocation; a dead receiver makes the call a skipped no-op.
  pub fn bound_weak<T>(
    receiver: Weak<T>,
    method: fn(&T, A) -> R,
  ) -> Callback<A, R>
  where
    T: Send + Sync + 'static,
  {
    Callback {
      invoke: Arc::new(move |args| {
        receiver.upgrade().map(|receiver| method(&receiver, args))
      }),
      kind: CallbackKind::Member,
      identity: method as usize as u64,
    }
  }

  /// Wraps a closure. Identity is a hash of the closure's type, so two
  /// wrappers of the same closure compare equal while closures written at
  /// different places do not.
  pub fn closure<F>(callable: F) -> Callback<A, R>
  where
    F: Fn(A) -> R + Send + Sync + 'static,
  {
    let identity =
      XxHash64::oneshot(IDENTITY_SEED, std::any::type_name::<F>().as_bytes());
    Callback {
      invoke: Arc::new(move |args| Some(callable(args))),
      kind: CallbackKind::Closure,
      identity,
    }
  }

  /// Wraps an already shared function object. Identity follows the
  /// allocation, so clones of the same `Arc` compare equal.
  pub fn from_arc(
    callable: Arc<dyn Fn(A) -> R + Send + Sync>,
  ) -> Callback<A, R> {
    let identity = Arc::as_ptr(&callable) as *const () as usize as u64;
    Callback {
      invoke: Arc::new(move |args| Some(callable(args))),
      kind: CallbackKind::FunctionObject,
      identity,
    }
  }

  /// Runs the callable. `None` means a weakly bound receiver was gone and
  /// the call was skipped.
  pub fn invoke(&self, args: A) -> Option<R> {
    (*self.invoke)(args)
  }

  pub fn kind(&self) -> CallbackKind {
    self.kind
  }

  pub fn identity(&self) -> u64 {
    self.identity
  }

  pub fn is_member_function(&self) -> bool {
    self.kind == CallbackKind::Member
  }

  pub fn is_closure(&self) -> bool {
    self.kind == CallbackKind::Closure
  }

  pub fn is_function_object(&self) -> bool {
    self.kind == CallbackKind::FunctionObject
  }

  pub fn is_void(&self) -> bool {
    TypeId::of::<R>() == TypeId::of::<()>()
  }
}
