// Copyright 2026 the Kestrel authors. MIT license.

//! Process-wide registries backing snapshot reconstitution.
//!
//! The engine can only rebuild embedder-wrapped objects from a snapshot
//! if (a) every callback address it stored is handed back verbatim at
//! isolate creation (the external-reference table) and (b) each native
//! type's serializer pair can be found by name. Native types register an
//! [`ObjInfo`] once at process init, before any snapshot is created or
//! loaded.

use std::any::Any;
use std::collections::HashMap;

use kestrel_core::serialization::ReadBuffer;
use kestrel_core::serialization::WriteBuffer;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::engine::IsolateId;

/// Writes one native object's state. False reports a serialization
/// failure distinct from the buffer's own error latch.
pub type ObjSerializerFn = fn(&mut WriteBuffer, &dyn NativeObject) -> bool;

/// Rebuilds one native object from its serialized state.
pub type ObjDeserializerFn =
  fn(&mut ReadBuffer) -> Option<Box<dyn NativeObject>>;

/// Callable run for each isolate to install global templates.
pub type GlobalRegisterFn = fn(IsolateId);

/// The registration triple for one snapshot-capable native type.
pub struct ObjInfo {
  pub type_name: &'static str,
  pub serializer: ObjSerializerFn,
  pub deserializer: ObjDeserializerFn,
}

/// A host object wrapped by an engine object, carrying its type's
/// registration so the snapshot layer can find the right serializer.
pub trait NativeObject: Any + Send {
  fn obj_info(&self) -> &'static ObjInfo;
  fn as_any(&self) -> &dyn Any;
}

#[derive(Default)]
struct RegistryInner {
  references: Vec<usize>,
  obj_infos: HashMap<&'static str, &'static ObjInfo>,
  global_registerers: Vec<GlobalRegisterFn>,
}

static REGISTRY: Lazy<Mutex<RegistryInner>> =
  Lazy::new(|| Mutex::new(RegistryInner::default()));

/// Facade over the process-wide registration state.
pub struct CallbackRegistry;

impl CallbackRegistry {
  /// Records a stable function address for the external-reference table.
  /// Duplicate addresses collapse to one entry; zero is reserved for the
  /// table's terminator and is ignored.
  pub fn register_external_reference(address: usize) {
    if address == 0 {
      return;
    }
    let mut inner = REGISTRY.lock();
    if !inner.references.contains(&address) {
      inner.references.push(address);
    }
  }

  /// The external-reference table: every registered address in
  /// registration order, terminated by the zero sentinel.
  pub fn references() -> Vec<usize> {
    let inner = REGISTRY.lock();
    let mut references = inner.references.clone();
    references.push(0);
    references
  }

  /// Registers a native type's snapshot triple. The serializer pair's
  /// addresses join the external-reference table. Returns false when the
  /// type name is already taken.
  pub fn register_obj_info(info: &'static ObjInfo) -> bool {
    {
      let mut inner = REGISTRY.lock();
      if inner.obj_infos.contains_key(info.type_name) {
        log::warn!("type {} is already registered", info.type_name);
        return false;
      }
      inner.obj_infos.insert(info.type_name, info);
    }
    CallbackRegistry::register_external_reference(info.serializer as usize);
    CallbackRegistry::register_external_reference(info.deserializer as usize);
    true
  }

  pub fn obj_info_by_name(type_name: &str) -> Option<&'static ObjInfo> {
    REGISTRY.lock().obj_infos.get(type_name).copied()
  }

  /// Registers a global-template installer, once per function.
  pub fn register_global_registerer(registerer: GlobalRegisterFn) {
    let mut inner = REGISTRY.lock();
    if !inner
      .global_registerers
      .iter()
      .any(|existing| std::ptr::fn_addr_eq(*existing, registerer))
    {
      inner.global_registerers.push(registerer);
    }
  }

  /// Runs every registered global-template installer for an isolate.
  pub fn run_global_registerers(isolate: IsolateId) {
    let registerers = REGISTRY.lock().global_registerers.clone();
    for registerer in registerers {
      registerer(isolate);
    }
  }
}
