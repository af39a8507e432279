// Copyright 2026 the Kestrel authors. MIT license.

use std::path::Path;
use std::path::PathBuf;

use kestrel_core::version::Version;
use parking_lot::Mutex;

use crate::engine::EngineHandle;
use crate::modules::ModuleAttributes;
use crate::modules::ModuleKind;

#[derive(Default)]
struct EngineSlots {
  module: Option<EngineHandle>,
  unbound_script: Option<EngineHandle>,
  parsed_json: Option<EngineHandle>,
}

/// A resolved module: its on-disk path, identity, and the engine-side
/// handles the binding layer installs lazily once the module is compiled
/// or its JSON parsed. Handles are cleared when the owning context is
/// disposed; the record itself lives as long as the resolver cache.
pub struct ModuleRecord {
  path: PathBuf,
  module_name: String,
  version: Version,
  attributes: ModuleAttributes,
  slots: Mutex<EngineSlots>,
}

impl ModuleRecord {
  pub(crate) fn new(
    path: PathBuf,
    module_name: String,
    version: Version,
    attributes: ModuleAttributes,
  ) -> ModuleRecord {
    ModuleRecord {
      path,
      module_name,
      version,
      attributes,
      slots: Mutex::new(EngineSlots::default()),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn module_name(&self) -> &str {
    &self.module_name
  }

  pub fn version(&self) -> &Version {
    &self.version
  }

  pub fn kind(&self) -> ModuleKind {
    self.attributes.kind()
  }

  pub fn attributes(&self) -> &ModuleAttributes {
    &self.attributes
  }

  pub fn engine_module(&self) -> Option<EngineHandle> {
    self.slots.lock().module
  }

  pub fn set_engine_module(&self, handle: EngineHandle) {
    self.slots.lock().module = Some(handle);
  }

  pub fn unbound_script(&self) -> Option<EngineHandle> {
    self.slots.lock().unbound_script
  }

  pub fn set_unbound_script(&self, handle: EngineHandle) {
    self.slots.lock().unbound_script = Some(handle);
  }

  pub fn clear_unbound_script(&self) {
    self.slots.lock().unbound_script = None;
  }

  pub fn parsed_json(&self) -> Option<EngineHandle> {
    self.slots.lock().parsed_json
  }

  pub fn set_parsed_json(&self, handle: EngineHandle) {
    self.slots.lock().parsed_json = Some(handle);
  }

  /// Releases every engine-side handle, for context disposal.
  pub fn clear_engine_handles(&self) {
    *self.slots.lock() = EngineSlots::default();
  }
}
