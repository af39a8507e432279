// Copyright 2026 the Kestrel authors. MIT license.

//! Snapshot create/load for host companion state.
//!
//! A host snapshot is a byte stream with a fixed header followed by an
//! app-defined body. The leading `u32` is always zero so host blobs can
//! never be confused with engine-authored startup blobs, whose header
//! starts with the engine's own nonzero magic. Alongside whole-file
//! snapshots, this module carries the per-slot serializer pairs the
//! engine calls while walking embedder-wrapped objects and contexts.

use std::path::Path;

use kestrel_core::serialization::Decode;
use kestrel_core::serialization::Encode;
use kestrel_core::serialization::ReadBuffer;
use kestrel_core::serialization::WriteBuffer;
use thiserror::Error;

use crate::registry::CallbackRegistry;
use crate::registry::NativeObject;
use crate::registry::ObjInfo;
use crate::version;

/// Host magic recorded after the leading zero.
pub const SNAPSHOT_MAGIC: u32 = 0x4B53_4E50; // "KSNP"

/// Slot layout of an embedder-wrapped object: the type-info pointer and
/// the native instance pointer.
pub const OBJ_INFO_SLOT: i32 = 0;
pub const OBJ_INSTANCE_SLOT: i32 = 1;

/// The context slot holding the per-context back-pointer whose state is
/// serialized into context snapshots.
pub const CONTEXT_DATA_SLOT: i32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot file path is empty")]
  EmptyPath,
  #[error("the app {0} is not snapshottable")]
  NotSnapshottable(String),
  #[error("failed to serialize the app {0}")]
  AppSerialization(String),
  #[error("failed to restore the app {0}")]
  AppRestore(String),
  #[error("snapshot i/o on {} failed", .path.display())]
  Io {
    path: std::path::PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("not a host snapshot: {0}")]
  BadHeader(&'static str),
  #[error(
    "snapshot version {snapshot:?} is newer than this runtime {runtime:?}"
  )]
  VersionMismatch {
    snapshot: (u32, u32, u32, u32),
    runtime: (u32, u32, u32, u32),
  },
  #[error("no serializer is registered for type {0}")]
  UnregisteredType(String),
  #[error("object payload for {0} did not deserialize")]
  BadObjectPayload(String),
}

/// An application whose companion state rides in snapshots. `class_tag`
/// names the concrete app type so a snapshot cannot be loaded into a
/// different application class.
pub trait SnapshotApp {
  fn name(&self) -> &str;
  fn class_tag(&self) -> &str;
  fn is_snapshottable(&self) -> bool;
  fn make_snapshot(&self, buffer: &mut WriteBuffer) -> bool;
  fn restore_snapshot(&mut self, buffer: &mut ReadBuffer) -> bool;
}

/// The fixed header of a host snapshot, after the leading engine zero.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotHeader {
  pub host_magic: u32,
  pub version: (u32, u32, u32, u32),
  pub platform_arch: String,
  pub app_class_tag: String,
}

impl SnapshotHeader {
  fn current(app_class_tag: &str) -> SnapshotHeader {
    SnapshotHeader {
      host_magic: SNAPSHOT_MAGIC,
      version: version::version_tuple(),
      platform_arch: version::platform_arch(),
      app_class_tag: app_class_tag.to_string(),
    }
  }
}

impl Encode for SnapshotHeader {
  fn encode(&self, buffer: &mut WriteBuffer) {
    // the engine-magic slot; zero marks a host-authored blob
    buffer.put(&0u32);
    buffer.put(&self.host_magic);
    buffer
      .put(&self.version.0)
      .put(&self.version.1)
      .put(&self.version.2)
      .put(&self.version.3);
    buffer.put(&self.platform_arch).put(&self.app_class_tag);
  }
}

impl Decode for SnapshotHeader {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
    let engine_magic = buffer.take::<u32>()?;
    if engine_magic != 0 {
      buffer.set_error();
      return None;
    }
    Some(SnapshotHeader {
      host_magic: buffer.take()?,
      version: (
        buffer.take()?,
        buffer.take()?,
        buffer.take()?,
        buffer.take()?,
      ),
      platform_arch: buffer.take()?,
      app_class_tag: buffer.take()?,
    })
  }
}

/// Writes snapshots and serves the engine's per-slot serializer
/// callbacks while one is being created.
pub struct SnapshotCreator;

impl SnapshotCreator {
  /// Serializes the header and the app body into one buffer.
  pub fn snapshot_bytes(
    app: &dyn SnapshotApp,
  ) -> Result<Vec<u8>, SnapshotError> {
    if !app.is_snapshottable() {
      log::error!("the app {} is not snapshottable", app.name());
      return Err(SnapshotError::NotSnapshottable(app.name().to_string()));
    }
    let mut buffer = WriteBuffer::new();
    buffer.put(&SnapshotHeader::current(app.class_tag()));
    if !app.make_snapshot(&mut buffer) || buffer.has_errored() {
      log::error!("failed to snapshot the app {}", app.name());
      return Err(SnapshotError::AppSerialization(app.name().to_string()));
    }
    Ok(buffer.into_bytes())
  }

  /// Creates a snapshot file. Nothing is written unless the whole
  /// serialization succeeded.
  pub fn create_snapshot(
    app: &dyn SnapshotApp,
    snapshot_file: &Path,
  ) -> Result<(), SnapshotError> {
    if snapshot_file.as_os_str().is_empty() {
      log::error!("create_snapshot passed an empty file path");
      return Err(SnapshotError::EmptyPath);
    }
    let bytes = SnapshotCreator::snapshot_bytes(app)?;
    std::fs::write(snapshot_file, bytes).map_err(|source| {
      SnapshotError::Io {
        path: snapshot_file.to_path_buf(),
        source,
      }
    })
  }

  /// The external references handed to the engine with any snapshot.
  pub fn external_references() -> Vec<usize> {
    CallbackRegistry::references()
  }
}

/// The slot array of one embedder-wrapped object as the host sees it.
#[derive(Default)]
pub struct ObjectSlots {
  pub info: Option<&'static ObjInfo>,
  pub instance: Option<Box<dyn NativeObject>>,
}

/// Engine callback: serialize one internal field of a wrapped object.
/// The type-info slot yields the type name, the instance slot the
/// registered serializer's payload; any other slot has no payload.
pub fn serialize_internal_field(
  slots: &ObjectSlots,
  index: i32,
) -> Option<Vec<u8>> {
  match index {
    OBJ_INFO_SLOT => {
      let info = slots.info?;
      let mut buffer = WriteBuffer::new();
      buffer.put(info.type_name);
      if buffer.has_errored() {
        return None;
      }
      Some(buffer.into_bytes())
    }
    OBJ_INSTANCE_SLOT => {
      let info = slots.info?;
      let instance = slots.instance.as_deref()?;
      let mut buffer = WriteBuffer::new();
      if !(info.serializer)(&mut buffer, instance) || buffer.has_errored() {
        return None;
      }
      Some(buffer.into_bytes())
    }
    _ => None,
  }
}

/// Engine callback: reconstitute one internal field of a wrapped object
/// from its snapshot payload.
pub fn deserialize_internal_field(
  slots: &mut ObjectSlots,
  index: i32,
  payload: &[u8],
) -> Result<(), SnapshotError> {
  match index {
    OBJ_INFO_SLOT => {
      let mut buffer = ReadBuffer::from_slice(payload);
      let type_name = buffer
        .take::<String>()
        .ok_or(SnapshotError::BadHeader("unreadable type name"))?;
      let info = CallbackRegistry::obj_info_by_name(&type_name)
        .ok_or(SnapshotError::UnregisteredType(type_name))?;
      slots.info = Some(info);
      Ok(())
    }
    OBJ_INSTANCE_SLOT => {
      let info = slots
        .info
        .ok_or(SnapshotError::BadHeader("instance before type info"))?;
      let mut buffer = ReadBuffer::from_slice(payload);
      let instance = (info.deserializer)(&mut buffer).ok_or_else(|| {
        SnapshotError::BadObjectPayload(info.type_name.to_string())
      })?;
      slots.instance = Some(instance);
      Ok(())
    }
    _ => Ok(()),
  }
}

/// Per-context state that rides in context snapshots through the
/// well-known context slot.
pub trait ContextSnapshot {
  fn serialize_context_data(&self, buffer: &mut WriteBuffer);
  fn deserialize_context_data(&mut self, buffer: &mut ReadBuffer);
}

/// Engine callback: serialize one context slot. Only the context-data
/// slot carries a payload.
pub fn serialize_context_field(
  context: &dyn ContextSnapshot,
  index: i32,
) -> Option<Vec<u8>> {
  if index != CONTEXT_DATA_SLOT {
    return None;
  }
  let mut buffer = WriteBuffer::new();
  context.serialize_context_data(&mut buffer);
  if buffer.has_errored() {
    return None;
  }
  Some(buffer.into_bytes())
}

/// Engine callback: restore one context slot from its payload.
pub fn deserialize_context_field(
  context: &mut dyn ContextSnapshot,
  index: i32,
  payload: &[u8],
) {
  if index != CONTEXT_DATA_SLOT {
    return;
  }
  let mut buffer = ReadBuffer::from_slice(payload);
  context.deserialize_context_data(&mut buffer);
}

/// A loaded, header-verified snapshot ready to hand to the engine and the
/// application.
pub struct SnapshotProvider {
  header: SnapshotHeader,
  body: Vec<u8>,
}

impl SnapshotProvider {
  pub fn load(snapshot_file: &Path) -> Result<SnapshotProvider, SnapshotError> {
    let bytes =
      std::fs::read(snapshot_file).map_err(|source| SnapshotError::Io {
        path: snapshot_file.to_path_buf(),
        source,
      })?;
    SnapshotProvider::from_bytes(bytes)
  }

  pub fn from_bytes(bytes: Vec<u8>) -> Result<SnapshotProvider, SnapshotError> {
    let mut buffer = ReadBuffer::new(bytes);
    let header = buffer
      .take::<SnapshotHeader>()
      .ok_or(SnapshotError::BadHeader("truncated or engine-authored"))?;
    if header.host_magic != SNAPSHOT_MAGIC {
      return Err(SnapshotError::BadHeader("wrong host magic"));
    }
    let runtime = version::version_tuple();
    if header.version > runtime {
      return Err(SnapshotError::VersionMismatch {
        snapshot: header.version,
        runtime,
      });
    }
    let body = buffer.read_bytes(buffer.remaining()).unwrap_or_default();
    Ok(SnapshotProvider { header, body })
  }

  pub fn header(&self) -> &SnapshotHeader {
    &self.header
  }

  /// The app-defined body, after the header.
  pub fn body(&self) -> &[u8] {
    &self.body
  }

  pub fn body_reader(&self) -> ReadBuffer {
    ReadBuffer::from_slice(&self.body)
  }

  /// Restores the application's companion state. The class tag must
  /// match the app this snapshot was created from.
  pub fn restore_into(
    &self,
    app: &mut dyn SnapshotApp,
  ) -> Result<(), SnapshotError> {
    if self.header.app_class_tag != app.class_tag() {
      return Err(SnapshotError::BadHeader("app class tag mismatch"));
    }
    let mut reader = self.body_reader();
    if !app.restore_snapshot(&mut reader) || reader.has_errored() {
      log::error!("failed to restore the app {}", app.name());
      return Err(SnapshotError::AppRestore(app.name().to_string()));
    }
    Ok(())
  }
}
