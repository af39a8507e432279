// Copyright 2026 the Kestrel authors. MIT license.

use std::collections::BTreeMap;

use crate::serialization::Decode;
use crate::serialization::Encode;
use crate::serialization::ReadBuffer;
use crate::serialization::WriteBuffer;

pub const DEFAULT_MAX_NAMED_INDEXES: u64 = 256;

/// Ordered, bijective mapping between slot indexes and names, used to
/// address per-context slot identities across snapshots. Both the index
/// and the name must be unique within the table; names are non-empty.
#[derive(Debug)]
pub struct NamedIndexes {
  max_count: u64,
  entries: BTreeMap<u64, String>,
}

impl Default for NamedIndexes {
  fn default() -> NamedIndexes {
    NamedIndexes::new(DEFAULT_MAX_NAMED_INDEXES)
  }
}

impl NamedIndexes {
  pub fn new(max_count: u64) -> NamedIndexes {
    NamedIndexes {
      max_count,
      entries: BTreeMap::new(),
    }
  }

  pub fn max_count(&self) -> u64 {
    self.max_count
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Adds an index/name pair. Rejects empty names, indexes at or past
  /// `max_count`, and any index or name already present.
  pub fn add_named_index(&mut self, index: u64, name: &str) -> bool {
    if name.is_empty() {
      log::warn!("refusing to add an empty name at index {index}");
      return false;
    }
    if index >= self.max_count {
      log::warn!("index {index} is out of range for this table");
      return false;
    }
    if self.entries.contains_key(&index)
      || self.entries.values().any(|existing| existing == name)
    {
      log::warn!("index {index} or name {name} is already registered");
      return false;
    }
    self.entries.insert(index, name.to_string());
    true
  }

  pub fn name_from_index(&self, index: u64) -> Option<&str> {
    self.entries.get(&index).map(String::as_str)
  }

  pub fn index_for_name(&self, name: &str) -> Option<u64> {
    self
      .entries
      .iter()
      .find(|(_, entry)| entry.as_str() == name)
      .map(|(index, _)| *index)
  }
}

impl Encode for NamedIndexes {
  fn encode(&self, buffer: &mut WriteBuffer) {
    buffer.put(&self.max_count).put(&(self.entries.len() as u64));
    for (index, name) in &self.entries {
      buffer.put(index).put(name);
    }
  }
}

impl Decode for NamedIndexes {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
    let max_count = buffer.take::<u64>()?;
    let count = buffer.take::<u64>()?;
    let mut table = NamedIndexes::new(max_count);
    for _ in 0..count {
      let index = buffer.take::<u64>()?;
      let name = buffer.take::<String>()?;
      if !table.add_named_index(index, &name) {
        buffer.set_error();
        return None;
      }
    }
    Some(table)
  }
}
