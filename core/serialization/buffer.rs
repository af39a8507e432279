// Copyright 2026 the Kestrel authors. MIT license.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Byte order a buffer reads or writes multi-byte values in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endianness {
  Little,
  Big,
}

impl Endianness {
  pub fn host() -> Endianness {
    if cfg!(target_endian = "big") {
      Endianness::Big
    } else {
      Endianness::Little
    }
  }
}

impl Default for Endianness {
  fn default() -> Endianness {
    Endianness::Little
  }
}

const DEFAULT_CAPACITY: usize = 128 * 1024;

/// Append-only byte stream that the typed codec serializes into.
pub struct WriteBuffer {
  bytes: Vec<u8>,
  endianness: Endianness,
  error: AtomicBool,
}

impl Default for WriteBuffer {
  fn default() -> WriteBuffer {
    WriteBuffer::new()
  }
}

impl WriteBuffer {
  pub fn new() -> WriteBuffer {
    WriteBuffer::with_capacity(DEFAULT_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> WriteBuffer {
    WriteBuffer {
      bytes: Vec::with_capacity(capacity),
      endianness: Endianness::default(),
      error: AtomicBool::new(false),
    }
  }

  pub fn with_endianness(endianness: Endianness) -> WriteBuffer {
    WriteBuffer {
      bytes: Vec::with_capacity(DEFAULT_CAPACITY),
      endianness,
      error: AtomicBool::new(false),
    }
  }

  pub fn endianness(&self) -> Endianness {
    self.endianness
  }

  /// True when the buffer's declared byte order differs from the host's,
  /// meaning multi-byte values are swapped on the way in.
  pub fn is_byte_swapping(&self) -> bool {
    self.endianness != Endianness::host()
  }

  pub fn has_errored(&self) -> bool {
    self.error.load(Ordering::Relaxed)
  }

  /// Latches the sticky error flag. Once set, codec calls are no-ops.
  pub fn set_error(&self) {
    self.error.store(true, Ordering::Relaxed);
  }

  pub fn buffer_size(&self) -> usize {
    self.bytes.len()
  }

  pub fn buffer_capacity(&self) -> usize {
    self.bytes.capacity()
  }

  /// A writer's cursor is always at the end.
  pub fn at_end(&self) -> bool {
    true
  }

  /// Appends raw bytes. Errored buffers drop the write.
  pub fn write_bytes(&mut self, bytes: &[u8]) {
    if self.has_errored() {
      return;
    }
    self.bytes.extend_from_slice(bytes);
  }

  pub fn data(&self) -> &[u8] {
    &self.bytes
  }

  /// Copies the contents out; the returned vector is storage the caller
  /// owns, distinct from the buffer's own.
  pub fn to_vec(&self) -> Vec<u8> {
    self.bytes.clone()
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }
}

/// Consume-only byte stream over an immutable byte view.
pub struct ReadBuffer {
  bytes: Vec<u8>,
  position: usize,
  endianness: Endianness,
  error: bool,
}

impl ReadBuffer {
  pub fn new(bytes: Vec<u8>) -> ReadBuffer {
    ReadBuffer {
      bytes,
      position: 0,
      endianness: Endianness::default(),
      error: false,
    }
  }

  pub fn from_slice(bytes: &[u8]) -> ReadBuffer {
    ReadBuffer::new(bytes.to_vec())
  }

  pub fn with_endianness(
    bytes: Vec<u8>,
    endianness: Endianness,
  ) -> ReadBuffer {
    ReadBuffer {
      bytes,
      position: 0,
      endianness,
      error: false,
    }
  }

  pub fn endianness(&self) -> Endianness {
    self.endianness
  }

  pub fn is_byte_swapping(&self) -> bool {
    self.endianness != Endianness::host()
  }

  pub fn has_errored(&self) -> bool {
    self.error
  }

  pub fn set_error(&mut self) {
    self.error = true;
  }

  pub fn buffer_size(&self) -> usize {
    self.bytes.len()
  }

  pub fn buffer_capacity(&self) -> usize {
    self.bytes.capacity()
  }

  pub fn position(&self) -> usize {
    self.position
  }

  pub fn remaining(&self) -> usize {
    self.bytes.len() - self.position
  }

  pub fn at_end(&self) -> bool {
    self.position >= self.bytes.len()
  }

  /// Consumes `out.len()` bytes. An under-read latches the error flag,
  /// leaves the cursor in place, and returns false.
  pub fn read_into(&mut self, out: &mut [u8]) -> bool {
    if self.error {
      return false;
    }
    if self.position + out.len() > self.bytes.len() {
      self.set_error();
      return false;
    }
    out.copy_from_slice(&self.bytes[self.position..self.position + out.len()]);
    self.position += out.len();
    true
  }

  /// Consumes and returns `len` bytes.
  pub fn read_bytes(&mut self, len: usize) -> Option<Vec<u8>> {
    let mut out = vec![0u8; len];
    if self.read_into(&mut out) { Some(out) } else { None }
  }

  /// Reads without advancing the cursor. Useful for peeking at a length
  /// prefix before committing to the read.
  pub fn peek_into(&mut self, out: &mut [u8]) -> bool {
    if self.read_into(out) {
      self.position -= out.len();
      true
    } else {
      false
    }
  }

  pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    if self.read_into(&mut out) { Some(out) } else { None }
  }

  /// Copies the contents out; the returned vector is storage the caller
  /// owns, distinct from the buffer's own.
  pub fn to_vec(&self) -> Vec<u8> {
    self.bytes.clone()
  }
}
