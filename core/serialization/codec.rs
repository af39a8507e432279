// Copyright 2026 the Kestrel authors. MIT license.

use super::buffer::Endianness;
use super::buffer::ReadBuffer;
use super::buffer::WriteBuffer;

/// Serializes a value into a [`WriteBuffer`] in the buffer's declared byte
/// order. User types compose the primitive impls.
pub trait Encode {
  fn encode(&self, buffer: &mut WriteBuffer);
}

/// Deserializes a value out of a [`ReadBuffer`]. Returns `None` after
/// latching the buffer's error on any fault.
pub trait Decode: Sized {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self>;
}

impl WriteBuffer {
  /// Chainable typed append. A no-op once the buffer has errored.
  pub fn put<T: Encode + ?Sized>(&mut self, value: &T) -> &mut WriteBuffer {
    if !self.has_errored() {
      value.encode(self);
    }
    self
  }

  /// Appends a C-style string: a length that counts the terminator,
  /// then the bytes including the trailing NUL.
  pub fn put_cstr(&mut self, value: &str) -> &mut WriteBuffer {
    if self.has_errored() {
      return self;
    }
    self.put(&((value.len() + 1) as u64));
    self.write_bytes(value.as_bytes());
    self.write_bytes(&[0]);
    self
  }
}

impl ReadBuffer {
  /// Typed consume. Returns `None` (and leaves the error latched) on any
  /// fault, including a previously latched error.
  pub fn take<T: Decode>(&mut self) -> Option<T> {
    if self.has_errored() {
      return None;
    }
    T::decode(self)
  }

  /// Reads a C-style string written by [`WriteBuffer::put_cstr`]. The
  /// terminator must be present and is stripped from the result.
  pub fn take_cstr(&mut self) -> Option<String> {
    let length = self.take::<u64>()? as usize;
    if length == 0 {
      self.set_error();
      return None;
    }
    let mut bytes = self.read_bytes(length)?;
    if bytes.pop() != Some(0) {
      self.set_error();
      return None;
    }
    match String::from_utf8(bytes) {
      Ok(value) => Some(value),
      Err(_) => {
        self.set_error();
        None
      }
    }
  }
}

macro_rules! impl_codec_for_numeric {
  ($($ty:ty),*) => {
    $(
      impl Encode for $ty {
        fn encode(&self, buffer: &mut WriteBuffer) {
          let bytes = match buffer.endianness() {
            Endianness::Little => self.to_le_bytes(),
            Endianness::Big => self.to_be_bytes(),
          };
          buffer.write_bytes(&bytes);
        }
      }

      impl Decode for $ty {
        fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
          let bytes = buffer.read_array::<{ size_of::<$ty>() }>()?;
          Some(match buffer.endianness() {
            Endianness::Little => <$ty>::from_le_bytes(bytes),
            Endianness::Big => <$ty>::from_be_bytes(bytes),
          })
        }
      }
    )*
  };
}

impl_codec_for_numeric!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Encode for bool {
  fn encode(&self, buffer: &mut WriteBuffer) {
    buffer.write_bytes(&[*self as u8]);
  }
}

impl Decode for bool {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
    match buffer.read_array::<1>()? {
      [0] => Some(false),
      [1] => Some(true),
      _ => {
        buffer.set_error();
        None
      }
    }
  }
}

// Length-counted string: u64 byte count, then the bytes, no terminator.
impl Encode for str {
  fn encode(&self, buffer: &mut WriteBuffer) {
    buffer.put(&(self.len() as u64));
    buffer.write_bytes(self.as_bytes());
  }
}

impl Encode for String {
  fn encode(&self, buffer: &mut WriteBuffer) {
    self.as_str().encode(buffer);
  }
}

impl Decode for String {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
    let length = buffer.take::<u64>()? as usize;
    let bytes = buffer.read_bytes(length)?;
    match String::from_utf8(bytes) {
      Ok(value) => Some(value),
      Err(_) => {
        buffer.set_error();
        None
      }
    }
  }
}

// Byte vectors move as one bulk copy rather than per element.
impl Encode for Vec<u8> {
  fn encode(&self, buffer: &mut WriteBuffer) {
    buffer.put(&(self.len() as u64));
    buffer.write_bytes(self);
  }
}

impl Decode for Vec<u8> {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
    let length = buffer.take::<u64>()? as usize;
    buffer.read_bytes(length)
  }
}

impl Encode for [u8] {
  fn encode(&self, buffer: &mut WriteBuffer) {
    buffer.put(&(self.len() as u64));
    buffer.write_bytes(self);
  }
}
