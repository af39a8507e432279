// Copyright 2026 the Kestrel authors. MIT license.

//! Endian-aware byte streams and the typed codec built on top of them.
//!
//! A buffer is either a [`WriteBuffer`] (append only) or a [`ReadBuffer`]
//! (consume only); there is no type that is both. Any under-read or other
//! codec fault latches a sticky error on the buffer and every later codec
//! call on that buffer becomes a no-op, so a chain of reads can be checked
//! once at the end with [`ReadBuffer::has_errored`].

mod buffer;
mod codec;

pub use buffer::Endianness;
pub use buffer::ReadBuffer;
pub use buffer::WriteBuffer;
pub use codec::Decode;
pub use codec::Encode;
