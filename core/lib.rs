// Copyright 2026 the Kestrel authors. MIT license.

//! Engine-agnostic substrate for the Kestrel embedding runtime: byte
//! buffers and the typed codec, semantic versions, thread primitives,
//! thread-safe queues, worker pools, the application asset tree, and the
//! small containers the snapshot layer is built on.

pub mod assets;
pub mod callbacks;
pub mod clock;
pub mod named_indexes;
pub mod pools;
pub mod queues;
pub mod serialization;
pub mod threads;
pub mod version;

pub use assets::AppAssetRoots;
pub use assets::AssetsError;
pub use callbacks::Callback;
pub use clock::Clock;
pub use clock::ManualClock;
pub use named_indexes::NamedIndexes;
pub use pools::DelayedWorkerPool;
pub use pools::WorkerPool;
pub use queues::DelayedQueue;
pub use queues::ThreadSafeQueue;
pub use serialization::Decode;
pub use serialization::Encode;
pub use serialization::Endianness;
pub use serialization::ReadBuffer;
pub use serialization::WriteBuffer;
pub use threads::ThreadPriority;
pub use version::Version;
