// Copyright 2026 the Kestrel authors. MIT license.

//! Engine-facing layer of the Kestrel embedding runtime.
//!
//! The embedded JavaScript engine is an opaque dependency; [`engine`]
//! defines the traits it is driven through. On top of the scheduling and
//! asset substrate in `kestrel_core`, this crate provides the per-isolate
//! foreground task runner, the platform adapter singleton that routes the
//! engine's scheduling requests onto worker pools, the import resolver
//! over the application asset tree, and the snapshot create/load protocol
//! for host companion state.

pub mod engine;
pub mod jobs;
pub mod modules;
pub mod nestable_queue;
pub mod platform;
pub mod registry;
pub mod snapshot;
pub mod task_runner;
pub mod version;

pub use engine::BlockingType;
pub use engine::BoxedIdleTask;
pub use engine::BoxedTask;
pub use engine::ForegroundRunner;
pub use engine::IdleTask;
pub use engine::IsolateHelper;
pub use engine::IsolateId;
pub use engine::JobDelegate;
pub use engine::JobTask;
pub use engine::Task;
pub use engine::TaskPriority;
pub use jobs::JobHandle;
pub use modules::ModuleAttributes;
pub use modules::ModuleError;
pub use modules::ModuleKind;
pub use modules::ModuleRecord;
pub use modules::ModuleResolver;
pub use nestable_queue::Nestability;
pub use nestable_queue::NestableQueue;
pub use platform::Platform;
pub use registry::CallbackRegistry;
pub use registry::NativeObject;
pub use registry::ObjInfo;
pub use snapshot::SnapshotApp;
pub use snapshot::SnapshotCreator;
pub use snapshot::SnapshotError;
pub use snapshot::SnapshotProvider;
pub use task_runner::TaskRunScope;
pub use task_runner::TaskRunner;
pub use task_runner::WorkerTaskRunner;
