// Copyright 2026 the Kestrel authors. MIT license.

//! Import resolution over the application asset tree.
//!
//! The engine hands the resolver an import specifier plus the parsed
//! import attributes (`type`, `module`, `version`); the resolver maps
//! them to a typed on-disk asset under the app root and caches the
//! resulting [`ModuleRecord`] per context.

mod attributes;
mod info;
mod resolver;

pub use attributes::ModuleAttributes;
pub use attributes::ModuleKind;
pub use info::ModuleRecord;
pub use resolver::ModuleError;
pub use resolver::ModuleResolver;
