// Copyright 2026 the Kestrel authors. MIT license.

pub const KESTREL_MAJOR_VERSION: u32 = 0;
pub const KESTREL_MINOR_VERSION: u32 = 1;
pub const KESTREL_PATCH_LEVEL: u32 = 0;
pub const KESTREL_BUILD_NUM: u32 = 0;

/// The runtime version as it appears in snapshot headers.
pub fn version_tuple() -> (u32, u32, u32, u32) {
  (
    KESTREL_MAJOR_VERSION,
    KESTREL_MINOR_VERSION,
    KESTREL_PATCH_LEVEL,
    KESTREL_BUILD_NUM,
  )
}

/// Platform/architecture tag recorded in snapshot headers.
pub fn platform_arch() -> String {
  format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
