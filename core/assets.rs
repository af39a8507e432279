// Copyright 2026 the Kestrel authors. MIT license.

//! The application asset tree.
//!
//! An app root contains `js/` (app scripts), `modules/<name>/<semver>/`
//! (third-party modules), and `resources/`. [`AppAssetRoots`] validates
//! and scans that tree once, tracks the per-module version directories and
//! the latest version of each module, and builds paths that are guaranteed
//! not to escape the root.
//!
//! Path inputs may use `\` or `/`; outputs always use `/`. The special
//! leading tokens `%APPROOT%`, `%JS%`, `%MODULES%`, and `%RESOURCES%`
//! expand to the corresponding directory; tokens anywhere else in a path
//! are kept verbatim. All containment checks are lexical: `..` segments
//! are resolved without consulting the filesystem, and any path that would
//! climb out of the app root is rejected.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::RwLock;
use thiserror::Error;

use crate::version::Version;

pub const ROOT_JS: &str = "js";
pub const ROOT_MODULES: &str = "modules";
pub const ROOT_RESOURCES: &str = "resources";

pub const TOKEN_APP_ROOT: &str = "%APPROOT%";
pub const TOKEN_JS: &str = "%JS%";
pub const TOKEN_MODULES: &str = "%MODULES%";
pub const TOKEN_RESOURCES: &str = "%RESOURCES%";

#[derive(Debug, Error)]
pub enum AssetsError {
  #[error("the app root is already set")]
  RootAlreadySet,
  #[error("app root {} does not exist or is not a directory", .0.display())]
  RootNotADirectory(PathBuf),
  #[error("failed to find the {0} directory in the app root")]
  MissingRootDirectory(&'static str),
  #[error("failed to scan {}", .path.display())]
  Scan {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Default)]
struct Inner {
  app_root: Option<PathBuf>,
  // keyed "name/version", plus the js and resources pseudo roots
  module_roots: BTreeMap<String, PathBuf>,
  latest_versions: BTreeMap<String, Version>,
}

/// Root paths and module-version bookkeeping for one application tree.
#[derive(Default)]
pub struct AppAssetRoots {
  inner: RwLock<Inner>,
}

impl AppAssetRoots {
  pub fn new() -> AppAssetRoots {
    AppAssetRoots::default()
  }

  /// Sets the app root, validates the tree, and scans `modules/` for
  /// versioned module directories. The root can be set successfully only
  /// once; directories whose name is not a valid semver are skipped.
  pub fn set_app_root(
    &self,
    path: impl AsRef<Path>,
  ) -> Result<(), AssetsError> {
    let path = path.as_ref();
    let mut inner = self.inner.write();
    if inner.app_root.is_some() {
      return Err(AssetsError::RootAlreadySet);
    }
    if !path.is_dir() {
      return Err(AssetsError::RootNotADirectory(path.to_path_buf()));
    }
    for required in [ROOT_JS, ROOT_MODULES, ROOT_RESOURCES] {
      if !path.join(required).is_dir() {
        log::error!(
          "failed to find the {required} directory in the app root"
        );
        return Err(AssetsError::MissingRootDirectory(required));
      }
    }

    let mut module_roots = BTreeMap::new();
    let mut latest_versions: BTreeMap<String, Version> = BTreeMap::new();
    let modules_dir = path.join(ROOT_MODULES);
    let entries =
      std::fs::read_dir(&modules_dir).map_err(|source| AssetsError::Scan {
        path: modules_dir.clone(),
        source,
      })?;
    for entry in entries.flatten() {
      if !entry.path().is_dir() {
        continue;
      }
      let module_name = entry.file_name().to_string_lossy().into_owned();
      let version_entries =
        std::fs::read_dir(entry.path()).map_err(|source| {
          AssetsError::Scan {
            path: entry.path(),
            source,
          }
        })?;
      for version_entry in version_entries.flatten() {
        if !version_entry.path().is_dir() {
          continue;
        }
        let version_name =
          version_entry.file_name().to_string_lossy().into_owned();
        let version = Version::parse(&version_name);
        if !version.is_valid() {
          log::warn!(
            "skipping module directory {module_name}/{version_name}: not a \
             semver"
          );
          continue;
        }
        module_roots.insert(
          format!("{module_name}/{version_name}"),
          version_entry.path(),
        );
        match latest_versions.get(&module_name) {
          Some(latest) if *latest >= version => {}
          _ => {
            latest_versions.insert(module_name.clone(), version);
          }
        }
      }
    }
    // the js and resources trees resolve like pseudo modules
    module_roots.insert(ROOT_JS.to_string(), path.join(ROOT_JS));
    module_roots
      .insert(ROOT_RESOURCES.to_string(), path.join(ROOT_RESOURCES));

    inner.app_root = Some(path.to_path_buf());
    inner.module_roots = module_roots;
    inner.latest_versions = latest_versions;
    Ok(())
  }

  pub fn app_root(&self) -> Option<PathBuf> {
    self.inner.read().app_root.clone()
  }

  /// Registers a module root under an explicit key (usually
  /// `name/version`). Returns false if the key is already taken.
  pub fn add_module_root(
    &self,
    module: impl Into<String>,
    path: impl Into<PathBuf>,
  ) -> bool {
    let mut inner = self.inner.write();
    let module = module.into();
    if inner.module_roots.contains_key(&module) {
      return false;
    }
    inner.module_roots.insert(module, path.into());
    true
  }

  pub fn remove_module_root(&self, module: &str) {
    self.inner.write().module_roots.remove(module);
  }

  /// Looks up a module root by its `name/version` key.
  pub fn find_module_version_root(&self, module: &str) -> Option<PathBuf> {
    self.inner.read().module_roots.get(module).cloned()
  }

  /// Looks up the root of the latest known version of a module.
  pub fn find_module_latest_version_root(
    &self,
    module: &str,
  ) -> Option<PathBuf> {
    let inner = self.inner.read();
    let latest = inner.latest_versions.get(module)?;
    inner.module_roots.get(&format!("{module}/{latest}")).cloned()
  }

  pub fn set_module_latest_version(&self, module: &str, version: Version) {
    self
      .inner
      .write()
      .latest_versions
      .insert(module.to_string(), version);
  }

  pub fn module_latest_version(&self, module: &str) -> Option<Version> {
    self.inner.read().latest_versions.get(module).cloned()
  }

  pub fn remove_module_latest_version(&self, module: &str) {
    self.inner.write().latest_versions.remove(module);
  }

  /// Makes `path` relative to the app root. Returns `None` when the input
  /// lexically escapes the root (or no root is set). Absolute inputs that
  /// do not start with the app root are treated as anchored at it, so
  /// `/js/x.js` and `js/x.js` resolve alike.
  pub fn make_relative_path_to_app_root(
    &self,
    path: impl AsRef<str>,
  ) -> Option<PathBuf> {
    let inner = self.inner.read();
    let root = root_string(inner.app_root.as_deref()?);
    let input = path.as_ref().replace('\\', "/");
    if input.is_empty() {
      return None;
    }
    let expanded = replace_leading_token(&input, "")?;
    let anchored = if let Some(rest) = strip_root(&expanded, &root) {
      rest.to_string()
    } else if let Some(rest) = expanded.strip_prefix('/') {
      if rest.is_empty() {
        // bare "/" addresses nothing inside the root
        return None;
      }
      rest.to_string()
    } else {
      expanded
    };
    normalize_lexically(&anchored).map(PathBuf::from)
  }

  /// Makes an absolute path under the app root, rejecting escapes the
  /// same way as [`make_relative_path_to_app_root`].
  pub fn make_absolute_path_to_app_root(
    &self,
    path: impl AsRef<str>,
  ) -> Option<PathBuf> {
    let relative = self.make_relative_path_to_app_root(path)?;
    let root = self.inner.read().app_root.clone()?;
    Some(root.join(relative))
  }
}

fn root_string(root: &Path) -> String {
  let mut root = root.to_string_lossy().replace('\\', "/");
  while root.len() > 1 && root.ends_with('/') {
    root.pop();
  }
  root
}

// Strips `root` (plus its separator) off an absolute input, refusing
// sibling prefixes like /opt/appx for a root of /opt/app.
fn strip_root<'a>(input: &'a str, root: &str) -> Option<&'a str> {
  if input == root {
    return Some("");
  }
  let rest = input.strip_prefix(root)?;
  rest.strip_prefix('/')
}

// Expands a token only in leading position; tokens embedded later in the
// path are preserved verbatim. `app_root` is what %APPROOT% becomes (the
// empty string when building root-relative paths).
fn replace_leading_token(input: &str, app_root: &str) -> Option<String> {
  for (token, replacement) in [
    (TOKEN_APP_ROOT, app_root),
    (TOKEN_JS, ROOT_JS),
    (TOKEN_MODULES, ROOT_MODULES),
    (TOKEN_RESOURCES, ROOT_RESOURCES),
  ] {
    if let Some(rest) = input.strip_prefix(token) {
      if rest.is_empty() {
        return Some(replacement.to_string());
      }
      let rest = rest.strip_prefix('/')?;
      if replacement.is_empty() {
        return Some(rest.to_string());
      }
      return Some(format!("{replacement}/{rest}"));
    }
  }
  Some(input.to_string())
}

// Resolves `.` and `..` segments of a root-relative path without touching
// the filesystem. `None` means the path climbed above its start.
fn normalize_lexically(input: &str) -> Option<String> {
  let mut segments: Vec<&str> = Vec::new();
  for segment in input.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop()?;
      }
      other => segments.push(other),
    }
  }
  Some(segments.join("/"))
}
