// Copyright 2026 the Kestrel authors. MIT license.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use kestrel_core::assets::AppAssetRoots;
use kestrel_core::version::Version;
use thiserror::Error;

use crate::modules::ModuleAttributes;
use crate::modules::ModuleKind;
use crate::modules::ModuleRecord;

#[derive(Debug, Error)]
pub enum ModuleError {
  #[error("no app root is set")]
  NoAppRoot,
  #[error("cannot infer a module kind from {specifier}")]
  UnsupportedExtension { specifier: String },
  #[error("{specifier} does not match its declared type attribute")]
  ExtensionMismatch { specifier: String },
  #[error("the import attributes of {specifier} are invalid")]
  InvalidAttributes { specifier: String },
  #[error("unknown module {module}")]
  UnknownModule { module: String },
  #[error("{specifier} escapes the app root")]
  PathEscapesRoot { specifier: String },
  #[error(
    "{specifier} is already loaded at version {cached}, requested {requested}"
  )]
  VersionConflict {
    specifier: String,
    cached: Version,
    requested: Version,
  },
}

/// Per-context import resolver and module cache.
///
/// Records are cached by `(specifier, kind)`. Re-resolving a cached
/// specifier with a `version` attribute that disagrees with the cached
/// record is a [`ModuleError::VersionConflict`]; the version is
/// deliberately not part of the cache key, so one context never holds two
/// live versions of the same specifier.
///
/// Resolution runs on the isolate's foreground thread; a resolver is not
/// meant to be shared across isolates and takes `&mut self` accordingly.
/// The asset roots are the application shell's; the resolver only reads
/// them.
pub struct ModuleResolver {
  asset_roots: Arc<AppAssetRoots>,
  records: HashMap<(String, ModuleKind), Arc<ModuleRecord>>,
}

impl ModuleResolver {
  pub fn new(asset_roots: Arc<AppAssetRoots>) -> ModuleResolver {
    ModuleResolver {
      asset_roots,
      records: HashMap::new(),
    }
  }

  /// Resolves an import specifier plus attributes to a module record,
  /// creating and caching the record on first sight.
  pub fn resolve(
    &mut self,
    specifier: &str,
    attributes: &ModuleAttributes,
    referrer: Option<&ModuleRecord>,
  ) -> Result<Arc<ModuleRecord>, ModuleError> {
    let kind = self.effective_kind(specifier, attributes)?;

    let (module_name, version) =
      self.select_module_version(attributes, referrer)?;
    let base = self.base_path(&module_name, &version)?;

    let composed = if specifier.starts_with('%')
      || specifier.starts_with('/')
      || specifier.starts_with('\\')
    {
      specifier.to_string()
    } else {
      format!("{}/{specifier}", base.to_string_lossy())
    };
    let path = self
      .asset_roots
      .make_absolute_path_to_app_root(&composed)
      .ok_or_else(|| ModuleError::PathEscapesRoot {
        specifier: specifier.to_string(),
      })?;

    let key = (specifier.to_string(), kind);
    if let Some(existing) = self.records.get(&key) {
      if attributes.version().is_valid()
        && existing.version() != attributes.version()
      {
        return Err(ModuleError::VersionConflict {
          specifier: specifier.to_string(),
          cached: existing.version().clone(),
          requested: attributes.version().clone(),
        });
      }
      return Ok(existing.clone());
    }

    let record = Arc::new(ModuleRecord::new(
      path,
      module_name.clone(),
      version.clone(),
      ModuleAttributes::resolved(kind, module_name, version),
    ));
    self.records.insert(key, record.clone());
    Ok(record)
  }

  /// The cached record for a specifier, if it has been resolved.
  pub fn get(
    &self,
    specifier: &str,
    kind: ModuleKind,
  ) -> Option<Arc<ModuleRecord>> {
    self.records.get(&(specifier.to_string(), kind)).cloned()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Drops every cached record and its engine handles, for context
  /// disposal.
  pub fn reset(&mut self) {
    for record in self.records.values() {
      record.clear_engine_handles();
    }
    self.records.clear();
  }

  fn effective_kind(
    &self,
    specifier: &str,
    attributes: &ModuleAttributes,
  ) -> Result<ModuleKind, ModuleError> {
    let extension = specifier
      .rfind('.')
      .map(|index| &specifier[index..])
      .unwrap_or("");
    match attributes.kind() {
      ModuleKind::Invalid => Err(ModuleError::InvalidAttributes {
        specifier: specifier.to_string(),
      }),
      ModuleKind::NoAttribute => {
        match ModuleKind::for_extension(extension) {
          ModuleKind::Invalid => Err(ModuleError::UnsupportedExtension {
            specifier: specifier.to_string(),
          }),
          inferred => Ok(inferred),
        }
      }
      declared => {
        if attributes.extension_matches_kind(extension) {
          Ok(declared)
        } else {
          Err(ModuleError::ExtensionMismatch {
            specifier: specifier.to_string(),
          })
        }
      }
    }
  }

  // picks the (module, version) pair the import addresses: the attribute
  // module at its requested or latest version, else the referrer's module,
  // else the app itself
  fn select_module_version(
    &self,
    attributes: &ModuleAttributes,
    referrer: Option<&ModuleRecord>,
  ) -> Result<(String, Version), ModuleError> {
    if !attributes.module().is_empty() {
      let module = attributes.module().to_string();
      let version = if attributes.version().is_valid() {
        attributes.version().clone()
      } else {
        self.asset_roots.module_latest_version(&module).ok_or_else(|| {
          ModuleError::UnknownModule {
            module: module.clone(),
          }
        })?
      };
      return Ok((module, version));
    }
    if let Some(referrer) = referrer {
      if !referrer.module_name().is_empty() {
        return Ok((
          referrer.module_name().to_string(),
          referrer.version().clone(),
        ));
      }
    }
    Ok((String::new(), Version::default()))
  }

  // the directory the specifier is interpreted relative to
  fn base_path(
    &self,
    module_name: &str,
    version: &Version,
  ) -> Result<PathBuf, ModuleError> {
    if module_name.is_empty() {
      return self.asset_roots.app_root().ok_or(ModuleError::NoAppRoot);
    }
    self
      .asset_roots
      .find_module_version_root(&format!("{module_name}/{version}"))
      .ok_or_else(|| ModuleError::UnknownModule {
        module: module_name.to_string(),
      })
  }
}

#[cfg(test)]
mod tests {
  use kestrel_core::assets::ROOT_JS;
  use kestrel_core::assets::ROOT_MODULES;
  use kestrel_core::assets::ROOT_RESOURCES;
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;

  fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  fn build_tree() -> (TempDir, Arc<AppAssetRoots>) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("app");
    for dir in [ROOT_JS, ROOT_MODULES, ROOT_RESOURCES] {
      std::fs::create_dir_all(root.join(dir)).unwrap();
    }
    for version in ["1.2.3", "2.0.0"] {
      let module_js =
        root.join(ROOT_MODULES).join("test").join(version).join("js");
      std::fs::create_dir_all(&module_js).unwrap();
      std::fs::write(module_js.join("index.js"), "export default 1;\n")
        .unwrap();
    }
    std::fs::write(root.join(ROOT_JS).join("main.js"), "import 'x';\n")
      .unwrap();

    let roots = Arc::new(AppAssetRoots::new());
    roots.set_app_root(&root).unwrap();
    (tmp, roots)
  }

  #[test]
  fn resolves_an_entry_point_against_the_app_root() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots.clone());
    let record = resolver
      .resolve("js/main.js", &ModuleAttributes::default(), None)
      .unwrap();
    assert_eq!(record.kind(), ModuleKind::Javascript);
    assert_eq!(record.path(), roots.app_root().unwrap().join("js/main.js"));
    assert_eq!(record.module_name(), "");
  }

  #[test]
  fn kind_inference_and_extension_checks() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots);

    let record = resolver
      .resolve("js/data.json", &ModuleAttributes::default(), None)
      .unwrap();
    assert_eq!(record.kind(), ModuleKind::Json);

    assert!(matches!(
      resolver.resolve("js/logo.png", &ModuleAttributes::default(), None),
      Err(ModuleError::UnsupportedExtension { .. })
    ));

    let json_attr =
      ModuleAttributes::from_pairs(&pairs(&[("type", "json")]));
    assert!(matches!(
      resolver.resolve("js/main.js", &json_attr, None),
      Err(ModuleError::ExtensionMismatch { .. })
    ));

    let poisoned =
      ModuleAttributes::from_pairs(&pairs(&[("type", "wasm")]));
    assert!(matches!(
      resolver.resolve("js/main.js", &poisoned, None),
      Err(ModuleError::InvalidAttributes { .. })
    ));
  }

  #[test]
  fn module_attribute_pins_the_version() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots.clone());
    let attributes = ModuleAttributes::from_pairs(&pairs(&[
      ("module", "test"),
      ("version", "1.2.3"),
    ]));
    let record =
      resolver.resolve("js/index.js", &attributes, None).unwrap();
    assert_eq!(
      record.path(),
      roots.app_root().unwrap().join("modules/test/1.2.3/js/index.js")
    );
    assert_eq!(record.module_name(), "test");
    assert_eq!(record.version(), &Version::parse("1.2.3"));
  }

  #[test]
  fn missing_version_attribute_selects_the_latest() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots.clone());
    let attributes =
      ModuleAttributes::from_pairs(&pairs(&[("module", "test")]));
    let record =
      resolver.resolve("js/index.js", &attributes, None).unwrap();
    assert_eq!(
      record.path(),
      roots.app_root().unwrap().join("modules/test/2.0.0/js/index.js")
    );
    assert_eq!(record.version(), &Version::parse("2.0.0"));
  }

  #[test]
  fn unknown_modules_are_rejected() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots);
    let attributes =
      ModuleAttributes::from_pairs(&pairs(&[("module", "nosuch")]));
    assert!(matches!(
      resolver.resolve("js/index.js", &attributes, None),
      Err(ModuleError::UnknownModule { .. })
    ));
  }

  #[test]
  fn referrer_scopes_relative_imports_to_its_module() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots.clone());
    let attributes = ModuleAttributes::from_pairs(&pairs(&[
      ("module", "test"),
      ("version", "1.2.3"),
    ]));
    let referrer =
      resolver.resolve("js/index.js", &attributes, None).unwrap();

    let sibling = resolver
      .resolve(
        "js/helper.js",
        &ModuleAttributes::default(),
        Some(referrer.as_ref()),
      )
      .unwrap();
    assert_eq!(
      sibling.path(),
      roots.app_root().unwrap().join("modules/test/1.2.3/js/helper.js")
    );
    assert_eq!(sibling.module_name(), "test");
  }

  #[test]
  fn escaping_specifiers_are_rejected() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots);
    assert!(matches!(
      resolver.resolve(
        "../../../etc/passwd.js",
        &ModuleAttributes::default(),
        None
      ),
      Err(ModuleError::PathEscapesRoot { .. })
    ));
  }

  #[test]
  fn cache_hits_return_the_same_record() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots);
    let first = resolver
      .resolve("js/main.js", &ModuleAttributes::default(), None)
      .unwrap();
    let second = resolver
      .resolve("js/main.js", &ModuleAttributes::default(), None)
      .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.len(), 1);
    assert_eq!(
      resolver
        .get("js/main.js", ModuleKind::Javascript)
        .map(|r| Arc::ptr_eq(&r, &first)),
      Some(true)
    );

    resolver.reset();
    assert!(resolver.is_empty());
  }

  #[test]
  fn conflicting_version_attributes_are_an_error() {
    let (_tmp, roots) = build_tree();
    let mut resolver = ModuleResolver::new(roots);
    let pinned = ModuleAttributes::from_pairs(&pairs(&[
      ("module", "test"),
      ("version", "1.2.3"),
    ]));
    resolver.resolve("js/index.js", &pinned, None).unwrap();

    let other = ModuleAttributes::from_pairs(&pairs(&[
      ("module", "test"),
      ("version", "2.0.0"),
    ]));
    assert!(matches!(
      resolver.resolve("js/index.js", &other, None),
      Err(ModuleError::VersionConflict { .. })
    ));

    // the unpinned form agrees with whatever is cached
    let unpinned =
      ModuleAttributes::from_pairs(&pairs(&[("module", "test")]));
    let record = resolver.resolve("js/index.js", &unpinned, None).unwrap();
    assert_eq!(record.version(), &Version::parse("1.2.3"));
  }
}
