// Copyright 2026 the Kestrel authors. MIT license.

use kestrel_core::serialization::Decode;
use kestrel_core::serialization::Encode;
use kestrel_core::serialization::ReadBuffer;
use kestrel_core::serialization::WriteBuffer;
use kestrel_core::version::Version;

pub const EXT_JS: &str = ".js";
pub const EXT_MODULE_JS: &str = ".mjs";
pub const EXT_JSON: &str = ".json";
pub const EXT_NATIVE: &str = ".vbin";

pub const ATTRIB_KEY_TYPE: &str = "type";
pub const ATTRIB_KEY_MODULE: &str = "module";
pub const ATTRIB_KEY_VERSION: &str = "version";

const TYPE_VALUE_JS: &str = "javascript";
const TYPE_VALUE_JSON: &str = "json";
const TYPE_VALUE_NATIVE: &str = "native";

/// What kind of asset a module record points at. `NoAttribute` means the
/// import carried no `type` attribute and the kind comes from the file
/// extension; `Invalid` poisons the attributes after a bad value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModuleKind {
  Invalid,
  Javascript,
  Json,
  Native,
  NoAttribute,
}

impl ModuleKind {
  /// Kind implied by a file extension (with its leading dot), if any.
  pub fn for_extension(extension: &str) -> ModuleKind {
    match extension {
      EXT_JS | EXT_MODULE_JS => ModuleKind::Javascript,
      EXT_JSON => ModuleKind::Json,
      EXT_NATIVE => ModuleKind::Native,
      _ => ModuleKind::Invalid,
    }
  }
}

/// The recognized import attributes of one import statement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleAttributes {
  kind: Option<ModuleKind>,
  module: String,
  version: Version,
}

impl ModuleAttributes {
  /// Parses an engine-delivered attribute array of key/value pairs.
  /// Unknown keys are warned about and ignored; a bad value for a known
  /// key poisons the result (`kind() == Invalid`). Blank keys, which some
  /// engine builds produce for padded arrays, are skipped.
  pub fn from_pairs(pairs: &[(String, String)]) -> ModuleAttributes {
    let mut attributes = ModuleAttributes::default();
    for (key, value) in pairs {
      match key.as_str() {
        "" => {}
        ATTRIB_KEY_TYPE => match value.as_str() {
          TYPE_VALUE_JS => attributes.kind = Some(ModuleKind::Javascript),
          TYPE_VALUE_JSON => attributes.kind = Some(ModuleKind::Json),
          TYPE_VALUE_NATIVE => attributes.kind = Some(ModuleKind::Native),
          unknown => {
            log::warn!("unknown {ATTRIB_KEY_TYPE} attribute: {unknown}");
            attributes.kind = Some(ModuleKind::Invalid);
          }
        },
        ATTRIB_KEY_MODULE => {
          attributes.module = value.clone();
        }
        ATTRIB_KEY_VERSION => {
          let version = Version::parse(value);
          if version.is_valid() {
            attributes.version = version;
          } else {
            log::warn!("invalid {ATTRIB_KEY_VERSION} attribute: {value}");
            attributes.kind = Some(ModuleKind::Invalid);
          }
        }
        unknown => {
          log::warn!("unknown attribute: {unknown}");
        }
      }
    }
    attributes
  }

  /// The declared kind, or `NoAttribute` when the import carried none.
  pub fn kind(&self) -> ModuleKind {
    self.kind.unwrap_or(ModuleKind::NoAttribute)
  }

  pub fn module(&self) -> &str {
    &self.module
  }

  pub fn version(&self) -> &Version {
    &self.version
  }

  /// Whether a file extension is compatible with the declared kind.
  pub fn extension_matches_kind(&self, extension: &str) -> bool {
    match self.kind() {
      ModuleKind::Javascript => {
        extension == EXT_JS || extension == EXT_MODULE_JS
      }
      ModuleKind::Json => extension == EXT_JSON,
      ModuleKind::Native => extension == EXT_NATIVE,
      ModuleKind::Invalid | ModuleKind::NoAttribute => false,
    }
  }

  // resolver-built attributes with the kind already settled
  pub(crate) fn resolved(
    kind: ModuleKind,
    module: String,
    version: Version,
  ) -> ModuleAttributes {
    ModuleAttributes {
      kind: Some(kind),
      module,
      version,
    }
  }
}

// Kind tags are part of the snapshot format; keep them stable.
const KIND_TAG_INVALID: u8 = 0;
const KIND_TAG_JAVASCRIPT: u8 = 1;
const KIND_TAG_JSON: u8 = 2;
const KIND_TAG_NATIVE: u8 = 3;
const KIND_TAG_NO_ATTRIBUTE: u8 = 4;

impl Encode for ModuleKind {
  fn encode(&self, buffer: &mut WriteBuffer) {
    let tag = match self {
      ModuleKind::Invalid => KIND_TAG_INVALID,
      ModuleKind::Javascript => KIND_TAG_JAVASCRIPT,
      ModuleKind::Json => KIND_TAG_JSON,
      ModuleKind::Native => KIND_TAG_NATIVE,
      ModuleKind::NoAttribute => KIND_TAG_NO_ATTRIBUTE,
    };
    buffer.put(&tag);
  }
}

impl Decode for ModuleKind {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
    match buffer.take::<u8>()? {
      KIND_TAG_INVALID => Some(ModuleKind::Invalid),
      KIND_TAG_JAVASCRIPT => Some(ModuleKind::Javascript),
      KIND_TAG_JSON => Some(ModuleKind::Json),
      KIND_TAG_NATIVE => Some(ModuleKind::Native),
      KIND_TAG_NO_ATTRIBUTE => Some(ModuleKind::NoAttribute),
      _ => {
        buffer.set_error();
        None
      }
    }
  }
}

impl Encode for ModuleAttributes {
  fn encode(&self, buffer: &mut WriteBuffer) {
    buffer.put(&self.kind()).put(&self.module).put(&self.version);
  }
}

impl Decode for ModuleAttributes {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
    let kind = buffer.take::<ModuleKind>()?;
    let module = buffer.take::<String>()?;
    let version = buffer.take::<Version>()?;
    Some(ModuleAttributes {
      kind: if kind == ModuleKind::NoAttribute {
        None
      } else {
        Some(kind)
      },
      module,
      version,
    })
  }
}
