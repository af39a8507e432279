// Copyright 2026 the Kestrel authors. MIT license.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::serialization::Decode;
use crate::serialization::Encode;
use crate::serialization::ReadBuffer;
use crate::serialization::WriteBuffer;

// The grammar from semver.org, anchored.
static SEMVER_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
  )
  .unwrap()
});

/// A Semantic Versioning 2.0.0 version string.
///
/// Parsing never fails outright; an unparsable input yields a value with
/// `is_valid() == false` that orders before every valid version. Ordering
/// follows SemVer §11: build metadata is ignored, numeric pre-release
/// identifiers compare numerically and sort before alphanumeric ones, and
/// a longer pre-release list wins when the common prefix is equal.
#[derive(Clone, Debug, Default)]
pub struct Version {
  raw: String,
  valid: bool,
  major: u64,
  minor: u64,
  patch: u64,
  pre_release: String,
  build: String,
}

impl Version {
  pub fn parse(input: &str) -> Version {
    let mut version = Version {
      raw: input.to_string(),
      ..Default::default()
    };
    let Some(captures) = SEMVER_RE.captures(input) else {
      return version;
    };
    // the numeric groups matched `0|[1-9]\d*`, so the only parse failure
    // left is overflow
    let number = |idx: usize| captures[idx].parse::<u64>().ok();
    let (Some(major), Some(minor), Some(patch)) =
      (number(1), number(2), number(3))
    else {
      return version;
    };
    version.major = major;
    version.minor = minor;
    version.patch = patch;
    version.pre_release =
      captures.get(4).map_or(String::new(), |m| m.as_str().to_string());
    version.build =
      captures.get(5).map_or(String::new(), |m| m.as_str().to_string());
    version.valid = true;
    version
  }

  pub fn is_valid(&self) -> bool {
    self.valid
  }

  pub fn major(&self) -> u64 {
    self.major
  }

  pub fn minor(&self) -> u64 {
    self.minor
  }

  pub fn patch(&self) -> u64 {
    self.patch
  }

  pub fn pre_release(&self) -> &str {
    &self.pre_release
  }

  pub fn build(&self) -> &str {
    &self.build
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  fn compare_pre_release(left: &str, right: &str) -> Ordering {
    match (left.is_empty(), right.is_empty()) {
      (true, true) => return Ordering::Equal,
      // a release sorts after any of its pre-releases
      (true, false) => return Ordering::Greater,
      (false, true) => return Ordering::Less,
      (false, false) => {}
    }
    let lefts: Vec<&str> = left.split('.').collect();
    let rights: Vec<&str> = right.split('.').collect();
    for (l, r) in lefts.iter().zip(rights.iter()) {
      let ordering = match (l.parse::<u64>().ok(), r.parse::<u64>().ok()) {
        (Some(ln), Some(rn)) => ln.cmp(&rn),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => l.cmp(r),
      };
      if ordering != Ordering::Equal {
        return ordering;
      }
    }
    lefts.len().cmp(&rights.len())
  }
}

impl PartialEq for Version {
  fn eq(&self, other: &Version) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Version {}

impl Ord for Version {
  fn cmp(&self, other: &Version) -> Ordering {
    match (self.valid, other.valid) {
      (false, false) => return Ordering::Equal,
      (false, true) => return Ordering::Less,
      (true, false) => return Ordering::Greater,
      (true, true) => {}
    }
    self
      .major
      .cmp(&other.major)
      .then(self.minor.cmp(&other.minor))
      .then(self.patch.cmp(&other.patch))
      .then_with(|| {
        Version::compare_pre_release(&self.pre_release, &other.pre_release)
      })
  }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

// Versions travel through snapshots as their string form; reading
// re-parses so the validity flag is recomputed rather than trusted.
impl Encode for Version {
  fn encode(&self, buffer: &mut WriteBuffer) {
    buffer.put(&self.raw);
  }
}

impl Decode for Version {
  fn decode(buffer: &mut ReadBuffer) -> Option<Self> {
    buffer.take::<String>().map(|raw| Version::parse(&raw))
  }
}
