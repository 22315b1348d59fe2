//! Schemas give meaning to the raw keys and values of a database.

use crate::schema::encoding::printable;
use hashbrown::HashMap;
use itertools::Itertools;
use std::fmt::{Display, Formatter};

pub mod containerd;
pub mod encoding;

pub use containerd::ContainerdDecoder;

/// Name of the containerd metadata schema, the default.
pub const CONTAINERD: &str = "containerd";

/// A record ready to be printed: the rendered bucket path, key and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
  pub path: String,
  pub key: String,
  /// None for bucket markers
  pub value: Option<String>,
}

impl DecodedRecord {
  pub fn new<P: Into<String>, K: Into<String>>(
    path: P, key: K, value: Option<String>,
  ) -> DecodedRecord {
    DecodedRecord {
      path: path.into(),
      key: key.into(),
      value,
    }
  }
}

impl Display for DecodedRecord {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match &self.value {
      None => write!(f, "{},{}", self.path, self.key),
      Some(v) => write!(f, "{},{}={}", self.path, self.key, v),
    }
  }
}

/// Renders a bucket path with `/` between names. Root buckets have an empty path.
pub fn display_path(path: &[&[u8]]) -> String {
  path.iter().map(|p| printable(p)).join("/")
}

/// Turns one walked entry into a record.
pub trait SchemaDecoder: Send + Sync {
  /// Decodes the entry at `key` inside the bucket at `path`. `value` is
  /// None when the entry is a nested bucket.
  ///
  /// Returns `Ok(None)` when the schema has nothing to say about the entry.
  fn decode(
    &self, path: &[&[u8]], key: &[u8], value: Option<&[u8]>,
  ) -> crate::Result<Option<DecodedRecord>>;
}

/// Declines every entry.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoopDecoder;

impl SchemaDecoder for NoopDecoder {
  fn decode(
    &self, _path: &[&[u8]], _key: &[u8], _value: Option<&[u8]>,
  ) -> crate::Result<Option<DecodedRecord>> {
    Ok(None)
  }
}

/// The decoder for a schema name, and whether the name was known.
#[derive(Copy, Clone)]
pub struct Resolved<'a> {
  pub decoder: &'a dyn SchemaDecoder,
  pub recognized: bool,
}

/// Maps schema names to their decoders.
pub struct SchemaRegistry {
  decoders: HashMap<&'static str, Box<dyn SchemaDecoder>>,
  noop: NoopDecoder,
}

impl SchemaRegistry {
  pub fn new() -> SchemaRegistry {
    let mut decoders: HashMap<&'static str, Box<dyn SchemaDecoder>> = HashMap::new();
    decoders.insert(CONTAINERD, Box::new(ContainerdDecoder));
    SchemaRegistry {
      decoders,
      noop: NoopDecoder,
    }
  }

  /// Looks up `name`. Unknown names resolve to a [NoopDecoder].
  pub fn resolve(&self, name: &str) -> Resolved<'_> {
    match self.decoders.get(name) {
      Some(decoder) => Resolved {
        decoder: decoder.as_ref(),
        recognized: true,
      },
      None => Resolved {
        decoder: &self.noop,
        recognized: false,
      },
    }
  }

  /// The recognized schema names, sorted.
  pub fn names(&self) -> Vec<&'static str> {
    self.decoders.keys().copied().sorted().collect()
  }
}

impl Default for SchemaRegistry {
  fn default() -> Self {
    SchemaRegistry::new()
  }
}
