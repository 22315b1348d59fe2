//! Decoder for containerd's bolt databases: the metadata store
//! (`io.containerd.metadata.v1.bolt/meta.db`) and the snapshotter metastore
//! (`metadata.db` of the overlayfs and native snapshotters).
//!
//! Both keep everything under a top level `v1` bucket. The metadata store
//! nests one bucket per namespace below it.

use crate::schema::encoding::{any, digest, go_time, printable, uvarint, varint, Reason};
use crate::schema::{display_path, DecodedRecord, SchemaDecoder};
use crate::Error;
use byteorder::{BigEndian, ByteOrder};
use log::trace;

const V1: &[u8] = b"v1";
const VERSION: &[u8] = b"version";
const LABELS: &[u8] = b"labels";
const CREATED_AT: &[u8] = b"createdat";
const UPDATED_AT: &[u8] = b"updatedat";
const EXPIRE_AT: &[u8] = b"expireat";

const IMAGE: &[u8] = b"image";
const TARGET: &[u8] = b"target";
const DIGEST: &[u8] = b"digest";
const MEDIA_TYPE: &[u8] = b"mediatype";
const SIZE: &[u8] = b"size";

const CONTAINERS: &[u8] = b"containers";
const SANDBOXES: &[u8] = b"sandboxes";
const SPEC: &[u8] = b"spec";
const RUNTIME: &[u8] = b"runtime";
const NAME: &[u8] = b"name";
const OPTIONS: &[u8] = b"options";
const EXTENSIONS: &[u8] = b"extensions";
const SNAPSHOTTER: &[u8] = b"snapshotter";
const SNAPSHOT_KEY: &[u8] = b"snapshotKey";
const SANDBOX_ID: &[u8] = b"sandboxid";

const CONTENT: &[u8] = b"content";
const BLOB: &[u8] = b"blob";
const INGESTS: &[u8] = b"ingests";
const REF: &[u8] = b"ref";
const EXPECTED: &[u8] = b"expected";

const SNAPSHOTS: &[u8] = b"snapshots";
const PARENT: &[u8] = b"parent";
const CHILDREN: &[u8] = b"children";

const LEASES: &[u8] = b"leases";

// snapshotter metastore
const PARENTS: &[u8] = b"parents";
const ID: &[u8] = b"id";
const KIND: &[u8] = b"kind";
const INODES: &[u8] = b"inodes";
const CREATED: &[u8] = b"created";
const UPDATED: &[u8] = b"updated";

/// What an entry is, judged by where it sits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Position {
  Bucket,
  /// A bucket named by a content digest
  DigestBucket,
  SchemaVersion,
  Label,
  Timestamp,
  Text,
  Digest,
  /// Signed varint
  Size,
  Any,
  SnapshotChild,
  /// A lease reference keyed by digest
  LeasedContent,
  LeasedResource,
  SnapshotId,
  SnapshotKind,
  /// Metastore `parents` entry keyed by two big-endian ids
  ParentLink,
  Unknown,
}

impl Position {
  fn classify(path: &[&[u8]], key: &[u8], leaf: bool) -> Position {
    if !leaf {
      return match path {
        [V1, _, CONTENT, BLOB] => Position::DigestBucket,
        _ => Position::Bucket,
      };
    }
    match (path, key) {
      ([V1], VERSION) => Position::SchemaVersion,
      // namespace labels, including a namespace named like a metastore bucket
      ([V1, _, LABELS], _) => Position::Label,

      ([V1, PARENTS], _) => Position::ParentLink,
      ([V1, SNAPSHOTS, _], ID) => Position::SnapshotId,
      ([V1, SNAPSHOTS, _], KIND) => Position::SnapshotKind,
      ([V1, SNAPSHOTS, _], INODES | SIZE) => Position::Size,
      ([V1, SNAPSHOTS, _], PARENT) => Position::Text,
      ([V1, SNAPSHOTS, _], CREATED | UPDATED) => Position::Timestamp,

      ([V1, _, IMAGE, _, TARGET], DIGEST) => Position::Digest,
      ([V1, _, IMAGE, _, TARGET], MEDIA_TYPE) => Position::Text,
      ([V1, _, IMAGE, _, TARGET], SIZE) => Position::Size,

      ([V1, _, CONTAINERS | SANDBOXES, _], SPEC) => Position::Any,
      ([V1, _, CONTAINERS | SANDBOXES, _, RUNTIME], OPTIONS) => Position::Any,
      ([V1, _, CONTAINERS | SANDBOXES, _, RUNTIME], NAME) => Position::Text,
      ([V1, _, CONTAINERS | SANDBOXES, _, EXTENSIONS], _) => Position::Any,
      ([V1, _, CONTAINERS | SANDBOXES, _], IMAGE | SNAPSHOTTER | SNAPSHOT_KEY | SANDBOX_ID) => {
        Position::Text
      }

      ([V1, _, CONTENT, BLOB, _], SIZE) => Position::Size,
      ([V1, _, CONTENT, INGESTS, _], REF) => Position::Text,
      ([V1, _, CONTENT, INGESTS, _], EXPECTED) => Position::Digest,

      ([V1, _, SNAPSHOTS, _, _], NAME | PARENT) => Position::Text,
      ([V1, _, SNAPSHOTS, _, _, CHILDREN], _) => Position::SnapshotChild,

      ([V1, _, LEASES, _, CONTENT], _) => Position::LeasedContent,
      ([V1, _, LEASES, _, SNAPSHOTS, _], _) | ([V1, _, LEASES, _, INGESTS], _) => {
        Position::LeasedResource
      }

      (
        [V1, _, IMAGE | CONTAINERS | SANDBOXES | LEASES, _] | [V1, _, CONTENT, BLOB | INGESTS, _],
        CREATED_AT | UPDATED_AT | EXPIRE_AT,
      ) => Position::Timestamp,
      ([.., LABELS], _) => Position::Label,
      (_, CREATED_AT | UPDATED_AT | EXPIRE_AT) => Position::Timestamp,
      _ => Position::Unknown,
    }
  }

  fn render_key(self, key: &[u8]) -> Result<String, Reason> {
    match self {
      Position::DigestBucket | Position::LeasedContent => digest(key).map(str::to_string),
      Position::ParentLink => parent_link(key),
      _ => Ok(printable(key).into_owned()),
    }
  }

  fn render_value(self, v: &[u8]) -> Result<String, Reason> {
    match self {
      Position::SchemaVersion | Position::Size => varint(v).map(|x| x.to_string()),
      Position::SnapshotId => uvarint(v).map(|x| x.to_string()),
      Position::SnapshotKind => snapshot_kind(v).map(str::to_string),
      Position::Label | Position::Text | Position::ParentLink => text(v),
      Position::Timestamp => go_time(v),
      Position::Digest => digest(v).map(str::to_string),
      Position::Any => any(v),
      Position::SnapshotChild
      | Position::LeasedContent
      | Position::LeasedResource
      | Position::Unknown
      | Position::Bucket
      | Position::DigestBucket => Ok(printable(v).into_owned()),
    }
  }
}

fn text(v: &[u8]) -> Result<String, Reason> {
  std::str::from_utf8(v)
    .map(str::to_string)
    .map_err(|e| format!("expected a string: {e}").into())
}

/// `Kind` of a snapshot, stored as a single byte.
fn snapshot_kind(v: &[u8]) -> Result<&'static str, Reason> {
  match v {
    [0] => Ok("Unknown"),
    [1] => Ok("View"),
    [2] => Ok("Active"),
    [3] => Ok("Committed"),
    [k] => Err(format!("unknown snapshot kind {k}").into()),
    _ => Err(format!("snapshot kind has {} bytes, expected 1", v.len()).into()),
  }
}

/// A metastore parent link key: the parent id then the child id, both
/// big-endian u64.
fn parent_link(key: &[u8]) -> Result<String, Reason> {
  if key.len() != 16 {
    return Err(format!("parent link key has {} bytes, expected 16", key.len()).into());
  }
  let parent = BigEndian::read_u64(&key[..8]);
  let child = BigEndian::read_u64(&key[8..]);
  Ok(format!("{parent}/{child}"))
}

/// Decodes containerd metadata and snapshotter databases.
#[derive(Debug, Default, Copy, Clone)]
pub struct ContainerdDecoder;

impl SchemaDecoder for ContainerdDecoder {
  fn decode(
    &self, path: &[&[u8]], key: &[u8], value: Option<&[u8]>,
  ) -> crate::Result<Option<DecodedRecord>> {
    let position = Position::classify(path, key, value.is_some());
    let fail = |reason: Reason| Error::Decode {
      path: display_path(path),
      key: printable(key).into_owned(),
      reason: reason.into_owned(),
    };
    if position == Position::Unknown {
      trace!(
        "no rule for {},{}; passing through",
        display_path(path),
        printable(key)
      );
    }
    let rendered_key = position.render_key(key).map_err(fail)?;
    let rendered_value = value
      .map(|v| position.render_value(v))
      .transpose()
      .map_err(fail)?;
    Ok(Some(DecodedRecord::new(
      display_path(path),
      rendered_key,
      rendered_value,
    )))
  }
}
