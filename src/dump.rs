//! Walks a database, decodes each entry and streams the records to a sink.

use crate::db::{Bolt, BoltOptions};
use crate::schema::{Resolved, SchemaRegistry, CONTAINERD};
use crate::sink::RecordSink;
use crate::snapshot::PrivateCopy;
use crate::walk::walk;
use getset::{CopyGetters, Getters};
use log::{debug, warn};
use std::path::Path;
use typed_builder::TypedBuilder;

/// Options for [run].
#[derive(Clone, Debug, TypedBuilder, Getters, CopyGetters)]
pub struct DumpOptions {
  /// Name of the schema used to decode entries
  #[builder(default = CONTAINERD.to_string(), setter(into))]
  #[getset(get = "pub")]
  schema: String,
  /// Read a private copy of the file instead of the file itself
  #[builder(default = true)]
  #[getset(get_copy = "pub")]
  copy_source: bool,
  #[builder(default)]
  #[getset(get = "pub")]
  bolt: BoltOptions,
}

impl Default for DumpOptions {
  fn default() -> Self {
    DumpOptions::builder().build()
  }
}

/// Counters collected during a dump.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct DumpStats {
  /// Bucket markers visited
  buckets: u64,
  /// Key/value entries visited
  entries: u64,
  /// Records handed to the sink
  records: u64,
  /// Entries the decoder declined
  declined: u64,
  /// Whether the schema name was recognized
  recognized: bool,
}

/// Decodes every entry of `db` with the resolved decoder and emits the
/// records to `sink` as they are produced.
///
/// Decoder and sink errors stop the walk and are returned wrapped in
/// [crate::Error::Walk].
pub fn dump<S: RecordSink + ?Sized>(
  db: &Bolt, resolved: Resolved<'_>, sink: &mut S,
) -> crate::Result<DumpStats> {
  let decoder = resolved.decoder;
  let mut stats = DumpStats {
    recognized: resolved.recognized,
    ..Default::default()
  };
  walk(db, |path, key, value, _| {
    if value.is_some() {
      stats.entries += 1;
    } else {
      stats.buckets += 1;
    }
    match decoder.decode(path, key, value)? {
      Some(record) => {
        sink.emit(record)?;
        stats.records += 1;
      }
      None => stats.declined += 1,
    }
    Ok(())
  })?;
  debug!("dump finished: {:?}", stats);
  Ok(stats)
}

/// Opens the database at `source` and dumps it with the schema named in
/// `options`.
///
/// An unknown schema is not an error: nothing is emitted and the returned
/// stats report it as unrecognized.
pub fn run<P: AsRef<Path>, S: RecordSink + ?Sized>(
  source: P, options: &DumpOptions, registry: &SchemaRegistry, sink: &mut S,
) -> crate::Result<DumpStats> {
  let resolved = registry.resolve(&options.schema);
  if !resolved.recognized {
    warn!(
      "unknown schema {:?}, known schemas are {:?}",
      options.schema,
      registry.names()
    );
  }

  let copy = if options.copy_source {
    Some(PrivateCopy::new(source.as_ref())?)
  } else {
    None
  };
  let path = copy
    .as_ref()
    .map_or(source.as_ref(), |copy| copy.path());
  let db = options.bolt.clone().open(path)?;
  dump(&db, resolved, sink)
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::schema::encoding::test::put_varint;
  use crate::schema::{ContainerdDecoder, DecodedRecord, SchemaDecoder};
  use crate::sink::LineSink;
  use crate::test_support::TestDb;
  use crate::Error;
  use std::sync::atomic::{AtomicU64, Ordering};

  fn containerd_db() -> TestDb {
    let mut db = TestDb::new();
    let v1 = db.root().bucket("v1");
    v1.put("version", put_varint(3));
    let ns = v1.bucket("default");
    ns.bucket("labels").put("team", "infra");
    ns.bucket("image")
      .bucket("redis:7")
      .bucket("target")
      .put("mediatype", "application/vnd.oci.image.index.v1+json")
      .put("size", put_varint(1234));
    db
  }

  #[test]
  fn test_dump_containerd() -> crate::Result<()> {
    let db = containerd_db().open()?;
    let registry = SchemaRegistry::new();
    let mut sink = LineSink::new(Vec::new());
    let stats = dump(&db, registry.resolve(CONTAINERD), &mut sink)?;
    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(
      "\
,v1
v1,default
v1/default,image
v1/default/image,redis:7
v1/default/image/redis:7,target
v1/default/image/redis:7/target,mediatype=application/vnd.oci.image.index.v1+json
v1/default/image/redis:7/target,size=1234
v1/default,labels
v1/default/labels,team=infra
v1,version=3
",
      out
    );
    assert_eq!(6, stats.buckets());
    assert_eq!(4, stats.entries());
    assert_eq!(10, stats.records());
    Ok(())
  }

  #[test]
  fn test_dump_stops_at_decode_error() -> crate::Result<()> {
    let mut db = TestDb::new();
    let v1 = db.root().bucket("v1");
    v1.bucket("a").put("x", "1");
    v1.bucket("default").bucket("labels").put("bad", [0xff]);
    v1.put("version", put_varint(1));
    let db = db.open()?;
    let mut records: Vec<DecodedRecord> = Vec::new();
    let resolved = Resolved {
      decoder: &ContainerdDecoder,
      recognized: true,
    };
    let result = dump(&db, resolved, &mut records);
    match result {
      Err(Error::Walk(e)) => assert!(matches!(*e, Error::Decode { .. })),
      r => panic!("unexpected result {r:?}"),
    }
    // everything before the failing entry was emitted, nothing after it
    let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(vec!["v1", "a", "x", "default", "labels"], keys);
    Ok(())
  }

  /// Counts the records it decodes.
  struct Counting<'a> {
    decoded: &'a AtomicU64,
  }

  impl SchemaDecoder for Counting<'_> {
    fn decode(
      &self, path: &[&[u8]], key: &[u8], value: Option<&[u8]>,
    ) -> crate::Result<Option<DecodedRecord>> {
      let record = ContainerdDecoder.decode(path, key, value)?;
      if record.is_some() {
        self.decoded.fetch_add(1, Ordering::SeqCst);
      }
      Ok(record)
    }
  }

  /// Checks that each record arrives right after it was decoded.
  struct Immediate<'a> {
    decoded: &'a AtomicU64,
    lines: Vec<String>,
  }

  impl RecordSink for Immediate<'_> {
    fn emit(&mut self, record: DecodedRecord) -> crate::Result<()> {
      let pending = self.decoded.load(Ordering::SeqCst) - self.lines.len() as u64;
      assert_eq!(1, pending, "record {record} was not emitted right away");
      self.lines.push(record.to_string());
      Ok(())
    }
  }

  #[test]
  fn test_dump_streams_records() -> crate::Result<()> {
    let mut db = TestDb::new();
    {
      let b = db.root().bucket("v1").bucket("default").bucket("labels");
      for i in 0..500 {
        b.put(format!("label-{i:03}"), format!("value-{i}"));
      }
    }
    let db = db.open()?;
    let decoded = AtomicU64::new(0);
    let mut sink = Immediate {
      decoded: &decoded,
      lines: vec![],
    };
    let counting = Counting { decoded: &decoded };
    let resolved = Resolved {
      decoder: &counting,
      recognized: true,
    };
    let stats = dump(&db, resolved, &mut sink)?;
    assert_eq!(503, decoded.load(Ordering::SeqCst));
    assert_eq!(503, sink.lines.len());
    assert_eq!(503, stats.records());
    assert_eq!("v1/default/labels,label-000=value-0", sink.lines[3]);
    Ok(())
  }

  #[test]
  fn test_run_unknown_schema() -> crate::Result<()> {
    let db = containerd_db().open()?;
    let options = DumpOptions::builder().schema("etcd").build();
    let mut sink = LineSink::new(Vec::new());
    let stats = run(db.file.path(), &options, &SchemaRegistry::new(), &mut sink)?;
    assert!(!stats.recognized());
    assert_eq!(0, stats.records());
    assert_eq!(10, stats.declined());
    assert!(sink.into_inner().is_empty());
    Ok(())
  }

  #[test]
  fn test_dump_reports_resolved_schema() -> crate::Result<()> {
    let db = containerd_db().open()?;
    let registry = SchemaRegistry::new();
    let mut records: Vec<DecodedRecord> = vec![];
    let stats = dump(&db, registry.resolve("etcd"), &mut records)?;
    assert!(!stats.recognized());
    assert_eq!(10, stats.declined());
    assert!(records.is_empty());

    let stats = dump(&db, registry.resolve(CONTAINERD), &mut records)?;
    assert!(stats.recognized());
    assert_eq!(10, records.len());
    Ok(())
  }

  #[test]
  fn test_run_with_and_without_copy() -> crate::Result<()> {
    let file = containerd_db().write()?;
    let registry = SchemaRegistry::new();
    for copy_source in [true, false] {
      let options = DumpOptions::builder().copy_source(copy_source).build();
      assert_eq!(CONTAINERD, options.schema());
      let mut lines = LineSink::new(Vec::new());
      let stats = run(file.path(), &options, &registry, &mut lines)?;
      assert!(stats.recognized());
      assert_eq!(10, lines.lines());
    }
    Ok(())
  }

  #[test]
  fn test_run_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink: Vec<DecodedRecord> = vec![];
    let result = run(
      dir.path().join("meta.db"),
      &DumpOptions::default(),
      &SchemaRegistry::new(),
      &mut sink,
    );
    assert!(matches!(result, Err(Error::Io(_))));
  }
}
