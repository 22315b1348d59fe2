//! Builds small Bolt files for tests.
//!
//! The layout matches what bbolt produces after a fresh commit: two meta
//! pages, an empty freelist at page 2, then the bucket trees. Small buckets
//! without nested buckets are stored inline in their parent's value.

use crate::common::bucket::BucketHeader;
use crate::common::defaults::{MAGIC, VERSION};
use crate::common::page::freelist::FREE_LIST_PAGE_FLAG;
use crate::common::page::meta::{Meta, META_PAGE_FLAG};
use crate::common::page::tree::branch::{BranchPageElement, BRANCH_PAGE_FLAG};
use crate::common::page::tree::leaf::{LeafPageElement, BUCKET_LEAF_FLAG, LEAF_PAGE_FLAG};
use crate::common::page::{PageHeader, PAGE_HEADER_SIZE};
use crate::common::{PgId, TxId};
use crate::Bolt;
use std::collections::BTreeMap;
use std::io::Write;
use std::ops::Deref;
use tempfile::{Builder, NamedTempFile};

const ELEMENT_SIZE: usize = 16;

enum TestEntry {
  Value(Vec<u8>),
  Bucket(TestBucket),
}

#[derive(Default)]
pub(crate) struct TestBucket {
  sequence: u64,
  entries: BTreeMap<Vec<u8>, TestEntry>,
}

impl TestBucket {
  /// Returns the nested bucket `name`, creating it if needed.
  pub(crate) fn bucket<T: AsRef<[u8]>>(&mut self, name: T) -> &mut TestBucket {
    let entry = self
      .entries
      .entry(name.as_ref().to_vec())
      .or_insert_with(|| TestEntry::Bucket(TestBucket::default()));
    match entry {
      TestEntry::Bucket(b) => b,
      TestEntry::Value(_) => panic!("key already holds a value"),
    }
  }

  pub(crate) fn bucket_path<T: AsRef<[u8]>>(&mut self, names: &[T]) -> &mut TestBucket {
    names.iter().fold(self, |b, name| b.bucket(name))
  }

  pub(crate) fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&mut self, key: K, value: V) -> &mut Self {
    self.entries.insert(
      key.as_ref().to_vec(),
      TestEntry::Value(value.as_ref().to_vec()),
    );
    self
  }

  pub(crate) fn set_sequence(&mut self, sequence: u64) -> &mut Self {
    self.sequence = sequence;
    self
  }

  fn has_buckets(&self) -> bool {
    self
      .entries
      .values()
      .any(|e| matches!(e, TestEntry::Bucket(_)))
  }
}

pub(crate) struct TestDb {
  page_size: usize,
  root: TestBucket,
}

impl TestDb {
  pub(crate) fn new() -> TestDb {
    TestDb::with_page_size(4096)
  }

  pub(crate) fn with_page_size(page_size: usize) -> TestDb {
    TestDb {
      page_size,
      root: TestBucket::default(),
    }
  }

  pub(crate) fn root(&mut self) -> &mut TestBucket {
    &mut self.root
  }

  /// Serializes the database into its on-disk form.
  pub(crate) fn to_bytes(&self) -> Vec<u8> {
    let mut w = PageWriter {
      page_size: self.page_size,
      data: vec![0u8; self.page_size * 3],
      next: PgId(3),
    };
    let items = leaf_items(&mut w, &self.root);
    let root = w.write_tree(items);

    let freelist = PageHeader {
      id: PgId(2),
      flags: FREE_LIST_PAGE_FLAG,
      count: 0,
      overflow: 0,
    };
    w.data[self.page_size * 2..self.page_size * 2 + PAGE_HEADER_SIZE]
      .copy_from_slice(bytemuck::bytes_of(&freelist));

    for i in 0..2u64 {
      let mut meta = Meta::default();
      meta
        .set_magic(MAGIC)
        .set_version(VERSION)
        .set_page_size(self.page_size as u32)
        .set_root(BucketHeader::new(root, 0))
        .set_free_list(PgId(2))
        .set_pgid(w.next)
        .set_txid(TxId(i));
      let checksum = meta.sum64();
      meta.set_checksum(checksum);
      let header = PageHeader {
        id: PgId(i),
        flags: META_PAGE_FLAG,
        count: 0,
        overflow: 0,
      };
      let start = i as usize * self.page_size;
      let mut bytes = bytemuck::bytes_of(&header).to_vec();
      bytes.extend_from_slice(bytemuck::bytes_of(&meta));
      w.data[start..start + bytes.len()].copy_from_slice(&bytes);
    }
    w.data
  }

  /// Writes the database to a new temporary file.
  pub(crate) fn write(&self) -> crate::Result<NamedTempFile> {
    let mut file = Builder::new()
      .prefix("bbolt-dump-")
      .suffix(".db")
      .tempfile()?;
    file.write_all(&self.to_bytes())?;
    file.flush()?;
    Ok(file)
  }

  pub(crate) fn open(&self) -> crate::Result<OpenedTestDb> {
    let file = self.write()?;
    let db = Bolt::open(file.path())?;
    Ok(OpenedTestDb { db, file })
  }
}

/// An open database and the file backing it. The handle is dropped before the file.
pub(crate) struct OpenedTestDb {
  pub(crate) db: Bolt,
  pub(crate) file: NamedTempFile,
}

impl Deref for OpenedTestDb {
  type Target = Bolt;

  fn deref(&self) -> &Self::Target {
    &self.db
  }
}

type Item = (u32, Vec<u8>, Vec<u8>);

struct PageWriter {
  page_size: usize,
  data: Vec<u8>,
  next: PgId,
}

/// Turns the entries of `bucket` into leaf items, writing nested buckets first.
fn leaf_items(w: &mut PageWriter, bucket: &TestBucket) -> Vec<Item> {
  bucket
    .entries
    .iter()
    .map(|(k, e)| match e {
      TestEntry::Value(v) => (0, k.clone(), v.clone()),
      TestEntry::Bucket(b) => (BUCKET_LEAF_FLAG, k.clone(), bucket_value(w, b)),
    })
    .collect()
}

fn bucket_value(w: &mut PageWriter, bucket: &TestBucket) -> Vec<u8> {
  let items = leaf_items(w, bucket);
  let inline = leaf_page(PgId(0), &items);
  if !bucket.has_buckets() && BUCKET_HEADER_LEN + inline.len() <= w.page_size / 4 {
    let mut value = bytemuck::bytes_of(&BucketHeader::new(PgId(0), bucket.sequence)).to_vec();
    value.extend_from_slice(&inline);
    return value;
  }
  let root = w.write_tree(items);
  bytemuck::bytes_of(&BucketHeader::new(root, bucket.sequence)).to_vec()
}

const BUCKET_HEADER_LEN: usize = std::mem::size_of::<BucketHeader>();

fn leaf_page(id: PgId, items: &[Item]) -> Vec<u8> {
  let data_start = PAGE_HEADER_SIZE + items.len() * ELEMENT_SIZE;
  let mut elems = Vec::with_capacity(items.len() * ELEMENT_SIZE);
  let mut data = Vec::new();
  for (i, (flags, k, v)) in items.iter().enumerate() {
    let elem_offset = PAGE_HEADER_SIZE + i * ELEMENT_SIZE;
    let pos = data_start + data.len() - elem_offset;
    let elem = LeafPageElement::new(*flags, pos as u32, k.len() as u32, v.len() as u32);
    elems.extend_from_slice(bytemuck::bytes_of(&elem));
    data.extend_from_slice(k);
    data.extend_from_slice(v);
  }
  page_bytes(id, LEAF_PAGE_FLAG, items.len(), &elems, &data)
}

fn branch_page(id: PgId, items: &[(Vec<u8>, PgId)]) -> Vec<u8> {
  let data_start = PAGE_HEADER_SIZE + items.len() * ELEMENT_SIZE;
  let mut elems = Vec::with_capacity(items.len() * ELEMENT_SIZE);
  let mut data = Vec::new();
  for (i, (k, pgid)) in items.iter().enumerate() {
    let elem_offset = PAGE_HEADER_SIZE + i * ELEMENT_SIZE;
    let pos = data_start + data.len() - elem_offset;
    let elem = BranchPageElement::new(pos as u32, k.len() as u32, *pgid);
    elems.extend_from_slice(bytemuck::bytes_of(&elem));
    data.extend_from_slice(k);
  }
  page_bytes(id, BRANCH_PAGE_FLAG, items.len(), &elems, &data)
}

fn page_bytes(id: PgId, flags: u16, count: usize, elems: &[u8], data: &[u8]) -> Vec<u8> {
  let header = PageHeader {
    id,
    flags,
    count: count as u16,
    overflow: 0,
  };
  let mut bytes = bytemuck::bytes_of(&header).to_vec();
  bytes.extend_from_slice(elems);
  bytes.extend_from_slice(data);
  bytes
}

/// Splits `items` into runs whose encoded size fits in a page, keeping at
/// least `min` items per run.
fn split<T>(items: Vec<T>, page_size: usize, min: usize, size: impl Fn(&T) -> usize) -> Vec<Vec<T>> {
  let mut runs = vec![];
  let mut run: Vec<T> = vec![];
  let mut used = PAGE_HEADER_SIZE;
  for item in items {
    let n = ELEMENT_SIZE + size(&item);
    if run.len() >= min && used + n > page_size {
      runs.push(std::mem::take(&mut run));
      used = PAGE_HEADER_SIZE;
    }
    used += n;
    run.push(item);
  }
  if !run.is_empty() || runs.is_empty() {
    runs.push(run);
  }
  runs
}

impl PageWriter {
  /// Appends a page, spilling into overflow pages as needed.
  fn alloc(&mut self, mut bytes: Vec<u8>) -> PgId {
    let id = self.next;
    let pages = bytes.len().div_ceil(self.page_size).max(1);
    let header = PageHeader {
      id,
      overflow: (pages - 1) as u32,
      ..bytemuck::pod_read_unaligned(&bytes[..PAGE_HEADER_SIZE])
    };
    bytes[..PAGE_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
    bytes.resize(pages * self.page_size, 0);
    self.data.extend_from_slice(&bytes);
    self.next = self.next + pages as u64;
    id
  }

  /// Writes a B+tree holding `items` and returns its root page.
  fn write_tree(&mut self, items: Vec<Item>) -> PgId {
    let mut level: Vec<(Vec<u8>, PgId)> = split(items, self.page_size, 1, |(_, k, v)| {
      k.len() + v.len()
    })
    .into_iter()
    .map(|run| {
      let first = run.first().map(|(_, k, _)| k.clone()).unwrap_or_default();
      (first, self.alloc(leaf_page(PgId(0), &run)))
    })
    .collect();

    while level.len() > 1 {
      level = split(level, self.page_size, 2, |(k, _)| k.len())
        .into_iter()
        .map(|run| (run[0].0.clone(), self.alloc(branch_page(PgId(0), &run))))
        .collect();
    }
    level[0].1
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{BucketApi, DbApi, TxApi};

  #[test]
  fn test_layout() -> crate::Result<()> {
    let mut db = TestDb::new();
    db.root().bucket("widgets").put("foo", "bar");
    let bytes = db.to_bytes();
    // meta, meta, freelist and the root leaf
    assert_eq!(4 * 4096, bytes.len());
    let opened = db.open()?;
    let info = opened.info()?;
    assert_eq!(PgId(4), info.high_water_mark());
    assert_eq!(PgId(3), info.root().root());
    let tx = opened.begin();
    assert!(tx.bucket("widgets")?.unwrap().root() == PgId(0));
    Ok(())
  }
}
