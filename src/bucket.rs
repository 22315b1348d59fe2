use crate::common::bucket::{BucketHeader, BUCKET_HEADER_SIZE};
use crate::common::page::tree::leaf::BUCKET_LEAF_FLAG;
use crate::common::page::RefPage;
use crate::common::PgId;
use crate::cursor::{CursorApi, CursorImpl, InnerCursor};
use crate::iter::{BucketIter, EntryIter, ValueBucketIter};
use crate::tx::TxImpl;
use crate::Error;

/// Read-only bucket API
pub trait BucketApi<'tx>: Copy + Clone + 'tx {
  /// Root returns the root of the bucket.
  fn root(&self) -> PgId;

  /// Writable returns whether the bucket is writable.
  fn is_writeable(&self) -> bool {
    false
  }

  /// Cursor creates a cursor associated with the bucket.
  fn cursor(&self) -> CursorImpl<'tx>;

  /// Bucket retrieves a nested bucket by name.
  /// Returns None if the bucket does not exist or the key holds a value.
  fn bucket<T: AsRef<[u8]>>(&self, name: T) -> crate::Result<Option<BucketImpl<'tx>>>;

  /// Get retrieves the value for a key in the bucket.
  /// Returns None if the key does not exist or if the key is a nested bucket.
  fn get<T: AsRef<[u8]>>(&self, key: T) -> crate::Result<Option<&'tx [u8]>>;

  /// Sequence returns the current integer for the bucket without incrementing it.
  fn sequence(&self) -> u64;

  /// ForEach executes a function for each key/value pair in a bucket.
  /// Nested buckets are passed with a None value.
  /// Because ForEach uses a Cursor, the iteration over keys is in lexicographical order.
  /// If the provided function returns an error then the iteration is stopped and
  /// the error is returned to the caller.
  fn for_each<F: FnMut(&'tx [u8], Option<&'tx [u8]>) -> crate::Result<()>>(
    &self, f: F,
  ) -> crate::Result<()>;

  /// ForEachBucket executes a function for each nested bucket in a bucket.
  fn for_each_bucket<F: FnMut(&'tx [u8]) -> crate::Result<()>>(&self, f: F) -> crate::Result<()>;

  /// Iterates over every entry, resolving nested buckets
  fn iter(&self) -> ValueBucketIter<'tx>;

  /// Iterates over the key/value entries only
  fn iter_entries(&self) -> EntryIter<'tx>;

  /// Iterates over the nested buckets only
  fn iter_buckets(&self) -> BucketIter<'tx>;
}

/// A bucket inside a read-only transaction.
#[derive(Copy, Clone)]
pub struct BucketImpl<'tx> {
  tx: TxImpl<'tx>,
  header: BucketHeader,
  /// The root page of an inline bucket, embedded in the parent's value
  inline_page: Option<RefPage<'tx>>,
}

impl<'tx> BucketImpl<'tx> {
  pub(crate) fn new_root(tx: TxImpl<'tx>, header: BucketHeader) -> BucketImpl<'tx> {
    BucketImpl {
      tx,
      header,
      inline_page: None,
    }
  }

  /// Opens the bucket stored in `value`, a bucket header optionally followed
  /// by an inline page.
  pub(crate) fn open(tx: TxImpl<'tx>, value: &'tx [u8]) -> crate::Result<BucketImpl<'tx>> {
    let header = BucketHeader::read(value).ok_or(Error::IncompatibleValue)?;
    let inline_page = if header.is_inline() {
      Some(RefPage::new(&value[BUCKET_HEADER_SIZE..]).ok_or(Error::IncompatibleValue)?)
    } else {
      None
    };
    Ok(BucketImpl {
      tx,
      header,
      inline_page,
    })
  }

  pub(crate) fn tx(&self) -> TxImpl<'tx> {
    self.tx
  }

  /// Returns the page for `id`. Inline buckets only have one page.
  pub(crate) fn page(&self, id: PgId) -> crate::Result<RefPage<'tx>> {
    match self.inline_page {
      Some(page) if id == PgId(0) => Ok(page),
      Some(_) => Err(Error::invalid_page(id, "inline bucket refers to a page")),
      None => self.tx.page(id),
    }
  }

  pub(crate) fn i_cursor(&self) -> InnerCursor<'tx> {
    InnerCursor::new(*self)
  }

  /// Seeks `key` and returns the raw entry if the key matches exactly
  fn lookup(&self, key: &[u8]) -> crate::Result<Option<(&'tx [u8], u32)>> {
    let mut c = self.i_cursor();
    match c.i_seek(key)? {
      Some((k, v, flags)) if k == key => Ok(Some((v, flags))),
      _ => Ok(None),
    }
  }
}

impl<'tx> BucketApi<'tx> for BucketImpl<'tx> {
  fn root(&self) -> PgId {
    self.header.root()
  }

  fn cursor(&self) -> CursorImpl<'tx> {
    CursorImpl::new(self.i_cursor())
  }

  fn bucket<T: AsRef<[u8]>>(&self, name: T) -> crate::Result<Option<BucketImpl<'tx>>> {
    match self.lookup(name.as_ref())? {
      Some((v, flags)) if flags & BUCKET_LEAF_FLAG != 0 => Ok(Some(BucketImpl::open(self.tx, v)?)),
      _ => Ok(None),
    }
  }

  fn get<T: AsRef<[u8]>>(&self, key: T) -> crate::Result<Option<&'tx [u8]>> {
    match self.lookup(key.as_ref())? {
      Some((v, flags)) if flags & BUCKET_LEAF_FLAG == 0 => Ok(Some(v)),
      _ => Ok(None),
    }
  }

  fn sequence(&self) -> u64 {
    self.header.sequence()
  }

  fn for_each<F: FnMut(&'tx [u8], Option<&'tx [u8]>) -> crate::Result<()>>(
    &self, mut f: F,
  ) -> crate::Result<()> {
    let mut c = self.cursor();
    let mut item = c.first()?;
    while let Some((k, v)) = item {
      f(k, v)?;
      item = c.next()?;
    }
    Ok(())
  }

  fn for_each_bucket<F: FnMut(&'tx [u8]) -> crate::Result<()>>(
    &self, mut f: F,
  ) -> crate::Result<()> {
    for item in self.iter_buckets() {
      let (k, _) = item?;
      f(k)?;
    }
    Ok(())
  }

  fn iter(&self) -> ValueBucketIter<'tx> {
    ValueBucketIter::new(self.i_cursor())
  }

  fn iter_entries(&self) -> EntryIter<'tx> {
    EntryIter::new(self.i_cursor())
  }

  fn iter_buckets(&self) -> BucketIter<'tx> {
    BucketIter::new(self.i_cursor())
  }
}
