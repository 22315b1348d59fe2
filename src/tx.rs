use crate::bucket::{BucketApi, BucketImpl};
use crate::common::page::RefPage;
use crate::common::{PgId, TxId};
use crate::db::Bolt;
use crate::iter::BucketIter;

/// Read-only transaction API
pub trait TxApi<'tx>: Copy + Clone + 'tx {
  /// ID returns the transaction id.
  fn id(&self) -> TxId;

  /// Writable returns whether the transaction can perform write operations.
  /// Always false: a dump never opens a write transaction.
  fn writeable(&self) -> bool {
    false
  }

  /// Returns the database page size
  fn page_size(&self) -> usize;

  /// Returns the root bucket, which holds every top level bucket
  fn root(&self) -> BucketImpl<'tx>;

  /// Bucket retrieves a top level bucket by name.
  /// Returns None if the bucket does not exist.
  fn bucket<T: AsRef<[u8]>>(&self, name: T) -> crate::Result<Option<BucketImpl<'tx>>> {
    self.root().bucket(name)
  }

  /// Retrieves a nested bucket by following `names` from the root.
  fn bucket_path<T: AsRef<[u8]>>(&self, names: &[T]) -> crate::Result<Option<BucketImpl<'tx>>> {
    let mut bucket = self.root();
    for name in names {
      match bucket.bucket(name)? {
        Some(b) => bucket = b,
        None => return Ok(None),
      }
    }
    Ok(Some(bucket))
  }

  /// ForEach executes a function for each top level bucket.
  /// If the provided function returns an error then the iteration is stopped and
  /// the error is returned to the caller.
  fn for_each<F: FnMut(&'tx [u8], BucketImpl<'tx>) -> crate::Result<()>>(
    &self, mut f: F,
  ) -> crate::Result<()> {
    for item in self.iter_buckets() {
      let (name, bucket) = item?;
      f(name, bucket)?;
    }
    Ok(())
  }

  /// Iterates over the top level buckets in key order
  fn iter_buckets(&self) -> BucketIter<'tx> {
    self.root().iter_buckets()
  }
}

#[derive(Copy, Clone)]
pub struct TxImpl<'tx> {
  db: &'tx Bolt,
}

impl<'tx> TxImpl<'tx> {
  pub(crate) fn new(db: &'tx Bolt) -> TxImpl<'tx> {
    TxImpl { db }
  }

  pub(crate) fn page(&self, id: PgId) -> crate::Result<RefPage<'tx>> {
    self.db.page(id)
  }
}

impl<'tx> TxApi<'tx> for TxImpl<'tx> {
  fn id(&self) -> TxId {
    self.db.meta().txid()
  }

  fn page_size(&self) -> usize {
    self.db.page_size()
  }

  fn root(&self) -> BucketImpl<'tx> {
    BucketImpl::new_root(*self, self.db.meta().root())
  }
}
