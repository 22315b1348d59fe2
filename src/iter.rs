use crate::bucket::BucketImpl;
use crate::common::page::tree::leaf::BUCKET_LEAF_FLAG;
use crate::cursor::InnerCursor;

/// Walks a cursor forward, yielding raw key, value and flags.
/// Iteration stops after the first error.
#[derive(Clone)]
struct KvIter<'tx> {
  c: InnerCursor<'tx>,
  started: bool,
  done: bool,
}

impl<'tx> KvIter<'tx> {
  fn new(c: InnerCursor<'tx>) -> KvIter<'tx> {
    KvIter {
      c,
      started: false,
      done: false,
    }
  }
}

impl<'tx> Iterator for KvIter<'tx> {
  type Item = crate::Result<(&'tx [u8], &'tx [u8], u32)>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    let r = if self.started {
      self.c.i_next()
    } else {
      self.started = true;
      self.c.i_first()
    };
    match r {
      Ok(Some(kv)) => Some(Ok(kv)),
      Ok(None) => {
        self.done = true;
        None
      }
      Err(e) => {
        self.done = true;
        Some(Err(e))
      }
    }
  }
}

/// Iterates over the key/value entries of a bucket, skipping nested buckets
#[derive(Clone)]
pub struct EntryIter<'tx> {
  i: KvIter<'tx>,
}

impl<'tx> EntryIter<'tx> {
  pub(crate) fn new(c: InnerCursor<'tx>) -> EntryIter<'tx> {
    EntryIter { i: KvIter::new(c) }
  }
}

impl<'tx> Iterator for EntryIter<'tx> {
  type Item = crate::Result<(&'tx [u8], &'tx [u8])>;

  fn next(&mut self) -> Option<Self::Item> {
    for item in self.i.by_ref() {
      match item {
        Ok((k, v, flags)) if flags & BUCKET_LEAF_FLAG == 0 => return Some(Ok((k, v))),
        Ok(_) => continue,
        Err(e) => return Some(Err(e)),
      }
    }
    None
  }
}

/// Iterates over the nested buckets of a bucket, skipping key/value entries
#[derive(Clone)]
pub struct BucketIter<'tx> {
  i: KvIter<'tx>,
}

impl<'tx> BucketIter<'tx> {
  pub(crate) fn new(c: InnerCursor<'tx>) -> BucketIter<'tx> {
    BucketIter { i: KvIter::new(c) }
  }
}

impl<'tx> Iterator for BucketIter<'tx> {
  type Item = crate::Result<(&'tx [u8], BucketImpl<'tx>)>;

  fn next(&mut self) -> Option<Self::Item> {
    let tx = self.i.c.bucket.tx();
    for item in self.i.by_ref() {
      match item {
        Ok((k, v, flags)) if flags & BUCKET_LEAF_FLAG != 0 => {
          return Some(BucketImpl::open(tx, v).map(|b| (k, b)))
        }
        Ok(_) => continue,
        Err(e) => return Some(Err(e)),
      }
    }
    None
  }
}

/// Either a value or a nested bucket
pub enum ValueBucket<'tx> {
  Value(&'tx [u8]),
  Bucket(BucketImpl<'tx>),
}

/// Iterates over every entry of a bucket, opening nested buckets
#[derive(Clone)]
pub struct ValueBucketIter<'tx> {
  i: KvIter<'tx>,
}

impl<'tx> ValueBucketIter<'tx> {
  pub(crate) fn new(c: InnerCursor<'tx>) -> ValueBucketIter<'tx> {
    ValueBucketIter { i: KvIter::new(c) }
  }
}

impl<'tx> Iterator for ValueBucketIter<'tx> {
  type Item = crate::Result<(&'tx [u8], ValueBucket<'tx>)>;

  fn next(&mut self) -> Option<Self::Item> {
    let tx = self.i.c.bucket.tx();
    let item = match self.i.next()? {
      Ok(item) => item,
      Err(e) => return Some(Err(e)),
    };
    let (k, v, flags) = item;
    if flags & BUCKET_LEAF_FLAG == 0 {
      Some(Ok((k, ValueBucket::Value(v))))
    } else {
      Some(BucketImpl::open(tx, v).map(|b| (k, ValueBucket::Bucket(b))))
    }
  }
}
