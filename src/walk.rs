//! Depth-first traversal of every bucket and entry in a database.
//!
//! The visitor receives the chain of bucket names leading to the entry, the
//! entry key, its value (`None` when the entry is itself a bucket) and a
//! sequence counter. For leaf entries the counter is that of the bucket being
//! traversed; for bucket entries it is the counter of the nested bucket.

use crate::bucket::{BucketApi, BucketImpl};
use crate::common::PgId;
use crate::db::{Bolt, DbApi};
use crate::iter::ValueBucket;
use crate::tx::{TxApi, TxImpl};
use crate::Error;
use log::debug;

/// Walks every bucket of `db` in key order, calling `visit` for each entry.
///
/// If `visit` returns an error the walk stops immediately and the error is
/// returned wrapped in [Error::Walk].
pub fn walk<F>(db: &Bolt, visit: F) -> crate::Result<()>
where
  F: FnMut(&[&[u8]], &[u8], Option<&[u8]>, u64) -> crate::Result<()>,
{
  db.view(|tx| walk_tx(tx, visit))
}

/// Like [walk], within an already open transaction.
pub fn walk_tx<'tx, F>(tx: TxImpl<'tx>, mut visit: F) -> crate::Result<()>
where
  F: FnMut(&[&[u8]], &[u8], Option<&[u8]>, u64) -> crate::Result<()>,
{
  debug!("walking database at txid {}", tx.id());
  let root = tx.root();
  let mut path: Vec<&'tx [u8]> = Vec::new();
  let mut roots = vec![root.root()];
  walk_bucket(root, &mut path, &mut roots, &mut visit)
}

/// `roots` holds the root page of every bucket on `path`, so a corrupt
/// header that leads back into an enclosing bucket is reported instead of
/// recursing forever.
fn walk_bucket<'tx, F>(
  bucket: BucketImpl<'tx>, path: &mut Vec<&'tx [u8]>, roots: &mut Vec<PgId>, visit: &mut F,
) -> crate::Result<()>
where
  F: FnMut(&[&[u8]], &[u8], Option<&[u8]>, u64) -> crate::Result<()>,
{
  let sequence = bucket.sequence();
  for item in bucket.iter() {
    match item? {
      (k, ValueBucket::Value(v)) => visit(path, k, Some(v), sequence).map_err(Error::walk)?,
      (k, ValueBucket::Bucket(child)) => {
        visit(path, k, None, child.sequence()).map_err(Error::walk)?;
        let child_root = child.root();
        // inline buckets live inside their parent's page
        let inline = child_root == PgId(0);
        if !inline && roots.contains(&child_root) {
          return Err(Error::invalid_page(
            child_root,
            "bucket refers back to an enclosing bucket",
          ));
        }
        path.push(k);
        if !inline {
          roots.push(child_root);
        }
        let r = walk_bucket(child, path, roots, visit);
        if !inline {
          roots.pop();
        }
        path.pop();
        r?;
      }
    }
  }
  Ok(())
}
