use crate::common::bucket::BucketHeader;
use crate::common::defaults::{MAGIC, VERSION};
use crate::common::page::{CoerciblePage, RefPage, PAGE_HEADER_SIZE};
use crate::common::{PgId, TxId};
use crate::Error::{ChecksumMismatch, InvalidDatabase, VersionMismatch};
use bytemuck::{Pod, Zeroable};
use fnv_rs::{Fnv64, FnvHasher};
use getset::{CopyGetters, Setters};
use std::hash::Hasher;
use std::mem;

pub const META_PAGE_FLAG: u16 = 0x04;

pub const META_HEADER_SIZE: usize = mem::size_of::<Meta>();

/// Bytes needed to hold a page header followed by a meta
pub const META_PAGE_SIZE: usize = PAGE_HEADER_SIZE + META_HEADER_SIZE;

/// `Meta` represents the on-file layout of a database's metadata
///
/// `meta` in Go BBolt
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, CopyGetters, Setters, Pod, Zeroable)]
#[getset(get_copy = "pub", set = "pub")]
pub struct Meta {
  /// Uniquely ID for BBolt databases
  magic: u32,
  /// Database version number
  version: u32,
  /// Database page size where page address = [PgId] * meta.page_size
  page_size: u32,
  flags: u32,
  /// Root bucket header
  root: BucketHeader,
  /// FreeList page location
  free_list: PgId,
  /// The end of the database where EOF = meta.pgid * meta.page_size
  pgid: PgId,
  /// Current transaction ID
  txid: TxId,
  /// Checksum of the previous Meta fields using the 64-bit version of the Fowler-Noll-Vo hash function
  checksum: u64,
}

impl Meta {
  /// validate checks the marker bytes and version of the meta page to ensure it matches this binary.
  pub fn validate(&self) -> crate::Result<()> {
    if self.magic != MAGIC {
      return Err(InvalidDatabase(true));
    } else if self.version != VERSION {
      return Err(VersionMismatch);
    } else if self.checksum != self.sum64() {
      return Err(ChecksumMismatch);
    }
    Ok(())
  }

  /// generates the checksum for the meta.
  pub fn sum64(&self) -> u64 {
    let mut h = Fnv64::new();
    let (left, _) =
      bytemuck::bytes_of(self).split_at(mem::size_of::<Meta>() - mem::size_of::<u64>());
    h.update(left);
    h.finish()
  }
}

/// A meta page mapped out of the database file
pub struct MappedMetaPage<'tx> {
  page: RefPage<'tx>,
}

impl<'tx> MappedMetaPage<'tx> {
  /// Reads the meta that follows the page header.
  pub fn meta(&self) -> Option<Meta> {
    self
      .page
      .bytes()
      .get(PAGE_HEADER_SIZE..META_PAGE_SIZE)
      .map(bytemuck::pod_read_unaligned)
  }

  /// Reads a meta page out of `bytes`, checking the page flag and the meta itself.
  pub fn read(bytes: &'tx [u8]) -> crate::Result<Meta> {
    let page = RefPage::new(bytes).ok_or(InvalidDatabase(false))?;
    let meta = MappedMetaPage::coerce_ref(&page)
      .and_then(|m| m.meta())
      .ok_or(InvalidDatabase(true))?;
    meta.validate()?;
    Ok(meta)
  }
}

impl<'tx> CoerciblePage<'tx> for MappedMetaPage<'tx> {
  #[inline]
  fn page_flag() -> u16 {
    META_PAGE_FLAG
  }

  fn wrap(page: RefPage<'tx>) -> Self {
    MappedMetaPage { page }
  }
}
