use crate::common::PgId;
use bytemuck::{Pod, Zeroable};
use freelist::FREE_LIST_PAGE_FLAG;
use meta::META_PAGE_FLAG;
use std::borrow::Cow;
use std::mem;
use std::ops::Deref;
use tree::branch::BRANCH_PAGE_FLAG;
use tree::leaf::LEAF_PAGE_FLAG;

pub mod freelist;
pub mod meta;
pub mod tree;

pub const PAGE_HEADER_SIZE: usize = mem::size_of::<PageHeader>();

/// Represents a page type that can be coerced from a [RefPage]
pub trait CoerciblePage<'tx>: Sized {
  /// The page flag discriminator
  fn page_flag() -> u16;

  /// Wrap a [RefPage] without checking its flag
  fn wrap(page: RefPage<'tx>) -> Self;

  /// Cast a [RefPage] into a specific page type if the type matches
  #[inline]
  fn coerce_ref(page: &RefPage<'tx>) -> Option<Self> {
    if page.flags == Self::page_flag() {
      Some(Self::wrap(*page))
    } else {
      None
    }
  }
}

/// A read-only view of a page and its overflow pages.
/// Always begins with a [PageHeader]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RefPage<'tx> {
  header: PageHeader,
  bytes: &'tx [u8],
}

impl<'tx> RefPage<'tx> {
  /// Reads the page header from the front of `bytes`.
  /// Returns `None` if `bytes` cannot hold one.
  pub fn new(bytes: &'tx [u8]) -> Option<RefPage<'tx>> {
    let header = bytes
      .get(..PAGE_HEADER_SIZE)
      .map(bytemuck::pod_read_unaligned::<PageHeader>)?;
    Some(RefPage { header, bytes })
  }

  /// All bytes covered by this page, header included
  #[inline]
  pub fn bytes(&self) -> &'tx [u8] {
    self.bytes
  }
}

impl<'tx> Deref for RefPage<'tx> {
  type Target = PageHeader;

  fn deref(&self) -> &Self::Target {
    &self.header
  }
}

/// `PageHeader` represents the on-file layout of a page header.
///
/// `page` in Go BBolt
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Pod, Zeroable, Eq, PartialEq)]
pub struct PageHeader {
  /// This Page's ID. Inline pages have an id of 0
  pub id: PgId,
  /// Page's type. Branch(0x01), Leaf(0x02), Meta(0x04), or FreeList(0x10)
  pub flags: u16,
  /// Defines the number of items in the Branch, Leaf, and Freelist pages
  pub count: u16,
  /// How many additional meta.page_size pages are included in this page
  pub overflow: u32,
}

impl PageHeader {
  #[inline]
  pub fn is_branch(&self) -> bool {
    self.flags & BRANCH_PAGE_FLAG != 0
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.flags & LEAF_PAGE_FLAG != 0
  }

  #[inline]
  pub fn is_meta(&self) -> bool {
    self.flags & META_PAGE_FLAG != 0
  }

  #[inline]
  pub fn is_free_list(&self) -> bool {
    self.flags & FREE_LIST_PAGE_FLAG != 0
  }

  /// Validates that the header belongs to the page that was asked for
  pub fn fast_check(&self, id: PgId) -> crate::Result<()> {
    if self.id != id {
      return Err(crate::Error::invalid_page(
        id,
        format!("page identifies as {}", self.id),
      ));
    }
    if !(self.is_branch() || self.is_leaf() || self.is_meta() || self.is_free_list()) {
      return Err(crate::Error::invalid_page(
        id,
        format!("unexpected type {}", self.page_type()),
      ));
    }
    Ok(())
  }

  pub fn page_type(&self) -> Cow<'static, str> {
    if self.is_branch() {
      Cow::Borrowed("branch")
    } else if self.is_leaf() {
      Cow::Borrowed("leaf")
    } else if self.is_meta() {
      Cow::Borrowed("meta")
    } else if self.is_free_list() {
      Cow::Borrowed("freelist")
    } else {
      Cow::Owned(format!("unknown<{:#02x}>", self.flags))
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_page_type() {
    let mut header = PageHeader {
      flags: BRANCH_PAGE_FLAG,
      ..Default::default()
    };
    assert_eq!("branch", header.page_type());
    header.flags = LEAF_PAGE_FLAG;
    assert_eq!("leaf", header.page_type());
    header.flags = META_PAGE_FLAG;
    assert_eq!("meta", header.page_type());
    header.flags = FREE_LIST_PAGE_FLAG;
    assert_eq!("freelist", header.page_type());
    header.flags = 0x4e20;
    assert_eq!("unknown<0x4e20>", header.page_type());
  }

  #[test]
  fn test_ref_page_short() {
    assert!(RefPage::new(&[0u8; PAGE_HEADER_SIZE - 1]).is_none());
    let header = PageHeader {
      id: PgId(3),
      flags: LEAF_PAGE_FLAG,
      count: 2,
      overflow: 0,
    };
    let page = RefPage::new(bytemuck::bytes_of(&header)).unwrap();
    assert_eq!(PgId(3), page.id);
    assert_eq!(2, page.count);
    assert!(page.fast_check(PgId(3)).is_ok());
    assert!(page.fast_check(PgId(4)).is_err());
  }
}
