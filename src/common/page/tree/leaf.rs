use crate::common::page::tree::TreePage;
use crate::common::page::{CoerciblePage, RefPage};
use bytemuck::{Pod, Zeroable};
use getset::CopyGetters;
use std::mem;
use std::ops::Deref;

pub const LEAF_PAGE_ELEMENT_SIZE: usize = mem::size_of::<LeafPageElement>();

pub const BUCKET_LEAF_FLAG: u32 = 0x01;
pub const LEAF_PAGE_FLAG: u16 = 0x02;

pub struct MappedLeafPage<'tx> {
  page: RefPage<'tx>,
}

impl<'tx> CoerciblePage<'tx> for MappedLeafPage<'tx> {
  #[inline]
  fn page_flag() -> u16 {
    LEAF_PAGE_FLAG
  }

  fn wrap(page: RefPage<'tx>) -> Self {
    MappedLeafPage { page }
  }
}

/// `LeafPageElement` represents the on-file layout of a leaf page's element
///
/// `leafPageElement` in Go BBolt
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct LeafPageElement {
  /// Additional flag for each element. If leaf is a Bucket then 0x01 set
  flags: u32,
  /// The distance from this element's pointer to its key/value location
  pos: u32,
  /// Key length
  key_size: u32,
  /// Value length
  value_size: u32,
}

impl LeafPageElement {
  pub fn new(flags: u32, pos: u32, key_size: u32, value_size: u32) -> LeafPageElement {
    LeafPageElement {
      flags,
      pos,
      key_size,
      value_size,
    }
  }

  #[inline]
  pub fn is_bucket_entry(&self) -> bool {
    self.flags & BUCKET_LEAF_FLAG != 0
  }
}

#[derive(Debug, Copy, Clone)]
pub struct LeafElementRef<'tx> {
  elem: LeafPageElement,
  key_ref: &'tx [u8],
  value_ref: &'tx [u8],
}

impl<'tx> LeafElementRef<'tx> {
  pub fn key(&self) -> &'tx [u8] {
    self.key_ref
  }

  pub fn value(&self) -> &'tx [u8] {
    self.value_ref
  }
}

impl<'tx> Deref for LeafElementRef<'tx> {
  type Target = LeafPageElement;

  fn deref(&self) -> &Self::Target {
    &self.elem
  }
}

impl<'tx> TreePage<'tx> for MappedLeafPage<'tx> {
  type Elem = LeafPageElement;
  type ElemRef = LeafElementRef<'tx>;

  #[inline]
  fn page(&self) -> &RefPage<'tx> {
    &self.page
  }

  fn get_elem(&self, i: usize) -> crate::Result<Self::ElemRef> {
    let (offset, elem) = self.raw_elem(i)?;
    let key_start = offset + elem.pos as usize;
    let key_end = key_start + elem.key_size as usize;
    let value_end = key_end + elem.value_size as usize;
    Ok(LeafElementRef {
      elem,
      key_ref: self.slice(key_start..key_end)?,
      value_ref: self.slice(key_end..value_end)?,
    })
  }
}
