use crate::common::page::tree::{check_pgid, TreePage};
use crate::common::page::{CoerciblePage, RefPage};
use crate::common::PgId;
use bytemuck::{Pod, Zeroable};
use getset::CopyGetters;
use std::mem;

pub const BRANCH_PAGE_ELEMENT_SIZE: usize = mem::size_of::<BranchPageElement>();

pub const BRANCH_PAGE_FLAG: u16 = 0x01;

pub struct MappedBranchPage<'tx> {
  page: RefPage<'tx>,
}

impl<'tx> CoerciblePage<'tx> for MappedBranchPage<'tx> {
  #[inline]
  fn page_flag() -> u16 {
    BRANCH_PAGE_FLAG
  }

  fn wrap(page: RefPage<'tx>) -> Self {
    MappedBranchPage { page }
  }
}

///`BranchPageElement` represents the on-file layout of a branch page's element
///
/// `branchPageElement` in Go BBolt
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct BranchPageElement {
  /// The distance from this element's pointer to its key location
  pos: u32,
  /// Key length
  key_size: u32,
  /// Page ID of this branch
  pgid: PgId,
}

impl BranchPageElement {
  pub fn new(pos: u32, key_size: u32, pgid: PgId) -> BranchPageElement {
    BranchPageElement { pos, key_size, pgid }
  }
}

#[derive(Debug, Copy, Clone)]
pub struct BranchElementRef<'tx> {
  elem: BranchPageElement,
  key_ref: &'tx [u8],
}

impl<'tx> BranchElementRef<'tx> {
  pub fn key(&self) -> &'tx [u8] {
    self.key_ref
  }

  pub fn pgid(&self) -> PgId {
    self.elem.pgid
  }
}

impl<'tx> TreePage<'tx> for MappedBranchPage<'tx> {
  type Elem = BranchPageElement;
  type ElemRef = BranchElementRef<'tx>;

  #[inline]
  fn page(&self) -> &RefPage<'tx> {
    &self.page
  }

  fn get_elem(&self, i: usize) -> crate::Result<Self::ElemRef> {
    let (offset, elem) = self.raw_elem(i)?;
    check_pgid(&self.page, elem.pgid)?;
    let key_start = offset + elem.pos as usize;
    let key_end = key_start + elem.key_size as usize;
    Ok(BranchElementRef {
      elem,
      key_ref: self.slice(key_start..key_end)?,
    })
  }
}
