use crate::common::page::{CoerciblePage, RefPage, PAGE_HEADER_SIZE};
use crate::common::PgId;
use std::mem;

pub const FREE_LIST_PAGE_FLAG: u16 = 0x10;

/// A freelist page. Only the page count is read; the ids themselves are
/// never needed by a read-only handle.
pub struct MappedFreeListPage<'tx> {
  page: RefPage<'tx>,
}

impl<'tx> MappedFreeListPage<'tx> {
  /// The number of free page ids stored in this page.
  ///
  /// If the page.count is at or above 0xFFFF then the real count is
  /// stored in the first element.
  pub fn free_count(&self) -> crate::Result<u64> {
    if self.page.count < 0xFFFF {
      return Ok(self.page.count as u64);
    }
    self
      .page
      .bytes()
      .get(PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + mem::size_of::<PgId>())
      .map(|b| bytemuck::pod_read_unaligned::<u64>(b))
      .ok_or_else(|| crate::Error::invalid_page(self.page.id, "freelist count out of bounds"))
  }
}

impl<'tx> CoerciblePage<'tx> for MappedFreeListPage<'tx> {
  #[inline]
  fn page_flag() -> u16 {
    FREE_LIST_PAGE_FLAG
  }

  fn wrap(page: RefPage<'tx>) -> Self {
    MappedFreeListPage { page }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::common::page::PageHeader;

  #[test]
  fn test_free_count() -> crate::Result<()> {
    let header = PageHeader {
      id: PgId(2),
      flags: FREE_LIST_PAGE_FLAG,
      count: 3,
      overflow: 0,
    };
    let bytes = bytemuck::bytes_of(&header).to_vec();
    let page = RefPage::new(&bytes).unwrap();
    let freelist = MappedFreeListPage::coerce_ref(&page).unwrap();
    assert_eq!(3, freelist.free_count()?);
    Ok(())
  }

  #[test]
  fn test_free_count_overflow() -> crate::Result<()> {
    let header = PageHeader {
      id: PgId(2),
      flags: FREE_LIST_PAGE_FLAG,
      count: 0xFFFF,
      overflow: 0,
    };
    let mut bytes = bytemuck::bytes_of(&header).to_vec();
    bytes.extend_from_slice(&70000u64.to_le_bytes());
    let page = RefPage::new(&bytes).unwrap();
    let freelist = MappedFreeListPage::coerce_ref(&page).unwrap();
    assert_eq!(70000, freelist.free_count()?);
    assert!(MappedFreeListPage::free_count(&MappedFreeListPage::wrap(
      RefPage::new(&bytes[..PAGE_HEADER_SIZE]).unwrap()
    ))
    .is_err());
    Ok(())
  }
}
