use crate::common::page::{CoerciblePage, RefPage, PAGE_HEADER_SIZE};
use crate::common::PgId;
use bytemuck::AnyBitPattern;
use std::marker::PhantomData;
use std::mem;
use std::ops::Range;

pub mod branch;
pub mod leaf;

/// A branch or leaf page: a header followed by `count` fixed-size elements,
/// followed by the key/value bytes the elements point at.
pub trait TreePage<'tx>: CoerciblePage<'tx> {
  type Elem: AnyBitPattern;
  type ElemRef: 'tx;

  fn page(&self) -> &RefPage<'tx>;

  #[inline]
  fn page_element_size(&self) -> usize {
    mem::size_of::<Self::Elem>()
  }

  #[inline]
  fn count(&self) -> usize {
    self.page().count as usize
  }

  fn iter<'a>(&'a self) -> TreeIterator<'tx, 'a, Self> {
    TreeIterator::new(self)
  }

  /// Reads the `i`th element and resolves the bytes it points at.
  fn get_elem(&self, i: usize) -> crate::Result<Self::ElemRef>;

  /// Reads the raw `i`th element and the page offset it was read from.
  fn raw_elem(&self, i: usize) -> crate::Result<(usize, Self::Elem)> {
    let page = self.page();
    if i >= self.count() {
      return Err(crate::Error::invalid_page(
        page.id,
        format!("element {} out of {}", i, page.count),
      ));
    }
    let offset = PAGE_HEADER_SIZE + self.page_element_size() * i;
    let elem = page
      .bytes()
      .get(offset..offset + self.page_element_size())
      .map(bytemuck::pod_read_unaligned)
      .ok_or_else(|| crate::Error::invalid_page(page.id, "element header out of bounds"))?;
    Ok((offset, elem))
  }

  /// Slices `range` out of the page, failing if it runs past the page end.
  fn slice(&self, range: Range<usize>) -> crate::Result<&'tx [u8]> {
    let page = self.page();
    page
      .bytes()
      .get(range)
      .ok_or_else(|| crate::Error::invalid_page(page.id, "element data out of bounds"))
  }
}

/// Iterates over the resolved elements of a [TreePage]
pub struct TreeIterator<'tx, 'a, T: TreePage<'tx>> {
  page: &'a T,
  i: usize,
  p: PhantomData<&'tx [u8]>,
}

impl<'tx, 'a, T: TreePage<'tx>> TreeIterator<'tx, 'a, T> {
  pub fn new(t: &'a T) -> Self {
    TreeIterator {
      page: t,
      i: 0,
      p: PhantomData,
    }
  }
}

impl<'tx, 'a, T: TreePage<'tx>> Iterator for TreeIterator<'tx, 'a, T> {
  type Item = crate::Result<T::ElemRef>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.i >= self.page.count() {
      return None;
    }
    let item = self.page.get_elem(self.i);
    self.i += 1;
    Some(item)
  }
}

/// Resolves the child page id for a branch or fails for anything else
pub(crate) fn check_pgid(page: &RefPage, pgid: PgId) -> crate::Result<PgId> {
  if pgid == PgId(0) {
    return Err(crate::Error::invalid_page(page.id, "branch points at page 0"));
  }
  Ok(pgid)
}
