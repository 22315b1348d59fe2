use crate::bucket::{BucketApi, BucketImpl};
use crate::common::page::tree::branch::MappedBranchPage;
use crate::common::page::tree::leaf::{MappedLeafPage, BUCKET_LEAF_FLAG};
use crate::common::page::tree::TreePage;
use crate::common::page::{CoerciblePage, RefPage};
use crate::common::PgId;
use crate::Error;

/// Read-only cursor API
pub trait CursorApi<'tx> {
  /// Bucket returns the bucket that this cursor was created from.
  fn bucket(&self) -> BucketImpl<'tx>;

  /// First moves the cursor to the first item in the bucket and returns its key and value.
  /// If the bucket is empty then None is returned.
  /// Nested buckets are returned with a None value.
  fn first(&mut self) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>>;

  /// Last moves the cursor to the last item in the bucket and returns its key and value.
  /// If the bucket is empty then None is returned.
  fn last(&mut self) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>>;

  /// Next moves the cursor to the next item in the bucket and returns its key and value.
  /// If the cursor is at the end of the bucket then None is returned.
  fn next(&mut self) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>>;

  /// Prev moves the cursor to the previous item in the bucket and returns its key and value.
  /// If the cursor is at the beginning of the bucket then None is returned.
  fn prev(&mut self) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>>;

  /// Seek moves the cursor to a given key and returns it.
  /// If the key does not exist then the next key is used. If no keys
  /// follow, None is returned.
  fn seek<T: AsRef<[u8]>>(
    &mut self, seek: T,
  ) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>>;
}

/// A page and the index of the element the cursor points at
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ElemRef<'tx> {
  page: RefPage<'tx>,
  index: usize,
}

impl<'tx> ElemRef<'tx> {
  #[inline]
  fn count(&self) -> usize {
    self.page.count as usize
  }

  #[inline]
  fn is_leaf(&self) -> bool {
    self.page.is_leaf()
  }

  fn branch(&self) -> crate::Result<MappedBranchPage<'tx>> {
    MappedBranchPage::coerce_ref(&self.page).ok_or_else(|| {
      Error::invalid_page(
        self.page.id,
        format!("expected branch, found {}", self.page.page_type()),
      )
    })
  }

  fn leaf(&self) -> crate::Result<MappedLeafPage<'tx>> {
    MappedLeafPage::coerce_ref(&self.page).ok_or_else(|| {
      Error::invalid_page(
        self.page.id,
        format!("expected leaf, found {}", self.page.page_type()),
      )
    })
  }
}

/// No well-formed tree that fits in a map gets this deep. Branch pages that
/// point back up the tree run into it.
const MAX_TREE_DEPTH: usize = 64;

/// Cursor state: the path of pages from the bucket root down to the
/// current leaf element.
#[derive(Clone)]
pub(crate) struct InnerCursor<'tx> {
  pub(crate) bucket: BucketImpl<'tx>,
  stack: Vec<ElemRef<'tx>>,
}

impl<'tx> PartialEq for InnerCursor<'tx> {
  fn eq(&self, other: &Self) -> bool {
    self.stack == other.stack
  }
}

impl<'tx> InnerCursor<'tx> {
  pub(crate) fn new(bucket: BucketImpl<'tx>) -> InnerCursor<'tx> {
    InnerCursor {
      bucket,
      stack: Vec::new(),
    }
  }

  fn top_count(&self) -> usize {
    self.stack.last().map_or(0, |e| e.count())
  }

  fn push(&mut self, pgid: PgId, last: bool) -> crate::Result<()> {
    if self.stack.len() >= MAX_TREE_DEPTH {
      return Err(Error::invalid_page(
        pgid,
        format!("tree is deeper than {} pages", MAX_TREE_DEPTH),
      ));
    }
    let page = self.bucket.page(pgid)?;
    if !(page.is_leaf() || page.is_branch()) {
      return Err(Error::invalid_page(
        pgid,
        format!("expected tree page, found {}", page.page_type()),
      ));
    }
    let index = if last {
      (page.count as usize).saturating_sub(1)
    } else {
      0
    };
    self.stack.push(ElemRef { page, index });
    Ok(())
  }

  pub(crate) fn i_first(&mut self) -> crate::Result<Option<(&'tx [u8], &'tx [u8], u32)>> {
    self.stack.clear();
    self.push(self.bucket.root(), false)?;
    self.go_to_first_element_on_the_stack()?;

    // If we land on an empty page then move to the next value.
    // https://github.com/boltdb/bolt/issues/450
    if self.top_count() == 0 {
      return self.i_next();
    }
    self.key_value()
  }

  pub(crate) fn i_last(&mut self) -> crate::Result<Option<(&'tx [u8], &'tx [u8], u32)>> {
    self.stack.clear();
    self.push(self.bucket.root(), true)?;
    self.go_to_last_element_on_the_stack()?;

    // If this is an empty page then find the last page that is not empty.
    if self.stack.len() > 1 && self.top_count() == 0 {
      return self.i_prev();
    }
    self.key_value()
  }

  pub(crate) fn i_next(&mut self) -> crate::Result<Option<(&'tx [u8], &'tx [u8], u32)>> {
    loop {
      // Attempt to move over one element until we're successful.
      // Move up the stack as we hit the end of each page in our stack.
      let moved = self.stack.iter_mut().enumerate().rev().find_map(|(i, elem)| {
        if elem.index + 1 < elem.count() {
          elem.index += 1;
          Some(i)
        } else {
          None
        }
      });

      // If we've hit the root page then stop and return. This will leave the
      // cursor on the last element of the last page.
      let Some(i) = moved else {
        return Ok(None);
      };

      // Otherwise start from where we left off in the stack and find the
      // first element of the first leaf page.
      self.stack.truncate(i + 1);
      self.go_to_first_element_on_the_stack()?;

      // If this is an empty page then restart and move back up the stack.
      // https://github.com/boltdb/bolt/issues/450
      if self.top_count() == 0 {
        continue;
      }
      return self.key_value();
    }
  }

  pub(crate) fn i_prev(&mut self) -> crate::Result<Option<(&'tx [u8], &'tx [u8], u32)>> {
    loop {
      // Attempt to move back one element until we're successful.
      // Move up the stack as we hit the beginning of each page in our stack.
      let mut moved = false;
      while let Some(elem) = self.stack.last_mut() {
        if elem.index > 0 {
          elem.index -= 1;
          moved = true;
          break;
        }
        // Stay on the first element so iteration can resume with next.
        if self.stack.len() == 1 {
          break;
        }
        self.stack.pop();
      }
      if !moved {
        return Ok(None);
      }

      // Move down the stack to find the last element of the last leaf under this branch.
      self.go_to_last_element_on_the_stack()?;
      if self.top_count() == 0 {
        continue;
      }
      return self.key_value();
    }
  }

  pub(crate) fn i_seek(
    &mut self, seek: &[u8],
  ) -> crate::Result<Option<(&'tx [u8], &'tx [u8], u32)>> {
    self.stack.clear();
    self.search(seek, self.bucket.root())?;

    // If we ended up after the last element of a page then move to the next one.
    if let Some(elem) = self.stack.last() {
      if elem.index >= elem.count() {
        return self.i_next();
      }
    }
    self.key_value()
  }

  /// Moves the cursor to the first leaf element under the last page in the stack.
  fn go_to_first_element_on_the_stack(&mut self) -> crate::Result<()> {
    self.go_down(false)
  }

  /// Moves the cursor to the last leaf element under the last page in the stack.
  fn go_to_last_element_on_the_stack(&mut self) -> crate::Result<()> {
    self.go_down(true)
  }

  fn go_down(&mut self, last: bool) -> crate::Result<()> {
    loop {
      // Exit when we hit a leaf page.
      let pgid = match self.stack.last() {
        None => return Ok(()),
        Some(r) if r.is_leaf() => return Ok(()),
        Some(r) => r.branch()?.get_elem(r.index)?.pgid(),
      };
      self.push(pgid, last)?;
    }
  }

  /// Recursively performs a binary search against the pages until it finds the key.
  fn search(&mut self, key: &[u8], pgid: PgId) -> crate::Result<()> {
    let mut pgid = pgid;
    loop {
      self.push(pgid, false)?;
      let Some(elem) = self.stack.last().copied() else {
        return Ok(());
      };
      if elem.is_leaf() {
        let leaf = elem.leaf()?;
        let index = lower_bound(leaf.count(), key, |i| Ok(leaf.get_elem(i)?.key()))?;
        self.set_top_index(index);
        return Ok(());
      }

      let branch = elem.branch()?;
      let mut index = lower_bound(branch.count(), key, |i| Ok(branch.get_elem(i)?.key()))?;
      let exact = index < branch.count() && branch.get_elem(index)?.key() == key;
      if !exact && index > 0 {
        index -= 1;
      }
      self.set_top_index(index);
      pgid = branch.get_elem(index)?.pgid();
    }
  }

  fn set_top_index(&mut self, index: usize) {
    if let Some(elem) = self.stack.last_mut() {
      elem.index = index;
    }
  }

  /// Returns the key, value and flags of the current leaf element.
  pub(crate) fn key_value(&self) -> crate::Result<Option<(&'tx [u8], &'tx [u8], u32)>> {
    let Some(elem) = self.stack.last() else {
      return Ok(None);
    };

    // If the cursor is pointing to the end of page/node then return nil.
    if elem.count() == 0 || elem.index >= elem.count() {
      return Ok(None);
    }
    let leaf = elem.leaf()?.get_elem(elem.index)?;
    Ok(Some((leaf.key(), leaf.value(), leaf.flags())))
  }
}

/// Finds the first index whose key is not less than `key`.
fn lower_bound<'a, F>(count: usize, key: &[u8], key_at: F) -> crate::Result<usize>
where
  F: Fn(usize) -> crate::Result<&'a [u8]>,
{
  let (mut lo, mut hi) = (0, count);
  while lo < hi {
    let mid = lo + (hi - lo) / 2;
    if key_at(mid)? < key {
      lo = mid + 1;
    } else {
      hi = mid;
    }
  }
  Ok(lo)
}

fn hide_bucket_value<'tx>(
  kv: Option<(&'tx [u8], &'tx [u8], u32)>,
) -> Option<(&'tx [u8], Option<&'tx [u8]>)> {
  kv.map(|(k, v, flags)| {
    if flags & BUCKET_LEAF_FLAG != 0 {
      (k, None)
    } else {
      (k, Some(v))
    }
  })
}

/// A cursor over the keys of one bucket
#[derive(Clone)]
pub struct CursorImpl<'tx> {
  c: InnerCursor<'tx>,
}

impl<'tx> CursorImpl<'tx> {
  pub(crate) fn new(c: InnerCursor<'tx>) -> CursorImpl<'tx> {
    CursorImpl { c }
  }
}

impl<'tx> CursorApi<'tx> for CursorImpl<'tx> {
  fn bucket(&self) -> BucketImpl<'tx> {
    self.c.bucket
  }

  fn first(&mut self) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>> {
    self.c.i_first().map(hide_bucket_value)
  }

  fn last(&mut self) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>> {
    self.c.i_last().map(hide_bucket_value)
  }

  fn next(&mut self) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>> {
    self.c.i_next().map(hide_bucket_value)
  }

  fn prev(&mut self) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>> {
    self.c.i_prev().map(hide_bucket_value)
  }

  fn seek<T: AsRef<[u8]>>(
    &mut self, seek: T,
  ) -> crate::Result<Option<(&'tx [u8], Option<&'tx [u8]>)>> {
    self.c.i_seek(seek.as_ref()).map(hide_bucket_value)
  }
}
