use crate::arch::size::MAX_MAP_SIZE;
use crate::common::bucket::BucketHeader;
use crate::common::defaults::{
  DEFAULT_PAGE_SIZE, FLOCK_RETRY_DELAY, MAX_PAGE_SIZE, MIN_PAGE_SIZE, PGID_NO_FREE_LIST,
};
use crate::common::page::freelist::MappedFreeListPage;
use crate::common::page::meta::{MappedMetaPage, Meta, META_PAGE_SIZE};
use crate::common::page::{CoerciblePage, RefPage, PAGE_HEADER_SIZE};
use crate::common::{PgId, TxId};
use crate::tx::TxImpl;
use crate::Error;
use fs4::fs_std::FileExt;
use getset::{CopyGetters, Getters};
use log::{debug, trace, warn};
use memmap2::Mmap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use typed_builder::TypedBuilder;

/// Read-only access to an open Bolt database.
///
/// There is deliberately no write counterpart: the handle maps the file
/// read-only and exposes no operation that could modify it.
pub trait DbApi
where
  Self: Sized,
{
  /// Begin starts a new read-only transaction.
  /// The transaction borrows the database, so it can never outlive it.
  fn begin(&self) -> TxImpl<'_>;

  /// View executes a function within the context of a read-only transaction.
  /// Any error that is returned from the function is returned from the View() method.
  fn view<'tx, T, F: FnOnce(TxImpl<'tx>) -> crate::Result<T>>(
    &'tx self, f: F,
  ) -> crate::Result<T> {
    f(self.begin())
  }

  /// Info returns the layout information of the database.
  fn info(&self) -> crate::Result<DbInfo>;

  /// Close releases all database resources.
  /// The same happens when the handle is dropped; closing only makes it explicit.
  fn close(self);
}

/// Options used when opening a database.
#[derive(Clone, Debug, TypedBuilder, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct BoltOptions {
  /// Timeout is the amount of time to wait to obtain the shared file lock.
  /// When set to None it will wait indefinitely.
  #[builder(default, setter(strip_option))]
  timeout: Option<Duration>,
  /// Lock the mapped pages into memory. Only honored on unix targets.
  #[builder(default)]
  mlock: bool,
  /// Check every page read against its id and the database high water mark.
  #[builder(default)]
  strict: bool,
}

impl Default for BoltOptions {
  fn default() -> Self {
    BoltOptions::builder().build()
  }
}

impl BoltOptions {
  /// Opens the database at `path` read-only with these options.
  pub fn open<T: AsRef<Path>>(self, path: T) -> crate::Result<Bolt> {
    Bolt::open_with(path.as_ref(), self)
  }
}

/// Layout information about an open database.
#[derive(Debug, Copy, Clone, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct DbInfo {
  page_size: usize,
  file_size: u64,
  /// The transaction id of the selected meta page
  txid: TxId,
  /// The first page id past the end of the data
  high_water_mark: PgId,
  root: BucketHeader,
  /// Number of free pages, if the freelist is synced to the file
  free_pages: Option<u64>,
}

/// A read-only Bolt database file.
#[derive(Getters)]
pub struct Bolt {
  #[getset(get = "pub")]
  path: PathBuf,
  file: File,
  mmap: Mmap,
  page_size: usize,
  meta: Meta,
  #[getset(get = "pub")]
  options: BoltOptions,
}

impl Bolt {
  /// Opens the database at `path` read-only with the default options.
  pub fn open<T: AsRef<Path>>(path: T) -> crate::Result<Bolt> {
    Bolt::open_with(path.as_ref(), BoltOptions::default())
  }

  fn open_with(path: &Path, options: BoltOptions) -> crate::Result<Bolt> {
    let path = path.to_path_buf();
    let file = fs::OpenOptions::new().read(true).open(&path)?;
    Bolt::flock(&file, options.timeout)?;

    let file_size = file.metadata()?.len();
    if file_size > MAX_MAP_SIZE.bytes() as u64 {
      return Err(Error::MMapTooLarge);
    }
    if file_size < META_PAGE_SIZE as u64 {
      return Err(Error::FileSizeTooSmall(file_size));
    }

    // The map is read-only; any store through it would fault.
    let mmap = unsafe { Mmap::map(&file)? };
    #[cfg(unix)]
    {
      mmap.advise(memmap2::Advice::Random)?;
      if options.mlock {
        mmap.lock()?;
      }
    }

    let page_size = Bolt::read_page_size(&mmap)?;
    if file_size < (page_size * 2) as u64 {
      return Err(Error::FileSizeTooSmall(file_size));
    }
    let meta = Bolt::select_meta(&mmap, page_size)?;
    debug!(
      "opened {:?}: page size {}, txid {}, high water mark {}",
      path,
      page_size,
      meta.txid(),
      meta.pgid()
    );
    Ok(Bolt {
      path,
      file,
      mmap,
      page_size,
      meta,
      options,
    })
  }

  /// Takes a shared advisory lock on the file, retrying until `timeout`.
  fn flock(file: &File, timeout: Option<Duration>) -> crate::Result<()> {
    let Some(timeout) = timeout else {
      FileExt::lock_shared(file)?;
      return Ok(());
    };
    let start = Instant::now();
    loop {
      match FileExt::try_lock_shared(file) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
          if start.elapsed() > timeout {
            return Err(Error::Timeout);
          }
          trace!("file lock is held elsewhere, retrying");
          std::thread::sleep(FLOCK_RETRY_DELAY);
        }
        Err(e) => return Err(e.into()),
      }
    }
  }

  fn read_page_size(data: &[u8]) -> crate::Result<usize> {
    // Read the first meta page to determine the page size.
    let meta0_err = match MappedMetaPage::read(data) {
      Ok(meta) => return Bolt::check_page_size(meta.page_size() as usize),
      Err(e) => e,
    };

    // Probe the legal page sizes for the second meta page.
    for page_size in Bolt::candidate_page_sizes() {
      if page_size + META_PAGE_SIZE > data.len() {
        continue;
      }
      if let Ok(meta) = MappedMetaPage::read(&data[page_size..]) {
        if meta.page_size() as usize == page_size {
          warn!("meta page 0 is invalid ({}), using meta page 1", meta0_err);
          return Ok(page_size);
        }
      }
    }

    // Neither page could be validated. If page 0 had the right shape but bad
    // contents, report that.
    match meta0_err {
      Error::InvalidDatabase(true) | Error::ChecksumMismatch | Error::VersionMismatch => {
        Err(meta0_err)
      }
      _ => Err(Error::InvalidDatabase(false)),
    }
  }

  fn is_legal_page_size(page_size: usize) -> bool {
    (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) && page_size.is_power_of_two()
  }

  /// Page sizes to probe when meta page 0 is unreadable. Files are usually
  /// created with the OS page size, so it goes first.
  fn candidate_page_sizes() -> impl Iterator<Item = usize> {
    let os = DEFAULT_PAGE_SIZE.bytes() as usize;
    let os = Some(os).filter(|&s| Bolt::is_legal_page_size(s));
    let rest = std::iter::successors(Some(MIN_PAGE_SIZE), |s| Some(s << 1))
      .take_while(|&s| s <= MAX_PAGE_SIZE)
      .filter(move |&s| Some(s) != os);
    os.into_iter().chain(rest)
  }

  fn check_page_size(page_size: usize) -> crate::Result<usize> {
    if Bolt::is_legal_page_size(page_size) {
      Ok(page_size)
    } else {
      debug!("page size {} is not usable", page_size);
      Err(Error::InvalidDatabase(true))
    }
  }

  /// Picks the valid meta page with the highest transaction id.
  fn select_meta(data: &[u8], page_size: usize) -> crate::Result<Meta> {
    let meta0 = MappedMetaPage::read(&data[..page_size]);
    let meta1 = MappedMetaPage::read(&data[page_size..page_size * 2]);
    match (meta0, meta1) {
      (Ok(m0), Ok(m1)) => Ok(if m1.txid() > m0.txid() { m1 } else { m0 }),
      (Ok(m0), Err(e)) => {
        warn!("meta page 1 is invalid: {}", e);
        Ok(m0)
      }
      (Err(e), Ok(m1)) => {
        warn!("meta page 0 is invalid: {}", e);
        Ok(m1)
      }
      (Err(e), Err(_)) => Err(e),
    }
  }

  #[inline]
  pub fn page_size(&self) -> usize {
    self.page_size
  }

  #[inline]
  pub(crate) fn meta(&self) -> Meta {
    self.meta
  }

  /// Returns the page at `id` including its overflow pages.
  pub(crate) fn page(&self, id: PgId) -> crate::Result<RefPage<'_>> {
    let data: &[u8] = &self.mmap;
    let start = usize::try_from(id.0)
      .ok()
      .and_then(|i| i.checked_mul(self.page_size))
      .filter(|start| start + PAGE_HEADER_SIZE <= data.len())
      .ok_or_else(|| Error::invalid_page(id, "page offset beyond end of file"))?;
    let header = RefPage::new(&data[start..])
      .ok_or_else(|| Error::invalid_page(id, "page header beyond end of file"))?;
    let end = (header.overflow as usize)
      .checked_add(1)
      .and_then(|n| n.checked_mul(self.page_size))
      .and_then(|len| start.checked_add(len))
      .filter(|end| *end <= data.len())
      .ok_or_else(|| Error::invalid_page(id, "overflow pages beyond end of file"))?;
    let page = RefPage::new(&data[start..end])
      .ok_or_else(|| Error::invalid_page(id, "page header beyond end of file"))?;
    if self.options.strict {
      page.fast_check(id)?;
      if id >= self.meta.pgid() {
        return Err(Error::invalid_page(
          id,
          format!("beyond high water mark {}", self.meta.pgid()),
        ));
      }
    }
    Ok(page)
  }
}

impl DbApi for Bolt {
  fn begin(&self) -> TxImpl<'_> {
    TxImpl::new(self)
  }

  fn info(&self) -> crate::Result<DbInfo> {
    let free_pages = if self.meta.free_list() == PGID_NO_FREE_LIST {
      None
    } else {
      let page = self.page(self.meta.free_list())?;
      let freelist = MappedFreeListPage::coerce_ref(&page).ok_or_else(|| {
        Error::invalid_page(
          page.id,
          format!("expected freelist, found {}", page.page_type()),
        )
      })?;
      Some(freelist.free_count()?)
    };
    Ok(DbInfo {
      page_size: self.page_size,
      file_size: self.mmap.len() as u64,
      txid: self.meta.txid(),
      high_water_mark: self.meta.pgid(),
      root: self.meta.root(),
      free_pages,
    })
  }

  fn close(self) {
    debug!("closing {:?}", self.path);
  }
}

impl Drop for Bolt {
  fn drop(&mut self) {
    if let Err(e) = FileExt::unlock(&self.file) {
      warn!("failed to unlock {:?}: {}", self.path, e);
    }
  }
}
