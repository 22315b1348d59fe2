use crate::common::PgId;
use once_cell::sync::Lazy;
use size::Size;
use std::time::Duration;

/// The data file format version.
pub const VERSION: u32 = 2;

/// The marker value that identifies a file as a Bolt database.
pub const MAGIC: u32 = 0xED0CDAED;

pub const PGID_NO_FREE_LIST: PgId = PgId(0xffffffffffffffff);

/// How long to wait between attempts to take the shared file lock.
pub const FLOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// The smallest page size a meta page can fit into.
pub const MIN_PAGE_SIZE: usize = 512;

/// The largest page size the format allows.
pub const MAX_PAGE_SIZE: usize = 1 << 16;

/// The OS page size.
pub static DEFAULT_PAGE_SIZE: Lazy<Size> = Lazy::new(|| Size::from_bytes(page_size::get()));
