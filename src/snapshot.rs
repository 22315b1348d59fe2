use log::debug;
use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A private copy of a database file in a temporary directory.
///
/// The process that owns a database keeps an exclusive lock on it for as
/// long as it runs, so it is read through a copy instead. The directory and
/// the copy are removed when this is dropped.
pub struct PrivateCopy {
  // removes the directory on drop
  _dir: TempDir,
  path: PathBuf,
}

impl PrivateCopy {
  /// Copies `source` into a new temporary directory and syncs the copy.
  pub fn new<P: AsRef<Path>>(source: P) -> crate::Result<PrivateCopy> {
    let source = source.as_ref();
    let dir = tempfile::Builder::new().prefix("bbolt-dump").tempdir()?;
    let name = source.file_name().unwrap_or(OsStr::new("bolt.db"));
    let path = dir.path().join(name);

    let mut src = File::open(source)?;
    let mut dst = File::create(&path)?;
    let copied = io::copy(&mut src, &mut dst)?;
    dst.sync_all()?;
    debug!("copied {} bytes from {:?} to {:?}", copied, source, path);
    Ok(PrivateCopy { _dir: dir, path })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}
