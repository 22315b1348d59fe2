use crate::common::PgId;
use std::borrow::Cow;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  /// Any failure reported by the filesystem while opening or mapping the file.
  #[error("io error: {0}")]
  Io(#[from] io::Error),
  /// Neither meta page holds a valid Bolt header. The flag records whether
  /// at least one of them could be read at all.
  #[error("invalid database")]
  InvalidDatabase(bool),
  /// The file was written by a different version of the format.
  #[error("version mismatch")]
  VersionMismatch,
  /// The meta page checksum does not match its contents.
  #[error("checksum error")]
  ChecksumMismatch,
  #[error("file size too small: {0} bytes")]
  FileSizeTooSmall(u64),
  #[error("mmap too large")]
  MMapTooLarge,
  /// The shared file lock could not be taken before the configured timeout.
  #[error("timeout")]
  Timeout,
  /// A page or element points outside of the data it was read from.
  #[error("invalid page {pgid}: {reason}")]
  InvalidPage {
    pgid: PgId,
    reason: Cow<'static, str>,
  },
  /// A key flagged as a bucket does not hold a bucket header.
  #[error("incompatible value")]
  IncompatibleValue,
  /// A recognized schema position holds bytes of the wrong shape.
  #[error("failed to decode {path},{key}: {reason}")]
  Decode {
    path: String,
    key: String,
    reason: String,
  },
  /// The walk visitor returned an error and the traversal stopped.
  #[error("walk aborted: {0}")]
  Walk(#[source] Box<Error>),
}

impl Error {
  pub(crate) fn invalid_page<R: Into<Cow<'static, str>>>(pgid: PgId, reason: R) -> Error {
    Error::InvalidPage {
      pgid,
      reason: reason.into(),
    }
  }

  pub(crate) fn walk(e: Error) -> Error {
    Error::Walk(Box::new(e))
  }

  /// Unwraps the visitor error carried by a [Error::Walk].
  pub fn into_visit_error(self) -> Error {
    match self {
      Error::Walk(e) => *e,
      e => e,
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;
