//! Read-only dumper for Bolt (bbolt) database files.
//!
//! A [Bolt] handle maps a database file read-only. [walk] visits every bucket
//! and entry in key order, a [SchemaDecoder] picked from the [SchemaRegistry]
//! turns each entry into a [DecodedRecord], and a [RecordSink] receives the
//! records as they are produced. [dump] and [run] tie these together.

mod arch;
mod bucket;
mod common;
mod cursor;
mod db;
mod dump;
mod iter;
pub mod schema;
mod sink;
mod snapshot;
#[cfg(test)]
mod test_support;
mod tx;
mod walk;

pub use bucket::{BucketApi, BucketImpl};
pub use common::bucket::BucketHeader;
pub use common::errors::{Error, Result};
pub use common::{PgId, TxId};
pub use cursor::{CursorApi, CursorImpl};
pub use db::{Bolt, BoltOptions, DbApi, DbInfo};
pub use dump::{dump, run, DumpOptions, DumpStats};
pub use iter::{BucketIter, EntryIter, ValueBucket, ValueBucketIter};
pub use schema::{
  ContainerdDecoder, DecodedRecord, NoopDecoder, Resolved, SchemaDecoder, SchemaRegistry,
};
pub use sink::{LineSink, RecordSink};
pub use snapshot::PrivateCopy;
pub use tx::{TxApi, TxImpl};
pub use walk::{walk, walk_tx};
