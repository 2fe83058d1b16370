//! Streaming, single-pass access to archive containers.
//!
//! An [`ArchiveCursor`] walks the entries of a tar (GNU, ustar, pax), mtree
//! or zip archive in order.  Each [`ArchiveEntry`] is a snapshot of one entry's
//! metadata plus, while it is the current entry, a one-shot
//! [`BlockProducer`] for its content.  Misusing an entry that the cursor has
//! left behind fails with a [`StateError`] rather than returning data that
//! belongs to another entry.
//!
//! ```no_run
//! use archive_cursor::{ArchiveCursor, ReadOptions};
//!
//! # fn main() -> archive_cursor::Result<()> {
//! let mut cursor = ArchiveCursor::open_path("backup.tar", ReadOptions::new())?;
//! while let Some(entry) = cursor.advance()? {
//!     let content = entry.read_to_end()?;
//!     println!("{} ({} bytes)", entry.pathname()?, content.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`ArchiveWriter`] produces the same formats.

pub mod codec;
pub mod cursor;
pub mod digest;
pub mod engine;
pub mod entry;
pub mod error;
pub mod header;
pub mod writer;

mod util;

#[cfg(test)]
mod test;

pub use codec::Codec;
pub use cursor::{ArchiveCursor, ReadOptions};
pub use digest::{DigestAlgorithm, StoredDigests};
pub use engine::{Block, Format};
pub use entry::{ArchiveEntry, BlockProducer, EntryState};
pub use error::{EncodingError, Error, Result, StateError};
pub use header::{EntryHeader, FileType, Timestamp};
pub use writer::{ArchiveWriter, WriteOptions};
