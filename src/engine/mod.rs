//! The format engine: single-pass readers and writers for each container format.
//!
//! An engine reader is a stateful cursor.  [`ArchiveRead::next_header()`] moves it
//! to the next entry (skipping whatever content of the previous entry was not
//! read) and [`ArchiveRead::read_block()`] returns the content of the current
//! entry piece by piece.  Nothing here tracks which entry a caller believes is
//! current; that is the job of [`crate::cursor`].

use std::{fmt, io::Write, str::FromStr};

use crate::{
    error::{Error, Result},
    header::EntryHeader,
};

pub mod mtree;
pub mod tar;
pub mod zip;

/// Default size of the blocks handed out while streaming entry content.
pub const DEFAULT_BLOCK_SIZE: usize = 10240;

/// A chunk of entry content together with its offset in the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub data: Vec<u8>,
    pub offset: u64,
}

/// Reading side of a format engine.
pub trait ArchiveRead {
    /// Advances to the next entry.  Returns `Ok(None)` at the end of the archive.
    fn next_header(&mut self) -> Result<Option<EntryHeader>>;

    /// Reads the next block of the current entry's content.  Returns `Ok(None)`
    /// once the content is exhausted.
    fn read_block(&mut self) -> Result<Option<Block>>;
}

/// Writing side of a format engine.
pub trait ArchiveWrite<W: Write> {
    /// Whether the format can store digests with its entries.
    fn supports_digests(&self) -> bool;

    /// Starts a new entry.
    fn write_header(&mut self, header: &EntryHeader) -> Result<()>;

    /// Appends content to the current entry.
    fn write_data(&mut self, data: &[u8]) -> Result<()>;

    /// Completes the current entry.
    fn finish_entry(&mut self) -> Result<()>;

    /// Writes any trailer and returns the sink.
    fn finish(self: Box<Self>) -> Result<W>;
}

/// Container formats known to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// GNU tar: long names through `././@LongLink` records.
    #[default]
    GnuTar,
    /// POSIX.1-1988 ustar.
    Ustar,
    /// POSIX.1-2001 pax interchange format.
    Pax,
    /// BSD mtree specification files.
    Mtree,
    /// PKWARE zip, read only.
    Zip,
}

impl Format {
    pub const fn name(&self) -> &'static str {
        match self {
            Format::GnuTar => "gnutar",
            Format::Ustar => "ustar",
            Format::Pax => "pax",
            Format::Mtree => "mtree",
            Format::Zip => "zip",
        }
    }

    pub const fn is_tar(&self) -> bool {
        !matches!(self, Format::Mtree | Format::Zip)
    }

    /// Guesses the format from the first bytes of an archive.
    ///
    /// Tar flavours are not told apart: all of them are read by the same parser,
    /// and the reported format is the one suggested by the first header's magic.
    pub fn detect(prefix: &[u8]) -> Option<Self> {
        if prefix.starts_with(b"#mtree") {
            return Some(Format::Mtree);
        }
        if prefix.starts_with(zip::LOCAL_HEADER_MAGIC) {
            return Some(Format::Zip);
        }
        if prefix.len() < tar::BLOCK_SIZE {
            return None;
        }
        let block = &prefix[..tar::BLOCK_SIZE];
        match &block[257..265] {
            b"ustar  \0" => Some(Format::GnuTar),
            magic if magic.starts_with(b"ustar\0") => match block[156] {
                b'x' | b'g' => Some(Format::Pax),
                _ => Some(Format::Ustar),
            },
            // pre-POSIX tar has no magic, only a valid checksum
            _ if tar::checksum_matches(block) => Some(Format::GnuTar),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gnutar" | "gnu" => Ok(Format::GnuTar),
            "ustar" => Ok(Format::Ustar),
            "pax" | "posix" | "tar" | "paxr" => Ok(Format::Pax),
            "mtree" => Ok(Format::Mtree),
            "zip" => Ok(Format::Zip),
            _ => Err(Error::Open(format!("unknown archive format {s:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_format_names() {
        for format in [
            Format::GnuTar,
            Format::Ustar,
            Format::Pax,
            Format::Mtree,
            Format::Zip,
        ] {
            assert_eq!(format.name().parse::<Format>().unwrap(), format);
        }
        assert_eq!("tar".parse::<Format>().unwrap(), Format::Pax);
        assert!("7z".parse::<Format>().is_err());
        assert!(!Format::Zip.is_tar());
    }

    #[test]
    fn test_detect() {
        assert_eq!(Format::detect(b"#mtree\n"), Some(Format::Mtree));
        assert_eq!(Format::detect(b"PK\x03\x04"), Some(Format::Zip));
        assert_eq!(Format::detect(b"PK\x05\x06"), None);
        assert_eq!(Format::detect(&[0u8; 1024]), None);

        let mut gnu = ::tar::Header::new_gnu();
        gnu.set_path("a").unwrap();
        gnu.set_cksum();
        assert_eq!(Format::detect(gnu.as_bytes()), Some(Format::GnuTar));

        let mut ustar = ::tar::Header::new_ustar();
        ustar.set_path("a").unwrap();
        ustar.set_cksum();
        assert_eq!(Format::detect(ustar.as_bytes()), Some(Format::Ustar));

        let mut old = ::tar::Header::new_old();
        old.set_path("a").unwrap();
        old.set_cksum();
        assert_eq!(Format::detect(old.as_bytes()), Some(Format::GnuTar));
    }
}
