//! Zip engine, read only.
//!
//! Entries are read in order from their local file headers with
//! [`read_zipfile_from_stream()`], so the source does not have to be seekable
//! and the central directory is never consulted.  The content of each entry is
//! decompressed when the cursor reaches it and then handed out from memory.

use std::io::{self, ErrorKind, Read};

use ::zip::{read::read_zipfile_from_stream, result::ZipError, DateTime};
use log::trace;

use super::{ArchiveRead, Block};
use crate::{
    error::{Error, Result},
    header::{EntryHeader, FileType, Timestamp},
};

/// Signature of a local file header, the first bytes of any non-empty zip.
pub(crate) const LOCAL_HEADER_MAGIC: &[u8] = b"PK\x03\x04";

fn zip_error(err: ZipError) -> Error {
    match err {
        ZipError::Io(err) => io_error(err),
        ZipError::UnsupportedArchive(detail) => Error::Unsupported(format!("zip: {detail}")),
        other => Error::Damaged(format!("Damaged zip archive: {other}")),
    }
}

fn io_error(err: io::Error) -> Error {
    match err.kind() {
        ErrorKind::UnexpectedEof => Error::Damaged("Truncated zip archive".to_string()),
        // checksum mismatches and corrupt compressed streams
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::Other => {
            Error::Damaged(format!("Damaged zip archive: {err}"))
        }
        _ => Error::Io(err),
    }
}

/// Seconds since the epoch of an MS-DOS timestamp, read as UTC.
fn dos_time_to_unix(time: &DateTime) -> i64 {
    let (year, month, day) = (
        i64::from(time.year()),
        i64::from(time.month()),
        i64::from(time.day()),
    );
    // days since 1970-01-01 in the proleptic Gregorian calendar
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let year_of_era = y - era * 400;
    let day_of_year = (153 * ((month + 9) % 12) + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    let days = era * 146_097 + day_of_era - 719_468;

    days * 86_400
        + i64::from(time.hour()) * 3600
        + i64::from(time.minute()) * 60
        + i64::from(time.second())
}

/// Sequential reader for zip archives.
pub struct ZipReader<R: Read> {
    reader: R,
    block_size: usize,
    /// decompressed content of the current entry
    content: Vec<u8>,
    position: usize,
    finished: bool,
}

impl<R: Read> ZipReader<R> {
    pub fn new(reader: R, block_size: usize) -> Self {
        Self {
            reader,
            block_size: block_size.max(1),
            content: Vec::new(),
            position: 0,
            finished: false,
        }
    }
}

impl<R: Read> ArchiveRead for ZipReader<R> {
    fn next_header(&mut self) -> Result<Option<EntryHeader>> {
        self.content.clear();
        self.position = 0;
        if self.finished {
            return Ok(None);
        }

        let mut file = match read_zipfile_from_stream(&mut self.reader) {
            Ok(Some(file)) => file,
            Ok(None) => {
                trace!("zip central directory reached");
                self.finished = true;
                return Ok(None);
            }
            Err(err) => return Err(zip_error(err)),
        };

        let mode = file.unix_mode();
        let file_type = match mode.and_then(FileType::from_mode) {
            Some(file_type) => file_type,
            None if file.is_dir() => FileType::Directory,
            None => FileType::Regular,
        };

        let mut entry = EntryHeader::new(file_type, file.name_raw().to_vec());
        entry.perm = match mode {
            Some(mode) => mode & 0o7777,
            None if file_type == FileType::Directory => 0o755,
            None => 0o644,
        };
        entry.mtime = Some(Timestamp::new(dos_time_to_unix(&file.last_modified()), 0));

        file.read_to_end(&mut self.content).map_err(io_error)?;
        drop(file);

        if file_type == FileType::Symlink {
            // zip stores the link target as the entry's content
            entry.linkname = Some(std::mem::take(&mut self.content));
        } else {
            entry.size = self.content.len() as u64;
        }

        trace!(
            "zip entry {:?} {:?} size {}",
            String::from_utf8_lossy(&entry.pathname),
            entry.file_type,
            entry.size
        );
        Ok(Some(entry))
    }

    fn read_block(&mut self) -> Result<Option<Block>> {
        if self.position >= self.content.len() {
            return Ok(None);
        }
        let end = (self.position + self.block_size).min(self.content.len());
        let block = Block {
            data: self.content[self.position..end].to_vec(),
            offset: self.position as u64,
        };
        self.position = end;
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_dos_time_to_unix() {
        let epoch_of_dos = DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(dos_time_to_unix(&epoch_of_dos), 315_532_800);

        let leap_day = DateTime::from_date_and_time(2020, 2, 29, 12, 30, 14).unwrap();
        assert_eq!(dos_time_to_unix(&leap_day), 1_582_979_414);
    }

    #[test]
    fn test_blocks_from_memory() {
        let mut data = io::Cursor::new(Vec::new());
        {
            let mut zip = ::zip::ZipWriter::new(&mut data);
            zip.start_file("big", ::zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(&[5u8; 2500]).unwrap();
            zip.finish().unwrap();
        }
        let data = data.into_inner();

        let mut reader = ZipReader::new(&data[..], 1000);
        let entry = reader.next_header().unwrap().unwrap();
        assert_eq!(entry.size, 2500);
        let mut lengths = vec![];
        while let Some(block) = reader.read_block().unwrap() {
            lengths.push((block.offset, block.data.len()));
        }
        assert_eq!(lengths, [(0, 1000), (1000, 1000), (2000, 500)]);
        assert!(reader.next_header().unwrap().is_none());
    }
}
