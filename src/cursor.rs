//! Sequential reading of archives.
//!
//! [`ArchiveCursor`] owns the format engine and is the only thing that moves
//! it from one entry to the next.  Each step hands out a fresh
//! [`ArchiveEntry`] and retires the previous one, so at most one entry of a
//! cursor is ever active.

use std::{
    cell::RefCell,
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
    rc::Rc,
};

use log::debug;

use crate::{
    codec::Codec,
    engine::{self, mtree::MtreeReader, tar::TarReader, zip::ZipReader, ArchiveRead, Format},
    entry::{ArchiveEntry, EntrySlot},
    error::{Error, Result},
};

/// Options for opening an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Expected format, or `None` to detect it from the data.
    pub format: Option<Format>,
    /// Codec for pathnames, link targets, owner names and xattr names.
    pub codec: Codec,
    /// Maximum size of the blocks produced while streaming content.
    pub block_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            format: None,
            codec: Codec::default(),
            block_size: engine::DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }
}

/// Engine context shared by a cursor, its entries and their producers.
pub(crate) struct Session<'a> {
    /// `None` once the cursor has been closed.
    pub(crate) engine: Option<Box<dyn ArchiveRead + 'a>>,
    pub(crate) current: Option<Rc<EntrySlot>>,
    /// Set at the end of the archive and after any engine error.
    pub(crate) finished: bool,
}

impl Session<'_> {
    pub(crate) fn is_closed(&self) -> bool {
        self.engine.is_none()
    }

    fn close(&mut self) {
        if let Some(current) = self.current.take() {
            current.pass();
        }
        self.engine = None;
    }
}

/// Picks the format to read with from the detected one and the caller's hint.
fn resolve_format(detected: Option<Format>, hint: Option<Format>) -> Result<Format> {
    match (detected, hint) {
        (None, _) => Err(Error::Open("unrecognized archive format".to_string())),
        (Some(detected), None) => Ok(detected),
        // any tar flavour satisfies a tar hint
        (Some(detected), Some(hint)) if detected == hint || (detected.is_tar() && hint.is_tar()) => {
            Ok(detected)
        }
        (Some(detected), Some(hint)) => Err(Error::Open(format!(
            "expected a {hint} archive, found {detected}"
        ))),
    }
}

/// A forward-only cursor over the entries of an archive.
///
/// Entries are produced by [`ArchiveCursor::advance()`] or by iterating the
/// cursor.  Dropping or closing the cursor releases the engine; entries and
/// producers that outlive it fail with [`StateError`](crate::StateError)s.
pub struct ArchiveCursor<'a> {
    session: Rc<RefCell<Session<'a>>>,
    format: Format,
    codec: Codec,
    entries_read: usize,
}

impl<'a> ArchiveCursor<'a> {
    /// Opens an archive read from `source`.
    ///
    /// The format is detected from the first bytes of the source; a format in
    /// `options` only has to agree with the detected one.
    pub fn open(mut source: impl Read + 'a, options: ReadOptions) -> Result<Self> {
        let mut prefix = Vec::with_capacity(engine::tar::BLOCK_SIZE);
        (&mut source)
            .take(engine::tar::BLOCK_SIZE as u64)
            .read_to_end(&mut prefix)
            .map_err(|e| Error::Open(format!("cannot read archive: {e}")))?;

        if prefix.is_empty() {
            return Err(Error::Open("empty source".to_string()));
        }

        // an archive holding nothing but its end marker
        let empty_tar = prefix.len() == engine::tar::BLOCK_SIZE && prefix.iter().all(|b| *b == 0);
        let detected = match Format::detect(&prefix) {
            None if empty_tar => Some(Format::GnuTar),
            detected => detected,
        };
        let format = resolve_format(detected, options.format)?;
        debug!("opening {format} archive");

        let stream = io::Cursor::new(prefix).chain(source);
        let engine: Box<dyn ArchiveRead + 'a> = match format {
            Format::Mtree => Box::new(MtreeReader::new(BufReader::new(stream))),
            Format::Zip => Box::new(ZipReader::new(stream, options.block_size)),
            _ => Box::new(TarReader::new(stream, options.block_size)),
        };

        Ok(Self {
            session: Rc::new(RefCell::new(Session {
                engine: Some(engine),
                current: None,
                finished: false,
            })),
            format,
            codec: options.codec,
            entries_read: 0,
        })
    }

    /// Opens an archive held in memory.
    pub fn open_memory(data: &'a [u8], options: ReadOptions) -> Result<Self> {
        Self::open(data, options)
    }

    /// Opens an archive file.
    pub fn open_path(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Open(format!("{}: {e}", path.display())))?;
        Self::open(BufReader::new(file), options)
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Number of entries produced so far.
    pub fn entries_read(&self) -> usize {
        self.entries_read
    }

    /// Moves to the next entry.
    ///
    /// The previous entry is passed unless its content was consumed.  Returns
    /// `Ok(None)` at the end of the archive.  After an error no further
    /// entries are produced.
    pub fn advance(&mut self) -> Result<Option<ArchiveEntry<'a>>> {
        let mut session = self.session.borrow_mut();
        if let Some(previous) = session.current.take() {
            previous.pass();
        }
        if session.finished {
            return Ok(None);
        }
        let Some(engine) = session.engine.as_mut() else {
            return Ok(None);
        };

        match engine.next_header() {
            Ok(Some(header)) => {
                let slot = Rc::new(EntrySlot::new(self.entries_read));
                session.current = Some(Rc::clone(&slot));
                self.entries_read += 1;
                drop(session);
                Ok(Some(ArchiveEntry::new(
                    header,
                    self.codec,
                    slot,
                    Rc::clone(&self.session),
                )))
            }
            Ok(None) => {
                debug!("end of archive after {} entries", self.entries_read);
                session.finished = true;
                Ok(None)
            }
            Err(err) => {
                debug!("stopping after entry {}: {err}", self.entries_read);
                session.finished = true;
                Err(err)
            }
        }
    }

    /// Closes the archive.  The current entry is passed.
    pub fn close(self) {
        // see Drop
    }
}

impl<'a> Iterator for ArchiveCursor<'a> {
    type Item = Result<ArchiveEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

impl Drop for ArchiveCursor<'_> {
    fn drop(&mut self) {
        if let Ok(mut session) = self.session.try_borrow_mut() {
            session.close();
            debug!("closed {} archive", self.format);
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{
        entry::EntryState,
        error::StateError,
        test::{gnutar_archive, mtree_archive},
    };

    #[test]
    fn test_resolve_format() {
        assert_eq!(resolve_format(Some(Format::Ustar), None).unwrap(), Format::Ustar);
        assert_eq!(
            resolve_format(Some(Format::GnuTar), Some(Format::Pax)).unwrap(),
            Format::GnuTar
        );
        assert!(matches!(
            resolve_format(Some(Format::Mtree), Some(Format::Pax)),
            Err(Error::Open(_))
        ));
        assert!(matches!(
            resolve_format(Some(Format::Zip), Some(Format::Mtree)),
            Err(Error::Open(_))
        ));
        assert!(matches!(resolve_format(None, None), Err(Error::Open(_))));
    }

    #[test]
    fn test_empty_sources() {
        assert!(matches!(
            ArchiveCursor::open_memory(b"", ReadOptions::new()),
            Err(Error::Open(_))
        ));

        let zeros = [0u8; 1024];
        let mut cursor = ArchiveCursor::open_memory(&zeros, ReadOptions::new()).unwrap();
        assert!(cursor.advance().unwrap().is_none());
        assert_eq!(cursor.entries_read(), 0);
    }

    #[test]
    fn test_end_is_sticky() {
        let data = gnutar_archive(&[("a", b"1"), ("b", b"22")]);
        let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new()).unwrap();
        assert_eq!(cursor.format(), Format::GnuTar);
        assert_eq!(cursor.by_ref().count(), 2);
        assert!(cursor.advance().unwrap().is_none());
        assert!(cursor.advance().unwrap().is_none());
    }

    #[test]
    fn test_close_retires_entries() {
        let data = gnutar_archive(&[("a", b"content")]);
        let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new()).unwrap();
        let entry = cursor.advance().unwrap().unwrap();
        let mut blocks = entry.blocks().unwrap();
        cursor.close();

        assert_eq!(entry.state(), EntryState::Passed);
        assert!(matches!(
            blocks.next(),
            Some(Err(Error::State(StateError::Closed(0))))
        ));
        assert!(matches!(
            entry.blocks(),
            Err(Error::State(StateError::Closed(0)))
        ));
        assert!(matches!(
            entry.header(),
            Err(Error::State(StateError::Passed(0)))
        ));
    }

    #[test]
    fn test_small_blocks() {
        let data = gnutar_archive(&[("big", &[7u8; 2500])]);
        let mut cursor =
            ArchiveCursor::open_memory(&data, ReadOptions::new().block_size(1000)).unwrap();
        let entry = cursor.advance().unwrap().unwrap();
        let offsets: Vec<_> = entry
            .blocks()
            .unwrap()
            .map(|block| {
                let block = block.unwrap();
                (block.offset, block.data.len())
            })
            .collect();
        assert_eq!(offsets, [(0, 1000), (1000, 1000), (2000, 500)]);
        assert_eq!(entry.state(), EntryState::Consumed);
    }

    #[test]
    fn test_mtree_format_hint() {
        let data = mtree_archive();
        let cursor = ArchiveCursor::open_memory(
            data.as_bytes(),
            ReadOptions::new().format(Format::Mtree),
        )
        .unwrap();
        assert_eq!(cursor.format(), Format::Mtree);
        assert!(matches!(
            ArchiveCursor::open_memory(data.as_bytes(), ReadOptions::new().format(Format::Ustar)),
            Err(Error::Open(_))
        ));
    }
}
