//! Entry views and their lifecycle.
//!
//! Every entry handed out by an [`ArchiveCursor`](crate::ArchiveCursor) starts
//! [`EntryState::Active`].  It leaves that state exactly once:
//!
//! ```text
//! Active   --[BlockProducer drained]--> Consumed
//! Active   --[cursor advanced/closed]--> Passed
//! Consumed --[cursor advanced]---------> Consumed
//! ```
//!
//! Content can only be streamed while the entry is active, and only through a
//! single [`BlockProducer`].  Metadata stays readable after the content was
//! consumed but not once the cursor has moved past the entry.

use std::{
    cell::{Cell, RefCell},
    fmt,
    io::Write,
    rc::Rc,
};

use crate::{
    codec::Codec,
    cursor::Session,
    digest::StoredDigests,
    engine::Block,
    error::{Error, Result, StateError},
    header::EntryHeader,
};

/// Lifecycle state of an [`ArchiveEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// The entry is the cursor's current entry.
    Active,
    /// The entry's content was streamed to completion.
    Consumed,
    /// The cursor moved past the entry.
    Passed,
}

/// Lifecycle bookkeeping shared between a view, its producer and the cursor.
#[derive(Debug)]
pub(crate) struct EntrySlot {
    index: usize,
    state: Cell<EntryState>,
    producer_taken: Cell<bool>,
}

impl EntrySlot {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            state: Cell::new(EntryState::Active),
            producer_taken: Cell::new(false),
        }
    }

    pub(crate) fn state(&self) -> EntryState {
        self.state.get()
    }

    fn check_active(&self) -> std::result::Result<(), StateError> {
        match self.state.get() {
            EntryState::Active => Ok(()),
            EntryState::Consumed => Err(StateError::Consumed(self.index)),
            EntryState::Passed => Err(StateError::Passed(self.index)),
        }
    }

    fn consume(&self) {
        if self.state.get() == EntryState::Active {
            self.state.set(EntryState::Consumed);
        }
    }

    /// Called by the cursor when it moves on.  Consumed entries stay consumed.
    pub(crate) fn pass(&self) {
        if self.state.get() == EntryState::Active {
            self.state.set(EntryState::Passed);
        }
    }
}

/// One entry of an archive being read.
///
/// The view owns a snapshot of the entry's metadata.  Text fields are decoded
/// with the codec the cursor was opened with; the raw bytes are always
/// available through the `*_bytes()` accessors.
pub struct ArchiveEntry<'a> {
    header: EntryHeader,
    codec: Codec,
    slot: Rc<EntrySlot>,
    session: Rc<RefCell<Session<'a>>>,
}

impl<'a> ArchiveEntry<'a> {
    pub(crate) fn new(
        header: EntryHeader,
        codec: Codec,
        slot: Rc<EntrySlot>,
        session: Rc<RefCell<Session<'a>>>,
    ) -> Self {
        Self {
            header,
            codec,
            slot,
            session,
        }
    }

    /// Position of the entry in its archive, starting at 0.
    pub fn index(&self) -> usize {
        self.slot.index
    }

    pub fn state(&self) -> EntryState {
        self.slot.state()
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The entry's metadata.
    ///
    /// Fails with [`StateError::Passed`] once the cursor has moved past the entry.
    pub fn header(&self) -> Result<&EntryHeader> {
        match self.slot.state() {
            EntryState::Passed => Err(StateError::Passed(self.slot.index).into()),
            EntryState::Active | EntryState::Consumed => Ok(&self.header),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        Ok(self.codec.decode(bytes)?)
    }

    pub fn pathname_bytes(&self) -> Result<&[u8]> {
        Ok(&self.header()?.pathname)
    }

    /// The pathname decoded with the cursor's codec.
    pub fn pathname(&self) -> Result<String> {
        self.decode(self.pathname_bytes()?)
    }

    /// Target of a symbolic or hard link.
    pub fn linkname_bytes(&self) -> Result<Option<&[u8]>> {
        Ok(self.header()?.linkname.as_deref())
    }

    pub fn linkname(&self) -> Result<Option<String>> {
        self.linkname_bytes()?
            .map(|link| self.decode(link))
            .transpose()
    }

    pub fn uname(&self) -> Result<Option<String>> {
        self.header()?
            .uname
            .as_deref()
            .map(|name| self.decode(name))
            .transpose()
    }

    pub fn gname(&self) -> Result<Option<String>> {
        self.header()?
            .gname
            .as_deref()
            .map(|name| self.decode(name))
            .transpose()
    }

    /// Extended attributes, names decoded with the cursor's codec.
    pub fn xattrs(&self) -> Result<Vec<(String, Vec<u8>)>> {
        self.header()?
            .xattrs
            .iter()
            .map(|(name, value)| Ok((self.decode(name)?, value.clone())))
            .collect()
    }

    pub fn stored_digests(&self) -> Result<&StoredDigests> {
        Ok(&self.header()?.digests)
    }

    /// Hands out the producer for the entry's content.
    ///
    /// There is only ever one producer per entry: a second call fails with
    /// [`StateError::ProducerTaken`], and calls on an entry that is no longer
    /// active fail with [`StateError::Consumed`] or [`StateError::Passed`].
    pub fn blocks(&self) -> Result<BlockProducer<'a>> {
        if self.session.borrow().is_closed() {
            return Err(StateError::Closed(self.slot.index).into());
        }
        self.slot.check_active()?;
        if self.slot.producer_taken.replace(true) {
            return Err(StateError::ProducerTaken(self.slot.index).into());
        }
        Ok(BlockProducer {
            slot: Rc::clone(&self.slot),
            session: Rc::clone(&self.session),
        })
    }

    /// Streams the whole content into memory.
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        self.copy_to(&mut content)?;
        Ok(content)
    }

    /// Streams the whole content into `writer`, returning the number of bytes
    /// copied.
    pub fn copy_to(&self, writer: &mut impl Write) -> Result<u64> {
        let mut copied = 0;
        for block in self.blocks()? {
            let block = block?;
            writer.write_all(&block.data)?;
            copied += block.data.len() as u64;
        }
        Ok(copied)
    }
}

impl fmt::Debug for ArchiveEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("index", &self.slot.index)
            .field("state", &self.slot.state())
            .field("pathname", &String::from_utf8_lossy(&self.header.pathname))
            .finish()
    }
}

/// Lazy, single-use sequence of the content blocks of one entry.
///
/// Returning `None` marks the entry consumed.  Pulling again after that, after
/// the cursor moved on, or after it was closed yields a [`StateError`] instead
/// of an empty sequence.
pub struct BlockProducer<'a> {
    slot: Rc<EntrySlot>,
    session: Rc<RefCell<Session<'a>>>,
}

impl BlockProducer<'_> {
    /// Index of the entry whose content this produces.
    pub fn index(&self) -> usize {
        self.slot.index
    }
}

impl Iterator for BlockProducer<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut session = self.session.borrow_mut();
        let Some(engine) = session.engine.as_mut() else {
            return Some(Err(StateError::Closed(self.slot.index).into()));
        };
        if let Err(err) = self.slot.check_active() {
            return Some(Err(err.into()));
        }

        match engine.read_block() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.slot.consume();
                None
            }
            // the engine is still in step; the content can only be skipped
            Err(err @ Error::Unsupported(_)) => Some(Err(err)),
            Err(err) => {
                // the engine cannot be trusted after a read error
                session.finished = true;
                self.slot.pass();
                Some(Err(err))
            }
        }
    }
}

impl fmt::Debug for BlockProducer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockProducer")
            .field("index", &self.slot.index)
            .field("state", &self.slot.state())
            .finish()
    }
}
