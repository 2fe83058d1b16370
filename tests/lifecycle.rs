use anyhow::Result;
use similar_asserts::assert_eq;

use archive_cursor::{
    ArchiveCursor, ArchiveWriter, EntryState, Error, Format, ReadOptions, StateError,
    StoredDigests, WriteOptions,
};

fn three_files() -> Result<Vec<u8>> {
    let mut writer = ArchiveWriter::new(Vec::new(), WriteOptions::new(Format::GnuTar))?;
    writer.add_file("Cargo.toml")?;
    writer.add_file("src/lib.rs")?;
    writer.add_file("src/entry.rs")?;
    Ok(writer.finish()?)
}

fn is_state_error(result: Option<archive_cursor::Result<archive_cursor::Block>>) -> bool {
    matches!(result, Some(Err(Error::State(_))))
}

#[test]
fn test_the_life_cycle_of_archive_entries() -> Result<()> {
    let data = three_files()?;
    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;

    let entry1 = cursor.advance()?.unwrap();
    assert_eq!(entry1.state(), EntryState::Active);
    let mut blocks = entry1.blocks()?;
    for block in blocks.by_ref() {
        block?;
    }
    assert_eq!(entry1.state(), EntryState::Consumed);
    // pulling past the end is a usage error, not an empty sequence
    assert!(is_state_error(blocks.next()));
    assert!(matches!(
        entry1.blocks(),
        Err(Error::State(StateError::Consumed(0)))
    ));
    // metadata of a consumed entry stays readable
    assert_eq!(entry1.pathname()?, "Cargo.toml");

    let entry2 = cursor.advance()?.unwrap();
    assert_eq!(entry2.state(), EntryState::Active);
    assert_eq!(entry1.state(), EntryState::Consumed);
    assert!(matches!(
        entry1.blocks(),
        Err(Error::State(StateError::Consumed(0)))
    ));

    let entry3 = cursor.advance()?.unwrap();
    assert_eq!(entry3.state(), EntryState::Active);
    assert_eq!(entry2.state(), EntryState::Passed);
    assert_eq!(entry1.state(), EntryState::Consumed);

    // a passed entry refuses both content and metadata
    assert!(matches!(
        entry2.blocks(),
        Err(Error::State(StateError::Passed(1)))
    ));
    assert!(matches!(
        entry2.pathname(),
        Err(Error::State(StateError::Passed(1)))
    ));
    assert_eq!(entry3.pathname()?, "src/entry.rs");

    assert!(cursor.advance()?.is_none());
    assert_eq!(entry3.state(), EntryState::Passed);
    assert_eq!(cursor.entries_read(), 3);
    Ok(())
}

#[test]
fn test_at_most_one_active_entry() -> Result<()> {
    let data = three_files()?;
    let cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;

    let mut seen = vec![];
    for entry in cursor {
        let entry = entry?;
        seen.push(entry);
        let active = seen
            .iter()
            .filter(|e| e.state() == EntryState::Active)
            .count();
        assert_eq!(active, 1);
        assert_eq!(seen.last().unwrap().state(), EntryState::Active);
    }
    assert_eq!(seen.len(), 3);
    Ok(())
}

#[test]
fn test_single_producer_per_entry() -> Result<()> {
    let data = three_files()?;
    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;
    let entry = cursor.advance()?.unwrap();

    let _blocks = entry.blocks()?;
    assert!(matches!(
        entry.blocks(),
        Err(Error::State(StateError::ProducerTaken(0)))
    ));
    // the producer was never pulled, so the entry is still active
    assert_eq!(entry.state(), EntryState::Active);
    Ok(())
}

#[test]
fn test_partial_drain_then_advance() -> Result<()> {
    let first = vec![b'x'; 50_000];
    let second = b"second entry".to_vec();

    let mut writer = ArchiveWriter::new(Vec::<u8>::new(), WriteOptions::new(Format::Ustar))?;
    writer.add_file_from_memory("first", 50_000, [&first], &StoredDigests::new())?;
    writer.add_file_from_memory("second", 12, [&second], &StoredDigests::new())?;
    let data = writer.finish()?;

    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;
    let entry1 = cursor.advance()?.unwrap();
    let mut blocks = entry1.blocks()?;
    let block = blocks.next().unwrap()?;
    assert_eq!(block.offset, 0);
    assert_eq!(block.data.len(), 10240);

    let entry2 = cursor.advance()?.unwrap();
    assert_eq!(entry1.state(), EntryState::Passed);
    assert!(matches!(
        blocks.next(),
        Some(Err(Error::State(StateError::Passed(0))))
    ));

    // the unread rest of the first entry was skipped
    assert_eq!(entry2.pathname()?, "second");
    assert_eq!(entry2.read_to_end()?, second);
    assert_eq!(entry2.state(), EntryState::Consumed);
    Ok(())
}

#[test]
fn test_content_matches_source() -> Result<()> {
    let data = three_files()?;
    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;
    while let Some(entry) = cursor.advance()? {
        let expected = std::fs::read(entry.pathname()?)?;
        let mut copied = vec![];
        assert_eq!(entry.copy_to(&mut copied)?, expected.len() as u64);
        assert_eq!(copied, expected);
    }
    Ok(())
}

#[test]
fn test_drop_cursor_with_live_producer() -> Result<()> {
    let data = three_files()?;
    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;
    let entry = cursor.advance()?.unwrap();
    let mut blocks = entry.blocks()?;
    drop(cursor);

    assert!(matches!(
        blocks.next(),
        Some(Err(Error::State(StateError::Closed(0))))
    ));
    assert_eq!(entry.state(), EntryState::Passed);
    Ok(())
}
