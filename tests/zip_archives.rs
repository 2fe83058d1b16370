use std::io::{Cursor, Write};

use anyhow::Result;
use similar_asserts::assert_eq;

use archive_cursor::{ArchiveCursor, EntryState, FileType, Format, ReadOptions};

fn zip_archive(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut data = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut data);
        let options = zip::write::FileOptions::default();
        zip.add_directory("docs/", options)?;
        for (name, content) in files {
            zip.start_file(*name, options.unix_permissions(0o600))?;
            zip.write_all(content)?;
        }
        zip.finish()?;
    }
    Ok(data.into_inner())
}

fn listing(cursor: ArchiveCursor<'_>) -> Result<Vec<(String, Vec<u8>)>> {
    let mut entries = vec![];
    for entry in cursor {
        let entry = entry?;
        entries.push((entry.pathname()?, entry.read_to_end()?));
    }
    Ok(entries)
}

#[test]
fn test_unicode_names() -> Result<()> {
    let files: &[(&str, &[u8])] = &[
        ("docs/Äpfel und Birnen.txt", b"obst"),
        ("docs/\u{7b80}\u{4f53}\u{4e2d}\u{6587}.md", b"# title\n"),
        ("docs/\u{1f600}", b""),
    ];
    let data = zip_archive(files)?;

    let cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;
    assert_eq!(cursor.format(), Format::Zip);

    let mut expected = vec![("docs/".to_string(), vec![])];
    expected.extend(files.iter().map(|(name, content)| (name.to_string(), content.to_vec())));
    assert_eq!(listing(cursor)?, expected);
    Ok(())
}

#[test]
fn test_entry_types_and_modes() -> Result<()> {
    let data = zip_archive(&[("docs/secret", b"hush")])?;
    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new().block_size(3))?;

    let dir = cursor.advance()?.unwrap();
    assert_eq!(dir.header()?.file_type, FileType::Directory);

    let file = cursor.advance()?.unwrap();
    let header = file.header()?;
    assert_eq!(header.file_type, FileType::Regular);
    assert_eq!(header.perm, 0o600);
    assert_eq!(header.size, 4);
    assert!(header.mtime.unwrap().secs >= 315_532_800);

    let blocks: Vec<_> = file.blocks()?.collect::<archive_cursor::Result<_>>()?;
    assert_eq!(blocks.len(), 2);
    assert_eq!(file.state(), EntryState::Consumed);
    assert!(cursor.advance()?.is_none());
    Ok(())
}

#[test]
fn test_archive_with_unicode_filename() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("\u{fc}ml\u{e4}ut\u{e9}.zip");
    std::fs::write(&path, zip_archive(&[("docs/a", b"1")])?)?;

    let cursor = ArchiveCursor::open_path(&path, ReadOptions::new().format(Format::Zip))?;
    let names: Vec<_> = listing(cursor)?.into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["docs/", "docs/a"]);
    Ok(())
}

#[test]
fn test_corrupt_content() -> Result<()> {
    let mut data = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut data);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("plain", options)?;
        zip.write_all(b"stored content")?;
        zip.finish()?;
    }
    let mut data = data.into_inner();
    // local header (30 bytes) and the name precede the stored content
    data[30 + "plain".len()] ^= 0xff;

    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;
    let err = cursor.advance().unwrap_err();
    assert!(err.is_damaged(), "{err}");
    assert!(cursor.advance()?.is_none());
    Ok(())
}
