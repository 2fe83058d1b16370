use anyhow::Result;
use similar_asserts::assert_eq;

use archive_cursor::{
    ArchiveCursor, ArchiveWriter, Codec, Error, Format, ReadOptions, StoredDigests, WriteOptions,
};

fn written_with(codec: Codec, format: Format, name: &str) -> Result<Vec<u8>> {
    let options = WriteOptions::new(format).codec(codec);
    let mut writer = ArchiveWriter::new(Vec::<u8>::new(), options)?;
    writer.add_file_from_memory(name, 4, [b"data"], &StoredDigests::new())?;
    Ok(writer.finish()?)
}

#[test]
fn test_non_ascii_encoding_of_file_metadata() -> Result<()> {
    let options = WriteOptions::new(Format::Ustar).codec(Codec::Cp037);
    let mut writer = ArchiveWriter::new(Vec::<u8>::new(), options)?;
    writer.add_file("Cargo.toml")?;
    let data = writer.finish()?;

    let encoded = Codec::Cp037.encode("Cargo.toml")?;
    assert_eq!(
        encoded,
        [0xc3, 0x81, 0x99, 0x87, 0x96, 0x4b, 0xa3, 0x96, 0x94, 0x93]
    );

    // the raw bytes are what the writer stored, whatever the reader's codec
    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new())?;
    let entry = cursor.advance()?.unwrap();
    assert_eq!(entry.pathname_bytes()?, &encoded[..]);
    assert!(matches!(entry.pathname(), Err(Error::Encoding(_))));
    // a decoding failure does not poison the entry or the cursor
    assert_eq!(entry.read_to_end()?, std::fs::read("Cargo.toml")?);
    assert!(cursor.advance()?.is_none());

    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new().codec(Codec::Latin1))?;
    let entry = cursor.advance()?.unwrap();
    let mismatched = entry.pathname()?;
    assert!(mismatched != "Cargo.toml");
    assert_eq!(mismatched.chars().count(), "Cargo.toml".len());

    let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new().codec(Codec::Cp037))?;
    let entry = cursor.advance()?.unwrap();
    assert_eq!(entry.pathname()?, "Cargo.toml");
    Ok(())
}

#[test]
fn test_pathname_round_trip() -> Result<()> {
    let name = "dossier/Grüße à tous.txt";
    for codec in [Codec::Utf8, Codec::Latin1, Codec::Cp037] {
        for format in [Format::GnuTar, Format::Pax, Format::Mtree] {
            // the "./" mtree prefix is ASCII
            if format == Format::Mtree && codec == Codec::Cp037 {
                continue;
            }
            let data = written_with(codec, format, name)?;
            let mut cursor = ArchiveCursor::open_memory(&data, ReadOptions::new().codec(codec))?;
            let entry = cursor.advance()?.unwrap();
            let expected = match format {
                Format::Mtree => format!("./{name}"),
                _ => name.to_string(),
            };
            assert_eq!(entry.pathname()?, expected, "{codec} {format}");
        }
    }
    Ok(())
}

#[test]
fn test_unencodable_name_is_rejected() {
    let err = written_with(Codec::Ascii, Format::GnuTar, "Grüße").unwrap_err();
    let err = err.downcast::<Error>().unwrap();
    assert!(matches!(err, Error::Encoding(_)));
}

#[test]
fn test_codec_names() -> Result<()> {
    assert_eq!("IBM037".parse::<Codec>()?, Codec::Cp037);
    assert_eq!("ISO-8859-1".parse::<Codec>()?, Codec::Latin1);
    assert_eq!(Codec::default(), Codec::Utf8);
    assert!("klingon".parse::<Codec>().is_err());
    Ok(())
}
