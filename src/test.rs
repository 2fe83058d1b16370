//! Fixtures shared by the unit tests.

use std::{ffi::OsString, sync::LazyLock};

use tempfile::TempDir;

static TMPDIR: LazyLock<OsString> = LazyLock::new(|| {
    if let Some(path) = std::env::var_os("ARCHIVE_CURSOR_TEST_TMPDIR") {
        eprintln!("temporary directory from $ARCHIVE_CURSOR_TEST_TMPDIR: {path:?}");
        path
    } else {
        std::env::temp_dir().into()
    }
});

/// Allocate a temporary directory.
pub fn tempdir() -> TempDir {
    TempDir::with_prefix_in("archive-cursor-test-", TMPDIR.as_os_str()).unwrap()
}

/// A GNU tar archive of regular files, built by the `tar` crate rather than
/// by our own writer.
pub fn gnutar_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

/// An mtree file with one entry carrying every supported digest, each made of
/// `!` bytes.
pub fn mtree_archive() -> String {
    format!(
        "#mtree\n./empty.txt nlink=0 time=0.0 mode=664 gid=0 uid=0 type=file size=42 \
         md5digest={} rmd160digest={} sha1digest={} sha256digest={} sha384digest={} \
         sha512digest={}\n",
        "21".repeat(16),
        "21".repeat(20),
        "21".repeat(20),
        "21".repeat(32),
        "21".repeat(48),
        "21".repeat(64),
    )
}
