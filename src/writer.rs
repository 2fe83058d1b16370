//! Writing archives.
//!
//! [`ArchiveWriter`] adds one entry at a time: the header first, then the
//! content as a sequence of chunks.  Text given to it is encoded with the
//! configured [`Codec`] before it reaches the format engine.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    os::unix::{ffi::OsStrExt, fs::MetadataExt},
    path::Path,
};

use log::{debug, trace};

use crate::{
    codec::Codec,
    digest::{DigestAlgorithm, StoredDigests},
    engine::{mtree::MtreeWriter, tar::TarWriter, ArchiveWrite, Format},
    error::{Error, Result},
    header::{EntryHeader, FileType, Timestamp},
};

/// Options for writing an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub format: Format,
    /// Codec used to encode pathnames and other text given to the writer.
    pub codec: Codec,
    /// Digests computed from the content of regular files, for formats that
    /// store digests.
    pub digests: Vec<DigestAlgorithm>,
}

impl WriteOptions {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Enables computation of one digest.
    pub fn digest(mut self, algorithm: DigestAlgorithm) -> Result<Self> {
        self.check_digest(algorithm.name())?;
        if !self.digests.contains(&algorithm) {
            self.digests.push(algorithm);
            self.digests.sort();
        }
        Ok(self)
    }

    /// Applies a comma separated option string such as `"md5,sha256"`.
    ///
    /// Each option names a digest algorithm to enable; a leading `!` disables
    /// it instead.  Options the format does not know fail with
    /// [`Error::UnsupportedDigest`].
    pub fn parse_options(mut self, options: &str) -> Result<Self> {
        for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            match option.strip_prefix('!') {
                Some(name) => {
                    self.check_digest(name)?;
                    let algorithm = DigestAlgorithm::from_name(name)?;
                    self.digests.retain(|a| *a != algorithm);
                }
                None => {
                    let algorithm = DigestAlgorithm::from_name(option).map_err(|_| {
                        Error::UnsupportedDigest {
                            algorithm: option.to_string(),
                            format: self.format.name(),
                        }
                    })?;
                    self = self.digest(algorithm)?;
                }
            }
        }
        Ok(self)
    }

    fn check_digest(&self, name: &str) -> Result<()> {
        if self.format == Format::Mtree {
            return Ok(());
        }
        Err(Error::UnsupportedDigest {
            algorithm: name.to_string(),
            format: self.format.name(),
        })
    }
}

/// Builds the header for a regular file, directory or symlink added by name.
fn new_header(codec: Codec, file_type: FileType, pathname: &str) -> Result<EntryHeader> {
    let mut header = EntryHeader::new(file_type, codec.encode(pathname)?);
    header.mtime = Some(Timestamp::default());
    Ok(header)
}

fn header_from_metadata(pathname: Vec<u8>, metadata: &fs::Metadata) -> Result<EntryHeader> {
    let file_type = FileType::from_mode(metadata.mode()).ok_or_else(|| {
        Error::InvalidEntry(format!("unknown file type in mode {:o}", metadata.mode()))
    })?;

    let mut header = EntryHeader::new(file_type, pathname);
    header.set_mode(metadata.mode());
    header.uid = metadata.uid() as u64;
    header.gid = metadata.gid() as u64;
    header.nlink = metadata.nlink() as u32;
    header.mtime = Some(Timestamp::new(metadata.mtime(), metadata.mtime_nsec() as u32));
    header.atime = Some(Timestamp::new(metadata.atime(), metadata.atime_nsec() as u32));
    header.ctime = Some(Timestamp::new(metadata.ctime(), metadata.ctime_nsec() as u32));
    if file_type == FileType::Regular {
        header.size = metadata.size();
    }
    if header.is_device() {
        let rdev = metadata.rdev();
        header.device = Some((rustix::fs::major(rdev), rustix::fs::minor(rdev)));
    }
    Ok(header)
}

/// Streams the content of one entry into the engine through [`io::copy()`].
struct EntryContent<'e, W: Write> {
    engine: &'e mut dyn ArchiveWrite<W>,
    /// the engine's own error, which `io::Error` cannot carry
    error: Option<Error>,
}

impl<W: Write> Write for EntryContent<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.engine.write_data(buf) {
            Ok(()) => Ok(buf.len()),
            Err(err) => {
                let message = err.to_string();
                self.error = Some(err);
                Err(io::Error::other(message))
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes entries into an archive.
///
/// The archive is only complete once [`ArchiveWriter::finish()`] has been
/// called; dropping the writer leaves the sink without the format's trailer.
///
/// Invalid entries are rejected before anything is written for them.  An error
/// after an entry's header reached the sink leaves a partial entry behind; the
/// writer then refuses further use with [`Error::WriterFailed`].
pub struct ArchiveWriter<'a, W: Write + 'a> {
    engine: Box<dyn ArchiveWrite<W> + 'a>,
    options: WriteOptions,
    entries_written: usize,
    failed: bool,
}

impl ArchiveWriter<'static, BufWriter<File>> {
    /// Creates (or truncates) an archive file.
    pub fn create(path: impl AsRef<Path>, options: WriteOptions) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file), options)
    }
}

impl<'a, W: Write + 'a> ArchiveWriter<'a, W> {
    pub fn new(sink: W, options: WriteOptions) -> Result<Self> {
        if let Some(algorithm) = options.digests.first() {
            options.check_digest(algorithm.name())?;
        }
        let engine: Box<dyn ArchiveWrite<W> + 'a> = match options.format {
            Format::Mtree => Box::new(MtreeWriter::new(sink, &options.digests)),
            Format::Zip => {
                return Err(Error::Unsupported(
                    "writing zip archives".to_string(),
                ))
            }
            format => Box::new(TarWriter::new(sink, format)),
        };
        debug!("writing {} archive", options.format);
        Ok(Self {
            engine,
            options,
            entries_written: 0,
            failed: false,
        })
    }

    pub fn format(&self) -> Format {
        self.options.format
    }

    pub fn codec(&self) -> Codec {
        self.options.codec
    }

    pub fn entries_written(&self) -> usize {
        self.entries_written
    }

    /// Whether an earlier error left the archive unusable.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn check_usable(&self) -> Result<()> {
        if self.failed {
            return Err(Error::WriterFailed);
        }
        Ok(())
    }

    /// Marks the writer failed when `result` is an error.
    fn poison<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn begin_entry(&mut self, header: &EntryHeader) -> Result<()> {
        self.check_usable()?;
        if !self.engine.supports_digests() {
            if let Some(algorithm) = header.digests.algorithms().next() {
                return Err(Error::UnsupportedDigest {
                    algorithm: algorithm.name().to_string(),
                    format: self.options.format.name(),
                });
            }
        }
        trace!(
            "adding {:?} {:?}",
            String::from_utf8_lossy(&header.pathname),
            header.file_type
        );
        match self.engine.write_header(header) {
            // engines reject a header before writing any of it
            Err(err @ Error::Io(_)) => self.poison(Err(err)),
            result => result,
        }
    }

    /// Writes the content of the entry begun last and completes it.
    fn write_content<I>(&mut self, chunks: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let result = chunks
            .into_iter()
            .try_for_each(|chunk| self.engine.write_data(chunk.as_ref()))
            .and_then(|()| self.engine.finish_entry());
        self.poison(result)?;
        self.entries_written += 1;
        Ok(())
    }

    /// Adds an entry described by a raw header, with its content given as a
    /// sequence of chunks.
    ///
    /// Tar formats require the chunks to add up to `header.size` exactly.
    pub fn add_entry<I>(&mut self, header: &EntryHeader, chunks: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.begin_entry(header)?;
        self.write_content(chunks)
    }

    /// Adds a regular file whose content is given in memory.
    ///
    /// The entry gets permissions `0o664`, owner 0:0 and time 0.  `digests`
    /// are stored with the entry; formats that cannot store digests reject a
    /// non-empty mapping with [`Error::UnsupportedDigest`].
    pub fn add_file_from_memory<I>(
        &mut self,
        pathname: &str,
        size: u64,
        chunks: I,
        digests: &StoredDigests,
    ) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut header = new_header(self.options.codec, FileType::Regular, pathname)?;
        header.perm = 0o664;
        header.size = size;
        header.digests = digests.clone();
        self.add_entry(&header, chunks)
    }

    /// Adds a directory entry.
    pub fn add_directory(&mut self, pathname: &str, perm: u32) -> Result<()> {
        let mut header = new_header(self.options.codec, FileType::Directory, pathname)?;
        header.perm = perm & 0o7777;
        self.add_entry(&header, None::<&[u8]>)
    }

    /// Adds a symbolic link pointing at `target`.
    pub fn add_symlink(&mut self, pathname: &str, target: &str) -> Result<()> {
        let mut header = new_header(self.options.codec, FileType::Symlink, pathname)?;
        header.perm = 0o777;
        header.linkname = Some(self.options.codec.encode(target)?);
        self.add_entry(&header, None::<&[u8]>)
    }

    /// Adds one filesystem object, with its metadata taken from `lstat()`.
    ///
    /// The entry is named after `path` as given.  Regular files have their
    /// content streamed from disk; directories are added without their
    /// children.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let metadata = fs::symlink_metadata(path)?;

        let pathname = match path.to_str() {
            Some(text) => self.options.codec.encode(text)?,
            None => path.as_os_str().as_bytes().to_vec(),
        };
        let mut header = header_from_metadata(pathname, &metadata)?;

        if header.is_symlink() {
            let target = fs::read_link(path)?;
            header.linkname = Some(match target.to_str() {
                Some(text) => self.options.codec.encode(text)?,
                None => target.as_os_str().as_bytes().to_vec(),
            });
        }

        if !header.is_file() {
            return self.add_entry(&header, None::<&[u8]>);
        }

        let mut file = File::open(path)?;
        self.begin_entry(&header)?;
        let mut content = EntryContent {
            engine: self.engine.as_mut(),
            error: None,
        };
        let result = match io::copy(&mut file, &mut content) {
            Ok(_) => Ok(()),
            Err(err) => Err(content.error.take().unwrap_or(Error::Io(err))),
        };
        self.poison(result)?;
        self.write_content(None::<&[u8]>)
    }

    /// Completes the archive and returns the sink.
    pub fn finish(self) -> Result<W> {
        self.check_usable()?;
        debug!(
            "finishing {} archive with {} entries",
            self.options.format, self.entries_written
        );
        self.engine.finish()
    }
}
