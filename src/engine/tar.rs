//! Tar engine: GNU tar, ustar and pax.
//!
//! Headers are read one 512-byte block at a time straight from the source, with
//! GNU long name/link records and pax extended headers folded into the entry
//! that follows them.  The header layout, checksums and pax record parsing come
//! from the `tar` crate; the streaming state (how much of the current entry is
//! still unread) is kept here so that content can be handed out block by block.

use std::{
    borrow::Cow,
    io::{self, ErrorKind, Read, Write},
};

use log::{debug, trace, warn};
use ::tar::{EntryType, Header, PaxExtensions};

use super::{ArchiveRead, ArchiveWrite, Block, Format};
use crate::{
    error::{Error, Result},
    header::{EntryHeader, FileType, Timestamp},
    util::read_exactish,
};

/// Size of a tar header and the unit of content padding.
pub const BLOCK_SIZE: usize = 512;

const PAX_SCHILYXATTR: &str = "SCHILY.xattr.";
const GNU_LONGLINK_NAME: &[u8] = b"././@LongLink";
const NAME_FIELD: usize = 100;
const PREFIX_FIELD: usize = 155;
const OWNER_NAME_FIELD: usize = 32;
const UNAME_RANGE: std::ops::Range<usize> = 265..297;
const GNAME_RANGE: std::ops::Range<usize> = 297..329;
// largest value of an 8-byte octal field
const MAX_OCTAL_ID: u64 = 0o7777777;
// largest value of the 12-byte octal size field
const MAX_OCTAL_SIZE: u64 = 0o77777777777;
/// Largest GNU long name or pax extended header accepted when reading.
const MAX_EXTENSION_SIZE: u64 = 1024 * 1024;

fn damaged(detail: impl std::fmt::Display) -> Error {
    Error::Damaged(format!("Damaged tar archive: {detail}"))
}

fn truncated() -> Error {
    Error::Damaged("Truncated tar archive".to_string())
}

fn read_error(err: io::Error) -> Error {
    match err.kind() {
        ErrorKind::UnexpectedEof => truncated(),
        _ => Error::Io(err),
    }
}

/// Parses a numeric header field.  Fields left empty by the writer read as 0.
fn numeric(field: &[u8], parsed: io::Result<u64>) -> Result<u64> {
    if field.iter().all(|b| *b == 0 || *b == b' ') {
        return Ok(0);
    }
    parsed.map_err(damaged)
}

fn padding(size: u64) -> u64 {
    size.next_multiple_of(BLOCK_SIZE as u64) - size
}

fn parse_octal(field: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(field).ok()?;
    let text = text.trim_matches(|c| c == ' ' || c == '\0');
    u32::from_str_radix(text, 8).ok()
}

/// Verifies the header checksum of a 512-byte block: the unsigned sum of all
/// bytes with the checksum field itself counted as spaces.
pub(crate) fn checksum_matches(block: &[u8]) -> bool {
    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { b' ' as u32 } else { b as u32 })
        .sum();
    parse_octal(&block[148..156]) == Some(computed)
}

/// Strips the NUL terminator GNU tar appends to long name records.
fn trim_nul(mut data: Vec<u8>) -> Vec<u8> {
    while data.last() == Some(&0) {
        data.pop();
    }
    data
}

fn file_type_from_tar(entry_type: EntryType, pathname: &[u8]) -> FileType {
    match entry_type {
        // pre-POSIX archives mark directories with a trailing slash only
        EntryType::Regular | EntryType::Continuous if pathname.ends_with(b"/") => {
            FileType::Directory
        }
        EntryType::Regular | EntryType::Continuous => FileType::Regular,
        EntryType::Link => FileType::Hardlink,
        EntryType::Symlink => FileType::Symlink,
        EntryType::Char => FileType::CharacterDevice,
        EntryType::Block => FileType::BlockDevice,
        EntryType::Directory => FileType::Directory,
        EntryType::Fifo => FileType::Fifo,
        // content is refused by read_block()
        EntryType::GNUSparse => FileType::Regular,
        other => {
            warn!(
                "unknown tar entry type {:?}, treating it as a regular file",
                other.as_byte() as char
            );
            FileType::Regular
        }
    }
}

fn tar_entry_type(file_type: FileType) -> Result<EntryType> {
    Ok(match file_type {
        FileType::Regular => EntryType::Regular,
        FileType::Directory => EntryType::Directory,
        FileType::Symlink => EntryType::Symlink,
        FileType::Hardlink => EntryType::Link,
        FileType::BlockDevice => EntryType::Block,
        FileType::CharacterDevice => EntryType::Char,
        FileType::Fifo => EntryType::Fifo,
        FileType::Socket => {
            return Err(Error::InvalidEntry(
                "tar archives cannot store sockets".to_string(),
            ))
        }
    })
}

/// Parses the records of a pax extended header.
fn parse_pax(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut records = Vec::new();
    for extension in PaxExtensions::new(data) {
        let extension = extension.map_err(|e| damaged(format!("bad pax header: {e}")))?;
        let key = extension
            .key()
            .map_err(|e| damaged(format!("bad pax key: {e}")))?;
        records.push((key.to_string(), extension.value_bytes().to_vec()));
    }
    Ok(records)
}

fn pax_number(key: &str, value: &[u8]) -> Result<u64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| damaged(format!("invalid pax {key} value")))
}

fn pax_time(key: &str, value: &[u8]) -> Result<Timestamp> {
    std::str::from_utf8(value)
        .ok()
        .and_then(Timestamp::parse_decimal)
        .ok_or_else(|| damaged(format!("invalid pax {key} value")))
}

/// Applies pax records to an entry.  Unknown keys are ignored.
fn apply_pax(entry: &mut EntryHeader, records: &[(String, Vec<u8>)]) -> Result<()> {
    for (key, value) in records {
        match key.as_str() {
            "path" => entry.pathname = value.clone(),
            "linkpath" => entry.linkname = Some(value.clone()),
            "size" => entry.size = pax_number(key, value)?,
            "uid" => entry.uid = pax_number(key, value)?,
            "gid" => entry.gid = pax_number(key, value)?,
            "uname" => entry.uname = Some(value.clone()),
            "gname" => entry.gname = Some(value.clone()),
            "mtime" => entry.mtime = Some(pax_time(key, value)?),
            "atime" => entry.atime = Some(pax_time(key, value)?),
            "ctime" => entry.ctime = Some(pax_time(key, value)?),
            "LIBARCHIVE.creationtime" => entry.birthtime = Some(pax_time(key, value)?),
            "SCHILY.devmajor" => {
                let minor = entry.device.map_or(0, |(_, minor)| minor);
                entry.device = Some((pax_number(key, value)? as u32, minor));
            }
            "SCHILY.devminor" => {
                let major = entry.device.map_or(0, |(major, _)| major);
                entry.device = Some((major, pax_number(key, value)? as u32));
            }
            "SCHILY.nlink" => entry.nlink = pax_number(key, value)? as u32,
            key => {
                if let Some(name) = key.strip_prefix(PAX_SCHILYXATTR) {
                    entry.xattrs.push((name.as_bytes().to_vec(), value.clone()));
                } else {
                    trace!("ignoring pax record {key:?}");
                }
            }
        }
    }
    Ok(())
}

/// Formats one pax record: `"<len> <key>=<value>\n"`, where `<len>` counts the
/// whole record including its own digits.
fn pax_record(key: &[u8], value: &[u8]) -> Vec<u8> {
    let body = key.len() + value.len() + 3;
    let mut len = body;
    loop {
        let total = body + len.to_string().len();
        if total == len {
            break;
        }
        len = total;
    }

    let mut record = Vec::with_capacity(len);
    record.extend_from_slice(len.to_string().as_bytes());
    record.push(b' ');
    record.extend_from_slice(key);
    record.push(b'=');
    record.extend_from_slice(value);
    record.push(b'\n');
    record
}

/// Splits a path into a ustar (prefix, name) pair, if possible.
fn split_ustar_path(path: &[u8]) -> Option<(&[u8], &[u8])> {
    if path.len() <= NAME_FIELD {
        return Some((&[], path));
    }
    path.iter()
        .enumerate()
        .filter(|(_, &b)| b == b'/')
        .map(|(i, _)| (&path[..i], &path[i + 1..]))
        .find(|(prefix, name)| {
            prefix.len() <= PREFIX_FIELD && !name.is_empty() && name.len() <= NAME_FIELD
        })
}

fn copy_field(field: &mut [u8], value: &[u8]) {
    let len = value.len().min(field.len());
    field.fill(0);
    field[..len].copy_from_slice(&value[..len]);
}

/// Streaming reader for all tar flavours.
pub struct TarReader<R: Read> {
    reader: R,
    block_size: usize,
    /// unread content of the current entry
    remaining: u64,
    /// padding after the current entry's content
    padding: u64,
    offset: u64,
    global_pax: Vec<(String, Vec<u8>)>,
    /// the current entry is a GNU sparse file
    sparse: bool,
    finished: bool,
}

impl<R: Read> TarReader<R> {
    pub fn new(reader: R, block_size: usize) -> Self {
        Self {
            reader,
            block_size: block_size.max(1),
            remaining: 0,
            padding: 0,
            offset: 0,
            global_pax: Vec::new(),
            sparse: false,
            finished: false,
        }
    }

    fn read_header(&mut self) -> Result<Option<Header>> {
        let mut header = Header::new_gnu();
        if read_exactish(&mut self.reader, header.as_mut_bytes()).map_err(read_error)? {
            Ok(Some(header))
        } else {
            Ok(None)
        }
    }

    fn skip(&mut self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let skipped = io::copy(&mut (&mut self.reader).take(amount), &mut io::sink())?;
        if skipped != amount {
            return Err(truncated());
        }
        Ok(())
    }

    /// Skips whatever is left of the current entry, including its padding.
    fn skip_rest(&mut self) -> Result<()> {
        let rest = self.remaining + self.padding;
        self.remaining = 0;
        self.padding = 0;
        self.skip(rest)
    }

    /// Reads the payload of a GNU long name or pax record.
    fn read_extension(&mut self, size: u64) -> Result<Vec<u8>> {
        if size > MAX_EXTENSION_SIZE {
            return Err(damaged(format!("extension header of {size} bytes")));
        }
        let mut data = Vec::with_capacity(size as usize);
        (&mut self.reader)
            .take(size)
            .read_to_end(&mut data)
            .map_err(read_error)?;
        if data.len() as u64 != size {
            return Err(truncated());
        }
        self.skip(padding(size))?;
        Ok(data)
    }

    fn build_entry(
        &self,
        header: &Header,
        longname: Option<Vec<u8>>,
        longlink: Option<Vec<u8>>,
        pax: &[(String, Vec<u8>)],
    ) -> Result<EntryHeader> {
        let pathname = longname.unwrap_or_else(|| header.path_bytes().into_owned());
        let file_type = file_type_from_tar(header.entry_type(), &pathname);

        let old = header.as_old();
        let mut entry = EntryHeader::new(file_type, pathname);
        entry.perm = numeric(&old.mode, header.mode().map(u64::from))? as u32 & 0o7777;
        entry.uid = numeric(&old.uid, header.uid())?;
        entry.gid = numeric(&old.gid, header.gid())?;
        entry.size = numeric(&old.size, header.entry_size())?;
        entry.mtime = Some(Timestamp::new(numeric(&old.mtime, header.mtime())? as i64, 0));
        entry.uname = header
            .username_bytes()
            .filter(|name| !name.is_empty())
            .map(<[u8]>::to_vec);
        entry.gname = header
            .groupname_bytes()
            .filter(|name| !name.is_empty())
            .map(<[u8]>::to_vec);

        if matches!(file_type, FileType::Symlink | FileType::Hardlink) {
            entry.linkname = longlink.or_else(|| header.link_name_bytes().map(Cow::into_owned));
        }

        if matches!(
            file_type,
            FileType::BlockDevice | FileType::CharacterDevice
        ) {
            let major = header.device_major().ok().flatten();
            let minor = header.device_minor().ok().flatten();
            entry.device = major.zip(minor);
        }

        if let Some(gnu) = header.as_gnu() {
            entry.atime = gnu
                .atime()
                .ok()
                .filter(|t| *t != 0)
                .map(|t| Timestamp::new(t as i64, 0));
            entry.ctime = gnu
                .ctime()
                .ok()
                .filter(|t| *t != 0)
                .map(|t| Timestamp::new(t as i64, 0));
        }

        apply_pax(&mut entry, &self.global_pax)?;
        apply_pax(&mut entry, pax)?;

        if entry.file_type != FileType::Hardlink && entry.file_type != FileType::Symlink {
            entry.linkname = None;
        }

        Ok(entry)
    }
}

impl<R: Read> ArchiveRead for TarReader<R> {
    fn next_header(&mut self) -> Result<Option<EntryHeader>> {
        if self.finished {
            return Ok(None);
        }
        self.skip_rest()?;

        let mut longname = None;
        let mut longlink = None;
        let mut pax = Vec::new();

        loop {
            let Some(header) = self.read_header()? else {
                debug!("tar archive ends without an end-of-archive marker");
                self.finished = true;
                return Ok(None);
            };

            if header.as_bytes() == &[0u8; BLOCK_SIZE] {
                trace!("end-of-archive marker");
                self.finished = true;
                return Ok(None);
            }

            if !checksum_matches(header.as_bytes()) {
                return Err(Error::Damaged("Damaged tar archive".to_string()));
            }

            let size = numeric(&header.as_old().size, header.entry_size())?;

            match header.entry_type() {
                EntryType::GNULongName => {
                    longname = Some(trim_nul(self.read_extension(size)?));
                    continue;
                }
                EntryType::GNULongLink => {
                    longlink = Some(trim_nul(self.read_extension(size)?));
                    continue;
                }
                EntryType::XHeader => {
                    let data = self.read_extension(size)?;
                    pax.extend(parse_pax(&data)?);
                    continue;
                }
                EntryType::XGlobalHeader => {
                    let data = self.read_extension(size)?;
                    self.global_pax.extend(parse_pax(&data)?);
                    continue;
                }
                _ => {}
            }

            let entry = self.build_entry(&header, longname, longlink, &pax)?;
            trace!(
                "tar entry {:?} {:?} size {}",
                String::from_utf8_lossy(&entry.pathname),
                entry.file_type,
                entry.size
            );

            // pax may override the size recorded in the header
            self.remaining = entry.size;
            self.sparse = header.entry_type() == EntryType::GNUSparse;
            self.padding = padding(entry.size);
            self.offset = 0;

            return Ok(Some(entry));
        }
    }

    fn read_block(&mut self) -> Result<Option<Block>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.sparse {
            return Err(Error::Unsupported(
                "content of GNU sparse entries".to_string(),
            ));
        }

        let len = self.remaining.min(self.block_size as u64) as usize;
        let mut data = vec![0u8; len];
        self.reader.read_exact(&mut data).map_err(read_error)?;

        let block = Block {
            data,
            offset: self.offset,
        };
        self.offset += len as u64;
        self.remaining -= len as u64;
        Ok(Some(block))
    }
}

/// Writer for GNU tar, ustar and pax archives.
pub struct TarWriter<W: Write> {
    writer: W,
    format: Format,
    in_entry: bool,
    declared: u64,
    written: u64,
}

impl<W: Write> TarWriter<W> {
    pub fn new(writer: W, format: Format) -> Self {
        debug_assert!(format.is_tar());
        Self {
            writer,
            format,
            in_entry: false,
            declared: 0,
            written: 0,
        }
    }

    fn set_path(
        &self,
        header: &mut Header,
        path: &[u8],
        out: &mut Vec<u8>,
        pax: &mut Vec<u8>,
    ) -> Result<()> {
        match self.format {
            Format::GnuTar => {
                if path.len() > NAME_FIELD {
                    push_gnu_longname(out, EntryType::GNULongName, path);
                }
                copy_field(&mut header.as_old_mut().name, path);
            }
            _ => match split_ustar_path(path) {
                Some((prefix, name)) => {
                    copy_field(&mut header.as_old_mut().name, name);
                    if let Some(ustar) = header.as_ustar_mut() {
                        copy_field(&mut ustar.prefix, prefix);
                    }
                }
                None if self.format == Format::Pax => {
                    pax.extend(pax_record(b"path", path));
                    copy_field(&mut header.as_old_mut().name, path);
                }
                None => {
                    return Err(Error::InvalidEntry(format!(
                        "pathname of {} bytes does not fit a ustar header",
                        path.len()
                    )))
                }
            },
        }
        Ok(())
    }

    fn set_link(
        &self,
        header: &mut Header,
        link: &[u8],
        out: &mut Vec<u8>,
        pax: &mut Vec<u8>,
    ) -> Result<()> {
        if link.len() > NAME_FIELD {
            match self.format {
                Format::GnuTar => push_gnu_longname(out, EntryType::GNULongLink, link),
                Format::Pax => pax.extend(pax_record(b"linkpath", link)),
                _ => {
                    return Err(Error::InvalidEntry(format!(
                        "link target of {} bytes does not fit a ustar header",
                        link.len()
                    )))
                }
            }
        }
        copy_field(&mut header.as_old_mut().linkname, link);
        Ok(())
    }

    fn set_owner_name(
        &self,
        header: &mut Header,
        key: &[u8],
        name: &[u8],
        pax: &mut Vec<u8>,
    ) -> Result<()> {
        if name.len() > OWNER_NAME_FIELD {
            if self.format != Format::Pax {
                return Err(Error::InvalidEntry(format!(
                    "owner name of {} bytes does not fit a {} header",
                    name.len(),
                    self.format
                )));
            }
            pax.extend(pax_record(key, name));
        }
        // uname and gname sit at the same offsets in ustar and GNU headers
        let range = if key == b"uname" { UNAME_RANGE } else { GNAME_RANGE };
        copy_field(&mut header.as_mut_bytes()[range], name);
        Ok(())
    }

    /// Time fields of GNU and ustar headers, which cannot hold times before 1970.
    fn header_time(&self, key: &str, time: Timestamp) -> Result<u64> {
        u64::try_from(time.secs).map_err(|_| {
            Error::InvalidEntry(format!(
                "{key} {} is before 1970 and cannot be stored in {} archives",
                time.secs, self.format
            ))
        })
    }
}

fn push_padded(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    out.resize(out.len() + padding(data.len() as u64) as usize, 0);
}

fn push_extension(out: &mut Vec<u8>, mut header: Header, name: &[u8], data: &[u8]) {
    copy_field(&mut header.as_old_mut().name, name);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(data.len() as u64);
    header.set_cksum();
    out.extend_from_slice(header.as_bytes());
    push_padded(out, data);
}

/// Appends a `././@LongLink` record holding a name that does not fit its field.
fn push_gnu_longname(out: &mut Vec<u8>, entry_type: EntryType, name: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    let mut data = name.to_vec();
    data.push(0);
    push_extension(out, header, GNU_LONGLINK_NAME, &data);
}

fn push_pax_header(out: &mut Vec<u8>, pathname: &[u8], records: &[u8]) {
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::XHeader);
    let basename = pathname
        .rsplit(|b| *b == b'/')
        .find(|part| !part.is_empty())
        .unwrap_or(&b"entry"[..]);
    let mut name = b"PaxHeaders/".to_vec();
    name.extend_from_slice(basename);
    name.truncate(NAME_FIELD);
    push_extension(out, header, &name, records);
}

impl<W: Write> ArchiveWrite<W> for TarWriter<W> {
    fn supports_digests(&self) -> bool {
        false
    }

    /// Builds the header and any extension records in memory; nothing reaches
    /// the sink unless the whole entry header is valid.
    fn write_header(&mut self, entry: &EntryHeader) -> Result<()> {
        if self.in_entry {
            self.finish_entry()?;
        }

        let entry_type = tar_entry_type(entry.file_type)?;
        let mut header = match self.format {
            Format::GnuTar => Header::new_gnu(),
            _ => Header::new_ustar(),
        };
        // long name records, then the pax header, then the entry header
        let mut out = Vec::new();
        let mut pax = Vec::new();

        self.set_path(&mut header, &entry.pathname, &mut out, &mut pax)?;
        if let Some(ref link) = entry.linkname {
            self.set_link(&mut header, link, &mut out, &mut pax)?;
        }

        header.set_entry_type(entry_type);
        header.set_mode(entry.perm & 0o7777);

        for (key, id, set) in [
            (&b"uid"[..], entry.uid, Header::set_uid as fn(&mut Header, u64)),
            (&b"gid"[..], entry.gid, Header::set_gid),
        ] {
            if id > MAX_OCTAL_ID && self.format == Format::Pax {
                pax.extend(pax_record(key, id.to_string().as_bytes()));
                set(&mut header, 0);
            } else {
                set(&mut header, id);
            }
        }

        if let Some(ref uname) = entry.uname {
            self.set_owner_name(&mut header, b"uname", uname, &mut pax)?;
        }
        if let Some(ref gname) = entry.gname {
            self.set_owner_name(&mut header, b"gname", gname, &mut pax)?;
        }

        let size = if entry.file_type.has_content() {
            entry.size
        } else {
            0
        };
        if size > MAX_OCTAL_SIZE {
            match self.format {
                Format::Pax => {
                    pax.extend(pax_record(b"size", size.to_string().as_bytes()));
                    header.set_size(0);
                }
                Format::Ustar => {
                    return Err(Error::InvalidEntry(format!(
                        "entry of {size} bytes is too large for ustar"
                    )))
                }
                // binary size encoding
                _ => header.set_size(size),
            }
        } else {
            header.set_size(size);
        }

        let mtime = entry.mtime.unwrap_or_default();
        if self.format == Format::Pax {
            header.set_mtime(mtime.secs.max(0) as u64);
            if mtime.nanos != 0 || mtime.secs < 0 {
                pax.extend(pax_record(b"mtime", mtime.to_decimal().as_bytes()));
            }
            for (key, time) in [
                (&b"atime"[..], entry.atime),
                (&b"ctime"[..], entry.ctime),
                (&b"LIBARCHIVE.creationtime"[..], entry.birthtime),
            ] {
                if let Some(time) = time {
                    pax.extend(pax_record(key, time.to_decimal().as_bytes()));
                }
            }
        } else {
            header.set_mtime(self.header_time("mtime", mtime)?);
            let atime = entry.atime.map(|t| self.header_time("atime", t)).transpose()?;
            let ctime = entry.ctime.map(|t| self.header_time("ctime", t)).transpose()?;
            if let Some(gnu) = header.as_gnu_mut() {
                if let Some(atime) = atime {
                    gnu.set_atime(atime);
                }
                if let Some(ctime) = ctime {
                    gnu.set_ctime(ctime);
                }
            }
        }

        if let Some((major, minor)) = entry.device {
            header.set_device_major(major)?;
            header.set_device_minor(minor)?;
        }

        if !entry.xattrs.is_empty() {
            if self.format != Format::Pax {
                return Err(Error::InvalidEntry(format!(
                    "extended attributes cannot be stored in {} archives",
                    self.format
                )));
            }
            for (name, value) in &entry.xattrs {
                let mut key = PAX_SCHILYXATTR.as_bytes().to_vec();
                key.extend_from_slice(name);
                pax.extend(pax_record(&key, value));
            }
        }

        if !pax.is_empty() {
            push_pax_header(&mut out, &entry.pathname, &pax);
        }

        header.set_cksum();
        out.extend_from_slice(header.as_bytes());
        self.writer.write_all(&out)?;

        self.in_entry = true;
        self.declared = size;
        self.written = 0;
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<()> {
        if !self.in_entry {
            return Err(Error::InvalidEntry(
                "content written outside of an entry".to_string(),
            ));
        }
        if self.written + data.len() as u64 > self.declared {
            return Err(Error::InvalidEntry(format!(
                "entry content exceeds its declared size of {} bytes",
                self.declared
            )));
        }
        self.writer.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish_entry(&mut self) -> Result<()> {
        if !self.in_entry {
            return Ok(());
        }
        self.in_entry = false;
        if self.written != self.declared {
            return Err(Error::InvalidEntry(format!(
                "entry declared {} bytes of content but {} were written",
                self.declared, self.written
            )));
        }
        let pad = padding(self.written) as usize;
        self.writer.write_all(&[0u8; BLOCK_SIZE][..pad])?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<W> {
        self.finish_entry()?;
        self.writer.write_all(&[0u8; 2 * BLOCK_SIZE])?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}
