//! Engine for BSD mtree specification files.
//!
//! An mtree file describes a tree of filesystem objects, one line per entry,
//! without any content.  Lines hold a name followed by `keyword=value` pairs;
//! `/set` and `/unset` lines change the defaults applied to following entries.
//! Names without a slash are relative to the current directory, which
//! directory entries enter and `..` leaves.
//!
//! Names and string values use three digit octal escapes (`\040` for a space).

use std::{
    collections::BTreeMap,
    fmt,
    io::{BufRead, Write},
    mem,
};

use log::{debug, trace};

use super::{ArchiveRead, ArchiveWrite, Block};
use crate::{
    digest::{DigestAlgorithm, Hasher, StoredDigests},
    error::{Error, Result},
    header::{EntryHeader, FileType, Timestamp},
};

const MAGIC: &[u8] = b"#mtree";

fn damaged(line: usize, detail: impl fmt::Display) -> Error {
    Error::Damaged(format!("Damaged mtree archive: line {line}: {detail}"))
}

fn needs_escape(c: u8) -> bool {
    c <= b' ' || c >= 0x7f || c == b'#' || c == b'=' || c == b'\\'
}

fn write_escaped(writer: &mut impl fmt::Write, bytes: &[u8]) -> fmt::Result {
    for &c in bytes {
        if needs_escape(c) {
            write!(writer, "\\{c:03o}")?;
        } else {
            writer.write_char(c as char)?;
        }
    }
    Ok(())
}

/// Reverses [`write_escaped()`].  A backslash not followed by three octal
/// digits is kept literally.
fn unescape(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        match (text[i], text.get(i + 1..i + 4)) {
            (b'\\', Some(digits)) if digits.iter().all(|d| (b'0'..=b'7').contains(d)) => {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + (d - b'0') as u32);
                out.push(value as u8);
                i += 4;
            }
            (c, _) => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn file_type_from_keyword(value: &[u8]) -> Option<FileType> {
    Some(match value {
        b"file" => FileType::Regular,
        b"dir" => FileType::Directory,
        b"link" => FileType::Symlink,
        b"block" => FileType::BlockDevice,
        b"char" => FileType::CharacterDevice,
        b"fifo" => FileType::Fifo,
        b"socket" => FileType::Socket,
        _ => return None,
    })
}

fn file_type_keyword(file_type: FileType) -> &'static str {
    match file_type {
        // mtree has no notion of hard links
        FileType::Regular | FileType::Hardlink => "file",
        FileType::Directory => "dir",
        FileType::Symlink => "link",
        FileType::BlockDevice => "block",
        FileType::CharacterDevice => "char",
        FileType::Fifo => "fifo",
        FileType::Socket => "socket",
    }
}

type Keywords = BTreeMap<String, Vec<u8>>;

/// Splits `keyword[=value]` tokens into a map.
fn parse_keywords<'t>(tokens: impl Iterator<Item = &'t [u8]>) -> Keywords {
    tokens
        .map(|token| match token.iter().position(|&c| c == b'=') {
            Some(eq) => (
                String::from_utf8_lossy(&token[..eq]).into_owned(),
                token[eq + 1..].to_vec(),
            ),
            None => (String::from_utf8_lossy(token).into_owned(), Vec::new()),
        })
        .collect()
}

/// Streaming reader for mtree files.
pub struct MtreeReader<R: BufRead> {
    reader: R,
    line: usize,
    defaults: Keywords,
    /// components of the current directory for relative names
    cwd: Vec<Vec<u8>>,
}

impl<R: BufRead> MtreeReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            defaults: Keywords::new(),
            cwd: Vec::new(),
        }
    }

    /// Reads one logical line, joining continuation lines that end in a
    /// backslash.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        loop {
            let mut part = Vec::new();
            if self.reader.read_until(b'\n', &mut part)? == 0 {
                return Ok((!line.is_empty()).then_some(line));
            }
            self.line += 1;

            while matches!(part.last(), Some(b'\n' | b'\r')) {
                part.pop();
            }
            if part.last() == Some(&b'\\') {
                part.pop();
                line.extend(part);
                continue;
            }
            line.extend(part);
            return Ok(Some(line));
        }
    }

    fn number<T: TryFrom<u64>>(&self, keyword: &str, value: &[u8], radix: u32) -> Result<T> {
        std::str::from_utf8(value)
            .ok()
            .and_then(|v| u64::from_str_radix(v, radix).ok())
            .and_then(|v| T::try_from(v).ok())
            .ok_or_else(|| damaged(self.line, format!("invalid {keyword} value")))
    }

    fn time(&self, value: &[u8]) -> Result<Timestamp> {
        // "seconds.nanoseconds", where the part after the dot is a plain integer
        let text = std::str::from_utf8(value).map_err(|_| damaged(self.line, "invalid time"))?;
        let (secs, nanos) = text.split_once('.').unwrap_or((text, "0"));
        let secs = secs.parse().map_err(|_| damaged(self.line, "invalid time"))?;
        let nanos = nanos
            .parse()
            .ok()
            .filter(|n| *n < 1_000_000_000)
            .ok_or_else(|| damaged(self.line, "invalid time"))?;
        Ok(Timestamp::new(secs, nanos))
    }

    fn device(&self, value: &[u8]) -> Result<(u32, u32)> {
        let fields: Vec<&[u8]> = value.split(|&c| c == b',').collect();
        match fields[..] {
            // format,major,minor[,...]
            [_, major, minor, ..] => Ok((
                self.number("device", major, 10)?,
                self.number("device", minor, 10)?,
            )),
            [dev] => {
                let dev: u64 = self.number("device", dev, 10)?;
                Ok((rustix::fs::major(dev), rustix::fs::minor(dev)))
            }
            _ => Err(damaged(self.line, "invalid device value")),
        }
    }

    fn build_entry(&self, pathname: Vec<u8>, keywords: &Keywords) -> Result<EntryHeader> {
        let file_type = match keywords.get("type") {
            Some(value) => file_type_from_keyword(value).ok_or_else(|| {
                damaged(
                    self.line,
                    format!("unknown type {:?}", String::from_utf8_lossy(value)),
                )
            })?,
            None => FileType::Regular,
        };

        let mut entry = EntryHeader::new(file_type, pathname);
        entry.nlink = 1;

        for (keyword, value) in keywords {
            match keyword.as_str() {
                "type" => {}
                "mode" => entry.perm = self.number::<u32>(keyword, value, 8)? & 0o7777,
                "uid" => entry.uid = self.number(keyword, value, 10)?,
                "gid" => entry.gid = self.number(keyword, value, 10)?,
                "uname" => entry.uname = Some(unescape(value)),
                "gname" => entry.gname = Some(unescape(value)),
                "size" => entry.size = self.number(keyword, value, 10)?,
                "nlink" => entry.nlink = self.number(keyword, value, 10)?,
                "time" => entry.mtime = Some(self.time(value)?),
                "link" => entry.linkname = Some(unescape(value)),
                "device" => entry.device = Some(self.device(value)?),
                keyword => match DigestAlgorithm::from_mtree_keyword(keyword) {
                    Some(algorithm) => entry
                        .digests
                        .insert_hex(algorithm, value)
                        .map_err(|e| damaged(self.line, format!("invalid {keyword}: {e}")))?,
                    None => trace!("ignoring mtree keyword {keyword:?}"),
                },
            }
        }

        Ok(entry)
    }

    /// Resolves a name against the current directory, updating it for
    /// directories.  Returns `None` for `..`.
    fn resolve(&mut self, name: Vec<u8>, file_type: Option<&[u8]>) -> Option<Vec<u8>> {
        if name.contains(&b'/') {
            return Some(name);
        }
        if name == b".." {
            self.cwd.pop();
            return None;
        }

        let mut path = Vec::new();
        for component in &self.cwd {
            path.extend_from_slice(component);
            path.push(b'/');
        }
        path.extend_from_slice(&name);

        if file_type == Some(&b"dir"[..]) {
            self.cwd.push(name);
        }
        Some(path)
    }
}

impl<R: BufRead> ArchiveRead for MtreeReader<R> {
    fn next_header(&mut self) -> Result<Option<EntryHeader>> {
        while let Some(line) = self.read_line()? {
            let mut tokens = line
                .split(|&c| c == b' ' || c == b'\t')
                .filter(|token| !token.is_empty());

            let Some(first) = tokens.next() else {
                continue;
            };
            if first.starts_with(b"#") {
                if self.line == 1 && !first.starts_with(MAGIC) {
                    debug!("mtree file without {:?} signature", "#mtree");
                }
                continue;
            }

            match first {
                b"/set" => {
                    self.defaults.extend(parse_keywords(tokens));
                }
                b"/unset" => {
                    for keyword in tokens {
                        if keyword == b"all" {
                            self.defaults.clear();
                        } else {
                            self.defaults.remove(&*String::from_utf8_lossy(keyword));
                        }
                    }
                }
                name => {
                    let name = unescape(name);
                    let own = parse_keywords(tokens);
                    let mut keywords = self.defaults.clone();
                    keywords.extend(own);

                    let file_type = keywords.get("type").map(Vec::as_slice);
                    let Some(pathname) = self.resolve(name, file_type) else {
                        continue;
                    };
                    let entry = self.build_entry(pathname, &keywords)?;
                    trace!(
                        "mtree entry {:?} {:?}",
                        String::from_utf8_lossy(&entry.pathname),
                        entry.file_type
                    );
                    return Ok(Some(entry));
                }
            }
        }
        Ok(None)
    }

    fn read_block(&mut self) -> Result<Option<Block>> {
        // mtree files describe entries but carry no content
        Ok(None)
    }
}

fn write_line(
    line: &mut impl fmt::Write,
    header: &EntryHeader,
    digests: &StoredDigests,
) -> fmt::Result {
    let pathname = &header.pathname;
    if !(pathname.starts_with(b"./") || pathname == b".") {
        line.write_str("./")?;
    }
    write_escaped(line, pathname)?;

    if header.nlink != 1 && header.file_type != FileType::Directory {
        write!(line, " nlink={}", header.nlink)?;
    }
    if let Some(ref gname) = header.gname {
        line.write_str(" gname=")?;
        write_escaped(line, gname)?;
    }
    if let Some(ref uname) = header.uname {
        line.write_str(" uname=")?;
        write_escaped(line, uname)?;
    }

    let mtime = header.mtime.unwrap_or_default();
    write!(
        line,
        " time={}.{} mode={:o} gid={} uid={} type={}",
        mtime.secs,
        mtime.nanos,
        header.perm & 0o7777,
        header.gid,
        header.uid,
        file_type_keyword(header.file_type)
    )?;

    match header.file_type {
        FileType::Symlink => {
            line.write_str(" link=")?;
            write_escaped(line, header.linkname.as_deref().unwrap_or_default())?;
        }
        FileType::BlockDevice | FileType::CharacterDevice => {
            let (major, minor) = header.device.unwrap_or_default();
            write!(line, " device=native,{major},{minor}")?;
        }
        FileType::Regular | FileType::Hardlink => write!(line, " size={}", header.size)?,
        _ => {}
    }

    for (algorithm, digest) in digests.iter() {
        write!(line, " {}={}", algorithm.mtree_keyword(), hex::encode(digest))?;
    }
    line.write_char('\n')
}

struct PendingEntry {
    header: EntryHeader,
    hashers: Vec<Hasher>,
}

/// Writer for mtree files.
///
/// Each line is held back until its entry is finished, so that digests of
/// the enabled algorithms can be computed from the content streamed in
/// between.  Digests supplied with an entry are written as given.
pub struct MtreeWriter<W: Write> {
    writer: W,
    digests: Vec<DigestAlgorithm>,
    pending: Option<PendingEntry>,
    started: bool,
}

impl<W: Write> MtreeWriter<W> {
    pub fn new(writer: W, digests: &[DigestAlgorithm]) -> Self {
        Self {
            writer,
            digests: digests.to_vec(),
            pending: None,
            started: false,
        }
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.writer.write_all(MAGIC)?;
            self.writer.write_all(b"\n")?;
            self.started = true;
        }
        Ok(())
    }
}

impl<W: Write> ArchiveWrite<W> for MtreeWriter<W> {
    fn supports_digests(&self) -> bool {
        true
    }

    fn write_header(&mut self, header: &EntryHeader) -> Result<()> {
        self.finish_entry()?;
        self.start()?;

        let hashers = match header.file_type {
            FileType::Regular | FileType::Hardlink => self
                .digests
                .iter()
                .filter(|algorithm| !header.digests.contains(**algorithm))
                .map(|algorithm| Hasher::new(*algorithm))
                .collect(),
            _ => Vec::new(),
        };

        self.pending = Some(PendingEntry {
            header: header.clone(),
            hashers,
        });
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let Some(ref mut pending) = self.pending else {
            return Err(Error::InvalidEntry(
                "content written outside of an entry".to_string(),
            ));
        };
        for hasher in &mut pending.hashers {
            hasher.update(data);
        }
        Ok(())
    }

    fn finish_entry(&mut self) -> Result<()> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(());
        };

        let mut digests = mem::take(&mut pending.header.digests);
        for hasher in pending.hashers {
            let algorithm = hasher.algorithm();
            digests.insert(algorithm, &hasher.finalize())?;
        }

        let mut line = String::new();
        write_line(&mut line, &pending.header, &digests)
            .map_err(|e| Error::InvalidEntry(e.to_string()))?;
        self.writer.write_all(line.as_bytes())?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<W> {
        self.finish_entry()?;
        self.start()?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}
