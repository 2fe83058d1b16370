//! Raw, format-independent entry metadata.
//!
//! [`EntryHeader`] is what the engine hands up for every entry it parses and what
//! writers hand down to it.  Text fields stay raw bytes here; decoding them is the
//! job of [`crate::codec::Codec`].

use std::fmt;

use crate::digest::StoredDigests;

// POSIX file type bits (st_mode & S_IFMT)
pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// The type of an archive entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FileType {
    #[default]
    Regular,
    Directory,
    Symlink,
    /// A hard link to an entry stored earlier in the archive.
    Hardlink,
    BlockDevice,
    CharacterDevice,
    Fifo,
    Socket,
}

impl FileType {
    /// Maps the `S_IFMT` bits of a mode to a file type.
    pub fn from_mode(mode: u32) -> Option<Self> {
        Some(match mode & S_IFMT {
            S_IFREG => FileType::Regular,
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::Symlink,
            S_IFBLK => FileType::BlockDevice,
            S_IFCHR => FileType::CharacterDevice,
            S_IFIFO => FileType::Fifo,
            S_IFSOCK => FileType::Socket,
            _ => return None,
        })
    }

    /// The `S_IFMT` bits for this type.  Hard links report regular file bits.
    pub const fn as_raw_mode(&self) -> u32 {
        match self {
            FileType::Regular | FileType::Hardlink => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Symlink => S_IFLNK,
            FileType::BlockDevice => S_IFBLK,
            FileType::CharacterDevice => S_IFCHR,
            FileType::Fifo => S_IFIFO,
            FileType::Socket => S_IFSOCK,
        }
    }

    /// The type character used in permission strings (`ls -l` style).
    pub const fn mode_char(&self) -> char {
        match self {
            FileType::Regular => '-',
            FileType::Directory => 'd',
            FileType::Symlink => 'l',
            FileType::Hardlink => 'h',
            FileType::BlockDevice => 'b',
            FileType::CharacterDevice => 'c',
            FileType::Fifo => 'p',
            FileType::Socket => 's',
        }
    }

    /// Whether entries of this type carry content in the archive.
    pub const fn has_content(&self) -> bool {
        matches!(self, FileType::Regular)
    }
}

/// A point in time as stored in archives: seconds and nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub const fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Parses `"secs[.fraction]"` where the fraction is a decimal fraction of a
    /// second, as used by pax extended headers.
    pub fn parse_decimal(value: &str) -> Option<Self> {
        let (secs, fraction) = match value.split_once('.') {
            Some((secs, fraction)) => (secs, fraction),
            None => (value, ""),
        };
        let secs = secs.parse().ok()?;
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut nanos = 0u32;
        for i in 0..9 {
            let digit = fraction.as_bytes().get(i).map_or(0, |b| (b - b'0') as u32);
            nanos = nanos * 10 + digit;
        }
        Some(Self { secs, nanos })
    }

    /// Formats as `"secs.fraction"` with the shortest exact decimal fraction.
    pub fn to_decimal(&self) -> String {
        if self.nanos == 0 {
            return self.secs.to_string();
        }
        let fraction = format!("{:09}", self.nanos);
        format!("{}.{}", self.secs, fraction.trim_end_matches('0'))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

/// The metadata of one archive entry, with text fields as raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryHeader {
    pub pathname: Vec<u8>,
    /// Target of a symbolic or hard link.
    pub linkname: Option<Vec<u8>>,
    pub file_type: FileType,
    /// Permission bits (`0o7777`); the type bits live in `file_type`.
    pub perm: u32,
    pub uid: u64,
    pub gid: u64,
    pub uname: Option<Vec<u8>>,
    pub gname: Option<Vec<u8>>,
    pub size: u64,
    pub mtime: Option<Timestamp>,
    pub atime: Option<Timestamp>,
    pub ctime: Option<Timestamp>,
    pub birthtime: Option<Timestamp>,
    pub nlink: u32,
    /// Major and minor number of a device node.
    pub device: Option<(u32, u32)>,
    /// Extended attributes, in archive order.
    pub xattrs: Vec<(Vec<u8>, Vec<u8>)>,
    pub digests: StoredDigests,
}

impl EntryHeader {
    pub fn new(file_type: FileType, pathname: impl Into<Vec<u8>>) -> Self {
        Self {
            pathname: pathname.into(),
            file_type,
            ..Default::default()
        }
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// The full `st_mode`: type bits and permission bits.
    pub fn mode(&self) -> u32 {
        self.file_type.as_raw_mode() | (self.perm & 0o7777)
    }

    /// Sets type and permissions from a full `st_mode`.
    ///
    /// The type is left alone if the mode carries no known type bits; a hard
    /// link stays a hard link.
    pub fn set_mode(&mut self, mode: u32) {
        if let Some(file_type) = FileType::from_mode(mode) {
            if self.file_type != FileType::Hardlink {
                self.file_type = file_type;
            }
        }
        self.perm = mode & 0o7777;
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn gid(&self) -> u64 {
        self.gid
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime(&self) -> Option<Timestamp> {
        self.mtime
    }

    pub fn atime(&self) -> Option<Timestamp> {
        self.atime
    }

    pub fn ctime(&self) -> Option<Timestamp> {
        self.ctime
    }

    pub fn birthtime(&self) -> Option<Timestamp> {
        self.birthtime
    }

    /// The combined device number of a device node, or 0.
    pub fn rdev(&self) -> u64 {
        match self.device {
            Some((major, minor)) => rustix::fs::makedev(major, minor) as u64,
            None => 0,
        }
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::Regular
    }

    /// Synonym of [`Self::is_file()`].
    pub fn is_regular(&self) -> bool {
        self.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }

    pub fn is_hardlink(&self) -> bool {
        self.file_type == FileType::Hardlink
    }

    pub fn is_block_device(&self) -> bool {
        self.file_type == FileType::BlockDevice
    }

    pub fn is_char_device(&self) -> bool {
        self.file_type == FileType::CharacterDevice
    }

    /// True for block and character devices.
    pub fn is_device(&self) -> bool {
        self.is_block_device() || self.is_char_device()
    }

    pub fn is_fifo(&self) -> bool {
        self.file_type == FileType::Fifo
    }

    pub fn is_socket(&self) -> bool {
        self.file_type == FileType::Socket
    }

    /// The permission string of the entry, e.g. `-rw-r--r--`.
    pub fn strmode(&self) -> String {
        let perm = self.perm;
        let bit = |mask: u32, c: char| if perm & mask != 0 { c } else { '-' };
        let special = |exec: u32, flag: u32, set: char, unset: char| {
            match (perm & exec != 0, perm & flag != 0) {
                (true, true) => set,
                (false, true) => unset,
                (true, false) => 'x',
                (false, false) => '-',
            }
        };

        [
            self.file_type.mode_char(),
            bit(0o400, 'r'),
            bit(0o200, 'w'),
            special(0o100, 0o4000, 's', 'S'),
            bit(0o040, 'r'),
            bit(0o020, 'w'),
            special(0o010, 0o2000, 's', 'S'),
            bit(0o004, 'r'),
            bit(0o002, 'w'),
            special(0o001, 0o1000, 't', 'T'),
        ]
        .into_iter()
        .collect()
    }
}
