//! Directory-entry models.
//!
//! These types describe what a listing returns and what the filesystem
//! advertises about itself. The file handle itself lives in
//! [`object`](crate::object).

use crate::object::FileObject;
use crate::path::RemotePath;
use std::fmt;
use time::OffsetDateTime;

/// Hash kinds a caller may ask for. Only [`HashType::Md5`] is backed by the
/// remote; the rest exist so callers get a typed refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    Md5,
    Sha1,
    Sha256,
    Crc32,
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Crc32 => "crc32",
        })
    }
}

/// A directory discovered by listing.
///
/// The remote doesn't track when folders were created, so `modified` is the
/// time of the listing that produced the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    /// Path relative to the filesystem root.
    pub path: RemotePath,
    pub modified: OffsetDateTime,
}

impl Directory {
    pub fn new(path: RemotePath, modified: OffsetDateTime) -> Self {
        Self { path, modified }
    }

    pub fn remote(&self) -> String {
        self.path.to_string()
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub enum DirEntry {
    Directory(Directory),
    Object(FileObject),
}

impl DirEntry {
    pub fn path(&self) -> &RemotePath {
        match self {
            Self::Directory(dir) => &dir.path,
            Self::Object(object) => object.path(),
        }
    }

    pub fn modified(&self) -> OffsetDateTime {
        match self {
            Self::Directory(dir) => dir.modified,
            Self::Object(object) => object.mod_time(),
        }
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&FileObject> {
        match self {
            Self::Directory(_) => None,
            Self::Object(object) => Some(object),
        }
    }

    pub fn into_object(self) -> Option<FileObject> {
        match self {
            Self::Directory(_) => None,
            Self::Object(object) => Some(object),
        }
    }
}

/// Optional behaviours of the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub case_insensitive: bool,
    /// Folders exist on the remote independently of assets.
    pub can_have_empty_directories: bool,
    /// The remote can hold several assets with the same folder and name.
    pub duplicate_files: bool,
}

/// Upload modifiers, chosen explicitly by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Replace an existing asset with the same public id.
    pub overwrite: bool,
    /// Invalidate cached/delivered copies of the replaced asset.
    pub invalidate: bool,
}

impl UploadOptions {
    /// Options used when replacing the content of an existing file.
    pub const fn update() -> Self {
        Self {
            overwrite: true,
            invalidate: true,
        }
    }
}

/// Read modifiers for [`FileObject::open()`](crate::FileObject::open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOption {
    /// Inclusive byte range. `end: None` reads to the end of the object.
    Range { start: u64, end: Option<u64> },
    /// Start reading at `offset`.
    Seek(u64),
}
