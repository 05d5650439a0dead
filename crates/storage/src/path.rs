//! Canonical hierarchical paths.
//!
//! A [`RemotePath`] is an ordered list of segments relative to the filesystem
//! root. It's the host-neutral side of the path mapping; the remote-encoded
//! side is produced by the [`Codec`](crate::codec::Codec).

use crate::error::{ErrorKind, Result};
use std::fmt;

/// An ordered sequence of path segments. The empty sequence is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath {
    segments: Vec<String>,
}

impl RemotePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses and normalizes a `/`-separated path.
    ///
    /// Empty and `.` segments are dropped, `..` removes the previous segment.
    /// Paths that would leave the root are rejected with
    /// [`InvalidPath`](crate::error::ErrorKind::InvalidPath). The empty string
    /// (and anything that normalizes to it) is the root.
    ///
    /// ```
    /// use cldfs_storage::RemotePath;
    /// assert_eq!(RemotePath::parse("a//b/./c/").unwrap().to_string(), "a/b/c");
    /// assert_eq!(RemotePath::parse("a/../b").unwrap().to_string(), "b");
    /// assert!(RemotePath::parse("").unwrap().is_root());
    /// assert!(RemotePath::parse("../etc").is_err());
    /// ```
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments: Vec<String> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {},
                ".." => {
                    if segments.pop().is_none() {
                        exn::bail!(ErrorKind::InvalidPath(path.to_string()));
                    }
                },
                normal => segments.push(normal.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// Builds a path from already-split segments without normalizing them.
    ///
    /// Segments may contain characters (including `/`) that are only
    /// representable on the remote through the codec.
    pub fn from_segments(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).filter(|s: &String| !s.is_empty()).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Everything but the last segment. The parent of the root is the root.
    pub fn parent(&self) -> Self {
        let end = self.segments.len().saturating_sub(1);
        Self {
            segments: self.segments[..end].to_vec(),
        }
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.clone();
        let name = name.into();
        if !name.is_empty() {
            path.segments.push(name);
        }
        path
    }

    pub fn join(&self, other: &RemotePath) -> Self {
        let mut path = self.clone();
        path.segments.extend(other.segments.iter().cloned());
        path
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}
